use fleetwatch_core::report::UpdateReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// `a -> b -> c`, or `(none)`.
pub fn sequence(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(" -> ")
    }
}

pub fn print_report(report: &UpdateReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }

    let rows = report
        .containers
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.image.clone(),
                c.outcome.label().to_string(),
                c.outcome.detail(),
            ]
        })
        .collect();
    print_table(&["CONTAINER", "IMAGE", "STATUS", "DETAIL"], rows);

    println!();
    println!("Stop order:  {}", sequence(&report.stop_sequence));
    println!("Start order: {}", sequence(&report.start_sequence));

    for issue in &report.config_issues {
        println!("[config] {issue}");
    }
    for w in &report.warnings {
        match &w.container {
            Some(name) => println!("[warning] {name}: {}", w.message),
            None => println!("[warning] {}", w.message),
        }
    }

    let s = report.summary();
    println!(
        "\n{} scanned, {} recycled, {} skipped, {} failed",
        s.scanned, s.recycled, s.skipped, s.failed
    );
    Ok(())
}
