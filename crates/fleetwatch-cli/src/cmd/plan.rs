use crate::cmd::{load_config, Selection};
use crate::docker::DockerCli;
use crate::output::{print_json, print_table, sequence};
use clap::Args;
use fleetwatch_core::graph::ConfigIssue;
use fleetwatch_core::resolver::Inclusion;
use fleetwatch_core::scheduler::ExcludedContainer;
use fleetwatch_core::{survey, RuntimeClient, Survey};
use serde::Serialize;
use std::path::Path;

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub selection: Selection,
}

/// One row of the dry run.
#[derive(Debug, Serialize)]
pub struct PlannedContainer {
    pub name: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included: Option<Inclusion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlanOutput {
    pub containers: Vec<PlannedContainer>,
    pub stop_sequence: Vec<String>,
    pub start_sequence: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<ExcludedContainer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_issues: Vec<ConfigIssue>,
    /// Previous updater instances the next cycle will remove.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<String>,
}

impl From<Survey> for PlanOutput {
    fn from(s: Survey) -> Self {
        let containers = s
            .containers
            .values()
            .map(|c| PlannedContainer {
                name: c.name.clone(),
                image: c.image.clone(),
                depends_on: c.depends_on.clone(),
                stale: s.stale.get(&c.name).copied().unwrap_or(false),
                included: s.update_set.inclusion_of(&c.name).cloned(),
                note: s.notes.get(&c.name).map(|r| r.to_string()),
            })
            .collect();
        PlanOutput {
            containers,
            stop_sequence: s.plan.stop_sequence().to_vec(),
            start_sequence: s.plan.start_sequence().to_vec(),
            excluded: s.plan.excluded().to_vec(),
            config_issues: s.graph.issues().to_vec(),
            retired: s.retired.into_iter().map(|c| c.name).collect(),
        }
    }
}

pub fn run(config_path: Option<&Path>, args: PlanArgs, json: bool) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    args.selection.apply(&mut config);

    let client = DockerCli::new(&config.docker)?;
    let params = config.update_params();

    let rt = tokio::runtime::Runtime::new()?;
    let output = rt.block_on(dry_run(&client, &params))?;
    print_plan(&output, json)
}

async fn dry_run<C: RuntimeClient>(
    client: &C,
    params: &fleetwatch_core::UpdateParams,
) -> anyhow::Result<PlanOutput> {
    Ok(survey(client, params).await?.into())
}

fn print_plan(plan: &PlanOutput, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(plan);
    }

    let rows = plan
        .containers
        .iter()
        .map(|c| {
            let reason = match &c.included {
                Some(Inclusion::Stale) => "stale".to_string(),
                Some(Inclusion::Dependent { via }) => format!("depends on '{via}'"),
                None => c.note.clone().unwrap_or_else(|| "-".to_string()),
            };
            vec![
                c.name.clone(),
                c.image.clone(),
                c.depends_on.clone().unwrap_or_else(|| "-".to_string()),
                if c.included.is_some() { "yes" } else { "no" }.to_string(),
                reason,
            ]
        })
        .collect();
    print_table(&["CONTAINER", "IMAGE", "DEPENDS ON", "UPDATE", "REASON"], rows);

    println!();
    println!("Stop order:  {}", sequence(&plan.stop_sequence));
    println!("Start order: {}", sequence(&plan.start_sequence));
    for excluded in &plan.excluded {
        println!("[excluded] {}: {}", excluded.name, excluded.issue);
    }
    for issue in &plan.config_issues {
        println!("[config] {issue}");
    }
    for name in &plan.retired {
        println!("[retired] {name}: previous updater instance, removed next cycle");
    }
    Ok(())
}
