use crate::cmd::{load_config, Selection};
use crate::docker::DockerCli;
use crate::output::print_report;
use anyhow::Context;
use clap::Args;
use fleetwatch_core::{run_cycle, RuntimeClient, UpdateContext, UpdateParams};
use std::path::Path;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Seconds between cycles (overrides interval_seconds)
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Remove old images after a successful recycle
    #[arg(long)]
    pub cleanup: bool,

    /// Report stale containers without recycling anything
    #[arg(long)]
    pub monitor_only: bool,

    /// Run pre/post-update commands declared in container labels
    #[arg(long)]
    pub lifecycle_hooks: bool,

    /// Grace period in seconds before a stopping container is killed
    #[arg(long, value_name = "SECS")]
    pub stop_timeout: Option<u64>,

    #[command(flatten)]
    pub selection: Selection,
}

pub fn run(config_path: Option<&Path>, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    args.selection.apply(&mut config);
    if args.cleanup {
        config.cleanup = true;
    }
    if args.monitor_only {
        config.monitor_only = true;
    }
    if args.lifecycle_hooks {
        config.lifecycle_hooks = true;
    }
    if let Some(secs) = args.stop_timeout {
        config.stop_timeout_seconds = secs;
    }
    if let Some(secs) = args.interval {
        config.interval_seconds = secs;
    }
    if !args.once && config.interval_seconds == 0 {
        anyhow::bail!("interval must be greater than 0");
    }

    let client = DockerCli::new(&config.docker)?;
    let params = config.update_params();
    let interval = config.interval();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(watch(&client, &params, interval, args.once, json))
}

async fn watch<C: RuntimeClient>(
    client: &C,
    params: &UpdateParams,
    interval: Duration,
    once: bool,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = UpdateContext::new();
    let cancel = ctx.cancellation_token();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current container");
                cancel.cancel();
            }
        }
    });

    loop {
        match run_cycle(&ctx, client, params).await {
            Ok(report) => {
                print_report(&report, json)?;
                if once && report.has_failures() {
                    anyhow::bail!(
                        "{} container(s) failed to update",
                        report.summary().failed
                    );
                }
            }
            Err(e) if once => return Err(e).context("update cycle failed"),
            Err(e) => tracing::error!(error = %e, "update cycle failed"),
        }

        if once || cancel.is_cancelled() {
            return Ok(());
        }

        tracing::info!(next_in_secs = interval.as_secs(), "waiting for next cycle");
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
