mod cmd;
mod config_path;
mod docker;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, plan::PlanArgs, run::RunArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fleetwatch",
    about = "Keep running containers on their latest images, restarting dependents in order",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./fleetwatch.yaml, then ~/.config/fleetwatch/config.yaml)
    #[arg(long, global = true, env = "FLEETWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the fleet and recycle containers whose images changed
    Run(RunArgs),

    /// Show what the next cycle would recycle, and in which order
    Plan(PlanArgs),

    /// Validate, show or create the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(config, args, cli.json),
        Commands::Plan(args) => cmd::plan::run(config, args, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
