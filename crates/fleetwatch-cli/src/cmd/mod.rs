pub mod config;
pub mod plan;
pub mod run;

use crate::config_path::resolve_config;
use anyhow::Context;
use clap::Args;
use fleetwatch_core::config::Config;
use std::path::Path;

/// Flags shared by every command that selects containers.
#[derive(Args, Debug, Default)]
pub struct Selection {
    /// Only consider containers labelled fleetwatch.enable=true
    #[arg(long)]
    pub label_enable: bool,

    /// Restrict the cycle to these container names
    #[arg(value_name = "NAMES")]
    pub names: Vec<String>,
}

impl Selection {
    /// Layer the flags over the file settings.
    pub fn apply(&self, config: &mut Config) {
        if self.label_enable {
            config.label_enable = true;
        }
        if !self.names.is_empty() {
            config.containers = self.names.clone();
        }
    }
}

/// Load the config file that applies, or the built-in defaults when none exists.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    match resolve_config(explicit) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            Config::load(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => {
            tracing::debug!("no config file found, using defaults");
            Ok(Config::default())
        }
    }
}
