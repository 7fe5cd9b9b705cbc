use crate::container::normalize_name;
use crate::error::{FleetError, Result};
use crate::filter::ContainerFilter;
use crate::update::UpdateParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: String) -> Self {
        Self {
            level: WarnLevel::Warning,
            message,
        }
    }

    fn error(message: String) -> Self {
        Self {
            level: WarnLevel::Error,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// DockerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Binary name or path; bare names are resolved on `PATH`.
    #[serde(default = "default_docker_binary")]
    pub binary: String,
    /// Upper bound for any single docker invocation, including pulls.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_command_timeout() -> u64 {
    120
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: default_docker_binary(),
            command_timeout_seconds: default_command_timeout(),
        }
    }
}

impl DockerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Seconds between cycles in daemon mode.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: u64,
    #[serde(default)]
    pub cleanup: bool,
    #[serde(default)]
    pub monitor_only: bool,
    #[serde(default)]
    pub lifecycle_hooks: bool,
    #[serde(default)]
    pub label_enable: bool,
    /// Allow-list; empty means every container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub docker: DockerConfig,
}

fn default_version() -> u32 {
    1
}

fn default_interval() -> u64 {
    86_400
}

fn default_stop_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            interval_seconds: default_interval(),
            stop_timeout_seconds: default_stop_timeout(),
            cleanup: false,
            monitor_only: false,
            lifecycle_hooks: false,
            label_enable: false,
            containers: Vec::new(),
            exclude: Vec::new(),
            docker: DockerConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FleetError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn filter(&self) -> ContainerFilter {
        ContainerFilter {
            names: self.containers.clone(),
            exclude: self.exclude.clone(),
            label_enable: self.label_enable,
        }
    }

    pub fn update_params(&self) -> UpdateParams {
        UpdateParams {
            filter: self.filter(),
            stop_timeout: Duration::from_secs(self.stop_timeout_seconds),
            cleanup: self.cleanup,
            monitor_only: self.monitor_only,
            lifecycle_hooks: self.lifecycle_hooks,
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.version != 1 {
            warnings.push(ConfigWarning::warning(format!(
                "unknown config version {}, reading as version 1",
                self.version
            )));
        }

        if self.interval_seconds == 0 {
            warnings.push(ConfigWarning::error(
                "interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.stop_timeout_seconds > 300 {
            warnings.push(ConfigWarning::warning(format!(
                "stop_timeout_seconds={} (>300 is unusual)",
                self.stop_timeout_seconds
            )));
        }

        for name in self.containers.iter().chain(&self.exclude) {
            if normalize_name(name).is_err() {
                warnings.push(ConfigWarning::error(format!(
                    "invalid container name '{name}'"
                )));
            }
        }

        for name in &self.containers {
            if self.exclude.contains(name) {
                warnings.push(ConfigWarning::warning(format!(
                    "'{name}' is in both containers and exclude; it will never be updated"
                )));
            }
        }

        if self.docker.binary.trim().is_empty() {
            warnings.push(ConfigWarning::error(
                "docker.binary must not be empty".to_string(),
            ));
        }

        if self.docker.command_timeout_seconds == 0 {
            warnings.push(ConfigWarning::error(
                "docker.command_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
