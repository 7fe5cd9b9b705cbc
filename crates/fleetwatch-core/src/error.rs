use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("an update cycle is already in progress")]
    CycleInProgress,

    #[error("invalid container name '{0}': must start with an alphanumeric and contain only [a-zA-Z0-9_.-]")]
    InvalidName(String),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("failed to list containers: {0}")]
    ListFailed(#[source] RuntimeError),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;

/// Failure reported by a [`RuntimeClient`](crate::client::RuntimeClient).
///
/// Every variant is scoped to the single container or operation it came from.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("operation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to parse runtime output: {0}")]
    Parse(String),
}

impl RuntimeError {
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
