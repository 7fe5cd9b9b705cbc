use crate::graph::ConfigIssue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Neither stale nor depending on anything stale.
    NotStale,
    /// Stale, but monitoring only.
    MonitorOnly,
    /// Staleness could not be determined; treated as not stale.
    StaleCheckFailed { error: String },
    /// Its dependency was not recycled, so it was not restarted.
    UpstreamFailed { dependency: String },
    /// The cycle was cancelled before this container was processed.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStale => f.write_str("not stale"),
            Self::MonitorOnly => f.write_str("monitor only"),
            Self::StaleCheckFailed { error } => write!(f, "staleness check failed: {error}"),
            Self::UpstreamFailed { dependency } => {
                write!(f, "dependency '{dependency}' was not recycled")
            }
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// The step a failed container was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedPhase {
    Configuration,
    PreUpdate,
    Stop,
    Start,
}

impl FailedPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            FailedPhase::Configuration => "configuration",
            FailedPhase::PreUpdate => "pre-update",
            FailedPhase::Stop => "stop",
            FailedPhase::Start => "start",
        }
    }
}

impl fmt::Display for FailedPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Recycled { new_id: String },
    Skipped(SkipReason),
    Failed { phase: FailedPhase, error: String },
}

impl Outcome {
    pub fn failed(phase: FailedPhase, error: impl fmt::Display) -> Self {
        Self::Failed {
            phase,
            error: error.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Recycled { .. } => "recycled",
            Self::Skipped(_) => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Self::Recycled { new_id } => format!("new id {}", short_id(new_id)),
            Self::Skipped(reason) => reason.to_string(),
            Self::Failed { phase, error } => format!("{phase}: {error}"),
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

// ---------------------------------------------------------------------------
// UpdateReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReport {
    pub name: String,
    pub image: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// A problem that did not change any container's outcome, such as a failed
/// image cleanup or post-update hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleWarning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub scanned: usize,
    pub recycled: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The user-visible outcome of one update cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every listed container, in name order.
    pub containers: Vec<ContainerReport>,
    pub stop_sequence: Vec<String>,
    pub start_sequence: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_issues: Vec<ConfigIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CycleWarning>,
}

impl UpdateReport {
    pub fn recycled(&self) -> impl Iterator<Item = &ContainerReport> {
        self.containers
            .iter()
            .filter(|c| matches!(c.outcome, Outcome::Recycled { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ContainerReport> {
        self.containers
            .iter()
            .filter(|c| matches!(c.outcome, Outcome::Skipped(_)))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ContainerReport> {
        self.containers
            .iter()
            .filter(|c| matches!(c.outcome, Outcome::Failed { .. }))
    }

    pub fn get(&self, name: &str) -> Option<&ContainerReport> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            scanned: self.containers.len(),
            recycled: self.recycled().count(),
            skipped: self.skipped().count(),
            failed: self.failed().count(),
        }
    }
}
