use crate::error::{FleetError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Label keys
// ---------------------------------------------------------------------------

pub const LABEL_PREFIX: &str = "fleetwatch.";
pub const DEPENDS_ON_LABEL: &str = "fleetwatch.depends-on";
pub const ENABLE_LABEL: &str = "fleetwatch.enable";
pub const MONITOR_ONLY_LABEL: &str = "fleetwatch.monitor-only";
pub const STOP_SIGNAL_LABEL: &str = "fleetwatch.stop-signal";
pub const SELF_LABEL: &str = "fleetwatch.self";
pub const PRE_UPDATE_LABEL: &str = "fleetwatch.lifecycle.pre-update";
pub const PRE_UPDATE_TIMEOUT_LABEL: &str = "fleetwatch.lifecycle.pre-update-timeout";
pub const POST_UPDATE_LABEL: &str = "fleetwatch.lifecycle.post-update";
pub const POST_UPDATE_TIMEOUT_LABEL: &str = "fleetwatch.lifecycle.post-update-timeout";

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.\-]*$").unwrap())
}

/// Strip the leading `/` the runtime reports and validate the remainder.
pub fn normalize_name(raw: &str) -> Result<String> {
    let name = raw.trim().trim_start_matches('/');
    if name.is_empty() || !name_re().is_match(name) {
        return Err(FleetError::InvalidName(raw.to_string()));
    }
    Ok(name.to_string())
}

static RETIRED_RE: OnceLock<Regex> = OnceLock::new();

fn retired_re() -> &'static Regex {
    RETIRED_RE.get_or_init(|| Regex::new(r"-fleetwatch-[0-9a-f]{8}$").unwrap())
}

/// The name an updater container moves to so its replacement can take the
/// original one.
pub fn retired_name(name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{name}-fleetwatch-{}", &suffix[..8])
}

// ---------------------------------------------------------------------------
// LifecycleHook
// ---------------------------------------------------------------------------

/// A command executed inside a container around its replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleHook {
    pub command: String,
    #[serde(
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub timeout: Duration,
}

fn serialize_secs<S>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_u64(d.as_secs())
}

fn deserialize_secs<'de, D>(d: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Duration::from_secs(u64::deserialize(d)?))
}

// ---------------------------------------------------------------------------
// ContainerSettings
// ---------------------------------------------------------------------------

/// Per-container behaviour parsed once from `fleetwatch.*` labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// `None` when the enable label is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub monitor_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_update: Option<LifecycleHook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_update: Option<LifecycleHook>,
    /// Marks the updater's own container.
    #[serde(default)]
    pub is_updater: bool,
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// A running container as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub image_id: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    #[serde(default)]
    pub settings: ContainerSettings,
}

impl Container {
    pub fn new(
        id: impl Into<String>,
        name: &str,
        image: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            name: normalize_name(name)?,
            image: image.into(),
            image_id: String::new(),
            created,
            depends_on: None,
            settings: ContainerSettings::default(),
        })
    }

    pub fn with_image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = image_id.into();
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on = Some(name.into());
        self
    }

    /// Apply every `fleetwatch.*` label. Unknown keys are ignored and
    /// malformed values fall back to the default with a warning.
    pub fn with_labels(mut self, labels: &HashMap<String, String>) -> Self {
        self.depends_on = labels
            .get(DEPENDS_ON_LABEL)
            .and_then(|v| parse_depends_on(&self.name, v));

        self.settings.enabled = labels
            .get(ENABLE_LABEL)
            .and_then(|v| parse_bool(&self.name, ENABLE_LABEL, v));
        self.settings.monitor_only = labels
            .get(MONITOR_ONLY_LABEL)
            .and_then(|v| parse_bool(&self.name, MONITOR_ONLY_LABEL, v))
            .unwrap_or(false);
        self.settings.is_updater = labels
            .get(SELF_LABEL)
            .and_then(|v| parse_bool(&self.name, SELF_LABEL, v))
            .unwrap_or(false);
        self.settings.stop_signal = labels
            .get(STOP_SIGNAL_LABEL)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        self.settings.pre_update =
            parse_hook(&self.name, labels, PRE_UPDATE_LABEL, PRE_UPDATE_TIMEOUT_LABEL);
        self.settings.post_update =
            parse_hook(&self.name, labels, POST_UPDATE_LABEL, POST_UPDATE_TIMEOUT_LABEL);
        self
    }

    pub fn is_monitor_only(&self) -> bool {
        self.settings.monitor_only
    }

    /// A previous updater instance still running under its [`retired_name`].
    pub fn is_retired_updater(&self) -> bool {
        self.settings.is_updater && retired_re().is_match(&self.name)
    }
}

fn parse_depends_on(container: &str, raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if value.contains(',') {
        tracing::warn!(
            container,
            value,
            "{DEPENDS_ON_LABEL} names more than one container; only a single dependency is supported, ignoring"
        );
        return None;
    }
    Some(value.trim_start_matches('/').to_string())
}

fn parse_bool(container: &str, label: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        "" => None,
        other => {
            tracing::warn!(container, label, value = other, "unrecognised boolean label value");
            None
        }
    }
}

fn parse_hook(
    container: &str,
    labels: &HashMap<String, String>,
    command_label: &str,
    timeout_label: &str,
) -> Option<LifecycleHook> {
    let command = labels.get(command_label)?.trim();
    if command.is_empty() {
        return None;
    }
    let timeout = match labels.get(timeout_label).map(|v| v.trim().parse::<u64>()) {
        None => DEFAULT_HOOK_TIMEOUT,
        Some(Ok(secs)) => Duration::from_secs(secs),
        Some(Err(_)) => {
            tracing::warn!(container, label = timeout_label, "invalid hook timeout, using default");
            DEFAULT_HOOK_TIMEOUT
        }
    };
    Some(LifecycleHook {
        command: command.to_string(),
        timeout,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
