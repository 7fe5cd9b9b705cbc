use crate::container::Container;
use serde::{Deserialize, Serialize};

/// Selects which containers a cycle may see.
///
/// Runtime clients apply this while listing; the core never lists twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerFilter {
    /// Only these names, when non-empty.
    #[serde(default)]
    pub names: Vec<String>,
    /// Never these names.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Require `fleetwatch.enable=true` on every container.
    #[serde(default)]
    pub label_enable: bool,
}

impl ContainerFilter {
    pub fn matches(&self, container: &Container) -> bool {
        if self.exclude.iter().any(|n| n == &container.name) {
            return false;
        }
        if !self.names.is_empty() && !self.names.iter().any(|n| n == &container.name) {
            return false;
        }
        match container.settings.enabled {
            Some(false) => false,
            Some(true) => true,
            None => !self.label_enable,
        }
    }
}
