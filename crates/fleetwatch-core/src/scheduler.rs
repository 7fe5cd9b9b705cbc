use crate::graph::{ConfigIssue, DependencyGraph};
use crate::resolver::{Inclusion, UpdateSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A member of the update set left out of ordering because its chain is
/// invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedContainer {
    pub name: String,
    pub issue: ConfigIssue,
}

/// The ordered, immutable recycle plan for one cycle.
///
/// Invariants:
/// - every dependent precedes its dependencies in `stop_sequence`;
/// - `start_sequence` is exactly `stop_sequence` reversed;
/// - ordering depends only on structure and staleness, never on the order
///   in which containers were listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlan {
    stop_sequence: Vec<String>,
    start_sequence: Vec<String>,
    excluded: Vec<ExcludedContainer>,
    /// Dependency of each planned container, when that dependency is planned too.
    #[serde(skip)]
    upstream: HashMap<String, String>,
    /// Planned containers that are stale themselves, not only pulled in.
    #[serde(skip)]
    stale: HashSet<String>,
}

impl UpdatePlan {
    /// Order the update set by depth, deepest first, breaking ties by name.
    pub fn schedule(graph: &DependencyGraph, set: &UpdateSet) -> Self {
        let mut ordered: Vec<(usize, &str)> = Vec::with_capacity(set.len());
        let mut excluded = Vec::new();

        for member in set.members() {
            match member.depth {
                Some(depth) => ordered.push((depth, member.name.as_str())),
                None => {
                    let issue = graph.blocking_issue(&member.name).cloned().unwrap_or_else(|| {
                        ConfigIssue::DependencyCycle {
                            container: member.name.clone(),
                            chain: Vec::new(),
                        }
                    });
                    tracing::warn!(container = %member.name, "{issue}");
                    excluded.push(ExcludedContainer {
                        name: member.name.clone(),
                        issue,
                    });
                }
            }
        }

        ordered.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        let stop_sequence: Vec<String> = ordered.iter().map(|(_, n)| (*n).to_string()).collect();
        let start_sequence: Vec<String> = stop_sequence.iter().rev().cloned().collect();

        let upstream = stop_sequence
            .iter()
            .filter_map(|name| {
                let dep = graph.dependency_of(name)?;
                set.contains(dep).then(|| (name.clone(), dep.to_string()))
            })
            .collect();

        let stale = stop_sequence
            .iter()
            .filter(|name| set.inclusion_of(name) == Some(&Inclusion::Stale))
            .cloned()
            .collect();

        Self {
            stop_sequence,
            start_sequence,
            excluded,
            upstream,
            stale,
        }
    }

    pub fn stop_sequence(&self) -> &[String] {
        &self.stop_sequence
    }

    pub fn start_sequence(&self) -> &[String] {
        &self.start_sequence
    }

    pub fn excluded(&self) -> &[ExcludedContainer] {
        &self.excluded
    }

    /// The planned dependency that must be back up before `name` starts.
    pub fn upstream_of(&self, name: &str) -> Option<&str> {
        self.upstream.get(name).map(String::as_str)
    }

    /// True for planned containers whose own image went stale.
    pub fn is_stale(&self, name: &str) -> bool {
        self.stale.contains(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stop_sequence.iter().any(|n| n == name) || self.excluded.iter().any(|e| e.name == name)
    }

    /// True when nothing needs recycling or reporting.
    pub fn is_empty(&self) -> bool {
        self.stop_sequence.is_empty() && self.excluded.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
