//! Dependency graph for one update cycle.
//!
//! Every container names at most one dependency, so the relation is a forest
//! (plus whatever cycles a misconfiguration introduces). It is stored as a
//! name → dependency index and a reverse adjacency list rather than a general
//! graph structure; every traversal stays linear in the container count.

use crate::container::Container;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// ConfigIssue
// ---------------------------------------------------------------------------

/// A configuration problem found while building the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigIssue {
    /// A second container reported the same name; only the first is kept.
    DuplicateName { container: String },
    /// The dependency names a container outside this cycle's view.
    DanglingDependency {
        container: String,
        dependency: String,
    },
    /// Following the dependency chain never reaches a root.
    /// `chain` is the loop itself, starting at its smallest name.
    DependencyCycle {
        container: String,
        chain: Vec<String>,
    },
}

impl ConfigIssue {
    pub fn container(&self) -> &str {
        match self {
            Self::DuplicateName { container }
            | Self::DanglingDependency { container, .. }
            | Self::DependencyCycle { container, .. } => container,
        }
    }

    /// Blocking issues exclude the container from automatic ordering.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::DependencyCycle { .. })
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { container } => {
                write!(f, "duplicate container name '{container}', ignoring later instance")
            }
            Self::DanglingDependency {
                container,
                dependency,
            } => write!(
                f,
                "'{container}' depends on unknown container '{dependency}', treating as no dependency"
            ),
            Self::DependencyCycle { container, chain } => write!(
                f,
                "'{container}' is on a cyclic dependency chain: {} -> {}",
                chain.join(" -> "),
                chain.first().map(String::as_str).unwrap_or_default()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// ChainStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainStatus {
    /// The chain ends at a root `depth` hops away.
    Valid { depth: usize },
    /// The container is on, or leads into, a dependency cycle.
    Cyclic,
}

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependency: HashMap<String, Option<String>>,
    dependents: BTreeMap<String, Vec<String>>,
    status: HashMap<String, ChainStatus>,
    issues: Vec<ConfigIssue>,
}

enum Walk {
    Root,
    Known(usize),
    IntoCycle(Vec<String>),
    Cycle(usize),
}

impl DependencyGraph {
    /// Build the graph for one cycle. Pure: never fails, problems become
    /// [`ConfigIssue`]s.
    pub fn build(containers: &[Container]) -> Self {
        let mut issues = Vec::new();
        let mut raw: BTreeMap<String, Option<String>> = BTreeMap::new();

        for c in containers {
            if raw.contains_key(&c.name) {
                issues.push(ConfigIssue::DuplicateName {
                    container: c.name.clone(),
                });
                continue;
            }
            raw.insert(c.name.clone(), c.depends_on.clone());
        }

        let mut dependency: HashMap<String, Option<String>> = HashMap::with_capacity(raw.len());
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, dep) in &raw {
            let resolved = match dep {
                Some(d) if raw.contains_key(d) => Some(d.clone()),
                Some(d) => {
                    issues.push(ConfigIssue::DanglingDependency {
                        container: name.clone(),
                        dependency: d.clone(),
                    });
                    None
                }
                None => None,
            };
            if let Some(d) = &resolved {
                // `raw` iterates in name order, so each list stays sorted.
                dependents.entry(d.clone()).or_default().push(name.clone());
            }
            dependency.insert(name.clone(), resolved);
        }

        let (status, cycles) = chain_statuses(&raw, &dependency);
        for (name, chain) in cycles {
            issues.push(ConfigIssue::DependencyCycle {
                container: name,
                chain,
            });
        }

        Self {
            dependency,
            dependents,
            status,
            issues,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dependency.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.dependency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependency.is_empty()
    }

    /// The resolved dependency; dangling references read as `None`.
    pub fn dependency_of(&self, name: &str) -> Option<&str> {
        self.dependency.get(name)?.as_deref()
    }

    /// Direct dependents, sorted by name.
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents
            .get(name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn chain_status(&self, name: &str) -> Option<ChainStatus> {
        self.status.get(name).copied()
    }

    /// `None` for unknown containers and containers on an invalid chain.
    pub fn depth(&self, name: &str) -> Option<usize> {
        match self.status.get(name)? {
            ChainStatus::Valid { depth } => Some(*depth),
            ChainStatus::Cyclic => None,
        }
    }

    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }

    /// The blocking issue that excludes `name` from ordering, if any.
    pub fn blocking_issue(&self, name: &str) -> Option<&ConfigIssue> {
        self.issues
            .iter()
            .find(|i| i.is_blocking() && i.container() == name)
    }
}

/// Walk every chain once, memoising depths. A chain that revisits one of its
/// own members before reaching a root is cyclic, and so is every chain that
/// runs into it.
fn chain_statuses(
    names: &BTreeMap<String, Option<String>>,
    dependency: &HashMap<String, Option<String>>,
) -> (HashMap<String, ChainStatus>, Vec<(String, Vec<String>)>) {
    let mut status: HashMap<String, ChainStatus> = HashMap::with_capacity(names.len());
    let mut cycle_of: HashMap<String, Vec<String>> = HashMap::new();

    for start in names.keys() {
        if status.contains_key(start) {
            continue;
        }

        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashMap<&str, usize> = HashMap::new();
        let mut cur: &str = start;

        let walk = loop {
            match status.get(cur) {
                Some(ChainStatus::Valid { depth }) => break Walk::Known(*depth),
                Some(ChainStatus::Cyclic) => {
                    break Walk::IntoCycle(cycle_of.get(cur).cloned().unwrap_or_default())
                }
                None => {}
            }
            if let Some(&idx) = on_path.get(cur) {
                break Walk::Cycle(idx);
            }
            on_path.insert(cur, path.len());
            path.push(cur);
            match dependency.get(cur).and_then(|d| d.as_deref()) {
                Some(next) => cur = next,
                None => break Walk::Root,
            }
        };

        match walk {
            Walk::Root => assign_depths(&mut status, &path, 0),
            Walk::Known(depth) => assign_depths(&mut status, &path, depth + 1),
            Walk::Cycle(idx) => {
                let chain = canonical_cycle(&path[idx..]);
                mark_cyclic(&mut status, &mut cycle_of, &path, &chain);
            }
            Walk::IntoCycle(chain) => mark_cyclic(&mut status, &mut cycle_of, &path, &chain),
        }
    }

    let mut cycles: Vec<(String, Vec<String>)> = cycle_of.into_iter().collect();
    cycles.sort_by(|a, b| a.0.cmp(&b.0));
    (status, cycles)
}

/// `path` ends one hop above a node at `base` depth (or at a root when
/// `base == 0`).
fn assign_depths(status: &mut HashMap<String, ChainStatus>, path: &[&str], base: usize) {
    for (hops, name) in path.iter().rev().enumerate() {
        status.insert(
            (*name).to_string(),
            ChainStatus::Valid { depth: base + hops },
        );
    }
}

fn mark_cyclic(
    status: &mut HashMap<String, ChainStatus>,
    cycle_of: &mut HashMap<String, Vec<String>>,
    path: &[&str],
    chain: &[String],
) {
    for name in path {
        status.insert((*name).to_string(), ChainStatus::Cyclic);
        cycle_of.insert((*name).to_string(), chain.to_vec());
    }
}

fn canonical_cycle(members: &[&str]) -> Vec<String> {
    let start = members
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    members[start..]
        .iter()
        .chain(members[..start].iter())
        .map(|n| (*n).to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::container;

    #[test]
    fn builds_dependency_and_reverse_index() {
        let graph = DependencyGraph::build(&[
            container("db", None),
            container("web", Some("db")),
            container("api", Some("db")),
            container("cache", None),
        ]);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.dependency_of("web"), Some("db"));
        assert_eq!(graph.dependency_of("db"), None);
        assert_eq!(graph.dependents_of("db"), &["api".to_string(), "web".to_string()]);
        assert!(graph.dependents_of("cache").is_empty());
        assert!(graph.issues().is_empty());
    }

    #[test]
    fn depths_along_a_chain() {
        let graph = DependencyGraph::build(&[
            container("d", Some("c")),
            container("c", Some("b")),
            container("b", Some("a")),
            container("a", None),
        ]);
        assert_eq!(graph.depth("a"), Some(0));
        assert_eq!(graph.depth("b"), Some(1));
        assert_eq!(graph.depth("c"), Some(2));
        assert_eq!(graph.depth("d"), Some(3));
    }

    #[test]
    fn dangling_reference_is_treated_as_root() {
        let graph = DependencyGraph::build(&[container("web", Some("ghost"))]);
        assert_eq!(graph.dependency_of("web"), None);
        assert_eq!(graph.depth("web"), Some(0));
        assert_eq!(
            graph.issues(),
            &[ConfigIssue::DanglingDependency {
                container: "web".into(),
                dependency: "ghost".into(),
            }]
        );
        assert!(graph.blocking_issue("web").is_none());
    }

    #[test]
    fn duplicate_names_keep_first() {
        let graph = DependencyGraph::build(&[
            container("db", None),
            container("web", Some("db")),
            container("web", None),
        ]);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.dependency_of("web"), Some("db"));
        assert!(graph
            .issues()
            .contains(&ConfigIssue::DuplicateName { container: "web".into() }));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = DependencyGraph::build(&[container("loop", Some("loop"))]);
        assert_eq!(graph.chain_status("loop"), Some(ChainStatus::Cyclic));
        assert_eq!(graph.depth("loop"), None);
        assert!(graph.blocking_issue("loop").is_some());
    }

    #[test]
    fn cycle_members_and_feeders_are_invalid() {
        let graph = DependencyGraph::build(&[
            container("a", Some("b")),
            container("b", Some("c")),
            container("c", Some("a")),
            container("feeder", Some("a")),
            container("root", None),
            container("leaf", Some("root")),
        ]);
        for name in ["a", "b", "c", "feeder"] {
            assert_eq!(graph.chain_status(name), Some(ChainStatus::Cyclic), "{name}");
        }
        assert_eq!(graph.depth("leaf"), Some(1));

        let issue = graph.blocking_issue("feeder").unwrap();
        assert_eq!(
            issue,
            &ConfigIssue::DependencyCycle {
                container: "feeder".into(),
                chain: vec!["a".into(), "b".into(), "c".into()],
            }
        );
        assert_eq!(graph.issues().iter().filter(|i| i.is_blocking()).count(), 4);
    }

    #[test]
    fn cycle_chain_is_independent_of_input_order() {
        let forward = DependencyGraph::build(&[
            container("x", Some("y")),
            container("y", Some("z")),
            container("z", Some("x")),
        ]);
        let backward = DependencyGraph::build(&[
            container("z", Some("x")),
            container("y", Some("z")),
            container("x", Some("y")),
        ]);
        assert_eq!(forward.issues(), backward.issues());
    }

    #[test]
    fn issue_display_names_the_loop() {
        let issue = ConfigIssue::DependencyCycle {
            container: "a".into(),
            chain: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            issue.to_string(),
            "'a' is on a cyclic dependency chain: a -> b -> a"
        );
    }
}
