use crate::graph::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Per-container staleness for one cycle, keyed by container name.
pub type StalenessMap = HashMap<String, bool>;

/// Why a container belongs to the update set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Inclusion {
    Stale,
    /// Reached from the nearest stale container up its dependency chain.
    Dependent { via: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMember {
    pub name: String,
    /// `None` when the container sits on an invalid chain.
    pub depth: Option<usize>,
    pub inclusion: Inclusion,
}

/// Containers that must be recycled this cycle: every stale container plus
/// all of its direct and transitive dependents.
#[derive(Debug, Clone, Default)]
pub struct UpdateSet {
    members: BTreeMap<String, UpdateMember>,
}

impl UpdateSet {
    pub fn resolve(graph: &DependencyGraph, stale: &StalenessMap) -> Self {
        let mut roots: Vec<&str> = stale
            .iter()
            .filter(|(name, is_stale)| **is_stale && graph.contains(name))
            .map(|(name, _)| name.as_str())
            .collect();
        roots.sort_unstable();

        let mut members: BTreeMap<String, UpdateMember> = BTreeMap::new();
        for root in &roots {
            members.insert(
                (*root).to_string(),
                UpdateMember {
                    name: (*root).to_string(),
                    depth: graph.depth(root),
                    inclusion: Inclusion::Stale,
                },
            );
        }

        // Nodes already present were (or will be) expanded by whoever added
        // them, so each container is traversed at most once.
        for root in roots {
            let mut queue: VecDeque<&str> = VecDeque::from([root]);
            while let Some(parent) = queue.pop_front() {
                let via = match &members[parent].inclusion {
                    Inclusion::Stale => parent.to_string(),
                    Inclusion::Dependent { via } => via.clone(),
                };
                for child in graph.dependents_of(parent) {
                    if members.contains_key(child) {
                        continue;
                    }
                    members.insert(
                        child.clone(),
                        UpdateMember {
                            name: child.clone(),
                            depth: graph.depth(child),
                            inclusion: Inclusion::Dependent { via: via.clone() },
                        },
                    );
                    queue.push_back(child.as_str());
                }
            }
        }

        Self { members }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&UpdateMember> {
        self.members.get(name)
    }

    /// Members in name order.
    pub fn members(&self) -> impl Iterator<Item = &UpdateMember> {
        self.members.values()
    }

    pub fn depth_of(&self, name: &str) -> Option<usize> {
        self.members.get(name)?.depth
    }

    pub fn inclusion_of(&self, name: &str) -> Option<&Inclusion> {
        self.members.get(name).map(|m| &m.inclusion)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
