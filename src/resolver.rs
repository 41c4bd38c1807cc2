//! Dependency-aware plugin scheduling.
//!
//! Plugins of one kind are ordered with Kahn's algorithm over a graph keyed
//! by plugin name. The result is a list of waves: every plugin in a wave
//! only depends on plugins in earlier waves (or in an earlier kind), so a
//! wave may run concurrently. Waves are sorted by name, which makes the
//! schedule reproducible for identical input.

use crate::error::OrchestratorError;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Execution order for one plugin kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    waves: Vec<Vec<String>>,
}

impl Schedule {
    /// Groups of plugins that can run together, in order.
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Flattened linear order.
    pub fn order(&self) -> Vec<String> {
        self.waves.iter().flatten().cloned().collect()
    }

    /// Every scheduled plugin name.
    pub fn names(&self) -> BTreeSet<String> {
        self.waves.iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

/// Order `requested` plugins so each runs after its dependencies.
///
/// * `enabled` - plugins of this kind enabled for the run. Enabled
///   dependencies that were not requested are pulled in.
/// * `upstream` - enabled plugins of preceding kinds; depending on them is
///   satisfied without an edge in this graph.
/// * `dependencies_of` - declared dependencies of a plugin; its errors
///   (unknown or unloadable plugin) abort resolution.
///
/// A dependency that is neither enabled here nor upstream is a
/// `MissingDependency`, even if such a plugin is installed.
pub fn resolve<F>(
    requested: &[String],
    enabled: &BTreeSet<String>,
    upstream: &BTreeSet<String>,
    mut dependencies_of: F,
) -> Result<Schedule, OrchestratorError>
where
    F: FnMut(&str) -> Result<Vec<String>, OrchestratorError>,
{
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut pending: BTreeSet<String> = requested.iter().cloned().collect();

    while let Some(name) = pending.pop_first() {
        if graph.contains_key(&name) {
            continue;
        }

        let declared: BTreeSet<String> = dependencies_of(&name)?.into_iter().collect();
        let mut local = BTreeSet::new();

        for dependency in declared {
            if enabled.contains(&dependency) {
                if !graph.contains_key(&dependency) {
                    pending.insert(dependency.clone());
                }
                local.insert(dependency);
            } else if !upstream.contains(&dependency) {
                return Err(OrchestratorError::MissingDependency {
                    plugin: name,
                    dependency,
                });
            }
        }

        graph.insert(name, local);
    }

    let waves = kahn_waves(&graph)?;
    debug!("Resolved schedule: {:?}", waves);

    Ok(Schedule { waves })
}

fn kahn_waves(graph: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<Vec<String>>, OrchestratorError> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (node, deps) in graph {
        in_degree.insert(node, deps.len());
        for dep in deps {
            dependents.entry(dep.as_str()).or_default().push(node.as_str());
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut waves = Vec::new();
    let mut placed = 0;

    while !ready.is_empty() {
        ready.sort_unstable();
        let mut next = Vec::new();

        for node in &ready {
            for dependent in dependents.get(node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }

        placed += ready.len();
        waves.push(ready.iter().map(|n| n.to_string()).collect());
        ready = next;
    }

    if placed < graph.len() {
        let stuck: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(node, _)| *node)
            .collect();
        return Err(OrchestratorError::DependencyCycle(cycle_members(graph, stuck)));
    }

    Ok(waves)
}

/// Strip plugins that are only blocked by a cycle, leaving the ones on it.
fn cycle_members(graph: &BTreeMap<String, BTreeSet<String>>, mut stuck: BTreeSet<&str>) -> Vec<String> {
    loop {
        let downstream: Vec<&str> = stuck
            .iter()
            .copied()
            .filter(|node| {
                !stuck
                    .iter()
                    .any(|other| graph.get(*other).is_some_and(|deps| deps.contains(*node)))
            })
            .collect();

        if downstream.is_empty() {
            break;
        }
        for node in downstream {
            stuck.remove(node);
        }
    }

    stuck.into_iter().map(String::from).collect()
}
