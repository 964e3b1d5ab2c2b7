// SPDX-License-Identifier: MIT

//! Dependency graph ordering.

use std::collections::{HashMap, VecDeque};
use thiserror::Error;

use crate::template::WorkflowTemplate;

/// The dependency graph contains a cycle.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("workflow dependency cycle involving: {steps:?}")]
pub struct CycleDetected {
    /// Steps that could not be ordered.
    pub steps: Vec<String>,
}

/// Topologically sort the template's steps (Kahn's algorithm).
///
/// Ties are broken by declaration order, so the result is deterministic:
/// independent steps appear in the order the author wrote them. Returns
/// `CycleDetected` naming the unorderable steps when the graph is cyclic.
pub fn topo_sort(template: &WorkflowTemplate) -> Result<Vec<String>, CycleDetected> {
    let mut indegree: HashMap<&str, usize> = template
        .jobs
        .keys()
        .map(|name| (name.as_str(), 0))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for (name, step) in &template.jobs {
        for dep in &step.depends_on {
            *indegree.entry(name.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.step.as_str())
                .or_default()
                .push(name.as_str());
        }
    }

    // Seed with zero-indegree steps in declaration order.
    let mut ready: VecDeque<&str> = template
        .jobs
        .keys()
        .map(String::as_str)
        .filter(|name| indegree.get(name).copied().unwrap_or(0) == 0)
        .collect();

    let mut order = Vec::with_capacity(template.jobs.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = indegree.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(dependent);
                }
            }
        }
    }

    if order.len() == template.jobs.len() {
        Ok(order)
    } else {
        let mut steps: Vec<String> = template
            .jobs
            .keys()
            .filter(|name| !order.contains(*name))
            .cloned()
            .collect();
        steps.sort();
        Err(CycleDetected { steps })
    }
}

#[cfg(test)]
#[path = "dag_tests.rs"]
mod tests;
