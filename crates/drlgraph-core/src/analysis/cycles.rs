//! Circular dependency detection over `depends_on` edges.
//!
//! Two passes are offered. [`find_circular_dependencies`] reports mutual
//! pairs (A depends on B and B depends on A). [`find_dependency_cycles`]
//! runs Tarjan's strongly-connected-components algorithm and reports every
//! cycle regardless of length.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::analysis::{rule_ref, RuleRef};
use crate::graph::DependencyGraph;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularDependency {
    /// `"name (package)"` for both rules.
    pub cycle: Vec<String>,
    pub from_rule: RuleRef,
    pub to_rule: RuleRef,
    pub shared_fact_types: Vec<String>,
}

/// One strongly connected component with more than one rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCycle {
    pub rules: Vec<RuleRef>,
    pub cycle: Vec<String>,
}

/// Mutually dependent pairs, each reported once, in graph order.
pub fn find_circular_dependencies(graph: &DependencyGraph) -> Vec<CircularDependency> {
    let mut found = Vec::new();
    for a in 0..graph.len() {
        for (&b, forward) in graph.depends_on(a) {
            if b <= a {
                continue;
            }
            let Some(backward) = graph.depends_on(b).get(&a) else {
                continue;
            };
            let shared: BTreeSet<&String> = forward.iter().chain(backward.iter()).collect();
            found.push(CircularDependency {
                cycle: vec![graph.node(a).id.to_string(), graph.node(b).id.to_string()],
                from_rule: rule_ref(graph, a),
                to_rule: rule_ref(graph, b),
                shared_fact_types: shared.into_iter().cloned().collect(),
            });
        }
    }
    found
}

/// Every `depends_on` cycle as a strongly connected component. Members are
/// in graph order; components are ordered by their first member.
pub fn find_dependency_cycles(graph: &DependencyGraph) -> Vec<DependencyCycle> {
    let mut components = strongly_connected(graph);
    components.retain(|c| c.len() > 1);
    for component in &mut components {
        component.sort_unstable();
    }
    components.sort();
    components
        .into_iter()
        .map(|members| DependencyCycle {
            cycle: members
                .iter()
                .map(|&m| graph.node(m).id.to_string())
                .collect(),
            rules: members.iter().map(|&m| rule_ref(graph, m)).collect(),
        })
        .collect()
}

const UNVISITED: usize = usize::MAX;

/// Iterative Tarjan so deep dependency chains cannot overflow the stack.
fn strongly_connected(graph: &DependencyGraph) -> Vec<Vec<usize>> {
    let n = graph.len();
    let adjacency: Vec<Vec<usize>> = (0..n)
        .map(|v| graph.depends_on(v).keys().copied().collect())
        .collect();

    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut calls: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(&(v, pos)) = calls.last() {
            if pos < adjacency[v].len() {
                if let Some(top) = calls.last_mut() {
                    top.1 += 1;
                }
                let w = adjacency[v][pos];
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    calls.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            calls.pop();
            if let Some(&(parent, _)) = calls.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if lowlink[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }
    components
}
