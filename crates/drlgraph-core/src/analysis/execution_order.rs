//! Execution order estimation from salience and `depends_on` edges.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::analysis::{rule_ref, RuleRef};
use crate::config::AnalysisConfig;
use crate::graph::DependencyGraph;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    HighPriority,
    EntryPoint,
    Aggregator,
    Normal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Ready,
    WaitingForDependencies,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEntry {
    pub name: String,
    pub package: String,
    pub original_salience: Option<i64>,
    pub effective_salience: i64,
    pub depends_on: Vec<RuleRef>,
    pub dependency_count: usize,
    pub rule_type: RuleType,
    pub execution_status: ExecutionStatus,
    pub missing_dependencies: Vec<RuleRef>,
}

pub fn classify_rule(
    salience: Option<i64>,
    dependency_count: usize,
    config: &AnalysisConfig,
) -> RuleType {
    match salience {
        Some(s) if s > config.high_priority_salience => RuleType::HighPriority,
        _ if dependency_count == 0 => RuleType::EntryPoint,
        _ if dependency_count > config.aggregator_dependency_count => RuleType::Aggregator,
        _ => RuleType::Normal,
    }
}

/// Order rules by descending effective salience (unset counts as 0), then
/// ascending dependency count, then package and name.
///
/// The walk afterwards only annotates: a rule is `ready` when every
/// dependency inside the analyzed set appears earlier in the list.
/// Dependencies outside the set (when `rule_names` filters) are listed in
/// `depends_on` but never reported missing.
pub fn analyze_execution_order(
    graph: &DependencyGraph,
    rule_names: Option<&[String]>,
    config: &AnalysisConfig,
) -> Vec<ExecutionEntry> {
    let wanted: Option<HashSet<&str>> =
        rule_names.map(|names| names.iter().map(String::as_str).collect());
    let selected: Vec<usize> = (0..graph.len())
        .filter(|&idx| {
            wanted
                .as_ref()
                .map_or(true, |w| w.contains(graph.node(idx).id.name.as_str()))
        })
        .collect();

    let mut entries: Vec<(usize, ExecutionEntry)> = selected
        .iter()
        .map(|&idx| {
            let rule = &graph.node(idx).rule;
            let depends_on: Vec<RuleRef> = graph
                .depends_on(idx)
                .keys()
                .map(|&dep| rule_ref(graph, dep))
                .collect();
            let dependency_count = depends_on.len();
            let entry = ExecutionEntry {
                name: rule.name.clone(),
                package: rule.package.clone(),
                original_salience: rule.salience,
                effective_salience: rule.salience.unwrap_or(0),
                depends_on,
                dependency_count,
                rule_type: classify_rule(rule.salience, dependency_count, config),
                execution_status: ExecutionStatus::Ready,
                missing_dependencies: Vec::new(),
            };
            (idx, entry)
        })
        .collect();

    entries.sort_by(|(_, a), (_, b)| {
        b.effective_salience
            .cmp(&a.effective_salience)
            .then_with(|| a.dependency_count.cmp(&b.dependency_count))
            .then_with(|| a.package.cmp(&b.package))
            .then_with(|| a.name.cmp(&b.name))
    });

    let position: HashMap<usize, usize> = entries
        .iter()
        .enumerate()
        .map(|(pos, (idx, _))| (*idx, pos))
        .collect();

    for (pos, (idx, entry)) in entries.iter_mut().enumerate() {
        let missing: Vec<RuleRef> = graph
            .depends_on(*idx)
            .keys()
            .filter(|&&dep| matches!(position.get(&dep), Some(&p) if p > pos))
            .map(|&dep| rule_ref(graph, dep))
            .collect();
        if !missing.is_empty() {
            entry.execution_status = ExecutionStatus::WaitingForDependencies;
            entry.missing_dependencies = missing;
        }
    }

    entries.into_iter().map(|(_, entry)| entry).collect()
}
