//! Pairwise rule conflict heuristics.
//!
//! Every unordered pair of rules with a condition on a common fact type is
//! classified with exactly one [`ConflictType`]. Labels are tried in priority
//! order and the first match wins. Constraint and action comparisons use the
//! distinct sets across the whole rule.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::RuleSummary;
use crate::config::AnalysisConfig;
use crate::graph::DependencyGraph;
use crate::models::{ActionKind, Constraint, Rule};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ContradictoryConstraints,
    PotentialActionConflict,
    PotentialConditionOverlap,
    RedundantRules,
    SameFactType,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::ContradictoryConstraints => "contradictory_constraints",
            ConflictType::PotentialActionConflict => "potential_action_conflict",
            ConflictType::PotentialConditionOverlap => "potential_condition_overlap",
            ConflictType::RedundantRules => "redundant_rules",
            ConflictType::SameFactType => "same_fact_type",
        }
    }

    /// 1 is reported first.
    pub fn priority(&self) -> u8 {
        match self {
            ConflictType::ContradictoryConstraints => 1,
            ConflictType::PotentialActionConflict => 2,
            ConflictType::PotentialConditionOverlap => 3,
            ConflictType::RedundantRules => 4,
            ConflictType::SameFactType => 5,
        }
    }
}

/// The parts of an action compared between rules; arguments are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionSignature {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub target: String,
    pub method: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetails {
    pub rule1_variables: Vec<String>,
    pub rule2_variables: Vec<String>,
    pub rule1_constraints: Vec<Constraint>,
    pub rule2_constraints: Vec<Constraint>,
    pub rule1_actions: Vec<ActionSignature>,
    pub rule2_actions: Vec<ActionSignature>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConflict {
    pub rule1: RuleSummary,
    pub rule2: RuleSummary,
    /// First shared condition fact type, alphabetically.
    pub fact_type: String,
    pub conflict_type: ConflictType,
    pub salience_difference: i64,
    pub details: ConflictDetails,
}

struct RuleShape {
    variables: Vec<String>,
    constraints: BTreeSet<Constraint>,
    actions: BTreeSet<ActionSignature>,
}

impl RuleShape {
    fn of(rule: &Rule) -> Self {
        let mut variables: Vec<String> = Vec::new();
        for condition in &rule.conditions {
            if !condition.variable.is_empty() && !variables.contains(&condition.variable) {
                variables.push(condition.variable.clone());
            }
        }
        Self {
            variables,
            constraints: rule
                .conditions
                .iter()
                .flat_map(|c| c.constraints.iter().cloned())
                .collect(),
            actions: rule
                .actions
                .iter()
                .map(|a| ActionSignature {
                    kind: a.kind,
                    target: a.target.clone(),
                    method: a.method.clone(),
                })
                .collect(),
        }
    }
}

pub fn salience_difference(a: Option<i64>, b: Option<i64>, config: &AnalysisConfig) -> i64 {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs(),
        _ => config.unset_salience_sentinel,
    }
}

fn classify(
    first: &RuleShape,
    second: &RuleShape,
    salience_diff: i64,
    config: &AnalysisConfig,
) -> ConflictType {
    let contradictory = first.constraints.iter().any(|c1| {
        second
            .constraints
            .iter()
            .any(|c2| c1.field == c2.field && c1.operator != c2.operator && c1.value == c2.value)
    });
    if contradictory {
        return ConflictType::ContradictoryConstraints;
    }

    let close = salience_diff < config.conflict_salience_window;
    let shares_constraint = first.constraints.intersection(&second.constraints).next().is_some();
    let actions_differ = first.actions.difference(&second.actions).next().is_some();
    if shares_constraint && actions_differ && close {
        return ConflictType::PotentialActionConflict;
    }

    let shares_field = first
        .constraints
        .iter()
        .any(|c1| second.constraints.iter().any(|c2| c1.field == c2.field));
    if shares_field && close {
        return ConflictType::PotentialConditionOverlap;
    }

    let shares_action = first.actions.intersection(&second.actions).next().is_some();
    let constraints_differ = first.constraints.difference(&second.constraints).next().is_some();
    if shares_action && constraints_differ {
        return ConflictType::RedundantRules;
    }

    ConflictType::SameFactType
}

/// Classify every candidate pair. `same_fact_type` pairs are dropped unless
/// their salience difference is below the weak-conflict window.
pub fn find_conflicting_rules(
    graph: &DependencyGraph,
    config: &AnalysisConfig,
) -> Vec<RuleConflict> {
    let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
    for fact_type in graph.fact_types() {
        let readers = graph.readers_of(fact_type);
        for (i, &a) in readers.iter().enumerate() {
            for &b in &readers[i + 1..] {
                pairs.insert((a.min(b), a.max(b)));
            }
        }
    }
    debug!("Classifying {} candidate rule pairs", pairs.len());

    let shapes: Vec<RuleShape> = graph.nodes().iter().map(|n| RuleShape::of(&n.rule)).collect();
    let pairs: Vec<(usize, usize)> = pairs.into_iter().collect();

    let mut conflicts: Vec<RuleConflict> = pairs
        .par_iter()
        .filter_map(|&(a, b)| {
            let (first, second) = (graph.node(a), graph.node(b));
            let fact_type = first
                .refs
                .condition_types
                .intersection(&second.refs.condition_types)
                .next()?
                .clone();
            let diff = salience_difference(first.rule.salience, second.rule.salience, config);
            let conflict_type = classify(&shapes[a], &shapes[b], diff, config);
            if conflict_type == ConflictType::SameFactType
                && diff >= config.weak_conflict_salience_window
            {
                return None;
            }
            Some(RuleConflict {
                rule1: RuleSummary::from(&first.rule),
                rule2: RuleSummary::from(&second.rule),
                fact_type,
                conflict_type,
                salience_difference: diff,
                details: ConflictDetails {
                    rule1_variables: shapes[a].variables.clone(),
                    rule2_variables: shapes[b].variables.clone(),
                    rule1_constraints: shapes[a].constraints.iter().cloned().collect(),
                    rule2_constraints: shapes[b].constraints.iter().cloned().collect(),
                    rule1_actions: shapes[a].actions.iter().cloned().collect(),
                    rule2_actions: shapes[b].actions.iter().cloned().collect(),
                },
            })
        })
        .collect();

    conflicts.sort_by(|x, y| {
        x.conflict_type
            .priority()
            .cmp(&y.conflict_type.priority())
            .then_with(|| x.salience_difference.cmp(&y.salience_difference))
            .then_with(|| x.rule1.package.cmp(&y.rule1.package))
            .then_with(|| x.rule1.name.cmp(&y.rule1.name))
            .then_with(|| x.rule2.package.cmp(&y.rule2.package))
            .then_with(|| x.rule2.name.cmp(&y.rule2.name))
    });
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::store::InMemoryRepository;

    fn graph(text: &str) -> DependencyGraph {
        let (file, _) = parse_source(text, "t.drl");
        DependencyGraph::from_repository(&InMemoryRepository::from_files([file])).unwrap()
    }

    fn only(text: &str) -> RuleConflict {
        let conflicts = find_conflicting_rules(&graph(text), &AnalysisConfig::default());
        assert_eq!(conflicts.len(), 1, "{conflicts:?}");
        conflicts.into_iter().next().unwrap()
    }

    #[test]
    fn test_contradictory_constraints_on_order() {
        let conflict = only(
            r#"package p;
rule "Accept New" salience 10 when $o : Order(status == "NEW") then $o.accept(); end
rule "Reject Old" salience 15 when $o : Order(status != "NEW") then $o.reject(); end
"#,
        );
        assert_eq!(conflict.conflict_type, ConflictType::ContradictoryConstraints);
        assert_eq!(conflict.salience_difference, 5);
        assert_eq!(conflict.fact_type, "Order");
        assert_eq!(conflict.rule1.name, "Accept New");
        assert_eq!(conflict.details.rule1_variables, vec!["o"]);
    }

    #[test]
    fn test_action_conflict_and_condition_overlap() {
        let conflict = only(
            r#"package p;
rule "A" salience 10 when $o : Order(total > 100) then $o.discount(); end
rule "B" salience 12 when $o : Order(total > 100) then $o.surcharge(); end
"#,
        );
        assert_eq!(conflict.conflict_type, ConflictType::PotentialActionConflict);

        let conflict = only(
            r#"package p;
rule "A" salience 10 when $o : Order(total > 100) then $o.discount(); end
rule "B" salience 12 when $o : Order(total > 500) then $o.discount(); end
"#,
        );
        assert_eq!(conflict.conflict_type, ConflictType::PotentialConditionOverlap);
    }

    #[test]
    fn test_redundant_rules_and_weak_pairs() {
        let conflict = only(
            r#"package p;
rule "A" when $o : Order(total > 100) then $o.flag(); end
rule "B" when $o : Order(region == "EU") then $o.flag(); end
"#,
        );
        assert_eq!(conflict.conflict_type, ConflictType::RedundantRules);
        assert_eq!(conflict.salience_difference, 999);

        // Unset salience pushes a weak same-type pair out of the report.
        let conflicts = find_conflicting_rules(
            &graph(
                r#"package p;
rule "A" when $o : Order() then $o.a(); end
rule "B" when $o : Order() then $o.b(); end
"#,
            ),
            &AnalysisConfig::default(),
        );
        assert!(conflicts.is_empty());

        let conflict = only(
            r#"package p;
rule "A" salience 1 when $o : Order() then $o.a(); end
rule "B" salience 2 when $o : Order() then $o.b(); end
"#,
        );
        assert_eq!(conflict.conflict_type, ConflictType::SameFactType);
    }

    #[test]
    fn test_each_pair_gets_one_label_in_priority_order() {
        let conflicts = find_conflicting_rules(
            &graph(
                r#"package p;
rule "A" salience 10 when $o : Order(status == "NEW") $c : Customer(tier == "GOLD") then $o.a(); end
rule "B" salience 11 when $o : Order(status != "NEW") $c : Customer(tier == "GOLD") then $o.b(); end
rule "C" salience 12 when $c : Customer(tier == "GOLD") then $c.c(); end
"#,
            ),
            &AnalysisConfig::default(),
        );
        let mut seen = BTreeSet::new();
        for conflict in &conflicts {
            assert!(seen.insert((conflict.rule1.name.clone(), conflict.rule2.name.clone())));
        }
        assert_eq!(conflicts.len(), 3);
        assert_eq!(conflicts[0].conflict_type, ConflictType::ContradictoryConstraints);
        let priorities: Vec<u8> = conflicts.iter().map(|c| c.conflict_type.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
    }
}
