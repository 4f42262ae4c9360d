//! Rule complexity scoring.
//!
//! `total = conditions + constraints + actions + distinct fact types`, where
//! fact types are counted across both conditions and actions.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::graph::{DependencyGraph, RuleNode};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleComplexity {
    pub name: String,
    pub package: String,
    pub salience: Option<i64>,
    pub condition_count: usize,
    pub constraint_count: usize,
    pub action_count: usize,
    pub class_count: usize,
    pub total_complexity: usize,
}

pub fn complexity_of(node: &RuleNode) -> RuleComplexity {
    let rule = &node.rule;
    let condition_count = rule.conditions.len();
    let constraint_count = rule.constraint_count();
    let action_count = rule.actions.len();
    let class_count = node.refs.all_types().len();
    RuleComplexity {
        name: rule.name.clone(),
        package: rule.package.clone(),
        salience: rule.salience,
        condition_count,
        constraint_count,
        action_count,
        class_count,
        total_complexity: condition_count + constraint_count + action_count + class_count,
    }
}

/// Rules scoring at least `threshold`, highest first. Ties are ordered by
/// package then name.
pub fn find_complex_rules(graph: &DependencyGraph, threshold: usize) -> Vec<RuleComplexity> {
    let mut scored: Vec<RuleComplexity> = graph
        .nodes()
        .par_iter()
        .map(complexity_of)
        .filter(|c| c.total_complexity >= threshold)
        .collect();
    scored.sort_by(|a, b| {
        b.total_complexity
            .cmp(&a.total_complexity)
            .then_with(|| a.package.cmp(&b.package))
            .then_with(|| a.name.cmp(&b.name))
    });
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Constraint, Operator};
    use crate::parser::parse_source;
    use crate::store::InMemoryRepository;

    const RULES: &str = r#"package p;
rule "Simple" when $c : Customer() then end
rule "Busy"
when
    $c : Customer(age > 18, status == "GOLD")
    $o : Order(total > 100)
then
    $o.setDiscount(10);
    insert(new Alert());
end
"#;

    fn graph_from(text: &str) -> DependencyGraph {
        let (mut file, _) = parse_source(text, "t.drl");
        file.imports.push(crate::models::Import {
            package: "p".to_string(),
            class_name: "Alert".to_string(),
        });
        DependencyGraph::from_repository(&InMemoryRepository::from_files([file])).unwrap()
    }

    #[test]
    fn test_scores_and_ordering() {
        let g = graph_from(RULES);
        let all = find_complex_rules(&g, 0);
        assert_eq!(all[0].name, "Busy");
        // 2 conditions + 3 constraints + 2 actions + 3 types
        assert_eq!(all[0].total_complexity, 10);
        assert_eq!(all[0].class_count, 3);
        assert_eq!(all[1].total_complexity, 2);

        let complex = find_complex_rules(&g, 5);
        assert_eq!(complex.len(), 1);
        assert_eq!(complex[0].name, "Busy");
    }

    #[test]
    fn test_adding_a_constraint_never_lowers_the_score() {
        let (file, _) = parse_source(RULES, "t.drl");
        let before_graph =
            DependencyGraph::from_repository(&InMemoryRepository::from_files([file.clone()]))
                .unwrap();

        let mut grown = file;
        for rule in &mut grown.rules {
            if let Some(condition) = rule.conditions.first_mut() {
                condition.constraints.push(Constraint {
                    field: "extra".to_string(),
                    operator: Operator::Ne,
                    value: "null".to_string(),
                });
            }
        }
        let after_graph =
            DependencyGraph::from_repository(&InMemoryRepository::from_files([grown])).unwrap();

        for (before, after) in before_graph.nodes().iter().zip(after_graph.nodes()) {
            assert!(
                complexity_of(after).total_complexity >= complexity_of(before).total_complexity
            );
            assert_eq!(
                complexity_of(after).constraint_count,
                complexity_of(before).constraint_count + 1
            );
        }
    }
}
