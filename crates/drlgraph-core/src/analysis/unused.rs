//! Unused-rule detection.

use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusedRule {
    pub name: String,
    pub package: String,
    pub salience: Option<i64>,
    pub reason: String,
}

/// Rules nobody extends and nobody depends on, that are not entry points
/// themselves (they have at least one dependency). Graph order.
pub fn find_unused_rules(graph: &DependencyGraph) -> Vec<UnusedRule> {
    (0..graph.len())
        .filter(|&idx| {
            graph.children(idx).is_empty()
                && graph.dependents(idx).is_empty()
                && !graph.depends_on(idx).is_empty()
        })
        .map(|idx| {
            let rule = &graph.node(idx).rule;
            UnusedRule {
                name: rule.name.clone(),
                package: rule.package.clone(),
                salience: rule.salience,
                reason: "unused".to_string(),
            }
        })
        .collect()
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

    #[test]
    fn test_leaf_consumer_is_unused() {
        let g = graph(
            r#"package p;
rule "Create Order" when $c : Customer() then insert(new Order()); end
rule "Log Order" salience 5 when $o : Order() then System.out.println($o); end
"#,
        );
        let unused = find_unused_rules(&g);
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].name, "Log Order");
        assert_eq!(unused[0].salience, Some(5));
        assert_eq!(unused[0].reason, "unused");
    }

    #[test]
    fn test_entry_points_and_extended_rules_are_kept() {
        let g = graph(
            r#"package p;
rule "Seed" when then insert(new Order()); end
rule "Base" when $o : Order() then end
rule "Derived" extends "Base" when $o : Order() then end
"#,
        );
        // Seed has no dependencies; Base is extended; Derived depends on Seed
        // and nothing depends on it.
        let names: Vec<String> = find_unused_rules(&g).into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["Derived"]);
    }
}
