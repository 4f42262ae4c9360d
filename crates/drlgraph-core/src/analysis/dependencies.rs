//! Neighbourhood of a single rule in the dependency graph.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::{rule_ref, RuleRef, RuleSummary};
use crate::errors::{DrlError, DrlResult};
use crate::graph::DependencyGraph;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDependencies {
    pub rule: RuleSummary,
    /// The rule this one extends, if resolved.
    pub parents: Vec<RuleRef>,
    /// Rules extending this one.
    pub children: Vec<RuleRef>,
    pub depends_on: Vec<RuleRef>,
    pub dependent_rules: Vec<RuleRef>,
}

pub fn find_rule_dependencies(
    graph: &DependencyGraph,
    name: &str,
    package: Option<&str>,
) -> DrlResult<RuleDependencies> {
    let Some(idx) = graph.find(name, package) else {
        warn!("Rule not found: {}", name);
        return Err(DrlError::RuleNotFound(name.to_string()));
    };
    Ok(RuleDependencies {
        rule: RuleSummary::from(&graph.node(idx).rule),
        parents: graph.parent(idx).map(|p| rule_ref(graph, p)).into_iter().collect(),
        children: graph.children(idx).iter().map(|&c| rule_ref(graph, c)).collect(),
        depends_on: graph
            .depends_on(idx)
            .keys()
            .map(|&d| rule_ref(graph, d))
            .collect(),
        dependent_rules: graph.dependents(idx).iter().map(|&d| rule_ref(graph, d)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::store::InMemoryRepository;

    fn graph() -> DependencyGraph {
        let (a, _) = parse_source(
            r#"package p;
rule "Base" when $c : Customer() then insert(new Order()); end
rule "Child" extends "Base" when $o : Order() then $o.ship(); end
"#,
            "a.drl",
        );
        let (b, _) = parse_source(
            "package q;\nrule \"Child\" when $o : Order(total > 1) then end\n",
            "b.drl",
        );
        DependencyGraph::from_repository(&InMemoryRepository::from_files([a, b])).unwrap()
    }

    #[test]
    fn test_parents_children_and_dependents() {
        let g = graph();
        let base = find_rule_dependencies(&g, "Base", None).unwrap();
        assert!(base.parents.is_empty());
        assert_eq!(base.children, vec![RuleRef { name: "Child".into(), package: "p".into() }]);
        let dependents: Vec<(&str, &str)> = base
            .dependent_rules
            .iter()
            .map(|r| (r.name.as_str(), r.package.as_str()))
            .collect();
        assert_eq!(dependents, vec![("Child", "p"), ("Child", "q")]);

        let child = find_rule_dependencies(&g, "Child", Some("p")).unwrap();
        assert_eq!(child.parents[0].name, "Base");
        assert_eq!(child.depends_on[0].name, "Base");
    }

    #[test]
    fn test_package_disambiguates_and_missing_rule_errors() {
        let g = graph();
        let q_child = find_rule_dependencies(&g, "Child", Some("q")).unwrap();
        assert!(q_child.parents.is_empty());
        assert_eq!(q_child.rule.package, "q");
        assert!(matches!(
            find_rule_dependencies(&g, "Nope", None),
            Err(DrlError::RuleNotFound(name)) if name == "Nope"
        ));
    }
}
