//! Common rule shapes and anti-patterns.

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::graph::DependencyGraph;
use crate::models::Rule;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub name: String,
    pub package: String,
    pub salience: Option<i64>,
    pub pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_count: Option<usize>,
}

impl PatternMatch {
    fn new(rule: &Rule, pattern: &str) -> Self {
        Self {
            name: rule.name.clone(),
            package: rule.package.clone(),
            salience: rule.salience,
            pattern: pattern.to_string(),
            condition_count: None,
            constraint_count: None,
        }
    }

    fn with_counts(mut self, rule: &Rule) -> Self {
        self.condition_count = Some(rule.conditions.len());
        self.constraint_count = Some(rule.constraint_count());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePatterns {
    pub high_salience_rules: Vec<PatternMatch>,
    pub no_conditions_rules: Vec<PatternMatch>,
    pub no_actions_rules: Vec<PatternMatch>,
    /// More than two conditions but fewer constraints than conditions.
    pub broad_rules: Vec<PatternMatch>,
    /// At most two conditions and more than three constraints.
    pub specific_rules: Vec<PatternMatch>,
}

pub fn find_rule_patterns(graph: &DependencyGraph, config: &AnalysisConfig) -> RulePatterns {
    let mut patterns = RulePatterns::default();
    let mut high: Vec<&Rule> = Vec::new();

    for node in graph.nodes() {
        let rule = &node.rule;
        let conditions = rule.conditions.len();
        let constraints = rule.constraint_count();

        if rule.salience.is_some_and(|s| s > config.high_priority_salience) {
            high.push(rule);
        }
        if conditions == 0 {
            patterns.no_conditions_rules.push(PatternMatch::new(rule, "no_conditions"));
        }
        if rule.actions.is_empty() {
            patterns.no_actions_rules.push(PatternMatch::new(rule, "no_actions"));
        }
        if conditions > 2 && constraints < conditions {
            patterns
                .broad_rules
                .push(PatternMatch::new(rule, "broad_rule").with_counts(rule));
        }
        if (1..=2).contains(&conditions) && constraints > 3 {
            patterns
                .specific_rules
                .push(PatternMatch::new(rule, "specific_rule").with_counts(rule));
        }
    }

    // Stable sort keeps graph order among equal saliences.
    high.sort_by_key(|r| std::cmp::Reverse(r.salience));
    patterns.high_salience_rules = high
        .into_iter()
        .take(config.high_salience_pattern_limit)
        .map(|r| PatternMatch::new(r, "high_salience"))
        .collect();
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::store::InMemoryRepository;

    #[test]
    fn test_patterns() {
        let (file, _) = parse_source(
            r#"package p;
rule "Always" salience 80 when then System.out.println("hi"); end
rule "Silent" salience 90 when $c : Customer() then end
rule "Broad" when $a : Alpha() $b : Beta() $g : Gamma(x > 1) then $a.go(); end
rule "Specific" when $c : Customer(a > 1, b > 2, c > 3, d > 4) then $c.go(); end
rule "Quiet" salience 10 when $c : Customer(a > 1) then $c.go(); end
"#,
            "t.drl",
        );
        let graph =
            DependencyGraph::from_repository(&InMemoryRepository::from_files([file])).unwrap();
        let patterns = find_rule_patterns(&graph, &AnalysisConfig::default());

        let high: Vec<&str> = patterns
            .high_salience_rules
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(high, vec!["Silent", "Always"]);
        assert_eq!(patterns.no_conditions_rules[0].name, "Always");
        assert_eq!(patterns.no_actions_rules[0].name, "Silent");
        assert_eq!(patterns.broad_rules.len(), 1);
        assert_eq!(patterns.broad_rules[0].condition_count, Some(3));
        assert_eq!(patterns.broad_rules[0].constraint_count, Some(1));
        assert_eq!(patterns.specific_rules[0].name, "Specific");
        assert_eq!(patterns.specific_rules[0].pattern, "specific_rule");
    }

    #[test]
    fn test_high_salience_limit() {
        let mut text = String::from("package p;\n");
        for i in 0..12 {
            text.push_str(&format!("rule \"R{i}\" salience {} when then end\n", 60 + i));
        }
        let (file, _) = parse_source(&text, "t.drl");
        let graph =
            DependencyGraph::from_repository(&InMemoryRepository::from_files([file])).unwrap();
        let patterns = find_rule_patterns(&graph, &AnalysisConfig::default());
        assert_eq!(patterns.high_salience_rules.len(), 10);
        assert_eq!(patterns.high_salience_rules[0].name, "R11");
        assert_eq!(patterns.high_salience_rules[0].salience, Some(71));
    }
}
