//! Pattern and constraint parsing for `when` sections and query bodies.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::errors::ConstructError;
use crate::models::{simple_type_name, Condition, Constraint, Operator};
use crate::parser::diagnostics::Diagnostics;
use crate::parser::scan::{matching_close, split_constraints, strip_comments, strip_quotes};
use crate::parser::ConstructContext;

static PATTERN_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\$?([A-Za-z_]\w*)\s*:\s*)?\b([A-Za-z_][\w.]*)\s*\(").unwrap()
});
static CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\$\w+\s*:\s*)?([\w.]+)\s*(==|!=|<=|>=|=|<|>|\bmatches\b)\s*(.+?)\s*$")
        .unwrap()
});
static BARE_BINDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\$\w+\s*:\s*[\w.]+\s*$").unwrap());

fn looks_like_fact_type(type_name: &str) -> bool {
    simple_type_name(type_name)
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// Scan `text` for `$var : Type(constraints)` patterns. Unbound patterns are
/// accepted when the type name is capitalised, which keeps `eval(..)`,
/// `not(..)` and similar keywords out while still descending into them.
pub(crate) fn parse_conditions(
    text: &str,
    ctx: &ConstructContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Vec<Condition> {
    let cleaned = strip_comments(text);
    let text = cleaned.as_str();
    let mut conditions = Vec::new();
    let mut pos = 0;

    while let Some(caps) = PATTERN_HEAD.captures_at(text, pos) {
        let Some(whole) = caps.get(0) else { break };
        let Some(type_match) = caps.get(2) else { break };
        let variable = caps.get(1).map(|m| m.as_str().to_string());
        let fact_type = type_match.as_str();

        if variable.is_none() && !looks_like_fact_type(fact_type) {
            pos = whole.end();
            continue;
        }

        let open_idx = whole.end() - 1;
        let Some(close_idx) = matching_close(text, open_idx) else {
            ctx.report(
                diagnostics,
                ConstructError::MalformedCondition(format!(
                    "Unbalanced parentheses in pattern '{fact_type}'"
                )),
            );
            break;
        };

        let constraints =
            parse_constraints(&text[open_idx + 1..close_idx], fact_type, ctx, diagnostics);
        conditions.push(Condition {
            variable: variable.unwrap_or_default(),
            fact_type: fact_type.to_string(),
            constraints,
        });
        pos = close_idx + 1;
    }

    conditions
}

/// Parse the text between a pattern's parentheses. Parts that do not have
/// a `field operator value` shape are reported and dropped.
pub(crate) fn parse_constraints(
    text: &str,
    fact_type: &str,
    ctx: &ConstructContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Vec<Constraint> {
    let mut constraints = Vec::new();
    for part in split_constraints(text) {
        if BARE_BINDING.is_match(&part) {
            debug!("Field binding '{}' in {} carries no constraint", part, fact_type);
            continue;
        }
        let parsed = CONSTRAINT.captures(&part).and_then(|caps| {
            let field = caps.get(1)?.as_str();
            let operator = Operator::parse(caps.get(2)?.as_str())?;
            let value = caps.get(3)?.as_str();
            Some(Constraint {
                field: field.to_string(),
                operator,
                value: strip_quotes(value).to_string(),
            })
        });
        match parsed {
            Some(constraint) => constraints.push(constraint),
            None => ctx.report(
                diagnostics,
                ConstructError::Condition(format!(
                    "Could not parse constraint '{part}' on {fact_type}"
                )),
            ),
        }
    }
    constraints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ConstructContext<'static> {
        ConstructContext::new("test.drl", 1).with_rule(Some("R"))
    }

    #[test]
    fn test_bound_pattern_with_constraints() {
        let mut diagnostics = Diagnostics::new();
        let conditions = parse_conditions(
            r#"$c : Customer(age > 18, name matches "J.*")"#,
            &ctx(),
            &mut diagnostics,
        );
        assert!(diagnostics.is_empty());
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].variable, "c");
        assert_eq!(conditions[0].fact_type, "Customer");
        assert_eq!(conditions[0].constraints.len(), 2);
        assert_eq!(conditions[0].constraints[1].operator, Operator::Matches);
        assert_eq!(conditions[0].constraints[1].value, "J.*");
    }

    #[test]
    fn test_unbound_and_nested_patterns() {
        let mut diagnostics = Diagnostics::new();
        let text = "$o : Order(total > 100)\nnot( Blacklist(id == 1) )\neval(check($o))";
        let conditions = parse_conditions(text, &ctx(), &mut diagnostics);
        let types: Vec<&str> = conditions.iter().map(|c| c.fact_type.as_str()).collect();
        assert_eq!(types, vec!["Order", "Blacklist"]);
        assert_eq!(conditions[1].variable, "");
    }

    #[test]
    fn test_comments_are_not_patterns() {
        let mut diagnostics = Diagnostics::new();
        let conditions = parse_conditions(
            "$c : Customer(age > 18) // Lookup(x) isn't checked\n/* Audit() */ $o : Order()",
            &ctx(),
            &mut diagnostics,
        );
        assert!(diagnostics.is_empty());
        let types: Vec<&str> = conditions.iter().map(|c| c.fact_type.as_str()).collect();
        assert_eq!(types, vec!["Customer", "Order"]);
    }

    #[test]
    fn test_no_patterns_is_not_an_error() {
        let mut diagnostics = Diagnostics::new();
        let conditions = parse_conditions("eval(true)", &ctx(), &mut diagnostics);
        assert!(conditions.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unparsable_constraint_is_dropped() {
        let mut diagnostics = Diagnostics::new();
        let conditions = parse_conditions(
            "$c : Customer(age > 18 && isVip() && $n : name)",
            &ctx(),
            &mut diagnostics,
        );
        assert_eq!(conditions[0].constraints.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.entries()[0].rule_name.as_deref(), Some("R"));
    }

    #[test]
    fn test_unbalanced_pattern_keeps_earlier_conditions() {
        let mut diagnostics = Diagnostics::new();
        let conditions = parse_conditions(
            "$a : Account(balance > 0)\n$c : Customer(age > 18",
            &ctx(),
            &mut diagnostics,
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.entries()[0].source_exception_kind, "MalformedCondition");
    }
}
