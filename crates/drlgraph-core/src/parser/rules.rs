//! Rule block parsing: header attributes, `when`, `then` and `end`.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::errors::ConstructError;
use crate::models::Rule;
use crate::parser::actions::parse_actions;
use crate::parser::conditions::parse_conditions;
use crate::parser::diagnostics::Diagnostics;
use crate::parser::scan::{strip_comments, strip_quotes, top_level_tokens};
use crate::parser::ConstructContext;

static RULE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*rule[ \t]+(?:"([^"]+)"|'([^']+)'|([^\s"']+))"#).unwrap()
});
static WHEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\s)when(?:\s|$)").unwrap());
static THEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\s)then(?:\s|$)").unwrap());
static TERMINAL_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)end\s*;?\s*(?://[^\n]*)?\s*$").unwrap());
static ATTRIBUTE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][\w-]*$").unwrap());

/// Parse one rule block. On error the whole rule is discarded; the caller
/// records the error against `rule_name` when one was recovered.
pub(crate) fn parse_rule(
    block: &str,
    package: &str,
    ctx: &ConstructContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<Rule, (ConstructError, Option<String>)> {
    let caps = RULE_NAME.captures(block).ok_or_else(|| {
        (
            ConstructError::MalformedRule("Missing or invalid rule name".to_string()),
            None,
        )
    })?;
    let name_match = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .filter(|m| !matches!(m.as_str(), "when" | "then" | "end"))
        .ok_or_else(|| {
            (
                ConstructError::MalformedRule("Missing or invalid rule name".to_string()),
                None,
            )
        })?;
    let name = name_match.as_str().to_string();
    let malformed = |message: &str| {
        (
            ConstructError::MalformedRule(message.to_string()),
            Some(name.clone()),
        )
    };

    let body_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let body = &block[body_start..];

    let when = WHEN
        .find(body)
        .ok_or_else(|| malformed("Missing 'when' section"))?;
    let after_when = &body[when.end()..];
    let then = THEN
        .find(after_when)
        .ok_or_else(|| malformed("Missing 'then' section"))?;
    let after_then = &after_when[then.end()..];
    let end = TERMINAL_END
        .find(after_then)
        .ok_or_else(|| malformed("Missing 'end' marker"))?;

    let rule_ctx = ctx.with_rule(Some(&name));
    let mut rule = Rule::new(name.clone(), package);
    parse_header(&body[..when.start()], &mut rule, &rule_ctx, diagnostics);
    rule.conditions = parse_conditions(&after_when[..then.start()], &rule_ctx, diagnostics);
    rule.actions = parse_actions(&after_then[..end.start()], &rule_ctx, diagnostics);
    Ok(rule)
}

/// Header text between the rule name and `when`: `extends`, `salience`,
/// and any other attribute with an optional value.
fn parse_header(
    header: &str,
    rule: &mut Rule,
    ctx: &ConstructContext<'_>,
    diagnostics: &mut Diagnostics,
) {
    let tokens: Vec<String> = top_level_tokens(&strip_comments(header))
        .into_iter()
        .map(|t| t.trim_end_matches(',').to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let mut attributes = IndexMap::new();
    let mut i = 0;
    while i < tokens.len() {
        let key = tokens[i].as_str();
        i += 1;
        if key.starts_with('@') || !ATTRIBUTE_NAME.is_match(key) {
            continue;
        }
        let value = match tokens.get(i) {
            Some(next) if is_attribute_value(next) => {
                i += 1;
                Some(next.clone())
            }
            _ => None,
        };

        match key {
            "extends" => match value {
                Some(parent) => rule.extends = Some(strip_quotes(&parent).to_string()),
                None => ctx.report(
                    diagnostics,
                    ConstructError::Rule("'extends' without a parent rule name".to_string()),
                ),
            },
            "salience" => {
                let raw = value.unwrap_or_default();
                match raw.parse::<i64>() {
                    Ok(salience) => rule.salience = Some(salience),
                    Err(_) => ctx.report(
                        diagnostics,
                        ConstructError::Rule(format!(
                            "Invalid salience value '{raw}'; treating salience as unset"
                        )),
                    ),
                }
            }
            _ => {
                attributes.insert(key.to_string(), value.unwrap_or_else(|| "true".to_string()));
            }
        }
    }
    rule.attributes = attributes;
}

/// A token following an attribute name is its value unless it looks like
/// the next attribute name.
fn is_attribute_value(token: &str) -> bool {
    if matches!(token, "true" | "false") {
        return true;
    }
    !ATTRIBUTE_NAME.is_match(token) || token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionKind, Operator};

    fn parse(block: &str) -> (Result<Rule, (ConstructError, Option<String>)>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let ctx = ConstructContext::new("test.drl", 1);
        let result = parse_rule(block, "com.acme", &ctx, &mut diagnostics);
        (result, diagnostics)
    }

    #[test]
    fn test_single_line_rule() {
        let (result, diagnostics) =
            parse(r#"rule "R1" when $c : Customer(age > 18) then $c.approve(); end"#);
        let rule = result.unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(rule.name, "R1");
        assert_eq!(rule.package, "com.acme");
        assert_eq!(rule.conditions.len(), 1);
        let condition = &rule.conditions[0];
        assert_eq!(condition.variable, "c");
        assert_eq!(condition.fact_type, "Customer");
        assert_eq!(condition.constraints[0].field, "age");
        assert_eq!(condition.constraints[0].operator, Operator::Gt);
        assert_eq!(condition.constraints[0].value, "18");
        assert_eq!(rule.actions.len(), 1);
        assert_eq!(rule.actions[0].kind, ActionKind::MethodCall);
        assert_eq!(rule.actions[0].target, "c");
        assert_eq!(rule.actions[0].method.as_deref(), Some("approve"));
        assert!(rule.actions[0].arguments.is_empty());
    }

    #[test]
    fn test_missing_then_is_malformed() {
        let (result, _) = parse(r#"rule "R2" when $c: Customer() end"#);
        let (err, name) = result.unwrap_err();
        assert!(matches!(err, ConstructError::MalformedRule(_)));
        assert_eq!(name.as_deref(), Some("R2"));
    }

    #[test]
    fn test_missing_when_is_malformed() {
        let (result, diagnostics) = parse(r#"rule "R4" salience 5 then $c.go(); end"#);
        let (err, name) = result.unwrap_err();
        assert!(matches!(err, ConstructError::MalformedRule(_)));
        assert_eq!(err.to_string(), "Missing 'when' section");
        assert_eq!(name.as_deref(), Some("R4"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_then_section_with_comments_and_literals() {
        let (result, diagnostics) = parse(
            r#"rule "Notify" // header note, don't parse
when
    $o : Order(status == "NEW")
then
    // first: log; then ship
    $o.log("a; b // not a comment");   // trailing; note
    /* skip
       this; */
    $o.ship();
end"#,
        );
        let rule = result.unwrap();
        assert!(diagnostics.is_empty());
        assert!(rule.attributes.is_empty());
        assert_eq!(rule.conditions.len(), 1);
        assert_eq!(rule.actions.len(), 2);
        assert_eq!(rule.actions[0].target, "o");
        assert_eq!(rule.actions[0].method.as_deref(), Some("log"));
        assert_eq!(rule.actions[0].arguments, vec![r#""a; b // not a comment""#]);
        assert_eq!(rule.actions[1].method.as_deref(), Some("ship"));
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let (result, _) = parse("rule \n when then end");
        let (err, name) = result.unwrap_err();
        assert!(matches!(err, ConstructError::MalformedRule(_)));
        assert!(name.is_none());
    }

    #[test]
    fn test_missing_end_is_malformed() {
        let (result, _) = parse("rule \"R3\"\nwhen\n  $c : Customer()\nthen\n  $c.approve();\n");
        let (err, _) = result.unwrap_err();
        assert_eq!(err.to_string(), "Missing 'end' marker");
    }

    #[test]
    fn test_header_attributes() {
        let block = r#"rule "Child" extends "Base"
    salience 100
    no-loop
    agenda-group "billing"
    lock-on-active true
    when
        Order()
    then
        update($o);
end"#;
        let (result, diagnostics) = parse(block);
        let rule = result.unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(rule.extends.as_deref(), Some("Base"));
        assert_eq!(rule.salience, Some(100));
        assert_eq!(rule.attributes.get("no-loop").map(String::as_str), Some("true"));
        assert_eq!(
            rule.attributes.get("agenda-group").map(String::as_str),
            Some("\"billing\"")
        );
        assert_eq!(rule.attributes.get("lock-on-active").map(String::as_str), Some("true"));
        assert!(!rule.attributes.contains_key("salience"));
        assert!(!rule.attributes.contains_key("extends"));
    }

    #[test]
    fn test_invalid_salience_degrades_to_unset() {
        let (result, diagnostics) =
            parse("rule \"S\" salience ($p.priority)\nwhen\nthen\nend");
        let rule = result.unwrap();
        assert_eq!(rule.salience, None);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.entries()[0].rule_name.as_deref(), Some("S"));
    }

    #[test]
    fn test_negative_salience_and_unquoted_name() {
        let (result, _) = parse("rule cleanup salience -5 when then end");
        let rule = result.unwrap();
        assert_eq!(rule.name, "cleanup");
        assert_eq!(rule.salience, Some(-5));
    }
}
