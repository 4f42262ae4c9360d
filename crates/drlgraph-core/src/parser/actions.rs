//! `then` section parsing.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::ConstructError;
use crate::models::{Action, ActionKind};
use crate::parser::diagnostics::Diagnostics;
use crate::parser::scan::{
    collapse_whitespace, split_arguments, split_statements, strip_comments, top_level_assignment,
    top_level_chars,
};
use crate::parser::ConstructContext;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").unwrap());
// Used only when the statement does not balance; picks the first `.name(`.
static LOOSE_METHOD_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^=(]+?)\.([A-Za-z_]\w*)\s*\(").unwrap());

fn strip_dollar(target: &str) -> String {
    target.trim().trim_start_matches('$').to_string()
}

/// Strip comments, drop blank lines and join what remains into one string.
fn clean_then_text(text: &str) -> String {
    strip_comments(text)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn parse_actions(
    text: &str,
    ctx: &ConstructContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Vec<Action> {
    split_statements(&clean_then_text(text))
        .into_iter()
        .map(|raw| collapse_whitespace(&raw))
        .filter(|statement| !statement.is_empty())
        .map(|statement| classify_statement(&statement, ctx, diagnostics))
        .collect()
}

fn classify_statement(
    statement: &str,
    ctx: &ConstructContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Action {
    if let Some(action) = method_call(statement, ctx, diagnostics) {
        return action;
    }
    if let Some(eq) = top_level_assignment(statement) {
        let lhs = statement[..eq].trim();
        let rhs = statement[eq + 1..].trim();
        if !lhs.is_empty() && !rhs.is_empty() {
            return Action {
                kind: ActionKind::Assignment,
                target: strip_dollar(lhs),
                method: None,
                arguments: vec![rhs.to_string()],
            };
        }
    }
    Action {
        kind: ActionKind::Statement,
        target: statement.to_string(),
        method: None,
        arguments: Vec::new(),
    }
}

/// Recognise `target.method(args)`, where the final `)` closes the call.
fn method_call(
    statement: &str,
    ctx: &ConstructContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Option<Action> {
    let (tops, bal) = top_level_chars(statement);
    if !bal.is_balanced() {
        let caps = LOOSE_METHOD_CALL.captures(statement)?;
        let target = caps.get(1)?.as_str();
        let method = caps.get(2)?.as_str();
        ctx.report(
            diagnostics,
            ConstructError::Action(format!(
                "Could not split arguments of '{statement}'; keeping call without arguments"
            )),
        );
        return Some(Action {
            kind: ActionKind::MethodCall,
            target: strip_dollar(target),
            method: Some(method.to_string()),
            arguments: Vec::new(),
        });
    }

    let &(last_idx, last_ch) = tops.last()?;
    if last_ch != ')' || last_idx + 1 != statement.len() {
        return None;
    }
    let open_idx = tops
        .iter()
        .rev()
        .find(|(_, ch)| *ch == '(')
        .map(|(idx, _)| *idx)?;
    let dot_idx = tops
        .iter()
        .rev()
        .filter(|(idx, _)| *idx < open_idx)
        .find(|(_, ch)| *ch == '.')
        .map(|(idx, _)| *idx)?;

    let head = &statement[..open_idx];
    if top_level_assignment(head).is_some() {
        return None;
    }
    let target = statement[..dot_idx].trim();
    let method = statement[dot_idx + 1..open_idx].trim();
    if target.is_empty() || !IDENTIFIER.is_match(method) {
        return None;
    }

    let inner = &statement[open_idx + 1..last_idx];
    let arguments = match split_arguments(inner) {
        Ok(arguments) => arguments,
        Err(message) => {
            ctx.report(diagnostics, ConstructError::Action(message));
            Vec::new()
        }
    };

    Some(Action {
        kind: ActionKind::MethodCall,
        target: strip_dollar(target),
        method: Some(method.to_string()),
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (Vec<Action>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let ctx = ConstructContext::new("test.drl", 1).with_rule(Some("R"));
        let actions = parse_actions(text, &ctx, &mut diagnostics);
        (actions, diagnostics)
    }

    #[test]
    fn test_method_call_without_arguments() {
        let (actions, diagnostics) = parse("$c.approve();");
        assert!(diagnostics.is_empty());
        assert_eq!(
            actions,
            vec![Action {
                kind: ActionKind::MethodCall,
                target: "c".to_string(),
                method: Some("approve".to_string()),
                arguments: vec![],
            }]
        );
    }

    #[test]
    fn test_method_call_arguments_are_nesting_aware() {
        let (actions, _) = parse(r#"results.add(new Alert($c, "a, b"), calc(1, 2));"#);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].target, "results");
        assert_eq!(
            actions[0].arguments,
            vec![r#"new Alert($c, "a, b")"#, "calc(1, 2)"]
        );
    }

    #[test]
    fn test_chained_receiver_and_string_with_dots() {
        let (actions, _) = parse(
            "$c.getOrders().clear();\nSystem.out.println(\"done. (ok)\");",
        );
        assert_eq!(actions[0].target, "c.getOrders()");
        assert_eq!(actions[0].method.as_deref(), Some("clear"));
        assert_eq!(actions[1].target, "System.out");
        assert_eq!(actions[1].method.as_deref(), Some("println"));
    }

    #[test]
    fn test_assignment_and_statement() {
        let (actions, _) = parse(
            "// bump the counter\n$total = $total + 1;\ninsert(new Audit());\n\nmodify($c) { setVip(true) }",
        );
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0].kind, ActionKind::Assignment);
        assert_eq!(actions[0].target, "total");
        assert_eq!(actions[0].arguments, vec!["$total + 1"]);
        assert_eq!(actions[1].kind, ActionKind::Statement);
        assert_eq!(actions[1].target, "insert(new Audit())");
        assert_eq!(actions[2].kind, ActionKind::Statement);
    }

    #[test]
    fn test_trailing_comments_do_not_leak_into_later_statements() {
        let (actions, diagnostics) = parse(
            "$c.approve(); // don't retry\n$o.ship();\ninsert(new Audit());",
        );
        assert!(diagnostics.is_empty());
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[1].target, "o");
        assert_eq!(actions[1].method.as_deref(), Some("ship"));
        assert_eq!(actions[2].target, "insert(new Audit())");

        let (actions, _) = parse("$c.approve(); // done\n$o.ship(); /* last; step */");
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1].target, "o");
    }

    #[test]
    fn test_assigned_call_is_assignment() {
        let (actions, _) = parse("String s = $c.getName();");
        assert_eq!(actions[0].kind, ActionKind::Assignment);
        assert_eq!(actions[0].target, "String s");
    }

    #[test]
    fn test_unbalanced_call_keeps_action_without_arguments() {
        let (actions, diagnostics) = parse("$c.setName(\"oops);");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::MethodCall);
        assert_eq!(actions[0].method.as_deref(), Some("setName"));
        assert!(actions[0].arguments.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }
}
