//! Query block parsing.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::ConstructError;
use crate::models::{Parameter, Query};
use crate::parser::conditions::parse_conditions;
use crate::parser::diagnostics::Diagnostics;
use crate::parser::scan::matching_close;
use crate::parser::ConstructContext;

static QUERY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*query[ \t]+(?:"([^"]+)"|'([^']+)'|([A-Za-z_]\w*))"#).unwrap()
});
static TERMINAL_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)end\s*;?\s*(?://[^\n]*)?\s*$").unwrap());

/// Split a `type name, type name` list. Commas inside generics are kept.
pub(crate) fn split_parameter_list(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    parts.push(current.trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

/// `Type name` → `Parameter`; `None` when either half is missing.
pub(crate) fn parse_parameter(raw: &str) -> Option<Parameter> {
    let (type_, name) = raw.trim().rsplit_once(char::is_whitespace)?;
    let (type_, name) = (type_.trim(), name.trim());
    let valid_name = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if type_.is_empty() || !valid_name {
        return None;
    }
    Some(Parameter {
        type_: type_.to_string(),
        name: name.to_string(),
    })
}

pub(crate) fn parse_query(
    block: &str,
    ctx: &ConstructContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<Query, ConstructError> {
    let caps = QUERY_NAME
        .captures(block)
        .ok_or_else(|| {
            ConstructError::MalformedQuery("Missing or invalid query name".to_string())
        })?;
    let name = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            ConstructError::MalformedQuery("Missing or invalid query name".to_string())
        })?;
    let query_ctx = ctx.with_rule(Some(&name));

    let mut rest_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let mut parameters = Vec::new();
    let after_name = &block[rest_start..];
    if after_name.trim_start().starts_with('(') {
        let open_idx = rest_start + (after_name.len() - after_name.trim_start().len());
        let close_idx = matching_close(block, open_idx).ok_or_else(|| {
            ConstructError::MalformedQuery(format!("Unclosed parameter list in query '{name}'"))
        })?;
        for raw in split_parameter_list(&block[open_idx + 1..close_idx]) {
            match parse_parameter(&raw) {
                Some(parameter) => parameters.push(parameter),
                None => query_ctx.report(
                    diagnostics,
                    ConstructError::Query(format!("Malformed parameter '{raw}' in query '{name}'")),
                ),
            }
        }
        rest_start = close_idx + 1;
    }

    let body = &block[rest_start..];
    let end = TERMINAL_END
        .find(body)
        .ok_or_else(|| {
            ConstructError::MalformedQuery(format!("Missing 'end' marker in query '{name}'"))
        })?;
    let conditions = parse_conditions(&body[..end.start()], &query_ctx, diagnostics);

    Ok(Query {
        name,
        parameters,
        conditions,
    })
}
