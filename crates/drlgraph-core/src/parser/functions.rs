//! `function` block parsing. Bodies are kept as raw text.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::ConstructError;
use crate::models::Function;
use crate::parser::diagnostics::Diagnostics;
use crate::parser::queries::{parse_parameter, split_parameter_list};
use crate::parser::scan::matching_close;
use crate::parser::ConstructContext;

static FUNCTION_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*function\s+([\w.$\[\]<>, ?]+?)\s+([A-Za-z_]\w*)\s*\(").unwrap()
});

pub(crate) fn parse_function(
    block: &str,
    ctx: &ConstructContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<Function, ConstructError> {
    let caps = FUNCTION_HEAD.captures(block).ok_or_else(|| {
        ConstructError::MalformedFunction(
            "Could not find function declaration in block".to_string(),
        )
    })?;
    let (Some(head), Some(return_type), Some(name)) = (caps.get(0), caps.get(1), caps.get(2))
    else {
        return Err(ConstructError::MalformedFunction(
            "Could not find function declaration in block".to_string(),
        ));
    };
    let name = name.as_str().to_string();
    let function_ctx = ctx.with_rule(Some(&name));

    let open_idx = head.end() - 1;
    let close_idx = matching_close(block, open_idx).ok_or_else(|| {
        ConstructError::MalformedFunction(format!("Unclosed parameter list in function '{name}'"))
    })?;

    let mut parameters = Vec::new();
    for raw in split_parameter_list(&block[open_idx + 1..close_idx]) {
        match parse_parameter(&raw) {
            Some(parameter) => parameters.push(parameter),
            None => function_ctx.report(
                diagnostics,
                ConstructError::Function(format!(
                    "Malformed parameter '{raw}' in function '{name}'"
                )),
            ),
        }
    }

    let rest = &block[close_idx + 1..];
    let body = match (rest.find('{'), rest.rfind('}')) {
        (Some(open), Some(close)) if open < close => rest[open + 1..close].trim().to_string(),
        _ => {
            return Err(ConstructError::MalformedFunction(format!(
                "Missing body in function '{name}'"
            )))
        }
    };

    Ok(Function {
        return_type: return_type.as_str().trim().to_string(),
        name,
        parameters,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(block: &str) -> (Result<Function, ConstructError>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let ctx = ConstructContext::new("test.drl", 1);
        let result = parse_function(block, &ctx, &mut diagnostics);
        (result, diagnostics)
    }

    #[test]
    fn test_function_signature_and_body() {
        let (result, diagnostics) = parse(
            "function String greet(String name, int times) {\n    if (times > 1) { return name; }\n    return \"hi \" + name;\n}",
        );
        let function = result.unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(function.return_type, "String");
        assert_eq!(function.name, "greet");
        assert_eq!(function.parameters.len(), 2);
        assert_eq!(function.parameters[1].type_, "int");
        assert!(function.body.starts_with("if (times > 1)"));
        assert!(function.body.ends_with("return \"hi \" + name;"));
    }

    #[test]
    fn test_generic_return_type() {
        let (result, _) =
            parse("function Map<String, Integer> index(List<String> keys) { return null; }");
        let function = result.unwrap();
        assert_eq!(function.return_type, "Map<String, Integer>");
        assert_eq!(function.name, "index");
        assert_eq!(function.parameters[0].type_, "List<String>");
    }

    #[test]
    fn test_malformed_parameter_is_skipped() {
        let (result, diagnostics) = parse("function void log(String) { }");
        let function = result.unwrap();
        assert!(function.parameters.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_missing_body() {
        let (result, _) = parse("function void log(String msg)");
        assert!(matches!(result, Err(ConstructError::MalformedFunction(_))));
    }
}
