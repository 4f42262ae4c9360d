//! `declare` block parsing.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use crate::errors::ConstructError;
use crate::models::{DeclaredType, Field};

static DECLARE_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*declare\s+(?:trait\s+)?([A-Za-z_][\w.]*)").unwrap()
});
static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)(?:\(([^)]*)\))?").unwrap());
// `Type name [: extra]`
static TYPED_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][\w.]*(?:<[^>]*>)?(?:\[\])*)\s+([A-Za-z_]\w*)\s*(?::\s*(.*))?$").unwrap()
});
// `name : Type [annotations]`
static NAMED_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)\s*:\s*([A-Za-z_][\w.]*(?:<[^>]*>)?(?:\[\])*)\s*(.*)$").unwrap()
});
static DECLARE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^end(?:\s*declare)?\b").unwrap());

fn annotations_in(text: &str) -> IndexMap<String, String> {
    ANNOTATION
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            Some((name, value.to_string()))
        })
        .collect()
}

fn parse_field(line: &str) -> Option<Field> {
    if let Some(caps) = NAMED_FIELD.captures(line) {
        return Some(Field {
            type_: caps.get(2)?.as_str().to_string(),
            name: caps.get(1)?.as_str().to_string(),
            annotations: annotations_in(caps.get(3).map(|m| m.as_str()).unwrap_or("")),
        });
    }
    let caps = TYPED_FIELD.captures(line)?;
    Some(Field {
        type_: caps.get(1)?.as_str().to_string(),
        name: caps.get(2)?.as_str().to_string(),
        annotations: annotations_in(caps.get(3).map(|m| m.as_str()).unwrap_or("")),
    })
}

/// Type-level annotations are the standalone `@..` lines and any on the
/// header line. Field annotations come from the field's own line.
pub(crate) fn parse_declared_type(block: &str) -> Result<DeclaredType, ConstructError> {
    let mut lines = block.lines();
    let header = lines.next().unwrap_or("");
    let caps = DECLARE_HEAD.captures(header).ok_or_else(|| {
        ConstructError::MalformedDeclaredType(
            "Could not find type name in declare block".to_string(),
        )
    })?;
    let (Some(head), Some(name)) = (caps.get(0), caps.get(1)) else {
        return Err(ConstructError::MalformedDeclaredType(
            "Could not find type name in declare block".to_string(),
        ));
    };

    let mut declared = DeclaredType {
        name: name.as_str().to_string(),
        annotations: annotations_in(&header[head.end()..]),
        fields: Vec::new(),
    };

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        if DECLARE_END.is_match(trimmed) {
            break;
        }
        if trimmed.starts_with('@') {
            declared.annotations.extend(annotations_in(trimmed));
            continue;
        }
        match parse_field(trimmed.trim_end_matches(';')) {
            Some(field) => declared.fields.push(field),
            None => debug!("Skipping unrecognised line in declare {}: {}", declared.name, trimmed),
        }
    }

    Ok(declared)
}
