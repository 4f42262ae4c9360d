//! Quote- and bracket-aware scanning shared by the construct parsers.
//!
//! DRL embeds Java/MVEL expressions, so splitting on `,`, `;` or `&&` must
//! ignore separators nested inside `()`, `[]`, `{}` or string literals.

/// Result of scanning a whole fragment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Balance {
    pub depth: i32,
    pub unclosed_quote: bool,
    pub underflow: bool,
}

impl Balance {
    pub fn is_balanced(&self) -> bool {
        self.depth == 0 && !self.unclosed_quote && !self.underflow
    }
}

/// Byte offsets and characters that sit at nesting depth zero outside string
/// literals. An opening bracket at depth zero is included, as is the closing
/// bracket that returns to depth zero. Quote characters are never included.
pub(crate) fn top_level_chars(text: &str) -> (Vec<(usize, char)>, Balance) {
    let mut out = Vec::new();
    let mut balance = Balance::default();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => {
                if balance.depth == 0 {
                    out.push((idx, ch));
                }
                balance.depth += 1;
            }
            ')' | ']' | '}' => {
                balance.depth -= 1;
                if balance.depth < 0 {
                    balance.underflow = true;
                    balance.depth = 0;
                }
                if balance.depth == 0 {
                    out.push((idx, ch));
                }
            }
            _ => {
                if balance.depth == 0 {
                    out.push((idx, ch));
                }
            }
        }
    }
    balance.unclosed_quote = quote.is_some();
    (out, balance)
}

pub(crate) fn balance(text: &str) -> Balance {
    top_level_chars(text).1
}

/// Offset of the bracket closing the one opened at `open_idx`, if any.
pub(crate) fn matching_close(text: &str, open_idx: usize) -> Option<usize> {
    let tail = text.get(open_idx..)?;
    let (tops, _) = top_level_chars(tail);
    let mut iter = tops.into_iter();
    match iter.next() {
        Some((0, '(' | '[' | '{')) => {}
        _ => return None,
    }
    iter.find(|(_, ch)| matches!(ch, ')' | ']' | '}'))
        .map(|(idx, _)| open_idx + idx)
}

fn split_at_offsets(text: &str, cuts: &[(usize, usize)]) -> Vec<String> {
    let mut parts = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for &(at, width) in cuts {
        parts.push(text[start..at].trim().to_string());
        start = at + width;
    }
    parts.push(text[start..].trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Split a constraint list on top-level `&&` and `,`.
pub(crate) fn split_constraints(text: &str) -> Vec<String> {
    let (tops, _) = top_level_chars(text);
    let mut cuts = Vec::new();
    let mut i = 0;
    while i < tops.len() {
        let (idx, ch) = tops[i];
        if ch == ',' {
            cuts.push((idx, 1));
        } else if ch == '&' {
            if let Some(&(next_idx, '&')) = tops.get(i + 1) {
                if next_idx == idx + 1 {
                    cuts.push((idx, 2));
                    i += 1;
                }
            }
        }
        i += 1;
    }
    split_at_offsets(text, &cuts)
}

/// Split a call argument list on top-level commas. Fails when brackets or
/// quotes do not balance.
pub(crate) fn split_arguments(text: &str) -> Result<Vec<String>, String> {
    let (tops, balance) = top_level_chars(text);
    if !balance.is_balanced() {
        return Err(format!("Unbalanced argument list '{}'", text.trim()));
    }
    let cuts: Vec<(usize, usize)> = tops
        .into_iter()
        .filter(|(_, ch)| *ch == ',')
        .map(|(idx, _)| (idx, 1))
        .collect();
    Ok(split_at_offsets(text, &cuts))
}

/// Split action text into statements on top-level `;`. A top-level `}`
/// also terminates a statement (`if (..) { .. }`, `modify(..) { .. }`).
pub(crate) fn split_statements(text: &str) -> Vec<String> {
    let (tops, _) = top_level_chars(text);
    let cuts: Vec<(usize, usize)> = tops
        .into_iter()
        .filter_map(|(idx, ch)| match ch {
            ';' => Some((idx, 1)),
            '}' => Some((idx + 1, 0)),
            _ => None,
        })
        .collect();
    split_at_offsets(text, &cuts)
}

/// Offset of a top-level assignment `=` (not part of `==`, `!=`, `<=`, `>=`).
pub(crate) fn top_level_assignment(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let (tops, _) = top_level_chars(text);
    tops.into_iter().map(|(idx, _)| idx).find(|&idx| {
        if bytes[idx] != b'=' {
            return false;
        }
        let prev = if idx > 0 { bytes[idx - 1] } else { b' ' };
        let next = bytes.get(idx + 1).copied().unwrap_or(b' ');
        !matches!(prev, b'=' | b'!' | b'<' | b'>') && next != b'='
    })
}

/// Whitespace-separated tokens, keeping quoted and bracketed runs intact.
pub(crate) fn top_level_tokens(text: &str) -> Vec<String> {
    let (tops, _) = top_level_chars(text);
    let cuts: Vec<(usize, usize)> = tops
        .into_iter()
        .filter(|(_, ch)| ch.is_whitespace())
        .map(|(idx, ch)| (idx, ch.len_utf8()))
        .collect();
    split_at_offsets(text, &cuts)
}

/// Strip one pair of matching surrounding quotes.
pub(crate) fn strip_quotes(value: &str) -> &str {
    let trimmed = value.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

/// Remove `//` and `/* */` comments that sit outside string literals. Line
/// breaks survive, and a string literal never runs past the end of its line.
pub(crate) fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q || ch == '\n' {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.next_if(|&next| next != '\n').is_some() {}
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        out.push('\n');
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Collapse runs of whitespace into single spaces.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
