//! Line-oriented block extraction.
//!
//! One pass over the source splits it into file-level declarations
//! (`package`, `import`, `global`) and raw construct blocks. Rule, query and
//! declare blocks run until a line-initial `end`; a new start marker
//! force-closes whatever block is open. Function blocks run until their
//! braces balance.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::models::{Global, Import};
use crate::parser::diagnostics::{Diagnostic, DiagnosticCategory, Diagnostics};
use crate::parser::scan::strip_comments;

static PACKAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^package\b\s*([\w.]*)\s*;?\s*$").unwrap());
static IMPORT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^import\s+(?:(?:static|function|accumulate)\s+)?([A-Za-z_$][\w$.]*(?:\.\*)?)\s*;?\s*$")
        .unwrap()
});
static GLOBAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^global\s+([A-Za-z_][\w.$]*(?:<[^>]*>)?(?:\[\])*)\s+([A-Za-z_]\w*)\s*;?\s*$")
        .unwrap()
});

static RULE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^rule\s+["'\w]"#).unwrap());
static QUERY_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^query\s+["'\w]"#).unwrap());
static DECLARE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^declare\s+\w").unwrap());
static FUNCTION_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^function\s+\S+\s+\S+?\s*\(").unwrap());

static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^end\b").unwrap());
static INLINE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\send\s*;?\s*$").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Rule,
    Query,
    Function,
    DeclaredType,
}

impl BlockKind {
    fn detect(trimmed: &str) -> Option<Self> {
        if RULE_START.is_match(trimmed) {
            Some(BlockKind::Rule)
        } else if QUERY_START.is_match(trimmed) {
            Some(BlockKind::Query)
        } else if DECLARE_START.is_match(trimmed) {
            Some(BlockKind::DeclaredType)
        } else if FUNCTION_START.is_match(trimmed) {
            Some(BlockKind::Function)
        } else {
            None
        }
    }
}

/// Raw text of one construct with its 1-based starting line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub start_line: usize,
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceLayout {
    pub package: Option<String>,
    pub imports: Vec<Import>,
    pub globals: Vec<Global>,
    pub blocks: Vec<Block>,
}

struct OpenBlock {
    kind: BlockKind,
    start_line: usize,
    lines: Vec<String>,
    brace_depth: i64,
    seen_open_brace: bool,
}

impl OpenBlock {
    fn new(kind: BlockKind, start_line: usize) -> Self {
        Self {
            kind,
            start_line,
            lines: Vec::new(),
            brace_depth: 0,
            seen_open_brace: false,
        }
    }

    fn push(&mut self, line: &str) {
        if self.kind == BlockKind::Function {
            self.brace_depth += brace_delta(line, &mut self.seen_open_brace);
        }
        self.lines.push(line.to_string());
    }

    fn function_closed(&self) -> bool {
        self.seen_open_brace && self.brace_depth <= 0
    }

    fn finish(self) -> Block {
        Block {
            kind: self.kind,
            start_line: self.start_line,
            text: self.lines.join("\n"),
        }
    }
}

/// Net `{`/`}` count of a line, ignoring braces inside string literals.
fn brace_delta(line: &str, seen_open: &mut bool) -> i64 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in line.chars() {
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
            '{' => {
                *seen_open = true;
                delta += 1;
            }
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn parse_import(line: &str) -> Option<Import> {
    let caps = IMPORT_LINE.captures(line)?;
    let full = caps.get(1)?.as_str();
    let (package, class_name) = match full.rfind('.') {
        Some(pos) => (&full[..pos], &full[pos + 1..]),
        None => ("", full),
    };
    if class_name.is_empty() {
        return None;
    }
    Some(Import {
        package: package.to_string(),
        class_name: class_name.to_string(),
    })
}

fn parse_global(line: &str) -> Option<Global> {
    let caps = GLOBAL_LINE.captures(line)?;
    Some(Global {
        type_: caps.get(1)?.as_str().to_string(),
        name: caps.get(2)?.as_str().to_string(),
    })
}

fn file_diagnostic(file_path: &str, line_number: usize, message: String) -> Diagnostic {
    Diagnostic::new(DiagnosticCategory::File, message)
        .with_file(file_path)
        .with_line(line_number)
        .with_kind("FileParsingError")
}

/// Split `text` into declarations and construct blocks.
pub fn extract(text: &str, file_path: &str, diagnostics: &mut Diagnostics) -> SourceLayout {
    let mut layout = SourceLayout::default();
    if text.trim().is_empty() {
        return layout;
    }

    let mut open: Option<OpenBlock> = None;
    let mut in_comment = false;

    for (idx, line) in text.lines().enumerate() {
        let line_number = idx + 1;
        let trimmed = line.trim();

        if let Some(block) = open.as_mut() {
            if block.kind == BlockKind::Function {
                block.push(line);
                if block.function_closed() {
                    if let Some(done) = open.take() {
                        layout.blocks.push(done.finish());
                    }
                }
                continue;
            }
            if let Some(kind) = BlockKind::detect(trimmed) {
                if let Some(done) = open.take() {
                    debug!(
                        "Block starting at line {} closed by new {:?} at line {}",
                        done.start_line, kind, line_number
                    );
                    layout.blocks.push(done.finish());
                }
                open = start_block(kind, line, line_number, &mut layout);
                continue;
            }
            block.push(line);
            if BLOCK_END.is_match(trimmed) {
                if let Some(done) = open.take() {
                    layout.blocks.push(done.finish());
                }
            }
            continue;
        }

        if in_comment {
            if trimmed.contains("*/") {
                in_comment = false;
            }
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with("/*") {
            in_comment = !trimmed.contains("*/");
            continue;
        }

        if let Some(kind) = BlockKind::detect(trimmed) {
            open = start_block(kind, line, line_number, &mut layout);
            continue;
        }

        if trimmed.starts_with("package") && PACKAGE_LINE.is_match(trimmed) {
            if layout.package.is_some() {
                debug!("Ignoring additional package declaration at line {}", line_number);
                continue;
            }
            let name = PACKAGE_LINE
                .captures(trimmed)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .unwrap_or("");
            if name.is_empty() {
                diagnostics.record(file_diagnostic(
                    file_path,
                    line_number,
                    format!("Malformed package declaration: '{trimmed}'"),
                ));
            } else {
                layout.package = Some(name.to_string());
            }
        } else if trimmed.starts_with("import ") || trimmed == "import" {
            match parse_import(trimmed) {
                Some(import) => layout.imports.push(import),
                None => diagnostics.record(file_diagnostic(
                    file_path,
                    line_number,
                    format!("Error parsing import: '{trimmed}'"),
                )),
            }
        } else if trimmed.starts_with("global ") || trimmed == "global" {
            match parse_global(trimmed) {
                Some(global) => layout.globals.push(global),
                None => diagnostics.record(file_diagnostic(
                    file_path,
                    line_number,
                    format!("Error parsing global: '{trimmed}'"),
                )),
            }
        } else {
            debug!("Skipping unrecognised top-level line {}: {}", line_number, trimmed);
        }
    }

    if let Some(done) = open.take() {
        layout.blocks.push(done.finish());
    }

    if layout.package.is_none() {
        diagnostics.record(
            Diagnostic::new(DiagnosticCategory::File, "No package declaration found")
                .with_file(file_path)
                .with_kind("MissingPackage"),
        );
    }

    layout
}

/// Open a block at `line`. One-line constructs are closed immediately and
/// `None` is returned.
fn start_block(
    kind: BlockKind,
    line: &str,
    line_number: usize,
    layout: &mut SourceLayout,
) -> Option<OpenBlock> {
    let mut block = OpenBlock::new(kind, line_number);
    block.push(line);
    let closed = match kind {
        BlockKind::Function => block.function_closed(),
        _ => INLINE_END.is_match(strip_comments(line).trim_end()),
    };
    if closed {
        layout.blocks.push(block.finish());
        None
    } else {
        Some(block)
    }
}
