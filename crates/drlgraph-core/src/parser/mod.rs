//! DRL parsing: text in, [`RuleFile`] plus diagnostics out.
//!
//! [`parse_source`] is the pure entry point. [`DrlParser`] adds file and
//! directory handling on top of it and keeps the diagnostics of the last
//! top-level call.

pub mod actions;
pub mod blocks;
pub mod conditions;
pub mod declared_types;
pub mod diagnostics;
pub mod filesystem;
pub mod functions;
pub mod pipeline;
pub mod queries;
pub mod rules;
pub(crate) mod scan;

use tracing::debug;

use crate::errors::ConstructError;
use crate::models::RuleFile;
use crate::parser::blocks::BlockKind;
use crate::parser::diagnostics::{Diagnostic, Diagnostics};

pub use diagnostics::{DiagnosticCategory, DiagnosticSummary};
pub use pipeline::{DirectoryParse, DrlParser, FileFailure, ParsedFile};

/// Location attached to diagnostics raised while parsing one construct.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConstructContext<'a> {
    pub file_path: &'a str,
    pub line_number: usize,
    pub rule_name: Option<&'a str>,
}

impl<'a> ConstructContext<'a> {
    pub fn new(file_path: &'a str, line_number: usize) -> Self {
        Self {
            file_path,
            line_number,
            rule_name: None,
        }
    }

    pub fn with_rule<'b>(&self, rule_name: Option<&'b str>) -> ConstructContext<'b>
    where
        'a: 'b,
    {
        ConstructContext {
            file_path: self.file_path,
            line_number: self.line_number,
            rule_name,
        }
    }

    pub fn report(&self, diagnostics: &mut Diagnostics, err: ConstructError) {
        diagnostics.record_construct_error(
            &err,
            self.file_path,
            Some(self.line_number),
            self.rule_name,
        );
    }
}

/// Parse DRL source text. Never fails: every malformed construct becomes a
/// diagnostic and parsing moves on to the next one.
pub fn parse_source(text: &str, path: &str) -> (RuleFile, Vec<Diagnostic>) {
    let mut diagnostics = Diagnostics::new();
    let rule_file = parse_into(text, path, &mut diagnostics);
    (rule_file, diagnostics.into_entries())
}

pub(crate) fn parse_into(text: &str, path: &str, diagnostics: &mut Diagnostics) -> RuleFile {
    let layout = blocks::extract(text, path, diagnostics);
    let mut rule_file = RuleFile::new(path, layout.package.unwrap_or_default());
    rule_file.imports = layout.imports;
    rule_file.globals = layout.globals;

    for block in &layout.blocks {
        let ctx = ConstructContext::new(path, block.start_line);
        match block.kind {
            BlockKind::Rule => {
                match rules::parse_rule(&block.text, &rule_file.package, &ctx, diagnostics) {
                    Ok(rule) => rule_file.rules.push(rule),
                    Err((err, rule_name)) => {
                        ctx.with_rule(rule_name.as_deref()).report(diagnostics, err)
                    }
                }
            }
            BlockKind::Query => match queries::parse_query(&block.text, &ctx, diagnostics) {
                Ok(query) => rule_file.queries.push(query),
                Err(err) => ctx.report(diagnostics, err),
            },
            BlockKind::Function => match functions::parse_function(&block.text, &ctx, diagnostics) {
                Ok(function) => rule_file.functions.push(function),
                Err(err) => ctx.report(diagnostics, err),
            },
            BlockKind::DeclaredType => match declared_types::parse_declared_type(&block.text) {
                Ok(declared) => rule_file.declared_types.push(declared),
                Err(err) => ctx.report(diagnostics, err),
            },
        }
    }

    debug!(
        "Parsed {}: {} rules, {} queries, {} functions, {} declared types",
        path,
        rule_file.rules.len(),
        rule_file.queries.len(),
        rule_file.functions.len(),
        rule_file.declared_types.len()
    );
    rule_file
}
