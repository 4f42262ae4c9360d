//! Categorized, located parse diagnostics.
//!
//! A [`Diagnostics`] collector is owned by one unit of work (one file parse).
//! Collectors from parallel units are merged afterwards; the type is never
//! shared mutably across threads.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::errors::{ConstructError, DrlError};

/// Number of individual diagnostics echoed by [`Diagnostics::log_summary`].
const LOG_SUMMARY_DETAILS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCategory {
    File,
    Rule,
    Condition,
    Action,
    Query,
    Function,
    DeclaredType,
    Other,
}

impl DiagnosticCategory {
    pub const ALL: [DiagnosticCategory; 8] = [
        DiagnosticCategory::File,
        DiagnosticCategory::Rule,
        DiagnosticCategory::Condition,
        DiagnosticCategory::Action,
        DiagnosticCategory::Query,
        DiagnosticCategory::Function,
        DiagnosticCategory::DeclaredType,
        DiagnosticCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCategory::File => "file",
            DiagnosticCategory::Rule => "rule",
            DiagnosticCategory::Condition => "condition",
            DiagnosticCategory::Action => "action",
            DiagnosticCategory::Query => "query",
            DiagnosticCategory::Function => "function",
            DiagnosticCategory::DeclaredType => "declared_type",
            DiagnosticCategory::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Self {
        DiagnosticCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == raw)
            .unwrap_or(DiagnosticCategory::Other)
    }
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub message: String,
    pub file_path: Option<String>,
    pub line_number: Option<usize>,
    pub rule_name: Option<String>,
    pub recoverable: bool,
    pub source_exception_kind: String,
}

impl Diagnostic {
    pub fn new(category: DiagnosticCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            file_path: None,
            line_number: None,
            rule_name: None,
            recoverable: true,
            source_exception_kind: "ParseError".to_string(),
        }
    }

    /// Diagnostic for a construct-scoped failure. Always recoverable.
    pub fn from_construct(err: &ConstructError) -> Self {
        Self {
            source_exception_kind: err.kind_name().to_string(),
            ..Self::new(err.category(), err.to_string())
        }
    }

    /// Diagnostic for a fatal file-level failure, as recorded by directory
    /// parses that continue past a bad file.
    pub fn from_file_error(err: &DrlError, path: &str) -> Self {
        Self {
            file_path: Some(path.to_string()),
            recoverable: false,
            source_exception_kind: err.kind_name().to_string(),
            ..Self::new(DiagnosticCategory::File, err.to_string())
        }
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line_number = Some(line);
        self
    }

    pub fn with_rule(mut self, rule_name: impl Into<String>) -> Self {
        self.rule_name = Some(rule_name.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.source_exception_kind = kind.into();
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)?;
        if let Some(path) = &self.file_path {
            write!(f, " in {path}")?;
            if let Some(line) = self.line_number {
                write!(f, ":{line}")?;
            }
        }
        if let Some(rule) = &self.rule_name {
            write!(f, " (rule '{rule}')")?;
        }
        Ok(())
    }
}

/// Totals and the ordered list of everything recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticSummary {
    pub total: usize,
    /// Every category is present, including those with a zero count.
    pub counts: IndexMap<DiagnosticCategory, usize>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSummary {
    pub fn count(&self, category: DiagnosticCategory) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        if diagnostic.recoverable {
            warn!(
                category = diagnostic.category.as_str(),
                kind = %diagnostic.source_exception_kind,
                "{}",
                diagnostic
            );
        } else {
            error!(
                category = diagnostic.category.as_str(),
                kind = %diagnostic.source_exception_kind,
                "{}",
                diagnostic
            );
        }
        self.entries.push(diagnostic);
    }

    /// Record a construct failure, attaching location context.
    pub fn record_construct_error(
        &mut self,
        err: &ConstructError,
        file_path: &str,
        line_number: Option<usize>,
        rule_name: Option<&str>,
    ) {
        let mut diagnostic = Diagnostic::from_construct(err).with_file(file_path);
        diagnostic.line_number = line_number;
        diagnostic.rule_name = rule_name.map(str::to_string);
        self.record(diagnostic);
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Append everything another collector gathered, preserving its order.
    pub fn merge(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.entries.extend(diagnostics);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> DiagnosticSummary {
        summarize(&self.entries)
    }

    pub fn log_summary(&self) {
        if self.entries.is_empty() {
            info!("Parsing completed with no errors");
            return;
        }
        let summary = self.summary();
        warn!("Parsing completed with {} errors", summary.total);
        for (category, count) in &summary.counts {
            if *count > 0 {
                warn!("  {}: {}", category, count);
            }
        }
        for diagnostic in summary.diagnostics.iter().take(LOG_SUMMARY_DETAILS) {
            warn!("  - {}", diagnostic);
        }
        if summary.total > LOG_SUMMARY_DETAILS {
            warn!("  ... and {} more", summary.total - LOG_SUMMARY_DETAILS);
        }
    }
}

pub fn summarize(diagnostics: &[Diagnostic]) -> DiagnosticSummary {
    let mut counts: IndexMap<DiagnosticCategory, usize> =
        DiagnosticCategory::ALL.into_iter().map(|c| (c, 0)).collect();
    for diagnostic in diagnostics {
        *counts.entry(diagnostic.category).or_insert(0) += 1;
    }
    DiagnosticSummary {
        total: diagnostics.len(),
        counts,
        diagnostics: diagnostics.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_summary_counts_every_category() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record(Diagnostic::new(DiagnosticCategory::Rule, "bad rule"));
        diagnostics.record(Diagnostic::new(DiagnosticCategory::Rule, "another"));
        diagnostics.record(Diagnostic::new(DiagnosticCategory::Action, "bad action"));

        let summary = diagnostics.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.counts.len(), DiagnosticCategory::ALL.len());
        assert_eq!(summary.count(DiagnosticCategory::Rule), 2);
        assert_eq!(summary.count(DiagnosticCategory::Action), 1);
        assert_eq!(summary.count(DiagnosticCategory::File), 0);
        assert_eq!(summary.diagnostics[0].message, "bad rule");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record(Diagnostic::new(DiagnosticCategory::Other, "x"));
        diagnostics.reset();
        assert!(diagnostics.is_empty());
        assert_eq!(diagnostics.summary().total, 0);
    }

    #[test]
    fn test_merge_preserves_order() {
        let mut first = Diagnostics::new();
        first.record(Diagnostic::new(DiagnosticCategory::File, "a"));
        let mut second = Diagnostics::new();
        second.record(Diagnostic::new(DiagnosticCategory::Query, "b"));
        first.merge(second);
        let messages: Vec<&str> = first.entries().iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[test]
    fn test_construct_error_diagnostic_context() {
        let mut diagnostics = Diagnostics::new();
        let err = ConstructError::MalformedRule("Missing 'then' section".to_string());
        diagnostics.record_construct_error(&err, "rules.drl", Some(3), Some("R2"));
        let entry = &diagnostics.entries()[0];
        assert_eq!(entry.category, DiagnosticCategory::Rule);
        assert_eq!(entry.rule_name.as_deref(), Some("R2"));
        assert_eq!(entry.line_number, Some(3));
        assert_eq!(entry.source_exception_kind, "MalformedRule");
        assert!(entry.recoverable);
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&DiagnosticCategory::DeclaredType).unwrap();
        assert_eq!(json, "\"declared_type\"");
        assert_eq!(DiagnosticCategory::parse("declared_type"), DiagnosticCategory::DeclaredType);
        assert_eq!(DiagnosticCategory::parse("bogus"), DiagnosticCategory::Other);
    }
}
