//! Error types for the drlgraph core library.
//!
//! Two layers: [`DrlError`] is fatal for the operation that produced it
//! (file I/O, decoding, storage), while [`ConstructError`] is scoped to a
//! single rule, query, function or declared type and is always degraded into
//! a [`Diagnostic`](crate::parser::diagnostics::Diagnostic) by the caller.

use std::path::PathBuf;

use crate::parser::diagnostics::DiagnosticCategory;

/// Top-level error enum for the drlgraph core library.
#[derive(Debug, thiserror::Error)]
pub enum DrlError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Permission denied when reading {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Failed to decode {} as UTF-8 and no fallback encoding is enabled", .0.display())]
    Decode(PathBuf),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DrlError {
    /// Short kind name recorded as `source_exception_kind` on file diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DrlError::FileNotFound(_) => "FileNotFound",
            DrlError::NotAFile(_) | DrlError::NotADirectory(_) => "FileParsingError",
            DrlError::PermissionDenied(_) => "PermissionDenied",
            DrlError::Decode(_) => "DecodeError",
            DrlError::RuleNotFound(_) => "RuleNotFound",
            DrlError::Config(_) => "ConfigError",
            DrlError::Pattern(_) => "PatternError",
            DrlError::Io(_) => "IoError",
            DrlError::Sqlite(_) => "SqliteError",
            DrlError::Json(_) => "JsonError",
        }
    }

    /// Map an I/O failure on `path` to the most specific file-level variant.
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => DrlError::FileNotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => DrlError::PermissionDenied(path.to_path_buf()),
            _ => DrlError::Io(err),
        }
    }
}

#[cfg(feature = "python")]
impl From<DrlError> for pyo3::PyErr {
    fn from(err: DrlError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
        match &err {
            DrlError::FileNotFound(_)
            | DrlError::NotAFile(_)
            | DrlError::NotADirectory(_)
            | DrlError::PermissionDenied(_)
            | DrlError::Io(_) => PyIOError::new_err(err.to_string()),
            DrlError::Decode(_)
            | DrlError::Config(_)
            | DrlError::Pattern(_)
            | DrlError::Json(_) => PyValueError::new_err(err.to_string()),
            DrlError::RuleNotFound(_) => PyKeyError::new_err(err.to_string()),
            DrlError::Sqlite(_) => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

pub type DrlResult<T> = Result<T, DrlError>;

/// Failure scoped to one construct. The enclosing loop records it and moves
/// on to the next sibling.
///
/// `Malformed*` variants mean a required marker or structure was absent;
/// the plain variants cover everything else that went wrong inside the
/// construct.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructError {
    #[error("{0}")]
    Rule(String),
    #[error("{0}")]
    MalformedRule(String),
    #[error("{0}")]
    Condition(String),
    #[error("{0}")]
    MalformedCondition(String),
    #[error("{0}")]
    Action(String),
    #[error("{0}")]
    MalformedAction(String),
    #[error("{0}")]
    Query(String),
    #[error("{0}")]
    MalformedQuery(String),
    #[error("{0}")]
    Function(String),
    #[error("{0}")]
    MalformedFunction(String),
    #[error("{0}")]
    DeclaredType(String),
    #[error("{0}")]
    MalformedDeclaredType(String),
}

impl ConstructError {
    pub fn category(&self) -> DiagnosticCategory {
        match self {
            ConstructError::Rule(_) | ConstructError::MalformedRule(_) => DiagnosticCategory::Rule,
            ConstructError::Condition(_) | ConstructError::MalformedCondition(_) => {
                DiagnosticCategory::Condition
            }
            ConstructError::Action(_) | ConstructError::MalformedAction(_) => {
                DiagnosticCategory::Action
            }
            ConstructError::Query(_) | ConstructError::MalformedQuery(_) => {
                DiagnosticCategory::Query
            }
            ConstructError::Function(_) | ConstructError::MalformedFunction(_) => {
                DiagnosticCategory::Function
            }
            ConstructError::DeclaredType(_) | ConstructError::MalformedDeclaredType(_) => {
                DiagnosticCategory::DeclaredType
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ConstructError::Rule(_) => "RuleError",
            ConstructError::MalformedRule(_) => "MalformedRule",
            ConstructError::Condition(_) => "ConditionError",
            ConstructError::MalformedCondition(_) => "MalformedCondition",
            ConstructError::Action(_) => "ActionError",
            ConstructError::MalformedAction(_) => "MalformedAction",
            ConstructError::Query(_) => "QueryError",
            ConstructError::MalformedQuery(_) => "MalformedQuery",
            ConstructError::Function(_) => "FunctionError",
            ConstructError::MalformedFunction(_) => "MalformedFunction",
            ConstructError::DeclaredType(_) => "DeclaredTypeError",
            ConstructError::MalformedDeclaredType(_) => "MalformedDeclaredType",
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.kind_name().starts_with("Malformed")
    }
}
