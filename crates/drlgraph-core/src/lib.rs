//! drlgraph core library: a Drools rule-language (DRL) parser and a rule
//! dependency graph analysis engine.
//!
//! Parsing never aborts on malformed constructs; every problem becomes a
//! [`parser::diagnostics::Diagnostic`] next to a best-effort
//! [`models::RuleFile`]. Parsed files live in a [`store::RuleRepository`]
//! (in memory or SQLite) and [`analysis::AnalysisEngine`] answers structural
//! questions over them. Built with the `python` feature, the crate is also a
//! Python extension module (`drlgraph_core`).

pub mod analysis;
pub mod config;
pub mod errors;
pub mod graph;
pub mod models;
pub mod parser;
pub mod store;

#[cfg(feature = "python")]
mod python;

pub use analysis::AnalysisEngine;
pub use config::{AnalysisConfig, Config, ParserConfig};
pub use errors::{ConstructError, DrlError, DrlResult};
pub use graph::DependencyGraph;
pub use models::RuleFile;
pub use parser::{parse_source, DrlParser};
pub use store::{InMemoryRepository, RuleRepository, SqliteRepository};

// ---------------------------------------------------------------------------
// Top-level Python module: drlgraph_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pyo3::pymodule]
#[pyo3(name = "drlgraph_core")]
fn drlgraph_core_module(m: &pyo3::Bound<'_, pyo3::types::PyModule>) -> pyo3::PyResult<()> {
    python::register(m)
}
