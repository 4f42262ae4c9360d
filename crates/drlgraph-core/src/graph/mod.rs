//! Rule dependency graph construction.

pub mod builder;
pub mod refs;

pub use builder::{DependencyEdge, DependencyGraph, EdgeKind, GraphExport, RuleId, RuleNode};
pub use refs::{FactTypeRef, RefSource, RuleRefs};
