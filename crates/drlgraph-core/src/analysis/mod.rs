//! Structural analyses over a rule corpus.
//!
//! [`AnalysisEngine`] wraps any [`RuleRepository`], builds the
//! [`DependencyGraph`] on first use and caches it until
//! [`AnalysisEngine::invalidate`] is called. Every analysis is also available
//! as a free function over a graph.

pub mod complexity;
pub mod conflicts;
pub mod cycles;
pub mod dependencies;
pub mod execution_order;
pub mod patterns;
pub mod unused;

use std::sync::Arc;

use parking_lot::Mutex;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::errors::DrlResult;
use crate::graph::{DependencyGraph, GraphExport, RuleId};
use crate::models::{simple_type_name, Rule};
use crate::store::RuleRepository;

pub use complexity::RuleComplexity;
pub use conflicts::{ConflictType, RuleConflict};
pub use cycles::{CircularDependency, DependencyCycle};
pub use dependencies::RuleDependencies;
pub use execution_order::{ExecutionEntry, ExecutionStatus, RuleType};
pub use patterns::{PatternMatch, RulePatterns};
pub use unused::UnusedRule;

/// A rule identity as it appears in analysis output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleRef {
    pub name: String,
    pub package: String,
}

impl From<&RuleId> for RuleRef {
    fn from(id: &RuleId) -> Self {
        Self {
            name: id.name.clone(),
            package: id.package.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub name: String,
    pub package: String,
    pub salience: Option<i64>,
}

impl From<&Rule> for RuleSummary {
    fn from(rule: &Rule) -> Self {
        Self {
            name: rule.name.clone(),
            package: rule.package.clone(),
            salience: rule.salience,
        }
    }
}

pub(crate) fn rule_ref(graph: &DependencyGraph, idx: usize) -> RuleRef {
    RuleRef::from(&graph.node(idx).id)
}

// ---------------------------------------------------------------------------
// AnalysisEngine
// ---------------------------------------------------------------------------

pub struct AnalysisEngine<R: RuleRepository> {
    repository: R,
    config: AnalysisConfig,
    graph: Mutex<Option<Arc<DependencyGraph>>>,
}

impl<R: RuleRepository> AnalysisEngine<R> {
    pub fn new(repository: R, config: AnalysisConfig) -> Self {
        Self {
            repository,
            config,
            graph: Mutex::new(None),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Mutable access drops the cached graph.
    pub fn repository_mut(&mut self) -> &mut R {
        self.invalidate();
        &mut self.repository
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The dependency graph, built on first use.
    pub fn graph(&self) -> DrlResult<Arc<DependencyGraph>> {
        let mut cached = self.graph.lock();
        if let Some(graph) = cached.as_ref() {
            return Ok(Arc::clone(graph));
        }
        let graph = Arc::new(DependencyGraph::from_repository(&self.repository)?);
        debug!("Cached dependency graph with {} rules", graph.len());
        *cached = Some(Arc::clone(&graph));
        Ok(graph)
    }

    pub fn invalidate(&self) {
        *self.graph.lock() = None;
    }

    pub fn export_graph(&self) -> DrlResult<GraphExport> {
        Ok(self.graph()?.export())
    }

    // -- lookups -------------------------------------------------------------

    /// Rules whose whole name matches `pattern`, case-insensitively, sorted
    /// by name.
    pub fn find_rules_by_name(&self, pattern: &str) -> DrlResult<Vec<RuleSummary>> {
        let regex = RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(true)
            .build()?;
        let mut rules: Vec<RuleSummary> = self
            .repository
            .all_rules()?
            .iter()
            .filter(|r| regex.is_match(&r.name))
            .map(RuleSummary::from)
            .collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.package.cmp(&b.package)));
        Ok(rules)
    }

    pub fn find_rule(&self, name: &str, package: Option<&str>) -> DrlResult<Option<Rule>> {
        self.repository.rule_by_name(name, package)
    }

    /// Rules referencing `fact_type` from a condition or an action.
    pub fn find_rules_by_class_reference(&self, fact_type: &str) -> DrlResult<Vec<RuleSummary>> {
        let wanted = simple_type_name(fact_type);
        let graph = self.graph()?;
        Ok(graph
            .nodes()
            .iter()
            .filter(|n| n.refs.all_types().contains(wanted))
            .map(|n| RuleSummary::from(&n.rule))
            .collect())
    }

    /// Every rule, sorted by package then name.
    pub fn all_rules(&self) -> DrlResult<Vec<RuleSummary>> {
        let mut rules: Vec<RuleSummary> = self
            .repository
            .all_rules()?
            .iter()
            .map(RuleSummary::from)
            .collect();
        rules.sort_by(|a, b| a.package.cmp(&b.package).then_with(|| a.name.cmp(&b.name)));
        Ok(rules)
    }

    pub fn rules_by_package(&self, package: &str) -> DrlResult<Vec<RuleSummary>> {
        let mut rules: Vec<RuleSummary> = self
            .repository
            .all_rules()?
            .iter()
            .filter(|r| r.package == package)
            .map(RuleSummary::from)
            .collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rules)
    }

    pub fn all_packages(&self) -> DrlResult<Vec<String>> {
        self.repository.packages()
    }

    pub fn all_classes(&self) -> DrlResult<Vec<String>> {
        self.repository.classes()
    }

    // -- analyses ------------------------------------------------------------

    pub fn find_rule_dependencies(
        &self,
        name: &str,
        package: Option<&str>,
    ) -> DrlResult<RuleDependencies> {
        dependencies::find_rule_dependencies(&*self.graph()?, name, package)
    }

    pub fn find_unused_rules(&self) -> DrlResult<Vec<UnusedRule>> {
        Ok(unused::find_unused_rules(&*self.graph()?))
    }

    pub fn find_circular_dependencies(&self) -> DrlResult<Vec<CircularDependency>> {
        Ok(cycles::find_circular_dependencies(&*self.graph()?))
    }

    pub fn find_dependency_cycles(&self) -> DrlResult<Vec<DependencyCycle>> {
        Ok(cycles::find_dependency_cycles(&*self.graph()?))
    }

    /// Uses the configured threshold when `threshold` is `None`.
    pub fn find_complex_rules(&self, threshold: Option<usize>) -> DrlResult<Vec<RuleComplexity>> {
        let threshold = threshold.unwrap_or(self.config.complexity_threshold);
        Ok(complexity::find_complex_rules(&*self.graph()?, threshold))
    }

    pub fn find_conflicting_rules(&self) -> DrlResult<Vec<RuleConflict>> {
        Ok(conflicts::find_conflicting_rules(&*self.graph()?, &self.config))
    }

    pub fn analyze_execution_order(
        &self,
        rule_names: Option<&[String]>,
    ) -> DrlResult<Vec<ExecutionEntry>> {
        Ok(execution_order::analyze_execution_order(
            &*self.graph()?,
            rule_names,
            &self.config,
        ))
    }

    pub fn find_rule_patterns(&self) -> DrlResult<RulePatterns> {
        Ok(patterns::find_rule_patterns(&*self.graph()?, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DrlError;
    use crate::parser::parse_source;
    use crate::store::InMemoryRepository;

    const CORPUS: &str = r#"package com.acme;
import com.acme.model.Order;

rule "Validate Order" salience 60
when
    $o : Order(status == "NEW")
then
    $o.setValid(true);
end

rule "Ship Order"
when
    $c : Customer(vip == true)
    $o : Order(valid == true)
then
    System.out.println("ship");
end
"#;

    fn engine() -> AnalysisEngine<InMemoryRepository> {
        let (file, _) = parse_source(CORPUS, "orders.drl");
        AnalysisEngine::new(
            InMemoryRepository::from_files([file]),
            AnalysisConfig::default(),
        )
    }

    #[test]
    fn test_graph_is_cached_until_invalidated() {
        let mut engine = engine();
        let first = engine.graph().unwrap();
        let second = engine.graph().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let (extra, _) = parse_source(
            "package other;\nrule \"Extra\" when Order() then end\n",
            "other.drl",
        );
        engine.repository_mut().upsert_file(extra);
        let rebuilt = engine.graph().unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.len(), 3);
    }

    #[test]
    fn test_find_rules_by_name_is_case_insensitive_full_match() {
        let engine = engine();
        let names: Vec<String> = engine
            .find_rules_by_name(".*order")
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Ship Order", "Validate Order"]);
        assert!(engine.find_rules_by_name("ship").unwrap().is_empty());
        assert!(matches!(
            engine.find_rules_by_name("("),
            Err(DrlError::Pattern(_))
        ));
    }

    #[test]
    fn test_lookups() {
        let engine = engine();
        assert_eq!(engine.find_rules_by_class_reference("Customer").unwrap().len(), 1);
        assert_eq!(
            engine
                .find_rules_by_class_reference("com.acme.model.Order")
                .unwrap()
                .len(),
            2
        );
        assert_eq!(engine.rules_by_package("com.acme").unwrap().len(), 2);
        assert!(engine.rules_by_package("none").unwrap().is_empty());
        assert_eq!(engine.all_packages().unwrap(), vec!["com.acme"]);
        assert_eq!(engine.all_classes().unwrap(), vec!["Customer", "Order"]);
        assert_eq!(
            engine.find_rule("Ship Order", None).unwrap().unwrap().conditions.len(),
            2
        );
        assert_eq!(engine.all_rules().unwrap()[0].name, "Ship Order");
    }

    #[test]
    fn test_engine_runs_every_analysis() {
        let engine = engine();
        let deps = engine.find_rule_dependencies("Ship Order", None).unwrap();
        assert_eq!(deps.depends_on[0].name, "Validate Order");
        let unused = engine.find_unused_rules().unwrap();
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].name, "Ship Order");
        assert!(engine.find_dependency_cycles().unwrap().is_empty());
        assert_eq!(engine.find_complex_rules(Some(1)).unwrap().len(), 2);
        let order = engine.analyze_execution_order(None).unwrap();
        assert_eq!(order[0].name, "Validate Order");
        assert_eq!(
            engine.find_rule_patterns().unwrap().high_salience_rules.len(),
            1
        );
        assert!(!engine.export_graph().unwrap().nodes.is_empty());
    }
}
