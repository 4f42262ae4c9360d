//! Dependency graph over a rule corpus.
//!
//! Nodes are rules keyed by `(name, package)`. Edges:
//! - `extends`: child -> parent, resolved by name (same package preferred).
//! - `depends_on`: A -> B when an action of B references a fact type that a
//!   condition of A references. Derived and possibly cyclic.
//! - `references`: rule -> fact type, kept per node in [`RuleRefs`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::DrlResult;
use crate::graph::refs::{collect_rule_refs, KnownNames, RuleRefs};
use crate::models::{simple_type_name, Global, Rule};
use crate::store::RuleRepository;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId {
    pub name: String,
    pub package: String,
}

impl RuleId {
    pub fn new(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
        }
    }

    pub fn of(rule: &Rule) -> Self {
        Self::new(rule.name.clone(), rule.package.clone())
    }

    /// Stable numeric id for exports: `crc32(package + "." + name) & 0x7FFFFFFF`.
    pub fn node_id(&self) -> i64 {
        let key = format!("{}.{}", self.package, self.name);
        (crc32fast::hash(key.as_bytes()) & 0x7FFF_FFFF) as i64
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.package)
    }
}

fn fact_type_node_id(fact_type: &str) -> i64 {
    (crc32fast::hash(format!("type:{fact_type}").as_bytes()) & 0x7FFF_FFFF) as i64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Extends,
    DependsOn,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from_rule: RuleId,
    pub to_rule: RuleId,
    pub kind: EdgeKind,
    /// Fact types that justify a `depends_on` edge. Empty for `extends`.
    pub shared_fact_types: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct RuleNode {
    pub id: RuleId,
    pub rule: Rule,
    pub refs: RuleRefs,
}

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<RuleNode>,
    index: HashMap<RuleId, usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    /// from -> to -> shared fact types (sorted).
    depends_on: Vec<BTreeMap<usize, Vec<String>>>,
    dependents: Vec<BTreeSet<usize>>,
    /// Rules whose conditions reference a fact type.
    readers: BTreeMap<String, Vec<usize>>,
}

impl DependencyGraph {
    /// Build from the repository contract.
    pub fn from_repository<R: RuleRepository + ?Sized>(repository: &R) -> DrlResult<Self> {
        let rules = repository.all_rules()?;
        let classes = repository.classes()?;
        let globals = repository.globals()?;
        Ok(Self::build(rules, classes, &globals))
    }

    pub fn build(rules: Vec<Rule>, classes: Vec<String>, globals: &[Global]) -> Self {
        let known = KnownNames::new(
            classes
                .into_iter()
                .chain(rules.iter().flat_map(|r| r.conditions.iter().map(|c| c.fact_type.clone()))),
            globals.iter().map(|g| g.name.clone()),
        );

        let mut graph = DependencyGraph::default();
        for rule in rules {
            let id = RuleId::of(&rule);
            if graph.index.contains_key(&id) {
                warn!("Duplicate rule {}; keeping the first definition", id);
                continue;
            }
            let refs = collect_rule_refs(&rule, &known);
            graph.index.insert(id.clone(), graph.nodes.len());
            graph.nodes.push(RuleNode { id, rule, refs });
        }

        let n = graph.nodes.len();
        graph.parent = vec![None; n];
        graph.children = vec![Vec::new(); n];
        graph.depends_on = vec![BTreeMap::new(); n];
        graph.dependents = vec![BTreeSet::new(); n];

        graph.link_extends();
        graph.link_depends_on();
        debug!(
            "Built dependency graph: {} rules, {} depends_on edges",
            n,
            graph.depends_on.iter().map(BTreeMap::len).sum::<usize>()
        );
        graph
    }

    fn link_extends(&mut self) {
        let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            by_name.entry(node.id.name.as_str()).or_default().push(idx);
        }
        let mut links = Vec::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            let Some(parent_name) = node.rule.extends.as_deref() else {
                continue;
            };
            let Some(candidates) = by_name.get(parent_name) else {
                debug!("Rule {} extends unknown rule '{}'", node.id, parent_name);
                continue;
            };
            let parent = candidates
                .iter()
                .copied()
                .find(|&c| c != idx && self.nodes[c].id.package == node.id.package)
                .or_else(|| candidates.iter().copied().find(|&c| c != idx));
            if let Some(parent) = parent {
                links.push((idx, parent));
            }
        }
        for (child, parent) in links {
            self.parent[child] = Some(parent);
            self.children[parent].push(child);
        }
    }

    fn link_depends_on(&mut self) {
        let mut writers: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        let mut readers: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            for fact_type in &node.refs.action_types {
                writers.entry(fact_type.as_str()).or_default().push(idx);
            }
            for fact_type in &node.refs.condition_types {
                readers.entry(fact_type.clone()).or_default().push(idx);
            }
        }

        let mut edges: Vec<(usize, usize, String)> = Vec::new();
        for (fact_type, reader_ids) in &readers {
            let Some(writer_ids) = writers.get(fact_type.as_str()) else {
                continue;
            };
            for &a in reader_ids {
                for &b in writer_ids {
                    if a != b {
                        edges.push((a, b, fact_type.clone()));
                    }
                }
            }
        }
        // `readers` iterates in sorted order, so shared types arrive sorted.
        for (a, b, fact_type) in edges {
            self.depends_on[a].entry(b).or_default().push(fact_type);
            self.dependents[b].insert(a);
        }
        self.readers = readers;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[RuleNode] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> &RuleNode {
        &self.nodes[idx]
    }

    pub fn index_of(&self, id: &RuleId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// First rule called `name`, optionally restricted to `package`.
    pub fn find(&self, name: &str, package: Option<&str>) -> Option<usize> {
        match package {
            Some(package) => self.index_of(&RuleId::new(name, package)),
            None => self.nodes.iter().position(|n| n.id.name == name),
        }
    }

    pub fn parent(&self, idx: usize) -> Option<usize> {
        self.parent[idx]
    }

    pub fn children(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }

    /// Rules `idx` depends on, with the fact types that link them.
    pub fn depends_on(&self, idx: usize) -> &BTreeMap<usize, Vec<String>> {
        &self.depends_on[idx]
    }

    /// Rules that depend on `idx`.
    pub fn dependents(&self, idx: usize) -> &BTreeSet<usize> {
        &self.dependents[idx]
    }

    pub fn has_depends_on(&self, from: usize, to: usize) -> bool {
        self.depends_on[from].contains_key(&to)
    }

    /// Rules with a condition on `fact_type` (compared by simple name).
    pub fn readers_of(&self, fact_type: &str) -> &[usize] {
        self.readers
            .get(simple_type_name(fact_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every fact type referenced by any rule.
    pub fn fact_types(&self) -> BTreeSet<&str> {
        self.nodes.iter().flat_map(|n| n.refs.all_types()).collect()
    }

    /// All `extends` edges followed by all `depends_on` edges.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges = Vec::new();
        for (child, parent) in self.parent.iter().enumerate() {
            if let Some(parent) = parent {
                edges.push(DependencyEdge {
                    from_rule: self.nodes[child].id.clone(),
                    to_rule: self.nodes[*parent].id.clone(),
                    kind: EdgeKind::Extends,
                    shared_fact_types: Vec::new(),
                });
            }
        }
        for (from, targets) in self.depends_on.iter().enumerate() {
            for (to, shared) in targets {
                edges.push(DependencyEdge {
                    from_rule: self.nodes[from].id.clone(),
                    to_rule: self.nodes[*to].id.clone(),
                    kind: EdgeKind::DependsOn,
                    shared_fact_types: shared.clone(),
                });
            }
        }
        edges
    }

    /// Flat node/edge lists with stable numeric ids, for visualization.
    pub fn export(&self) -> GraphExport {
        let mut export = GraphExport::default();
        for node in &self.nodes {
            export.nodes.push(ExportNode {
                id: node.id.node_id(),
                label: node.id.name.clone(),
                kind: "rule".to_string(),
                package: Some(node.id.package.clone()),
                salience: node.rule.salience,
            });
        }
        for fact_type in self.fact_types() {
            export.nodes.push(ExportNode {
                id: fact_type_node_id(fact_type),
                label: fact_type.to_string(),
                kind: "fact_type".to_string(),
                package: None,
                salience: None,
            });
        }
        for edge in self.edges() {
            export.edges.push(ExportEdge {
                source: edge.from_rule.node_id(),
                target: edge.to_rule.node_id(),
                relationship: match edge.kind {
                    EdgeKind::Extends => "extends",
                    EdgeKind::DependsOn => "depends_on",
                }
                .to_string(),
            });
        }
        for node in &self.nodes {
            for fact_type in node.refs.all_types() {
                export.edges.push(ExportEdge {
                    source: node.id.node_id(),
                    target: fact_type_node_id(fact_type),
                    relationship: "references".to_string(),
                });
            }
        }
        export
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: i64,
    pub label: String,
    pub kind: String,
    pub package: Option<String>,
    pub salience: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEdge {
    pub source: i64,
    pub target: i64,
    pub relationship: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::store::InMemoryRepository;

    fn graph(text: &str) -> DependencyGraph {
        let (file, _) = parse_source(text, "t.drl");
        DependencyGraph::from_repository(&InMemoryRepository::from_files([file])).unwrap()
    }

    #[test]
    fn test_extends_edge_child_to_base() {
        let g = graph(
            r#"package p;
rule "Base" salience 100
when
    $c : Customer()
then
    $c.touch();
end
rule "Child" extends "Base"
when
    $c : Customer(age > 18)
then
    $c.approve();
end
"#,
        );
        let child = g.find("Child", None).unwrap();
        let base = g.find("Base", Some("p")).unwrap();
        assert_eq!(g.node(child).rule.extends.as_deref(), Some("Base"));
        assert_eq!(g.parent(child), Some(base));
        assert_eq!(g.children(base), &[child]);
        let edges = g.edges();
        assert!(edges.iter().any(|e| e.kind == EdgeKind::Extends
            && e.from_rule == RuleId::new("Child", "p")
            && e.to_rule == RuleId::new("Base", "p")));
    }

    #[test]
    fn test_depends_on_follows_action_writes() {
        let g = graph(
            r#"package p;
rule "Reader" when $o : Order(total > 10) then System.out.println("x"); end
rule "Writer" when $c : Customer() then insert(new Order()); end
"#,
        );
        let reader = g.find("Reader", None).unwrap();
        let writer = g.find("Writer", None).unwrap();
        assert!(g.has_depends_on(reader, writer));
        assert!(!g.has_depends_on(writer, reader));
        assert_eq!(g.depends_on(reader)[&writer], vec!["Order".to_string()]);
        assert!(g.dependents(writer).contains(&reader));
        assert_eq!(g.readers_of("com.acme.Order"), &[reader]);
    }

    #[test]
    fn test_dangling_extends_and_duplicates() {
        let g = graph(
            r#"package p;
rule "A" extends "Missing" when then end
rule "A" when then end
"#,
        );
        assert_eq!(g.len(), 1);
        assert_eq!(g.parent(0), None);
        assert!(g.edges().is_empty());
    }

    #[test]
    fn test_export_ids_are_stable() {
        let id = RuleId::new("R", "p");
        assert_eq!(id.node_id(), RuleId::new("R", "p").node_id());
        assert!(id.node_id() >= 0);
        let g = graph("package p;\nrule \"R\" when Customer() then end\n");
        let export = g.export();
        assert_eq!(export.nodes.len(), 2);
        assert_eq!(export.edges.len(), 1);
        assert_eq!(export.edges[0].relationship, "references");
        assert_eq!(export.edges[0].source, id.node_id());
    }
}
