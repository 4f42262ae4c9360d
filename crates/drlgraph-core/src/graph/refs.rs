//! Fact-type references made by rule conditions and actions.
//!
//! Fact types are identified by their simple (unqualified) name so that
//! `com.acme.Order` and an imported `Order` meet at the same node.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{simple_type_name, Action, Rule};

static NEW_INSTANCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bnew\s+([A-Za-z_][\w.]*)\s*\(").unwrap());
static WORKING_MEMORY_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:modify|update|retract|delete|insertLogical|insert)\s*\(\s*\$?([A-Za-z_]\w*)")
        .unwrap()
});

/// Where inside a rule a reference was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum RefSource {
    Condition(usize),
    Action(usize),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactTypeRef {
    pub source: RefSource,
    pub fact_type: String,
}

/// Everything a single rule references, split by side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleRefs {
    pub refs: Vec<FactTypeRef>,
    pub condition_types: BTreeSet<String>,
    pub action_types: BTreeSet<String>,
    /// Globals named as an action target.
    pub globals: BTreeSet<String>,
}

impl RuleRefs {
    /// Distinct fact types referenced from either side.
    pub fn all_types(&self) -> BTreeSet<&str> {
        self.condition_types
            .iter()
            .chain(self.action_types.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Names used to resolve action references.
#[derive(Clone, Debug, Default)]
pub struct KnownNames {
    pub fact_types: HashSet<String>,
    pub globals: HashSet<String>,
}

impl KnownNames {
    pub fn new(
        fact_types: impl IntoIterator<Item = String>,
        globals: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            fact_types: fact_types
                .into_iter()
                .map(|t| simple_type_name(&t).to_string())
                .collect(),
            globals: globals.into_iter().collect(),
        }
    }
}

fn receiver_root(target: &str) -> &str {
    let target = target.trim().trim_start_matches('$');
    let end = target
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(target.len());
    &target[..end]
}

/// Collect the references of one rule.
pub fn collect_rule_refs(rule: &Rule, known: &KnownNames) -> RuleRefs {
    let mut out = RuleRefs::default();
    let mut bindings: HashMap<&str, &str> = HashMap::new();

    for (index, condition) in rule.conditions.iter().enumerate() {
        let fact_type = simple_type_name(&condition.fact_type);
        if !condition.variable.is_empty() {
            bindings.insert(condition.variable.as_str(), fact_type);
        }
        out.condition_types.insert(fact_type.to_string());
        out.refs.push(FactTypeRef {
            source: RefSource::Condition(index),
            fact_type: fact_type.to_string(),
        });
    }

    for (index, action) in rule.actions.iter().enumerate() {
        let mut types = BTreeSet::new();
        action_types(action, &bindings, known, &mut types);
        let root = receiver_root(&action.target);
        if known.globals.contains(root) && !bindings.contains_key(root) {
            out.globals.insert(root.to_string());
        }
        for fact_type in types {
            out.action_types.insert(fact_type.clone());
            out.refs.push(FactTypeRef {
                source: RefSource::Action(index),
                fact_type,
            });
        }
    }
    out
}

fn action_types(
    action: &Action,
    bindings: &HashMap<&str, &str>,
    known: &KnownNames,
    types: &mut BTreeSet<String>,
) {
    let root = receiver_root(&action.target);
    if let Some(bound) = bindings.get(root) {
        types.insert((*bound).to_string());
    } else if known.fact_types.contains(root) {
        types.insert(root.to_string());
    }

    let texts = std::iter::once(action.target.as_str())
        .chain(action.arguments.iter().map(String::as_str));
    for text in texts {
        for caps in NEW_INSTANCE.captures_iter(text) {
            let name = simple_type_name(&caps[1]);
            if known.fact_types.contains(name) {
                types.insert(name.to_string());
            }
        }
        for caps in WORKING_MEMORY_CALL.captures_iter(text) {
            if let Some(bound) = bindings.get(&caps[1]) {
                types.insert((*bound).to_string());
            }
        }
    }
}
