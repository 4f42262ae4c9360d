//! Rule model repositories.
//!
//! [`RuleRepository`] is the read contract the analysis engine consumes.
//! Only [`RuleRepository::rule_files`] is required; the other lookups have
//! defaults built on it that storage backends may override with native
//! queries.

pub mod database;
pub mod memory;
pub mod schema;

use std::collections::BTreeSet;

use crate::errors::DrlResult;
use crate::models::{simple_type_name, Global, Rule, RuleFile};

pub use database::SqliteRepository;
pub use memory::InMemoryRepository;

pub trait RuleRepository {
    /// Every stored file, in repository order.
    fn rule_files(&self) -> DrlResult<Vec<RuleFile>>;

    /// Every rule, in file order then declaration order.
    fn all_rules(&self) -> DrlResult<Vec<Rule>> {
        Ok(self
            .rule_files()?
            .into_iter()
            .flat_map(|f| f.rules)
            .collect())
    }

    /// Look a rule up by name. Without a package the first rule with that
    /// name wins.
    fn rule_by_name(&self, name: &str, package: Option<&str>) -> DrlResult<Option<Rule>> {
        Ok(self
            .all_rules()?
            .into_iter()
            .find(|r| r.name == name && package.map_or(true, |p| r.package == p)))
    }

    /// Rules with at least one condition on `fact_type`, compared by simple
    /// name.
    fn rules_referencing(&self, fact_type: &str) -> DrlResult<Vec<Rule>> {
        let wanted = simple_type_name(fact_type);
        Ok(self
            .all_rules()?
            .into_iter()
            .filter(|r| {
                r.conditions
                    .iter()
                    .any(|c| simple_type_name(&c.fact_type) == wanted)
            })
            .collect())
    }

    /// Imported classes, declared types and condition fact types, as
    /// sorted distinct simple names.
    fn classes(&self) -> DrlResult<Vec<String>> {
        let mut names = BTreeSet::new();
        for file in self.rule_files()? {
            for import in &file.imports {
                if import.class_name != "*" {
                    names.insert(import.class_name.clone());
                }
            }
            for declared in &file.declared_types {
                names.insert(simple_type_name(&declared.name).to_string());
            }
            for rule in &file.rules {
                for condition in &rule.conditions {
                    names.insert(simple_type_name(&condition.fact_type).to_string());
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    fn globals(&self) -> DrlResult<Vec<Global>> {
        let mut seen = BTreeSet::new();
        let mut globals = Vec::new();
        for file in self.rule_files()? {
            for global in file.globals {
                if seen.insert((global.type_.clone(), global.name.clone())) {
                    globals.push(global);
                }
            }
        }
        Ok(globals)
    }

    /// Sorted distinct non-empty packages.
    fn packages(&self) -> DrlResult<Vec<String>> {
        let packages: BTreeSet<String> = self
            .rule_files()?
            .into_iter()
            .map(|f| f.package)
            .filter(|p| !p.is_empty())
            .collect();
        Ok(packages.into_iter().collect())
    }
}
