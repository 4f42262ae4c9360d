//! SQLite storage layer for parsed rule corpora.
//!
//! Each public method opens its own connection so callers never manage
//! connection lifetime. A rule file is stored normalized (rules, conditions,
//! constraints and actions get their own rows) so fact-type lookups can be
//! answered by the database; queries, functions and declared types are kept
//! as JSON columns because nothing queries into them.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::errors::{DrlError, DrlResult};
use crate::models::{
    simple_type_name, Action, ActionKind, Condition, Constraint, DeclaredType, Function, Global,
    Import, Operator, Query, Rule, RuleFile,
};
use crate::parser::diagnostics::{summarize, Diagnostic, DiagnosticCategory, DiagnosticSummary};
use crate::store::{schema, RuleRepository};

// ---------------------------------------------------------------------------
// SqliteRepository
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct SqliteRepository {
    db_path: PathBuf,
}

impl SqliteRepository {
    /// Create a repository backed by `db_path`. Parent directories are
    /// created if they do not already exist. Call [`Self::init_schema`]
    /// before first use.
    pub fn new(db_path: impl AsRef<Path>) -> DrlResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DrlError::Io)?;
            }
        }
        Ok(Self { db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open a new connection with foreign keys enabled.
    fn connect(&self) -> DrlResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Enable WAL, create every table and index, then run migrations.
    pub fn init_schema(&self) -> DrlResult<()> {
        let conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        schema::migrate_schema(&conn)?;
        Ok(())
    }

    pub fn schema_version(&self) -> DrlResult<i32> {
        let conn = self.connect()?;
        Ok(schema::get_schema_version(&conn))
    }

    // -----------------------------------------------------------------------
    // Rule files
    // -----------------------------------------------------------------------

    /// Replace everything stored for `file.path` in a single transaction.
    ///
    /// Returns `false` without touching the database when the stored content
    /// hash already equals `content_hash`.
    pub fn replace_rule_file(&self, file: &RuleFile, content_hash: &str) -> DrlResult<bool> {
        let mut conn = self.connect()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM rule_files WHERE path = ?1;",
                params![file.path],
                |row| row.get(0),
            )
            .optional()?;
        if stored.as_deref() == Some(content_hash) {
            debug!("Skipping unchanged rule file {}", file.path);
            return Ok(false);
        }

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM rule_files WHERE path = ?1;", params![file.path])?;
        tx.execute(
            "INSERT INTO rule_files(path, package, content_hash) VALUES (?1, ?2, ?3);",
            params![file.path, file.package, content_hash],
        )?;
        insert_file_children(&tx, file)?;
        tx.commit()?;

        info!(
            "Stored {}: {} rules, {} queries, {} functions, {} declared types",
            file.path,
            file.rules.len(),
            file.queries.len(),
            file.functions.len(),
            file.declared_types.len()
        );
        Ok(true)
    }

    /// Delete a file, its children (by cascade) and its recorded diagnostics.
    /// Returns whether a file row existed.
    pub fn delete_rule_file(&self, path: &str) -> DrlResult<bool> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM rule_files WHERE path = ?1;", params![path])?;
        tx.execute(
            "DELETE FROM parse_diagnostics WHERE file_path = ?1;",
            params![path],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn load_rule_file(&self, path: &str) -> DrlResult<Option<RuleFile>> {
        let conn = self.connect()?;
        load_file(&conn, path)
    }

    /// Stored file paths in repository order. A replaced file moves to the
    /// end.
    pub fn file_paths(&self) -> DrlResult<Vec<String>> {
        let conn = self.connect()?;
        file_paths(&conn)
    }

    pub fn content_hash(&self, path: &str) -> DrlResult<Option<String>> {
        let conn = self.connect()?;
        let hash = conn
            .query_row(
                "SELECT content_hash FROM rule_files WHERE path = ?1;",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    // -----------------------------------------------------------------------
    // Parse diagnostics
    // -----------------------------------------------------------------------

    pub fn record_diagnostics(&self, diagnostics: &[Diagnostic]) -> DrlResult<usize> {
        if diagnostics.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO parse_diagnostics( \
                     file_path, category, message, line_number, rule_name, \
                     recoverable, source_exception_kind \
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            )?;
            for diag in diagnostics {
                stmt.execute(params![
                    diag.file_path,
                    diag.category.as_str(),
                    diag.message,
                    diag.line_number.map(|n| n as i64),
                    diag.rule_name,
                    diag.recoverable as i64,
                    diag.source_exception_kind,
                ])?;
            }
        }
        tx.commit()?;
        Ok(diagnostics.len())
    }

    /// Recorded diagnostics in insertion order, optionally for one file.
    pub fn list_diagnostics(&self, file_path: Option<&str>) -> DrlResult<Vec<Diagnostic>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT category, message, file_path, line_number, rule_name, \
                    recoverable, source_exception_kind \
             FROM parse_diagnostics \
             WHERE ?1 IS NULL OR file_path = ?1 \
             ORDER BY id;",
        )?;
        let rows = stmt
            .query_map(params![file_path], |row| {
                let category: String = row.get(0)?;
                let line: Option<i64> = row.get(3)?;
                let recoverable: i64 = row.get(5)?;
                Ok(Diagnostic {
                    category: DiagnosticCategory::parse(&category),
                    message: row.get(1)?,
                    file_path: row.get(2)?,
                    line_number: line.map(|n| n.max(0) as usize),
                    rule_name: row.get(4)?,
                    recoverable: recoverable != 0,
                    source_exception_kind: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn summarize_diagnostics(&self, file_path: Option<&str>) -> DrlResult<DiagnosticSummary> {
        Ok(summarize(&self.list_diagnostics(file_path)?))
    }

    pub fn clear_diagnostics(&self, file_path: Option<&str>) -> DrlResult<usize> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM parse_diagnostics WHERE ?1 IS NULL OR file_path = ?1;",
            params![file_path],
        )?;
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Backup
    // -----------------------------------------------------------------------

    /// Copy the database to `destination` using the SQLite backup API.
    pub fn backup_to(&self, destination: impl AsRef<Path>) -> DrlResult<PathBuf> {
        let destination = destination.as_ref().to_path_buf();
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DrlError::Io)?;
            }
        }
        let src_conn = self.connect()?;
        let mut dst_conn = Connection::open(&destination)?;
        let backup = rusqlite::backup::Backup::new(&src_conn, &mut dst_conn)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
        Ok(destination)
    }
}

impl RuleRepository for SqliteRepository {
    fn rule_files(&self) -> DrlResult<Vec<RuleFile>> {
        let conn = self.connect()?;
        let mut files = Vec::new();
        for path in file_paths(&conn)? {
            if let Some(file) = load_file(&conn, &path)? {
                files.push(file);
            }
        }
        Ok(files)
    }

    fn all_rules(&self) -> DrlResult<Vec<Rule>> {
        let conn = self.connect()?;
        let ids = rule_ids(
            &conn,
            "SELECT r.id FROM rules r JOIN rule_files f ON f.path = r.file_path \
             ORDER BY f.rowid, r.position;",
            params![],
        )?;
        load_rules(&conn, &ids)
    }

    fn rule_by_name(&self, name: &str, package: Option<&str>) -> DrlResult<Option<Rule>> {
        let conn = self.connect()?;
        let ids = rule_ids(
            &conn,
            "SELECT r.id FROM rules r JOIN rule_files f ON f.path = r.file_path \
             WHERE r.name = ?1 AND (?2 IS NULL OR r.package = ?2) \
             ORDER BY f.rowid, r.position LIMIT 1;",
            params![name, package],
        )?;
        Ok(load_rules(&conn, &ids)?.into_iter().next())
    }

    fn rules_referencing(&self, fact_type: &str) -> DrlResult<Vec<Rule>> {
        let conn = self.connect()?;
        let ids = rule_ids(
            &conn,
            "SELECT r.id FROM rules r JOIN rule_files f ON f.path = r.file_path \
             WHERE EXISTS (SELECT 1 FROM conditions c \
                           WHERE c.rule_id = r.id AND c.simple_type = ?1) \
             ORDER BY f.rowid, r.position;",
            params![simple_type_name(fact_type)],
        )?;
        load_rules(&conn, &ids)
    }

    fn packages(&self) -> DrlResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT package FROM rule_files WHERE package != '' ORDER BY package;",
        )?;
        let packages = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(packages)
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> DrlResult<String> {
    Ok(serde_json::to_string(value)?)
}

fn insert_file_children(conn: &Connection, file: &RuleFile) -> DrlResult<()> {
    for (pos, import) in file.imports.iter().enumerate() {
        conn.execute(
            "INSERT INTO imports(file_path, position, package, class_name) \
             VALUES (?1, ?2, ?3, ?4);",
            params![file.path, pos as i64, import.package, import.class_name],
        )?;
    }
    for (pos, global) in file.globals.iter().enumerate() {
        conn.execute(
            "INSERT INTO globals(file_path, position, type, name) VALUES (?1, ?2, ?3, ?4);",
            params![file.path, pos as i64, global.type_, global.name],
        )?;
    }
    for (pos, rule) in file.rules.iter().enumerate() {
        insert_rule(conn, &file.path, pos, rule)?;
    }
    for (pos, query) in file.queries.iter().enumerate() {
        conn.execute(
            "INSERT INTO queries(file_path, position, name, parameters_json, conditions_json) \
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                file.path,
                pos as i64,
                query.name,
                to_json(&query.parameters)?,
                to_json(&query.conditions)?,
            ],
        )?;
    }
    for (pos, function) in file.functions.iter().enumerate() {
        conn.execute(
            "INSERT INTO functions(file_path, position, return_type, name, parameters_json, body) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                file.path,
                pos as i64,
                function.return_type,
                function.name,
                to_json(&function.parameters)?,
                function.body,
            ],
        )?;
    }
    for (pos, declared) in file.declared_types.iter().enumerate() {
        conn.execute(
            "INSERT INTO declared_types(file_path, position, name, annotations_json, fields_json) \
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                file.path,
                pos as i64,
                declared.name,
                to_json(&declared.annotations)?,
                to_json(&declared.fields)?,
            ],
        )?;
    }
    Ok(())
}

fn insert_rule(conn: &Connection, file_path: &str, position: usize, rule: &Rule) -> DrlResult<()> {
    conn.execute(
        "INSERT INTO rules(file_path, position, name, package, extends, salience, attributes_json) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            file_path,
            position as i64,
            rule.name,
            rule.package,
            rule.extends,
            rule.salience,
            to_json(&rule.attributes)?,
        ],
    )?;
    let rule_id = conn.last_insert_rowid();

    for (pos, condition) in rule.conditions.iter().enumerate() {
        conn.execute(
            "INSERT INTO conditions(rule_id, position, variable, fact_type, simple_type) \
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                rule_id,
                pos as i64,
                condition.variable,
                condition.fact_type,
                simple_type_name(&condition.fact_type),
            ],
        )?;
        let condition_id = conn.last_insert_rowid();
        for (cpos, constraint) in condition.constraints.iter().enumerate() {
            conn.execute(
                "INSERT INTO constraints(condition_id, position, field, operator, value) \
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    condition_id,
                    cpos as i64,
                    constraint.field,
                    constraint.operator.as_str(),
                    constraint.value,
                ],
            )?;
        }
    }

    for (pos, action) in rule.actions.iter().enumerate() {
        conn.execute(
            "INSERT INTO actions(rule_id, position, kind, target, method, arguments_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                rule_id,
                pos as i64,
                action.kind.as_str(),
                action.target,
                action.method,
                to_json(&action.arguments)?,
            ],
        )?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

fn file_paths(conn: &Connection) -> DrlResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT path FROM rule_files ORDER BY rowid;")?;
    let paths = stmt
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(paths)
}

fn rule_ids(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> DrlResult<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(args, |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(ids)
}

fn load_file(conn: &Connection, path: &str) -> DrlResult<Option<RuleFile>> {
    let package: String = match conn.query_row(
        "SELECT package FROM rule_files WHERE path = ?1;",
        params![path],
        |row| row.get(0),
    ) {
        Ok(p) => p,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut file = RuleFile::new(path, package);

    let mut stmt = conn.prepare(
        "SELECT package, class_name FROM imports WHERE file_path = ?1 ORDER BY position;",
    )?;
    file.imports = stmt
        .query_map(params![path], |row| {
            Ok(Import {
                package: row.get(0)?,
                class_name: row.get(1)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    let mut stmt =
        conn.prepare("SELECT type, name FROM globals WHERE file_path = ?1 ORDER BY position;")?;
    file.globals = stmt
        .query_map(params![path], |row| {
            Ok(Global {
                type_: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    let ids = rule_ids(
        conn,
        "SELECT id FROM rules WHERE file_path = ?1 ORDER BY position;",
        params![path],
    )?;
    file.rules = load_rules(conn, &ids)?;

    let mut stmt = conn.prepare(
        "SELECT name, parameters_json, conditions_json FROM queries \
         WHERE file_path = ?1 ORDER BY position;",
    )?;
    let raw: Vec<(String, String, String)> = stmt
        .query_map(params![path], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .filter_map(|r| r.ok())
        .collect();
    for (name, params_json, conditions_json) in raw {
        file.queries.push(Query {
            name,
            parameters: serde_json::from_str(&params_json)?,
            conditions: serde_json::from_str(&conditions_json)?,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT return_type, name, parameters_json, body FROM functions \
         WHERE file_path = ?1 ORDER BY position;",
    )?;
    let raw: Vec<(String, String, String, String)> = stmt
        .query_map(params![path], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .filter_map(|r| r.ok())
        .collect();
    for (return_type, name, params_json, body) in raw {
        file.functions.push(Function {
            return_type,
            name,
            parameters: serde_json::from_str(&params_json)?,
            body,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT name, annotations_json, fields_json FROM declared_types \
         WHERE file_path = ?1 ORDER BY position;",
    )?;
    let raw: Vec<(String, String, String)> = stmt
        .query_map(params![path], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .filter_map(|r| r.ok())
        .collect();
    for (name, annotations_json, fields_json) in raw {
        file.declared_types.push(DeclaredType {
            name,
            annotations: serde_json::from_str(&annotations_json)?,
            fields: serde_json::from_str(&fields_json)?,
        });
    }

    Ok(Some(file))
}

fn load_rules(conn: &Connection, ids: &[i64]) -> DrlResult<Vec<Rule>> {
    let mut rule_stmt = conn.prepare(
        "SELECT name, package, extends, salience, attributes_json FROM rules WHERE id = ?1;",
    )?;
    let mut condition_stmt = conn.prepare(
        "SELECT id, variable, fact_type FROM conditions WHERE rule_id = ?1 ORDER BY position;",
    )?;
    let mut constraint_stmt = conn.prepare(
        "SELECT field, operator, value FROM constraints \
         WHERE condition_id = ?1 ORDER BY position;",
    )?;
    let mut action_stmt = conn.prepare(
        "SELECT kind, target, method, arguments_json FROM actions \
         WHERE rule_id = ?1 ORDER BY position;",
    )?;

    let mut rules = Vec::with_capacity(ids.len());
    for id in ids {
        let (name, package, extends, salience, attributes_json): (
            String,
            String,
            Option<String>,
            Option<i64>,
            String,
        ) = rule_stmt.query_row(params![id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?;
        let mut rule = Rule::new(name, package);
        rule.extends = extends;
        rule.salience = salience;
        rule.attributes = serde_json::from_str::<IndexMap<String, String>>(&attributes_json)?;

        let conditions: Vec<(i64, String, String)> = condition_stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .filter_map(|r| r.ok())
            .collect();
        for (condition_id, variable, fact_type) in conditions {
            let constraints = constraint_stmt
                .query_map(params![condition_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .filter_map(|r| r.ok())
                .filter_map(|(field, op, value)| {
                    Operator::parse(&op).map(|operator| Constraint {
                        field,
                        operator,
                        value,
                    })
                })
                .collect();
            rule.conditions.push(Condition {
                variable,
                fact_type,
                constraints,
            });
        }

        let actions: Vec<(String, String, Option<String>, String)> = action_stmt
            .query_map(params![id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        for (kind, target, method, arguments_json) in actions {
            rule.actions.push(Action {
                kind: ActionKind::parse(&kind).unwrap_or(ActionKind::Statement),
                target,
                method,
                arguments: serde_json::from_str(&arguments_json)?,
            });
        }
        rules.push(rule);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::store::InMemoryRepository;

    const SAMPLE: &str = r#"package com.acme.orders;
import com.acme.model.Order;
import com.acme.model.*;
global java.util.List alerts;

declare Audit
    @role(event)
    String message
end

query "open orders" (String region)
    $o : Order(status == "OPEN", region == region)
end

function String label(String prefix, int n) {
    return prefix + n;
}

rule "Flag Big" salience 10 no-loop
when
    $o : Order(total > 1000 && status == "NEW")
then
    $o.setFlag(true);
    alerts.add($o);
    modify($o) { setStatus("FLAGGED") }
end

rule "Child" extends "Flag Big"
when
    $o : com.acme.model.Order(status == "FLAGGED")
then
    count = count + 1;
end
"#;

    fn repo() -> (tempfile::TempDir, SqliteRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::new(dir.path().join("nested").join("rules.db")).unwrap();
        repo.init_schema().unwrap();
        (dir, repo)
    }

    #[test]
    fn test_init_schema_sets_version() {
        let (_dir, repo) = repo();
        assert_eq!(repo.schema_version().unwrap(), schema::SCHEMA_VERSION);
        repo.init_schema().unwrap();
        assert_eq!(repo.schema_version().unwrap(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_round_trip_matches_parsed_file() {
        let (_dir, repo) = repo();
        let (file, _) = parse_source(SAMPLE, "orders.drl");
        assert!(repo.replace_rule_file(&file, "h1").unwrap());
        let loaded = repo.load_rule_file("orders.drl").unwrap().unwrap();
        assert_eq!(loaded, file);
        assert!(repo.load_rule_file("missing.drl").unwrap().is_none());
    }

    #[test]
    fn test_unchanged_hash_is_skipped() {
        let (_dir, repo) = repo();
        let (file, _) = parse_source(SAMPLE, "orders.drl");
        assert!(repo.replace_rule_file(&file, "h1").unwrap());
        assert!(!repo.replace_rule_file(&file, "h1").unwrap());
        assert_eq!(repo.content_hash("orders.drl").unwrap().as_deref(), Some("h1"));

        let (smaller, _) = parse_source("package com.acme.orders;\n", "orders.drl");
        assert!(repo.replace_rule_file(&smaller, "h2").unwrap());
        assert!(repo.all_rules().unwrap().is_empty());
    }

    #[test]
    fn test_repository_contract_matches_in_memory() {
        let (_dir, repo) = repo();
        let (a, _) = parse_source(SAMPLE, "a.drl");
        let (b, _) = parse_source(
            "package com.acme.b;\nrule \"Child\" when $c : Customer() then $c.flag(); end\n",
            "b.drl",
        );
        repo.replace_rule_file(&a, "a").unwrap();
        repo.replace_rule_file(&b, "b").unwrap();
        let memory = InMemoryRepository::from_files([a, b]);

        assert_eq!(repo.rule_files().unwrap(), memory.rule_files().unwrap());
        assert_eq!(repo.all_rules().unwrap(), memory.all_rules().unwrap());
        assert_eq!(
            repo.rules_referencing("Order").unwrap(),
            memory.rules_referencing("Order").unwrap()
        );
        assert_eq!(
            repo.rule_by_name("Child", Some("com.acme.b")).unwrap(),
            memory.rule_by_name("Child", Some("com.acme.b")).unwrap()
        );
        assert_eq!(
            repo.rule_by_name("Child", None).unwrap().unwrap().package,
            "com.acme.orders"
        );
        assert_eq!(repo.classes().unwrap(), memory.classes().unwrap());
        assert_eq!(repo.packages().unwrap(), vec!["com.acme.b", "com.acme.orders"]);
    }

    #[test]
    fn test_replaced_file_moves_to_end() {
        let (_dir, repo) = repo();
        let (a, _) = parse_source("package a;\n", "a.drl");
        let (b, _) = parse_source("package b;\n", "b.drl");
        repo.replace_rule_file(&a, "1").unwrap();
        repo.replace_rule_file(&b, "1").unwrap();
        repo.replace_rule_file(&a, "2").unwrap();
        assert_eq!(repo.file_paths().unwrap(), vec!["b.drl", "a.drl"]);
        assert!(repo.delete_rule_file("b.drl").unwrap());
        assert!(!repo.delete_rule_file("b.drl").unwrap());
        assert_eq!(repo.file_paths().unwrap(), vec!["a.drl"]);
    }

    #[test]
    fn test_diagnostics_persisted_and_summarized() {
        let (_dir, repo) = repo();
        let (_, diagnostics) = parse_source(
            "package p;\nrule \"R2\" when $c: Customer() end\n",
            "bad.drl",
        );
        assert_eq!(repo.record_diagnostics(&diagnostics).unwrap(), diagnostics.len());
        let extra = Diagnostic::new(DiagnosticCategory::Other, "elsewhere").with_file("other.drl");
        repo.record_diagnostics(std::slice::from_ref(&extra)).unwrap();

        assert_eq!(repo.list_diagnostics(Some("bad.drl")).unwrap(), diagnostics);
        let summary = repo.summarize_diagnostics(None).unwrap();
        assert_eq!(summary.total, diagnostics.len() + 1);
        assert_eq!(summary.count(DiagnosticCategory::Other), 1);

        assert_eq!(repo.clear_diagnostics(Some("other.drl")).unwrap(), 1);
        assert_eq!(repo.list_diagnostics(None).unwrap().len(), diagnostics.len());
    }

    #[test]
    fn test_backup_copies_rules() {
        let (dir, repo) = repo();
        let (file, _) = parse_source(SAMPLE, "orders.drl");
        repo.replace_rule_file(&file, "h").unwrap();
        let copy_path = repo.backup_to(dir.path().join("backup").join("copy.db")).unwrap();
        let copy = SqliteRepository::new(copy_path).unwrap();
        assert_eq!(copy.all_rules().unwrap().len(), 2);
    }
}
