//! SQLite schema DDL and migration framework for persisted rule corpora.

use rusqlite::Connection;

use crate::errors::DrlResult;

/// Current schema version. Migrations run from whatever the DB currently
/// reports up to this value.
pub const SCHEMA_VERSION: i32 = 3;

/// Core DDL statements: 12 CREATE TABLE + 6 CREATE INDEX.
///
/// Executed with `CREATE … IF NOT EXISTS` so they are safe to replay on an
/// already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // ── tables (12) ─────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS repo_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS rule_files (
        path TEXT PRIMARY KEY,
        package TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        parsed_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS imports (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL REFERENCES rule_files(path) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        package TEXT NOT NULL,
        class_name TEXT NOT NULL,
        UNIQUE(file_path, position)
    );",
    "CREATE TABLE IF NOT EXISTS globals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL REFERENCES rule_files(path) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        type TEXT NOT NULL,
        name TEXT NOT NULL,
        UNIQUE(file_path, position)
    );",
    "CREATE TABLE IF NOT EXISTS rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL REFERENCES rule_files(path) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        name TEXT NOT NULL,
        package TEXT NOT NULL,
        extends TEXT,
        salience INTEGER,
        attributes_json TEXT NOT NULL DEFAULT '{}',
        UNIQUE(file_path, position)
    );",
    "CREATE TABLE IF NOT EXISTS conditions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        rule_id INTEGER NOT NULL REFERENCES rules(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        variable TEXT NOT NULL,
        fact_type TEXT NOT NULL,
        simple_type TEXT NOT NULL,
        UNIQUE(rule_id, position)
    );",
    "CREATE TABLE IF NOT EXISTS constraints (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        condition_id INTEGER NOT NULL REFERENCES conditions(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        field TEXT NOT NULL,
        operator TEXT NOT NULL,
        value TEXT NOT NULL,
        UNIQUE(condition_id, position)
    );",
    "CREATE TABLE IF NOT EXISTS actions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        rule_id INTEGER NOT NULL REFERENCES rules(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        kind TEXT NOT NULL,
        target TEXT NOT NULL,
        method TEXT,
        arguments_json TEXT NOT NULL DEFAULT '[]',
        UNIQUE(rule_id, position)
    );",
    "CREATE TABLE IF NOT EXISTS queries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL REFERENCES rule_files(path) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        name TEXT NOT NULL,
        parameters_json TEXT NOT NULL DEFAULT '[]',
        conditions_json TEXT NOT NULL DEFAULT '[]',
        UNIQUE(file_path, position)
    );",
    "CREATE TABLE IF NOT EXISTS functions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL REFERENCES rule_files(path) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        return_type TEXT NOT NULL,
        name TEXT NOT NULL,
        parameters_json TEXT NOT NULL DEFAULT '[]',
        body TEXT NOT NULL,
        UNIQUE(file_path, position)
    );",
    "CREATE TABLE IF NOT EXISTS declared_types (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL REFERENCES rule_files(path) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        name TEXT NOT NULL,
        annotations_json TEXT NOT NULL DEFAULT '{}',
        fields_json TEXT NOT NULL DEFAULT '[]',
        UNIQUE(file_path, position)
    );",
    // ── indexes (6) ─────────────────────────────────────────────────────
    "CREATE INDEX IF NOT EXISTS idx_rules_name ON rules(name);",
    "CREATE INDEX IF NOT EXISTS idx_rules_package ON rules(package);",
    "CREATE INDEX IF NOT EXISTS idx_rules_file ON rules(file_path);",
    "CREATE INDEX IF NOT EXISTS idx_conditions_rule ON conditions(rule_id);",
    "CREATE INDEX IF NOT EXISTS idx_constraints_condition ON constraints(condition_id);",
    "CREATE INDEX IF NOT EXISTS idx_actions_rule ON actions(rule_id);",
];

// ─── Migration framework ────────────────────────────────────────────────────

/// Run all pending migrations from the current stored version up to
/// [`SCHEMA_VERSION`]. Each step is wrapped in a SAVEPOINT so a failure
/// rolls back only that single step.
pub fn migrate_schema(conn: &Connection) -> DrlResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < SCHEMA_VERSION {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT drlgraph_migrate_step;")?;

        let step_result = (|| -> DrlResult<()> {
            match next_version {
                1 => migrate_to_v1(conn)?,
                2 => migrate_to_v2(conn)?,
                3 => migrate_to_v3(conn)?,
                _ => {}
            }
            set_schema_version(conn, next_version)?;
            record_migration_step(conn, current_version, next_version, "success", None)?;
            conn.execute_batch("RELEASE SAVEPOINT drlgraph_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => {
                current_version = next_version;
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT drlgraph_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT drlgraph_migrate_step;");
                let _ = record_migration_step(
                    conn,
                    current_version,
                    next_version,
                    "failed",
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Read the current schema version from `repo_meta`.
/// Returns 0 when the key is absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM repo_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> DrlResult<()> {
    conn.execute(
        "INSERT INTO repo_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

fn record_migration_step(
    conn: &Connection,
    from_v: i32,
    to_v: i32,
    status: &str,
    error_msg: Option<&str>,
) -> DrlResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        rusqlite::params![from_v, to_v, status, error_msg],
    )?;
    Ok(())
}

// ─── Individual migration steps ─────────────────────────────────────────────

/// v0 -> v1: baseline.
fn migrate_to_v1(_conn: &Connection) -> DrlResult<()> {
    Ok(())
}

/// v1 -> v2: fact-type lookup index used by `rules_referencing`.
fn migrate_to_v2(conn: &Connection) -> DrlResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_conditions_simple_type ON conditions(simple_type);",
    )?;
    Ok(())
}

/// v2 -> v3: create `parse_diagnostics` table and indexes.
fn migrate_to_v3(conn: &Connection) -> DrlResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS parse_diagnostics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT,
            category TEXT NOT NULL,
            message TEXT NOT NULL,
            line_number INTEGER,
            rule_name TEXT,
            recoverable INTEGER NOT NULL DEFAULT 1,
            source_exception_kind TEXT NOT NULL,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_parse_diag_file ON parse_diagnostics(file_path, id);",
    )?;
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_parse_diag_category ON parse_diagnostics(category);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt).unwrap();
        }
        conn
    }

    #[test]
    fn schema_statement_counts() {
        assert_eq!(SCHEMA_STATEMENTS.len(), 18);
    }

    #[test]
    fn migrate_fresh_database() {
        let conn = fresh();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        let steps: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM migration_history WHERE status = 'success';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(steps, SCHEMA_VERSION as i64);
        conn.query_row("SELECT COUNT(*) FROM parse_diagnostics;", [], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap();
    }

    #[test]
    fn migrate_idempotent() {
        let conn = fresh();
        migrate_schema(&conn).unwrap();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }
}
