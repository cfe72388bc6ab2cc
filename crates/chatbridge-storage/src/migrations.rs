// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-based schema migrations.
//!
//! Every `*.sql` file in the migrations directory is applied once, in order
//! of the integer before the first underscore in its name (`010_x.sql` is
//! version 10). Files without a numeric prefix sort as version 0. Ties are
//! broken by filename. Each file runs in its own transaction together with
//! its row in `schema_migrations`, so a failing file leaves no trace and
//! the next run retries it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chatbridge_core::BridgeError;
use rusqlite::{Connection, params};
use tracing::{debug, info};

const CREATE_TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    filename TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
)";

/// A migration file discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: u64,
    pub filename: String,
    pub path: PathBuf,
}

/// Outcome of [`MigrationRunner::apply_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Filenames applied by this run, in order.
    pub applied: Vec<String>,
    /// Files that were already recorded as applied.
    pub skipped: usize,
}

/// Applies the `.sql` files of one directory.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    dir: PathBuf,
}

impl MigrationRunner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List migration files in application order.
    pub fn discover(&self) -> Result<Vec<MigrationFile>, BridgeError> {
        if !self.dir.is_dir() {
            return Err(BridgeError::MigrationDirectoryNotFound(self.dir.clone()));
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| BridgeError::Migration {
            file: self.dir.display().to_string(),
            source: Box::new(e),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BridgeError::Migration {
                file: self.dir.display().to_string(),
                source: Box::new(e),
            })?;
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "sql") {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            files.push(MigrationFile {
                version: migration_version(filename),
                filename: filename.to_string(),
                path,
            });
        }

        if files.is_empty() {
            return Err(BridgeError::NoMigrationsFound(self.dir.clone()));
        }

        files.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        Ok(files)
    }

    /// Apply every file not yet recorded in `schema_migrations`.
    ///
    /// Stops at the first failing file; files applied before it stay applied.
    pub fn apply_all(&self, conn: &mut Connection) -> Result<MigrationReport, BridgeError> {
        let files = self.discover()?;

        conn.execute(CREATE_TRACKING_TABLE, [])
            .map_err(|e| tracking_err(&self.dir, e))?;
        let applied = applied_filenames(conn).map_err(|e| tracking_err(&self.dir, e))?;

        let mut report = MigrationReport::default();
        for file in files {
            if applied.contains(&file.filename) {
                debug!(file = %file.filename, "migration already applied");
                report.skipped += 1;
                continue;
            }
            apply_one(conn, &file)?;
            info!(file = %file.filename, version = file.version, "applied migration");
            report.applied.push(file.filename);
        }
        Ok(report)
    }
}

/// Digits before the first underscore of `filename`, or 0 if the prefix is
/// anything other than plain ASCII digits.
pub fn migration_version(filename: &str) -> u64 {
    filename
        .split('_')
        .next()
        .filter(|prefix| !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|prefix| prefix.parse().ok())
        .unwrap_or(0)
}

/// Filenames recorded in `schema_migrations`.
pub fn applied_filenames(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT filename FROM schema_migrations")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

fn apply_one(conn: &mut Connection, file: &MigrationFile) -> Result<(), BridgeError> {
    let migration_err = |source: Box<dyn std::error::Error + Send + Sync>| BridgeError::Migration {
        file: file.filename.clone(),
        source,
    };

    let sql = std::fs::read_to_string(&file.path).map_err(|e| migration_err(Box::new(e)))?;

    let tx = conn.transaction().map_err(|e| migration_err(Box::new(e)))?;
    tx.execute_batch(&sql)
        .map_err(|e| migration_err(Box::new(e)))?;
    tx.execute(
        "INSERT INTO schema_migrations (filename) VALUES (?1)",
        params![file.filename],
    )
    .map_err(|e| migration_err(Box::new(e)))?;
    tx.commit().map_err(|e| migration_err(Box::new(e)))
}

fn tracking_err(dir: &Path, e: rusqlite::Error) -> BridgeError {
    BridgeError::Migration {
        file: format!("{} (schema_migrations)", dir.display()),
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, sql: &str) {
        std::fs::write(dir.join(name), sql).unwrap();
    }

    #[test]
    fn version_is_integer_prefix() {
        assert_eq!(migration_version("010_add_index.sql"), 10);
        assert_eq!(migration_version("1_init.sql"), 1);
        assert_eq!(migration_version("initial.sql"), 0);
        assert_eq!(migration_version("v2_thing.sql"), 0);
    }

    #[test]
    fn signed_prefixes_count_as_unnumbered() {
        assert_eq!(migration_version("-5_x.sql"), 0);
        assert_eq!(migration_version("+3_x.sql"), 0);
        assert_eq!(migration_version("_x.sql"), 0);
    }

    #[test]
    fn files_apply_in_numeric_order() {
        let dir = tempdir().unwrap();
        write(dir.path(), "010_x.sql", "INSERT INTO log (name) VALUES ('010_x');");
        write(dir.path(), "002_y.sql", "INSERT INTO log (name) VALUES ('002_y');");
        write(
            dir.path(),
            "1_z.sql",
            "CREATE TABLE log (seq INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);
             INSERT INTO log (name) VALUES ('1_z');",
        );
        write(dir.path(), "README.md", "not a migration");

        let mut conn = Connection::open_in_memory().unwrap();
        let report = MigrationRunner::new(dir.path()).apply_all(&mut conn).unwrap();
        assert_eq!(report.applied, vec!["1_z.sql", "002_y.sql", "010_x.sql"]);

        let order: Vec<String> = conn
            .prepare("SELECT name FROM log ORDER BY seq")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(order, vec!["1_z", "002_y", "010_x"]);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let dir = tempdir().unwrap();
        write(dir.path(), "001_init.sql", "CREATE TABLE t (id INTEGER);");

        let mut conn = Connection::open_in_memory().unwrap();
        let runner = MigrationRunner::new(dir.path());
        assert_eq!(runner.apply_all(&mut conn).unwrap().applied.len(), 1);

        let again = runner.apply_all(&mut conn).unwrap();
        assert!(again.applied.is_empty());
        assert_eq!(again.skipped, 1);
    }

    fn schema(conn: &Connection) -> Vec<(String, String, Option<String>)> {
        conn.prepare("SELECT type, name, sql FROM sqlite_master ORDER BY type, name")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn rerun_keeps_schema_and_one_tracking_row_per_file() {
        let dir = tempdir().unwrap();
        write(dir.path(), "001_init.sql", "CREATE TABLE a (id INTEGER);");
        write(dir.path(), "002_index.sql", "CREATE INDEX idx_a ON a(id);");
        write(dir.path(), "3_more.sql", "CREATE TABLE b (id INTEGER);");

        let mut conn = Connection::open_in_memory().unwrap();
        let runner = MigrationRunner::new(dir.path());
        runner.apply_all(&mut conn).unwrap();
        let first = schema(&conn);

        runner.apply_all(&mut conn).unwrap();
        assert_eq!(schema(&conn), first);

        let tracked: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tracked, 3);
    }

    #[test]
    fn failing_file_rolls_back_and_is_not_recorded() {
        let dir = tempdir().unwrap();
        write(dir.path(), "001_ok.sql", "CREATE TABLE ok (id INTEGER);");
        write(
            dir.path(),
            "002_bad.sql",
            "CREATE TABLE half (id INTEGER); THIS IS NOT SQL;",
        );

        let mut conn = Connection::open_in_memory().unwrap();
        let err = MigrationRunner::new(dir.path())
            .apply_all(&mut conn)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Migration { ref file, .. } if file == "002_bad.sql"));

        let applied = applied_filenames(&conn).unwrap();
        assert!(applied.contains("001_ok.sql"));
        assert!(!applied.contains("002_bad.sql"));

        let half_exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'half'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(half_exists, 0);
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = tempdir().unwrap();
        let err = MigrationRunner::new(dir.path().join("absent"))
            .discover()
            .unwrap_err();
        assert!(matches!(err, BridgeError::MigrationDirectoryNotFound(_)));
    }

    #[test]
    fn directory_without_sql_files_is_reported() {
        let dir = tempdir().unwrap();
        write(dir.path(), "notes.txt", "");
        let err = MigrationRunner::new(dir.path()).discover().unwrap_err();
        assert!(matches!(err, BridgeError::NoMigrationsFound(_)));
    }

    #[test]
    fn shipped_migrations_are_ordered() {
        let files = MigrationRunner::new(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations"))
            .discover()
            .unwrap();
        let versions: Vec<u64> = files.iter().map(|f| f.version).collect();
        let mut sorted = versions.clone();
        sorted.sort();
        assert_eq!(versions, sorted);
        assert_eq!(versions.first(), Some(&1));
    }
}
