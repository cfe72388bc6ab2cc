// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::PathBuf;
use std::time::Duration;

use chatbridge_config::model::{BridgeConfig, StorageConfig};
use chatbridge_core::{BridgeError, StorageErrorKind};
use rusqlite::ErrorCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::migrations::{MigrationReport, MigrationRunner};
use crate::retry::{self, RetryPolicy};

/// Options for [`Database::open`].
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Directory of numbered `.sql` files applied on open.
    pub migrations_dir: PathBuf,
    pub wal_mode: bool,
    pub busy_timeout: Duration,
    /// Policy applied to every statement issued through [`Database::call`].
    pub retry: RetryPolicy,
}

impl DatabaseOptions {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            wal_mode: true,
            busy_timeout: Duration::from_millis(5_000),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        let StorageConfig {
            migrations_dir,
            wal_mode,
            busy_timeout_ms,
            ..
        } = &config.storage;
        Self {
            migrations_dir: PathBuf::from(migrations_dir),
            wal_mode: *wal_mode,
            busy_timeout: Duration::from_millis(*busy_timeout_ms),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

/// An open, migrated database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
    retry: RetryPolicy,
    migrations: MigrationReport,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply connection
    /// PRAGMAs, and run pending migrations.
    pub async fn open(path: &str, options: DatabaseOptions) -> Result<Self, BridgeError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| BridgeError::Storage {
                context: format!("create database directory {}", parent.display()),
                kind: StorageErrorKind::Io,
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| BridgeError::Storage {
                context: format!("open database {path}"),
                kind: StorageErrorKind::Io,
                source: Box::new(e),
            })?;

        let (wal_mode, busy_timeout) = (options.wal_mode, options.busy_timeout);
        call_raw(&conn, "configure connection", move |conn| {
            configure(conn, wal_mode, busy_timeout)
        })
        .await?;

        let runner = MigrationRunner::new(options.migrations_dir.clone());
        let migrations = conn
            .call(move |conn| Ok::<_, rusqlite::Error>(runner.apply_all(conn)))
            .await
            .map_err(|e| map_tr_err("run migrations", e))??;

        info!(
            path,
            applied = migrations.applied.len(),
            already_applied = migrations.skipped,
            "database opened"
        );

        Ok(Self {
            conn,
            retry: options.retry,
            migrations,
        })
    }

    /// Returns a reference to the underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// What the migration runner did when this handle was opened.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migrations
    }

    /// Run `f` on the connection thread under the configured retry policy.
    ///
    /// Engine errors are classified before the retry wrapper sees them, so
    /// only lock contention and transient I/O are attempted again. `f` may
    /// run more than once.
    pub async fn call<R, F>(
        &self,
        cancel: &CancellationToken,
        label: &str,
        f: F,
    ) -> Result<R, BridgeError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Clone + Send + 'static,
        R: Send + 'static,
    {
        retry::with_retry(cancel, &self.retry, label, || {
            let f = f.clone();
            async move { call_raw(&self.conn, label, f).await }
        })
        .await
    }

    /// Checkpoint the WAL and release the connection.
    pub async fn close(self) -> Result<(), BridgeError> {
        self.checkpoint().await?;
        self.conn
            .close()
            .await
            .map_err(|e| map_tr_err("close database", e))?;
        debug!("database closed");
        Ok(())
    }

    /// Fold the WAL back into the main database file.
    pub async fn checkpoint(&self) -> Result<(), BridgeError> {
        call_raw(&self.conn, "wal checkpoint", |conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
        })
        .await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

fn configure(
    conn: &mut rusqlite::Connection,
    wal_mode: bool,
    busy_timeout: Duration,
) -> rusqlite::Result<()> {
    let journal = if wal_mode { "WAL" } else { "DELETE" };
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", journal, |row| row.get(0))?;
    debug!(journal_mode = %mode, "journal mode set");
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// One attempt of `f` on the connection thread, with engine errors classified.
async fn call_raw<R, F>(
    conn: &tokio_rusqlite::Connection,
    label: &str,
    f: F,
) -> Result<R, BridgeError>
where
    F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
{
    conn.call(move |conn| Ok::<_, rusqlite::Error>(f(conn)))
        .await
        .map_err(|e| map_tr_err(label, e))?
        .map_err(|e| map_sqlite_err(label, e))
}

/// Wrap a failure of the connection thread itself (closed, panicked).
pub fn map_tr_err<E>(context: &str, e: tokio_rusqlite::Error<E>) -> BridgeError
where
    tokio_rusqlite::Error<E>: std::error::Error + Send + Sync + 'static,
{
    BridgeError::Storage {
        context: context.to_string(),
        kind: StorageErrorKind::Other,
        source: Box::new(e),
    }
}

/// Wrap an engine error, classifying it by result code.
pub fn map_sqlite_err(context: &str, e: rusqlite::Error) -> BridgeError {
    BridgeError::Storage {
        context: context.to_string(),
        kind: classify_sqlite_error(&e),
        source: Box::new(e),
    }
}

/// Map an engine error onto the coarse kinds the retry wrapper understands.
pub fn classify_sqlite_error(e: &rusqlite::Error) -> StorageErrorKind {
    let (code, message) = match e {
        rusqlite::Error::SqliteFailure(err, message) => {
            (err.code, message.as_deref().unwrap_or_default())
        }
        rusqlite::Error::SqlInputError { error, msg, .. } => (error.code, msg.as_str()),
        _ => return StorageErrorKind::Other,
    };
    match code {
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StorageErrorKind::Locked,
        ErrorCode::SystemIoFailure => StorageErrorKind::Io,
        ErrorCode::ConstraintViolation => StorageErrorKind::Constraint,
        _ if message.contains("no such table") || message.contains("no such column") => {
            StorageErrorKind::MissingSchema
        }
        _ if message.contains("database is locked") => StorageErrorKind::Locked,
        _ => StorageErrorKind::Other,
    }
}
