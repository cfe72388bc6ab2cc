// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted SQLite persistence for the chatbridge message store.
//!
//! Provides WAL-mode SQLite storage with file-based migrations, a
//! single-writer connection via `tokio-rusqlite`, bounded retry for lock
//! contention, and field-level encryption for every identifier and piece
//! of message content.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;
pub mod retry;

pub use adapter::{SqliteBridgeStore, encryptor_from_config};
pub use database::{Database, DatabaseOptions};
pub use migrations::{MigrationReport, MigrationRunner};
pub use retry::{RetryPolicy, with_retry};

#[cfg(test)]
pub(crate) mod test_support {
    use chatbridge_cipher::{CipherSettings, Encryptor};
    use chatbridge_core::types::format_timestamp;
    use chrono::{TimeDelta, Utc};
    use secrecy::SecretString;
    use tempfile::TempDir;

    use crate::database::{Database, DatabaseOptions};

    pub const SECRET: &str = "0123456789abcdef0123456789abcdef";

    pub fn encryptor() -> Encryptor {
        let settings = CipherSettings {
            kdf_iterations: 1_000,
            ..CipherSettings::default()
        };
        Encryptor::new(&SecretString::from(SECRET.to_string()), &settings).unwrap()
    }

    pub async fn setup() -> (Database, Encryptor, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let options = DatabaseOptions::new(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations"));
        let db = Database::open(path.to_str().unwrap(), options).await.unwrap();
        (db, encryptor(), dir)
    }

    /// Backdate `column` of the row whose `key_column` is `key` by `days`.
    pub async fn age_rows(
        db: &Database,
        table: &str,
        column: &str,
        key_column: &str,
        key: &str,
        days: i64,
    ) {
        let sql = format!("UPDATE {table} SET {column} = ?1 WHERE {key_column} = ?2");
        let ts = format_timestamp(&(Utc::now() - TimeDelta::days(days)));
        let key = key.to_string();
        let updated = db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(&sql, rusqlite::params![ts, key])
            })
            .await
            .unwrap();
        assert_eq!(updated, 1);
    }
}
