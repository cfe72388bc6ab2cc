// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row counts and liveness checks.

use chatbridge_core::types::StoreStats;
use chatbridge_core::BridgeError;
use tokio_util::sync::CancellationToken;

use crate::database::Database;

const COUNTS: &str = r#"SELECT
        (SELECT COUNT(*) FROM message_mappings),
        (SELECT COUNT(*) FROM contacts),
        (SELECT COUNT(*) FROM "groups"),
        (SELECT COUNT(*) FROM pending_signal_messages),
        (SELECT COUNT(*) FROM schema_migrations)"#;

pub async fn stats(db: &Database, cancel: &CancellationToken) -> Result<StoreStats, BridgeError> {
    db.call(cancel, "collect stats", |conn| {
        conn.query_row(COUNTS, [], |row| {
            Ok(StoreStats {
                message_mappings: row.get(0)?,
                contacts: row.get(1)?,
                groups: row.get(2)?,
                pending_signal_messages: row.get(3)?,
                applied_migrations: row.get(4)?,
            })
        })
    })
    .await
}

/// Round-trip a trivial statement through the connection thread.
pub async fn ping(db: &Database, cancel: &CancellationToken) -> Result<(), BridgeError> {
    db.call(cancel, "health check", |conn| {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
    })
    .await
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup;

    #[tokio::test]
    async fn fresh_store_has_zero_rows_and_all_migrations() {
        let (db, _enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        let s = stats(&db, &cancel).await.unwrap();
        assert_eq!(s.message_mappings, 0);
        assert_eq!(s.pending_signal_messages, 0);
        assert_eq!(
            s.applied_migrations,
            db.migration_report().applied.len() as i64
        );
        ping(&db, &cancel).await.unwrap();
    }
}
