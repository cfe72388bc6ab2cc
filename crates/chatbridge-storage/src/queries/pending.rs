// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable queue of Signal messages awaiting relay.
//!
//! Rows are keyed by `(message_id, destination)`. Queuing the same pair twice
//! keeps the first row and its retry count.

use chatbridge_cipher::Encryptor;
use chatbridge_core::types::PendingSignalMessage;
use chatbridge_core::BridgeError;
use rusqlite::{Row, params};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::database::Database;
use crate::queries::{
    decode_timestamp, seal, seal_for_lookup, seal_optional, unseal, unseal_optional,
};

const INSERT_OR_IGNORE: &str = "INSERT OR IGNORE INTO pending_signal_messages (
        message_id, message_id_hash, sender, message, group_id, timestamp, raw_json,
        destination, destination_hash)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const SELECT_BATCH: &str = "SELECT message_id, sender, message, group_id, timestamp, raw_json,
        destination, retry_count, created_at
     FROM pending_signal_messages
     ORDER BY created_at ASC, id ASC
     LIMIT ?1";

const DELETE_ONE: &str =
    "DELETE FROM pending_signal_messages WHERE message_id_hash = ?1 AND destination_hash = ?2";

const INCREMENT_RETRY: &str = "UPDATE pending_signal_messages SET retry_count = retry_count + 1
     WHERE message_id_hash = ?1 AND destination_hash = ?2";

const COUNT: &str = "SELECT COUNT(*) FROM pending_signal_messages";

const DELETE_EXHAUSTED: &str = "DELETE FROM pending_signal_messages WHERE retry_count >= ?1";

#[derive(Debug, Clone)]
struct StoredPending {
    message_id: String,
    sender: String,
    message: String,
    group_id: Option<String>,
    timestamp: i64,
    raw_json: String,
    destination: String,
    retry_count: u32,
    created_at: String,
}

impl StoredPending {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            message_id: row.get(0)?,
            sender: row.get(1)?,
            message: row.get(2)?,
            group_id: row.get(3)?,
            timestamp: row.get(4)?,
            raw_json: row.get(5)?,
            destination: row.get(6)?,
            retry_count: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn decrypt(self, enc: &Encryptor) -> Result<PendingSignalMessage, BridgeError> {
        Ok(PendingSignalMessage {
            message_id: unseal(enc, "message_id", &self.message_id)?,
            sender: unseal(enc, "sender", &self.sender)?,
            message: unseal(enc, "message", &self.message)?,
            group_id: unseal_optional(enc, "group_id", self.group_id.as_deref())?,
            timestamp: self.timestamp,
            raw_json: unseal(enc, "raw_json", &self.raw_json)?,
            destination: unseal(enc, "destination", &self.destination)?,
            retry_count: self.retry_count,
            created_at: Some(decode_timestamp("created_at", &self.created_at)?),
        })
    }
}

/// Queue a message. Returns false if `(message_id, destination)` was already queued.
pub async fn save_pending_signal_message(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    message: &PendingSignalMessage,
) -> Result<bool, BridgeError> {
    let values = (
        seal_for_lookup(enc, "message_id", &message.message_id)?,
        enc.lookup_hash(&message.message_id),
        seal(enc, "sender", &message.sender)?,
        seal(enc, "message", &message.message)?,
        seal_optional(enc, "group_id", message.group_id.as_deref())?,
        message.timestamp,
        seal(enc, "raw_json", &message.raw_json)?,
        seal_for_lookup(enc, "destination", &message.destination)?,
        enc.lookup_hash(&message.destination),
    );

    let inserted = db
        .call(cancel, "save pending signal message", move |conn| {
            conn.prepare_cached(INSERT_OR_IGNORE)?.execute(params![
                values.0, values.1, values.2, values.3, values.4, values.5, values.6, values.7,
                values.8,
            ])
        })
        .await?;

    debug!(inserted = inserted > 0, "queued pending signal message");
    Ok(inserted > 0)
}

/// Oldest-first batch of at most `limit` queued messages.
pub async fn get_pending_signal_messages(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    limit: u32,
) -> Result<Vec<PendingSignalMessage>, BridgeError> {
    let stored = db
        .call(cancel, "get pending signal messages", move |conn| {
            let mut stmt = conn.prepare_cached(SELECT_BATCH)?;
            let rows = stmt.query_map(params![limit], StoredPending::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await?;
    stored.into_iter().map(|s| s.decrypt(enc)).collect()
}

/// Remove a delivered message. Removing an absent message is not an error.
pub async fn delete_pending_signal_message(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    message_id: &str,
    destination: &str,
) -> Result<(), BridgeError> {
    let keys = (enc.lookup_hash(message_id), enc.lookup_hash(destination));
    let deleted = db
        .call(cancel, "delete pending signal message", move |conn| {
            conn.prepare_cached(DELETE_ONE)?
                .execute(params![keys.0, keys.1])
        })
        .await?;
    debug!(deleted, "deleted pending signal message");
    Ok(())
}

/// Record a failed delivery attempt.
///
/// Fails with [`BridgeError::NotFound`] if the message is not queued.
pub async fn increment_pending_signal_message_retry(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    message_id: &str,
    destination: &str,
) -> Result<(), BridgeError> {
    let keys = (enc.lookup_hash(message_id), enc.lookup_hash(destination));
    let updated = db
        .call(cancel, "increment pending retry", move |conn| {
            conn.prepare_cached(INCREMENT_RETRY)?
                .execute(params![keys.0, keys.1])
        })
        .await?;
    if updated == 0 {
        return Err(BridgeError::NotFound(format!(
            "no pending signal message {message_id} for that destination"
        )));
    }
    Ok(())
}

pub async fn count_pending_signal_messages(
    db: &Database,
    cancel: &CancellationToken,
) -> Result<i64, BridgeError> {
    db.call(cancel, "count pending signal messages", |conn| {
        conn.query_row(COUNT, [], |row| row.get(0))
    })
    .await
}

/// Drop messages that have failed `max_retries` times or more.
pub async fn purge_exhausted_pending_messages(
    db: &Database,
    cancel: &CancellationToken,
    max_retries: u32,
) -> Result<usize, BridgeError> {
    let purged = db
        .call(cancel, "purge exhausted pending messages", move |conn| {
            conn.execute(DELETE_EXHAUSTED, params![max_retries])
        })
        .await?;
    if purged > 0 {
        info!(purged, max_retries, "purged pending signal messages past retry limit");
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup;

    fn pending(id: &str, destination: &str) -> PendingSignalMessage {
        PendingSignalMessage {
            message_id: id.into(),
            sender: "+15550001111".into(),
            message: "hello from signal".into(),
            group_id: None,
            timestamp: 1_767_225_600_000,
            raw_json: r#"{"envelope":{}}"#.into(),
            destination: destination.into(),
            retry_count: 0,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_ignored() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        let msg = pending("sig-1", "1555@c.us");

        assert!(save_pending_signal_message(&db, &enc, &cancel, &msg).await.unwrap());
        increment_pending_signal_message_retry(&db, &enc, &cancel, "sig-1", "1555@c.us")
            .await
            .unwrap();
        assert!(!save_pending_signal_message(&db, &enc, &cancel, &msg).await.unwrap());

        let batch = get_pending_signal_messages(&db, &enc, &cancel, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].retry_count, 1);
        assert_eq!(batch[0].message, "hello from signal");
        assert_eq!(batch[0].raw_json, r#"{"envelope":{}}"#);
        assert!(batch[0].group_id.is_none());
    }

    #[tokio::test]
    async fn same_message_to_two_destinations_is_two_rows() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        let mut to_group = pending("sig-1", "g1@g.us");
        to_group.group_id = Some("signal-group".into());
        save_pending_signal_message(&db, &enc, &cancel, &pending("sig-1", "1555@c.us"))
            .await
            .unwrap();
        save_pending_signal_message(&db, &enc, &cancel, &to_group).await.unwrap();

        assert_eq!(count_pending_signal_messages(&db, &cancel).await.unwrap(), 2);

        delete_pending_signal_message(&db, &enc, &cancel, "sig-1", "1555@c.us")
            .await
            .unwrap();
        let rest = get_pending_signal_messages(&db, &enc, &cancel, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].destination, "g1@g.us");
        assert_eq!(rest[0].group_id.as_deref(), Some("signal-group"));

        // Deleting again is harmless.
        delete_pending_signal_message(&db, &enc, &cancel, "sig-1", "1555@c.us")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn batch_is_oldest_first_and_limited() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        for i in 0..5 {
            save_pending_signal_message(&db, &enc, &cancel, &pending(&format!("sig-{i}"), "d@c.us"))
                .await
                .unwrap();
        }
        let batch = get_pending_signal_messages(&db, &enc, &cancel, 3).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["sig-0", "sig-1", "sig-2"]);
    }

    #[tokio::test]
    async fn increment_unknown_message_is_not_found() {
        let (db, enc, _dir) = setup().await;
        let err = increment_pending_signal_message_retry(
            &db,
            &enc,
            &CancellationToken::new(),
            "ghost",
            "d@c.us",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn purge_removes_only_exhausted_rows() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        save_pending_signal_message(&db, &enc, &cancel, &pending("tired", "d@c.us"))
            .await
            .unwrap();
        save_pending_signal_message(&db, &enc, &cancel, &pending("fresh", "d@c.us"))
            .await
            .unwrap();
        for _ in 0..3 {
            increment_pending_signal_message_retry(&db, &enc, &cancel, "tired", "d@c.us")
                .await
                .unwrap();
        }

        assert_eq!(purge_exhausted_pending_messages(&db, &cancel, 3).await.unwrap(), 1);
        let rest = get_pending_signal_messages(&db, &enc, &cancel, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].message_id, "fresh");
    }
}
