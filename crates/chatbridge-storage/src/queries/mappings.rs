// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message mapping operations.

use std::str::FromStr;

use chatbridge_cipher::Encryptor;
use chatbridge_core::types::{
    DeliveryStatus, IdentifierKind, MessageMapping, format_timestamp, normalize_chat_id,
    normalize_session,
};
use chatbridge_core::BridgeError;
use rusqlite::{OptionalExtension, Row, params};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::database::Database;
use crate::queries::{
    decode_err, decode_timestamp, retention_cutoff, seal, seal_for_lookup, seal_optional, unseal,
    unseal_optional,
};

macro_rules! select_mappings {
    ($tail:literal) => {
        concat!(
            "SELECT id, chat_id, source_msg_id, dest_msg_id, source_timestamp, forwarded_at,
                    delivery_status, media_path, session_name, media_type, created_at, updated_at
             FROM message_mappings ",
            $tail
        )
    };
}

const INSERT: &str = "INSERT INTO message_mappings (
        chat_id, chat_id_hash, source_msg_id, source_msg_id_hash, dest_msg_id, dest_msg_id_hash,
        source_timestamp, forwarded_at, delivery_status, media_path, session_name, media_type)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const BY_SOURCE: &str =
    select_mappings!("WHERE source_msg_id_hash = ?1 ORDER BY id DESC LIMIT 1");
const BY_DEST: &str = select_mappings!("WHERE dest_msg_id_hash = ?1 ORDER BY id DESC LIMIT 1");
const LATEST_BY_CHAT: &str =
    select_mappings!("WHERE chat_id_hash = ?1 ORDER BY forwarded_at DESC, id DESC LIMIT 1");
const LATEST_BY_SESSION: &str =
    select_mappings!("WHERE session_name = ?1 ORDER BY forwarded_at DESC, id DESC LIMIT 1");
const LATEST: &str = select_mappings!("ORDER BY forwarded_at DESC, id DESC LIMIT 1");
const LIST_BY_CHAT: &str =
    select_mappings!("WHERE chat_id_hash = ?1 ORDER BY forwarded_at DESC, id DESC LIMIT ?2");

const UPDATE_STATUS_BY_SOURCE: &str =
    "UPDATE message_mappings SET delivery_status = ?1 WHERE source_msg_id_hash = ?2";
const UPDATE_STATUS_BY_DEST: &str =
    "UPDATE message_mappings SET delivery_status = ?1 WHERE dest_msg_id_hash = ?2";

const HISTORY_EXISTS: &str = "SELECT EXISTS(
        SELECT 1 FROM message_mappings WHERE session_name = ?1 AND chat_id_hash = ?2)";

const DELETE_OLDER_THAN: &str = "DELETE FROM message_mappings WHERE created_at < ?1";

/// A mapping row exactly as stored.
#[derive(Debug, Clone)]
struct StoredMapping {
    id: i64,
    chat_id: String,
    source_msg_id: String,
    dest_msg_id: String,
    source_timestamp: String,
    forwarded_at: String,
    delivery_status: String,
    media_path: Option<String>,
    session_name: String,
    media_type: Option<String>,
    created_at: String,
    updated_at: String,
}

impl StoredMapping {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chat_id: row.get(1)?,
            source_msg_id: row.get(2)?,
            dest_msg_id: row.get(3)?,
            source_timestamp: row.get(4)?,
            forwarded_at: row.get(5)?,
            delivery_status: row.get(6)?,
            media_path: row.get(7)?,
            session_name: row.get(8)?,
            media_type: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn decrypt(self, enc: &Encryptor) -> Result<MessageMapping, BridgeError> {
        Ok(MessageMapping {
            id: self.id,
            chat_id: unseal(enc, "chat_id", &self.chat_id)?,
            source_msg_id: unseal(enc, "source_msg_id", &self.source_msg_id)?,
            dest_msg_id: unseal(enc, "dest_msg_id", &self.dest_msg_id)?,
            source_timestamp: decode_timestamp("source_timestamp", &self.source_timestamp)?,
            forwarded_at: decode_timestamp("forwarded_at", &self.forwarded_at)?,
            delivery_status: DeliveryStatus::from_str(&self.delivery_status)
                .map_err(|e| decode_err("delivery_status", e))?,
            media_path: unseal_optional(enc, "media_path", self.media_path.as_deref())?,
            session_name: self.session_name,
            media_type: self.media_type,
            created_at: Some(decode_timestamp("created_at", &self.created_at)?),
            updated_at: Some(decode_timestamp("updated_at", &self.updated_at)?),
        })
    }
}

/// Run a single-row mapping query and decrypt the result.
async fn fetch_one(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    label: &str,
    sql: &'static str,
    key: Option<String>,
) -> Result<Option<MessageMapping>, BridgeError> {
    let stored = db
        .call(cancel, label, move |conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let row = match key {
                Some(key) => stmt.query_row(params![key], StoredMapping::from_row),
                None => stmt.query_row([], StoredMapping::from_row),
            };
            row.optional()
        })
        .await?;
    stored.map(|s| s.decrypt(enc)).transpose()
}

/// Insert a new mapping. Returns the row id.
///
/// A blank session name is stored as the default session.
pub async fn save_message_mapping(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    mapping: &MessageMapping,
) -> Result<i64, BridgeError> {
    let session_name = normalize_session(&mapping.session_name).to_string();
    let values = (
        seal(enc, "chat_id", &mapping.chat_id)?,
        enc.lookup_hash(&mapping.chat_id),
        seal_for_lookup(enc, "source_msg_id", &mapping.source_msg_id)?,
        enc.lookup_hash(&mapping.source_msg_id),
        seal_for_lookup(enc, "dest_msg_id", &mapping.dest_msg_id)?,
        enc.lookup_hash(&mapping.dest_msg_id),
        format_timestamp(&mapping.source_timestamp),
        format_timestamp(&mapping.forwarded_at),
        mapping.delivery_status.to_string(),
        seal_optional(enc, "media_path", mapping.media_path.as_deref())?,
        session_name.clone(),
        mapping.media_type.clone(),
    );

    let id = db
        .call(cancel, "save message mapping", move |conn| {
            conn.prepare_cached(INSERT)?.execute(params![
                values.0, values.1, values.2, values.3, values.4, values.5, values.6, values.7,
                values.8, values.9, values.10, values.11,
            ])?;
            Ok(conn.last_insert_rowid())
        })
        .await?;

    debug!(id, session = %session_name, status = %mapping.delivery_status, "saved message mapping");
    Ok(id)
}

/// Look up the most recent mapping whose `kind` id equals `id`.
pub async fn get_message_mapping_by(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    kind: IdentifierKind,
    id: &str,
) -> Result<Option<MessageMapping>, BridgeError> {
    let sql = match kind {
        IdentifierKind::Source => BY_SOURCE,
        IdentifierKind::Dest => BY_DEST,
    };
    let label = format!("get message mapping by {kind} id");
    fetch_one(db, enc, cancel, &label, sql, Some(enc.lookup_hash(id))).await
}

/// Set the delivery status of every mapping whose `kind` id equals `id`.
pub async fn update_delivery_status_by(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    kind: IdentifierKind,
    id: &str,
    status: DeliveryStatus,
) -> Result<(), BridgeError> {
    let sql = match kind {
        IdentifierKind::Source => UPDATE_STATUS_BY_SOURCE,
        IdentifierKind::Dest => UPDATE_STATUS_BY_DEST,
    };
    let hash = enc.lookup_hash(id);
    let status_text = status.to_string();

    let updated = db
        .call(cancel, "update delivery status", move |conn| {
            conn.prepare_cached(sql)?.execute(params![status_text, hash])
        })
        .await?;

    if updated == 0 {
        return Err(BridgeError::NotFound(format!(
            "no message mapping with {kind} id {id}"
        )));
    }
    debug!(%kind, %status, rows = updated, "updated delivery status");
    Ok(())
}

/// Most recently forwarded mapping in `chat_id`.
pub async fn get_latest_message_mapping_by_chat_id(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    chat_id: &str,
) -> Result<Option<MessageMapping>, BridgeError> {
    let hash = enc.lookup_hash(chat_id);
    fetch_one(db, enc, cancel, "get latest mapping by chat", LATEST_BY_CHAT, Some(hash)).await
}

/// Most recently forwarded mapping in a session. Blank means the default session.
pub async fn get_latest_message_mapping_by_session(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    session_name: &str,
) -> Result<Option<MessageMapping>, BridgeError> {
    let session = normalize_session(session_name).to_string();
    fetch_one(
        db,
        enc,
        cancel,
        "get latest mapping by session",
        LATEST_BY_SESSION,
        Some(session),
    )
    .await
}

/// Most recently forwarded mapping overall.
pub async fn get_latest_message_mapping(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
) -> Result<Option<MessageMapping>, BridgeError> {
    fetch_one(db, enc, cancel, "get latest mapping", LATEST, None).await
}

/// Newest-first mappings for one chat, at most `limit`.
pub async fn list_message_mappings_by_chat(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    chat_id: &str,
    limit: u32,
) -> Result<Vec<MessageMapping>, BridgeError> {
    let hash = enc.lookup_hash(chat_id);
    let stored = db
        .call(cancel, "list mappings by chat", move |conn| {
            let mut stmt = conn.prepare_cached(LIST_BY_CHAT)?;
            let rows = stmt.query_map(params![hash, limit], StoredMapping::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await?;
    stored.into_iter().map(|s| s.decrypt(enc)).collect()
}

/// Whether `session_name` has relayed anything for `counterpart_id`.
///
/// The counterpart is normalized first, so a bare or `+`-prefixed phone
/// number matches mappings saved under `<number>@c.us`.
pub async fn has_message_history_between(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    session_name: &str,
    counterpart_id: &str,
) -> Result<bool, BridgeError> {
    let chat_id = normalize_chat_id(counterpart_id);
    if chat_id.is_empty() {
        return Ok(false);
    }
    let session = normalize_session(session_name).to_string();
    let hash = enc.lookup_hash(&chat_id);

    db.call(cancel, "check message history", move |conn| {
        conn.prepare_cached(HISTORY_EXISTS)?
            .query_row(params![session, hash], |row| row.get(0))
    })
    .await
}

/// Delete mappings created more than `retention_days` ago.
pub async fn cleanup_old_records(
    db: &Database,
    cancel: &CancellationToken,
    retention_days: u32,
) -> Result<usize, BridgeError> {
    let cutoff = retention_cutoff(retention_days);
    let deleted = db
        .call(cancel, "cleanup old message mappings", move |conn| {
            conn.execute(DELETE_OLDER_THAN, params![cutoff])
        })
        .await?;
    if deleted > 0 {
        info!(deleted, retention_days, "cleaned up old message mappings");
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup;
    use chatbridge_core::types::DEFAULT_SESSION;
    use chrono::{TimeDelta, Utc};

    fn mapping(chat: &str, source: &str, dest: &str) -> MessageMapping {
        MessageMapping::new(chat, source, dest, DeliveryStatus::Sent)
    }

    #[tokio::test]
    async fn save_and_fetch_by_either_id() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();

        let mut m = mapping("15551234567@c.us", "wa-1", "sig-1");
        m.media_path = Some("/media/photo.jpg".into());
        m.media_type = Some("image/jpeg".into());
        let id = save_message_mapping(&db, &enc, &cancel, &m).await.unwrap();
        assert!(id > 0);

        let by_source = get_message_mapping_by(&db, &enc, &cancel, IdentifierKind::Source, "wa-1")
            .await
            .unwrap()
            .unwrap();
        let by_dest = get_message_mapping_by(&db, &enc, &cancel, IdentifierKind::Dest, "sig-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_source.id, id);
        assert_eq!(by_dest.id, id);
        assert_eq!(by_source.chat_id, "15551234567@c.us");
        assert_eq!(by_source.media_path.as_deref(), Some("/media/photo.jpg"));
        assert_eq!(by_source.media_type.as_deref(), Some("image/jpeg"));
        assert_eq!(by_source.session_name, DEFAULT_SESSION);
        assert!(by_source.created_at.is_some());

        // Wrong side does not match.
        assert!(
            get_message_mapping_by(&db, &enc, &cancel, IdentifierKind::Dest, "wa-1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn identifiers_are_not_stored_in_plaintext() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        save_message_mapping(&db, &enc, &cancel, &mapping("15551234567@c.us", "wa-secret", "sig-secret"))
            .await
            .unwrap();

        let raw: (String, String, String) = db
            .connection()
            .call(|conn| -> Result<_, rusqlite::Error> {
                conn.query_row(
                    "SELECT chat_id, source_msg_id, dest_msg_id FROM message_mappings",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
            })
            .await
            .unwrap();
        assert!(!raw.0.contains("15551234567"));
        assert!(!raw.1.contains("wa-secret"));
        assert!(!raw.2.contains("sig-secret"));
    }

    #[tokio::test]
    async fn update_status_on_missing_row_is_not_found() {
        let (db, enc, _dir) = setup().await;
        let err = update_delivery_status_by(
            &db,
            &enc,
            &CancellationToken::new(),
            IdentifierKind::Source,
            "nope",
            DeliveryStatus::Read,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn status_update_refreshes_updated_at() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        save_message_mapping(&db, &enc, &cancel, &mapping("c-1", "wa-1", "sig-1"))
            .await
            .unwrap();
        let before = get_message_mapping_by(&db, &enc, &cancel, IdentifierKind::Source, "wa-1")
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        update_delivery_status_by(
            &db,
            &enc,
            &cancel,
            IdentifierKind::Dest,
            "sig-1",
            DeliveryStatus::Delivered,
        )
        .await
        .unwrap();

        let after = get_message_mapping_by(&db, &enc, &cancel, IdentifierKind::Source, "wa-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.delivery_status, DeliveryStatus::Delivered);
        assert!(after.updated_at.unwrap() > before.updated_at.unwrap());
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn latest_by_chat_prefers_newest_forward() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        let now = Utc::now();

        let mut older = mapping("chat@g.us", "wa-old", "sig-old");
        older.forwarded_at = now - TimeDelta::minutes(5);
        let mut newer = mapping("chat@g.us", "wa-new", "sig-new");
        newer.forwarded_at = now;
        // Insert newest first so row order does not decide.
        save_message_mapping(&db, &enc, &cancel, &newer).await.unwrap();
        save_message_mapping(&db, &enc, &cancel, &older).await.unwrap();

        let latest = get_latest_message_mapping_by_chat_id(&db, &enc, &cancel, "chat@g.us")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.source_msg_id, "wa-new");

        let listed = list_message_mappings_by_chat(&db, &enc, &cancel, "chat@g.us", 10)
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.source_msg_id.as_str()).collect();
        assert_eq!(ids, vec!["wa-new", "wa-old"]);

        let limited = list_message_mappings_by_chat(&db, &enc, &cancel, "chat@g.us", 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn history_check_normalizes_phone_numbers() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        let mut m = mapping("15551234567@c.us", "wa-1", "sig-1");
        m.session_name = "work".into();
        save_message_mapping(&db, &enc, &cancel, &m).await.unwrap();

        for counterpart in ["+15551234567", "15551234567", "15551234567@c.us"] {
            assert!(
                has_message_history_between(&db, &enc, &cancel, "work", counterpart)
                    .await
                    .unwrap(),
                "{counterpart} should match"
            );
        }
        assert!(!has_message_history_between(&db, &enc, &cancel, "personal", "+15551234567")
            .await
            .unwrap());
        assert!(!has_message_history_between(&db, &enc, &cancel, "work", "").await.unwrap());
    }

    #[tokio::test]
    async fn corrupted_ciphertext_surfaces_as_crypto_error() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        save_message_mapping(&db, &enc, &cancel, &mapping("c@c.us", "wa-1", "sig-1"))
            .await
            .unwrap();

        db.connection()
            .call(|conn| -> Result<_, rusqlite::Error> {
                conn.execute("UPDATE message_mappings SET chat_id = 'AAAAAAAAAAAAAAAAAAAAAAAAAAAA'", [])
            })
            .await
            .unwrap();

        let err = get_message_mapping_by(&db, &enc, &cancel, IdentifierKind::Source, "wa-1")
            .await
            .unwrap_err();
        assert!(err.is_crypto());
        assert!(err.to_string().contains("chat_id"));
    }
}
