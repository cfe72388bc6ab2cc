// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group cache operations. Groups are scoped per session.

use chatbridge_cipher::Encryptor;
use chatbridge_core::types::{Group, normalize_session};
use chatbridge_core::BridgeError;
use rusqlite::{OptionalExtension, params};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::database::Database;
use crate::queries::{decode_timestamp, now, retention_cutoff, seal, seal_for_lookup, unseal};

const UPSERT: &str = r#"INSERT INTO "groups" (
        group_id, group_id_hash, subject, description, participant_count, session_name,
        cached_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
     ON CONFLICT(group_id_hash, session_name) DO UPDATE SET
        group_id = excluded.group_id,
        subject = excluded.subject,
        description = excluded.description,
        participant_count = excluded.participant_count,
        cached_at = excluded.cached_at,
        updated_at = excluded.updated_at"#;

const SELECT: &str = r#"SELECT group_id, subject, description, participant_count, session_name,
        cached_at, updated_at
     FROM "groups" WHERE group_id_hash = ?1 AND session_name = ?2"#;

const DELETE_OLDER_THAN: &str = r#"DELETE FROM "groups" WHERE cached_at < ?1"#;

type StoredGroup = (String, String, String, i64, String, String, String);

/// Insert the group, or replace the existing row for the same group and session.
pub async fn save_group(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    group: &Group,
) -> Result<(), BridgeError> {
    let session = normalize_session(&group.session_name).to_string();
    let values = (
        seal_for_lookup(enc, "group_id", &group.group_id)?,
        enc.lookup_hash(&group.group_id),
        seal(enc, "subject", &group.subject)?,
        seal(enc, "description", &group.description)?,
        group.participant_count,
        session.clone(),
        now(),
    );

    db.call(cancel, "save group", move |conn| {
        conn.prepare_cached(UPSERT)?.execute(params![
            values.0, values.1, values.2, values.3, values.4, values.5, values.6,
        ])
    })
    .await?;

    debug!(session = %session, participants = group.participant_count, "saved group");
    Ok(())
}

/// Cached metadata for `group_id` in one session. Blank means the default session.
pub async fn get_group(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    group_id: &str,
    session_name: &str,
) -> Result<Option<Group>, BridgeError> {
    let hash = enc.lookup_hash(group_id);
    let session = normalize_session(session_name).to_string();

    let stored: Option<StoredGroup> = db
        .call(cancel, "get group", move |conn| {
            conn.prepare_cached(SELECT)?
                .query_row(params![hash, session], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                })
                .optional()
        })
        .await?;

    let Some((group_id, subject, description, participant_count, session_name, cached, updated)) =
        stored
    else {
        return Ok(None);
    };

    Ok(Some(Group {
        group_id: unseal(enc, "group_id", &group_id)?,
        subject: unseal(enc, "subject", &subject)?,
        description: unseal(enc, "description", &description)?,
        participant_count,
        session_name,
        cached_at: Some(decode_timestamp("cached_at", &cached)?),
        updated_at: Some(decode_timestamp("updated_at", &updated)?),
    }))
}

/// Delete groups not refreshed in the last `retention_days`.
pub async fn cleanup_old_groups(
    db: &Database,
    cancel: &CancellationToken,
    retention_days: u32,
) -> Result<usize, BridgeError> {
    let cutoff = retention_cutoff(retention_days);
    let deleted = db
        .call(cancel, "cleanup old groups", move |conn| {
            conn.execute(DELETE_OLDER_THAN, params![cutoff])
        })
        .await?;
    if deleted > 0 {
        info!(deleted, retention_days, "cleaned up old groups");
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{age_rows, setup};

    fn group(id: &str, session: &str, subject: &str) -> Group {
        Group {
            group_id: id.into(),
            subject: subject.into(),
            description: "weekend plans".into(),
            participant_count: 4,
            session_name: session.into(),
            ..Group::default()
        }
    }

    #[tokio::test]
    async fn same_group_is_independent_per_session() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();

        save_group(&db, &enc, &cancel, &group("g1@g.us", "work", "Team"))
            .await
            .unwrap();
        save_group(&db, &enc, &cancel, &group("g1@g.us", "", "Family"))
            .await
            .unwrap();

        let work = get_group(&db, &enc, &cancel, "g1@g.us", "work").await.unwrap().unwrap();
        let default = get_group(&db, &enc, &cancel, "g1@g.us", "default")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(work.subject, "Team");
        assert_eq!(default.subject, "Family");
        assert_eq!(default.description, "weekend plans");
        assert!(get_group(&db, &enc, &cancel, "g1@g.us", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_replaces_within_session() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        save_group(&db, &enc, &cancel, &group("g1@g.us", "work", "Team")).await.unwrap();
        let mut renamed = group("g1@g.us", "work", "Team 2");
        renamed.participant_count = 9;
        save_group(&db, &enc, &cancel, &renamed).await.unwrap();

        let got = get_group(&db, &enc, &cancel, "g1@g.us", "work").await.unwrap().unwrap();
        assert_eq!(got.subject, "Team 2");
        assert_eq!(got.participant_count, 9);
    }

    #[tokio::test]
    async fn cleanup_uses_cached_at() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        save_group(&db, &enc, &cancel, &group("old@g.us", "", "Old")).await.unwrap();
        save_group(&db, &enc, &cancel, &group("new@g.us", "", "New")).await.unwrap();

        let old_hash = enc.lookup_hash("old@g.us");
        age_rows(&db, "\"groups\"", "cached_at", "group_id_hash", &old_hash, 30).await;

        assert_eq!(cleanup_old_groups(&db, &cancel, 7).await.unwrap(), 1);
        assert!(get_group(&db, &enc, &cancel, "new@g.us", "").await.unwrap().is_some());
    }
}
