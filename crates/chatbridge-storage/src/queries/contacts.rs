// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact cache operations.

use chatbridge_cipher::Encryptor;
use chatbridge_core::types::Contact;
use chatbridge_core::BridgeError;
use rusqlite::{OptionalExtension, Row, params};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::database::Database;
use crate::queries::{decode_timestamp, now, retention_cutoff, seal, seal_for_lookup, unseal};

const UPSERT: &str = "INSERT INTO contacts (
        contact_id, contact_id_hash, phone_number, phone_hash, name, push_name, short_name,
        is_blocked, is_group, is_my_contact, cached_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
     ON CONFLICT(contact_id_hash) DO UPDATE SET
        contact_id = excluded.contact_id,
        phone_number = excluded.phone_number,
        phone_hash = excluded.phone_hash,
        name = excluded.name,
        push_name = excluded.push_name,
        short_name = excluded.short_name,
        is_blocked = excluded.is_blocked,
        is_group = excluded.is_group,
        is_my_contact = excluded.is_my_contact,
        cached_at = excluded.cached_at,
        updated_at = excluded.updated_at";

const SELECT_BY_ID: &str = "SELECT contact_id, phone_number, name, push_name, short_name,
        is_blocked, is_group, is_my_contact, cached_at, updated_at
     FROM contacts WHERE contact_id_hash = ?1";

const SELECT_BY_PHONE: &str = "SELECT contact_id, phone_number, name, push_name, short_name,
        is_blocked, is_group, is_my_contact, cached_at, updated_at
     FROM contacts WHERE phone_hash = ?1 ORDER BY cached_at DESC LIMIT 1";

const DELETE_OLDER_THAN: &str = "DELETE FROM contacts WHERE cached_at < ?1";

#[derive(Debug, Clone)]
struct StoredContact {
    contact_id: String,
    phone_number: String,
    name: String,
    push_name: String,
    short_name: String,
    is_blocked: bool,
    is_group: bool,
    is_my_contact: bool,
    cached_at: String,
    updated_at: String,
}

impl StoredContact {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            contact_id: row.get(0)?,
            phone_number: row.get(1)?,
            name: row.get(2)?,
            push_name: row.get(3)?,
            short_name: row.get(4)?,
            is_blocked: row.get(5)?,
            is_group: row.get(6)?,
            is_my_contact: row.get(7)?,
            cached_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn decrypt(self, enc: &Encryptor) -> Result<Contact, BridgeError> {
        Ok(Contact {
            contact_id: unseal(enc, "contact_id", &self.contact_id)?,
            phone_number: unseal(enc, "phone_number", &self.phone_number)?,
            name: unseal(enc, "name", &self.name)?,
            push_name: unseal(enc, "push_name", &self.push_name)?,
            short_name: unseal(enc, "short_name", &self.short_name)?,
            is_blocked: self.is_blocked,
            is_group: self.is_group,
            is_my_contact: self.is_my_contact,
            cached_at: Some(decode_timestamp("cached_at", &self.cached_at)?),
            updated_at: Some(decode_timestamp("updated_at", &self.updated_at)?),
        })
    }
}

/// Lookup hash for a phone number, or `None` when there is no number to match on.
fn phone_hash(enc: &Encryptor, phone_number: &str) -> Option<String> {
    let phone = phone_number.trim();
    (!phone.is_empty()).then(|| enc.lookup_hash(phone))
}

/// Insert the contact, or replace every field of the existing one with the
/// same `contact_id`. Refreshes `cached_at`.
pub async fn save_contact(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    contact: &Contact,
) -> Result<(), BridgeError> {
    let values = (
        seal_for_lookup(enc, "contact_id", &contact.contact_id)?,
        enc.lookup_hash(&contact.contact_id),
        seal(enc, "phone_number", &contact.phone_number)?,
        phone_hash(enc, &contact.phone_number),
        seal(enc, "name", &contact.name)?,
        seal(enc, "push_name", &contact.push_name)?,
        seal(enc, "short_name", &contact.short_name)?,
        (contact.is_blocked, contact.is_group, contact.is_my_contact),
        now(),
    );

    db.call(cancel, "save contact", move |conn| {
        let (is_blocked, is_group, is_my_contact) = values.7;
        conn.prepare_cached(UPSERT)?.execute(params![
            values.0,
            values.1,
            values.2,
            values.3,
            values.4,
            values.5,
            values.6,
            is_blocked,
            is_group,
            is_my_contact,
            values.8,
        ])
    })
    .await?;

    debug!(is_group = contact.is_group, "saved contact");
    Ok(())
}

async fn fetch_one(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    label: &str,
    sql: &'static str,
    hash: String,
) -> Result<Option<Contact>, BridgeError> {
    let stored = db
        .call(cancel, label, move |conn| {
            conn.prepare_cached(sql)?
                .query_row(params![hash], StoredContact::from_row)
                .optional()
        })
        .await?;
    stored.map(|s| s.decrypt(enc)).transpose()
}

pub async fn get_contact(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    contact_id: &str,
) -> Result<Option<Contact>, BridgeError> {
    let hash = enc.lookup_hash(contact_id);
    fetch_one(db, enc, cancel, "get contact", SELECT_BY_ID, hash).await
}

/// Most recently cached contact with this phone number.
pub async fn get_contact_by_phone(
    db: &Database,
    enc: &Encryptor,
    cancel: &CancellationToken,
    phone_number: &str,
) -> Result<Option<Contact>, BridgeError> {
    let Some(hash) = phone_hash(enc, phone_number) else {
        return Ok(None);
    };
    fetch_one(db, enc, cancel, "get contact by phone", SELECT_BY_PHONE, hash).await
}

/// Delete contacts not refreshed in the last `retention_days`.
pub async fn cleanup_old_contacts(
    db: &Database,
    cancel: &CancellationToken,
    retention_days: u32,
) -> Result<usize, BridgeError> {
    let cutoff = retention_cutoff(retention_days);
    let deleted = db
        .call(cancel, "cleanup old contacts", move |conn| {
            conn.execute(DELETE_OLDER_THAN, params![cutoff])
        })
        .await?;
    if deleted > 0 {
        info!(deleted, retention_days, "cleaned up old contacts");
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{age_rows, setup};

    fn contact(id: &str, phone: &str, name: &str) -> Contact {
        Contact {
            contact_id: id.into(),
            phone_number: phone.into(),
            name: name.into(),
            push_name: format!("{name} (push)"),
            is_my_contact: true,
            ..Contact::default()
        }
    }

    #[tokio::test]
    async fn save_replaces_existing_contact() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();

        save_contact(&db, &enc, &cancel, &contact("1555@c.us", "+1555", "Alice"))
            .await
            .unwrap();
        let mut updated = contact("1555@c.us", "+1555", "Alice B.");
        updated.is_blocked = true;
        save_contact(&db, &enc, &cancel, &updated).await.unwrap();

        let fetched = get_contact(&db, &enc, &cancel, "1555@c.us").await.unwrap().unwrap();
        assert_eq!(fetched.name, "Alice B.");
        assert!(fetched.is_blocked);
        assert!(fetched.cached_at.is_some());

        let count: i64 = db
            .connection()
            .call(|conn| -> Result<_, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn lookup_by_phone() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        save_contact(&db, &enc, &cancel, &contact("1555@c.us", "+1555", "Alice"))
            .await
            .unwrap();

        let found = get_contact_by_phone(&db, &enc, &cancel, " +1555 ").await.unwrap();
        assert_eq!(found.unwrap().contact_id, "1555@c.us");
        assert!(get_contact_by_phone(&db, &enc, &cancel, "+1999").await.unwrap().is_none());
        assert!(get_contact_by_phone(&db, &enc, &cancel, "").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_contact_is_none() {
        let (db, enc, _dir) = setup().await;
        let got = get_contact(&db, &enc, &CancellationToken::new(), "ghost@c.us")
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn cleanup_uses_cached_at() {
        let (db, enc, _dir) = setup().await;
        let cancel = CancellationToken::new();
        save_contact(&db, &enc, &cancel, &contact("old@c.us", "1", "Old")).await.unwrap();
        save_contact(&db, &enc, &cancel, &contact("new@c.us", "2", "New")).await.unwrap();

        let old_hash = enc.lookup_hash("old@c.us");
        age_rows(&db, "contacts", "cached_at", "contact_id_hash", &old_hash, 8).await;

        assert_eq!(cleanup_old_contacts(&db, &cancel, 7).await.unwrap(), 1);
        assert!(get_contact(&db, &enc, &cancel, "old@c.us").await.unwrap().is_none());
        assert!(get_contact(&db, &enc, &cancel, "new@c.us").await.unwrap().is_some());
    }
}
