// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types persisted by the bridge store.
//!
//! All values here are plaintext copies. Encryption happens inside the
//! storage crate; callers never see ciphertext or lookup hashes.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Session name used when a mapping is saved without one.
pub const DEFAULT_SESSION: &str = "default";

/// Suffix WhatsApp gives to one-to-one chat identifiers.
pub const WHATSAPP_USER_SUFFIX: &str = "@c.us";

/// Text format for every timestamp column. Matches SQLite's
/// `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` so stored values compare lexically.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Delivery state of a relayed message. Stored as plain text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Which side of a mapping an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum IdentifierKind {
    /// The WhatsApp-side message id.
    Source,
    /// The Signal-side message id.
    Dest,
}

/// Correlates one WhatsApp message with its Signal counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMapping {
    /// Storage-assigned row id. Zero until the mapping has been saved.
    pub id: i64,
    /// WhatsApp conversation identifier.
    pub chat_id: String,
    /// WhatsApp-side message id.
    pub source_msg_id: String,
    /// Signal-side message id.
    pub dest_msg_id: String,
    pub source_timestamp: DateTime<Utc>,
    /// When the bridge relayed the message.
    pub forwarded_at: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    pub media_path: Option<String>,
    /// Logical channel pairing that produced the row. Empty means [`DEFAULT_SESSION`].
    pub session_name: String,
    pub media_type: Option<String>,
    /// Set by storage on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Refreshed by storage on every update.
    pub updated_at: Option<DateTime<Utc>>,
}

impl MessageMapping {
    /// Build an unsaved mapping stamped with the current time.
    pub fn new(
        chat_id: impl Into<String>,
        source_msg_id: impl Into<String>,
        dest_msg_id: impl Into<String>,
        delivery_status: DeliveryStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            chat_id: chat_id.into(),
            source_msg_id: source_msg_id.into(),
            dest_msg_id: dest_msg_id.into(),
            source_timestamp: now,
            forwarded_at: now,
            delivery_status,
            media_path: None,
            session_name: String::new(),
            media_type: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Cached identity metadata for a WhatsApp participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub contact_id: String,
    pub phone_number: String,
    pub name: String,
    pub push_name: String,
    pub short_name: String,
    pub is_blocked: bool,
    pub is_group: bool,
    pub is_my_contact: bool,
    pub cached_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Cached metadata for a WhatsApp group, scoped to one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: String,
    pub subject: String,
    pub description: String,
    pub participant_count: i64,
    pub session_name: String,
    pub cached_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A Signal-originated message waiting to be relayed to `destination`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSignalMessage {
    pub message_id: String,
    pub sender: String,
    pub message: String,
    pub group_id: Option<String>,
    /// Signal timestamp in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Opaque upstream payload.
    pub raw_json: String,
    pub destination: String,
    pub retry_count: u32,
    pub created_at: Option<DateTime<Utc>>,
}

/// Retention windows, in days, for each cleanup target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionDays {
    pub messages: u32,
    pub contacts: u32,
    pub groups: u32,
}

/// Rows removed by a retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub message_mappings: usize,
    pub contacts: usize,
    pub groups: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.message_mappings + self.contacts + self.groups
    }
}

/// Row counts reported by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub message_mappings: i64,
    pub contacts: i64,
    pub groups: i64,
    pub pending_signal_messages: i64,
    pub applied_migrations: i64,
}

/// Health status reported by store health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

/// Returns the session name to persist, substituting [`DEFAULT_SESSION`] for blanks.
pub fn normalize_session(name: &str) -> &str {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_SESSION
    } else {
        trimmed
    }
}

/// Normalize a WhatsApp counterpart into the chat id form used in storage.
///
/// Bare phone numbers (optionally `+`-prefixed) gain the `@c.us` suffix.
/// Identifiers that already carry a server part (`@c.us`, `@g.us`,
/// `@lid`) are returned trimmed but otherwise unchanged.
pub fn normalize_chat_id(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.is_empty() || trimmed.contains('@') {
        return trimmed.to_string();
    }
    let number = trimmed.trim_start_matches('+');
    format!("{number}{WHATSAPP_USER_SUFFIX}")
}

/// Format a timestamp for storage.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Accepts any fractional precision.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ").map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn delivery_status_round_trips_through_text() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Read,
            DeliveryStatus::Failed,
        ] {
            let text = status.to_string();
            assert_eq!(text, text.to_lowercase());
            assert_eq!(DeliveryStatus::from_str(&text).unwrap(), status);
        }
        assert!(DeliveryStatus::from_str("bogus").is_err());
    }

    #[test]
    fn delivery_status_serializes_lowercase() {
        let json = serde_json::to_string(&DeliveryStatus::Delivered).unwrap();
        assert_eq!(json, "\"delivered\"");
    }

    #[test]
    fn blank_session_normalizes_to_default() {
        assert_eq!(normalize_session(""), DEFAULT_SESSION);
        assert_eq!(normalize_session("   "), DEFAULT_SESSION);
        assert_eq!(normalize_session("work"), "work");
    }

    #[test]
    fn phone_numbers_gain_whatsapp_suffix() {
        assert_eq!(normalize_chat_id("+15551234567"), "15551234567@c.us");
        assert_eq!(normalize_chat_id("15551234567"), "15551234567@c.us");
        assert_eq!(normalize_chat_id("15551234567@c.us"), "15551234567@c.us");
        assert_eq!(normalize_chat_id("1203630@g.us"), "1203630@g.us");
        assert_eq!(normalize_chat_id(""), "");
    }

    #[test]
    fn timestamps_parse_sqlite_and_chrono_output() {
        let ts = parse_timestamp("2026-01-01T00:00:01.500Z").unwrap();
        assert_eq!(format_timestamp(&ts), "2026-01-01T00:00:01.500Z");

        let now = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(&now)).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    proptest::proptest! {
        #[test]
        fn normalize_chat_id_is_idempotent(raw in "[+]?[0-9]{5,15}(@[a-z.]{1,6})?") {
            let once = normalize_chat_id(&raw);
            proptest::prop_assert_eq!(normalize_chat_id(&once), once.clone());
            proptest::prop_assert!(once.contains('@'));
        }
    }

    #[test]
    fn new_mapping_is_unsaved() {
        let m = MessageMapping::new("c-1", "wa-1", "sig-1", DeliveryStatus::Sent);
        assert_eq!(m.id, 0);
        assert!(m.session_name.is_empty());
        assert!(m.created_at.is_none());
    }
}
