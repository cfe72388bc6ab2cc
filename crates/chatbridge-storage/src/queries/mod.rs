// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the encrypted store tables.
//!
//! Each function encrypts its inputs on the caller's task, runs a single
//! statement (or transaction) through [`Database::call`](crate::Database::call),
//! and decrypts what comes back. Identifier columns are sealed with the
//! deterministic cipher and matched through their `*_hash` sibling.

pub mod contacts;
pub mod groups;
pub mod mappings;
pub mod pending;
pub mod stats;

use chatbridge_cipher::Encryptor;
use chatbridge_core::types::{format_timestamp, parse_timestamp};
use chatbridge_core::{BridgeError, StorageErrorKind};
use chrono::{DateTime, TimeDelta, Utc};

pub(crate) fn seal(enc: &Encryptor, field: &str, value: &str) -> Result<String, BridgeError> {
    enc.encrypt(value)
        .map_err(|e| BridgeError::crypto(format!("encrypt {field}"), e))
}

pub(crate) fn seal_for_lookup(
    enc: &Encryptor,
    field: &str,
    value: &str,
) -> Result<String, BridgeError> {
    enc.encrypt_for_lookup(value)
        .map_err(|e| BridgeError::crypto(format!("encrypt {field}"), e))
}

pub(crate) fn seal_optional(
    enc: &Encryptor,
    field: &str,
    value: Option<&str>,
) -> Result<Option<String>, BridgeError> {
    value.map(|v| seal(enc, field, v)).transpose()
}

pub(crate) fn unseal(enc: &Encryptor, field: &str, value: &str) -> Result<String, BridgeError> {
    enc.decrypt(value)
        .map_err(|e| BridgeError::crypto(format!("decrypt {field}"), e))
}

pub(crate) fn unseal_optional(
    enc: &Encryptor,
    field: &str,
    value: Option<&str>,
) -> Result<Option<String>, BridgeError> {
    enc.decrypt_optional(value)
        .map_err(|e| BridgeError::crypto(format!("decrypt {field}"), e))
}

/// Parse a timestamp column, reporting the column on failure.
pub(crate) fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, BridgeError> {
    parse_timestamp(value).map_err(|e| decode_err(column, e))
}

pub(crate) fn decode_err<E>(column: &str, e: E) -> BridgeError
where
    E: std::error::Error + Send + Sync + 'static,
{
    BridgeError::Storage {
        context: format!("decode {column}"),
        kind: StorageErrorKind::Other,
        source: Box::new(e),
    }
}

/// Current time in storage format.
pub(crate) fn now() -> String {
    format_timestamp(&Utc::now())
}

/// Rows with a timestamp strictly before this are older than `days`.
pub(crate) fn retention_cutoff(days: u32) -> String {
    format_timestamp(&(Utc::now() - TimeDelta::days(i64::from(days))))
}
