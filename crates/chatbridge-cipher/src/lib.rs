// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field-level encryption for the chatbridge store.
//!
//! Provides AES-256-GCM encryption of individual column values, a
//! deterministic variant for columns that must stay searchable, and keyed
//! lookup hashes for indexed equality queries. Keys are derived from a
//! configured secret via PBKDF2-HMAC-SHA256.

pub mod crypto;
pub mod encryptor;
pub mod kdf;

pub use encryptor::{CipherSettings, Encryptor, MIN_SALT_LEN, MIN_SECRET_LEN};
