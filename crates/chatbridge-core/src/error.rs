// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by every chatbridge crate.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error source used by variants that wrap foreign errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type used across the bridge store and its collaborators.
///
/// "No matching row" is never represented here for point lookups; those
/// return `Ok(None)`. [`BridgeError::NotFound`] is reserved for mutations
/// that were expected to affect a row and did not.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors (missing secret, invalid paths, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Encryption, decryption, or key derivation failed for a named field.
    #[error("{context}: {source}")]
    Crypto {
        context: String,
        #[source]
        source: CryptoError,
    },

    /// Underlying engine failure, classified by [`StorageErrorKind`].
    #[error("storage error ({context}): {source}")]
    Storage {
        context: String,
        kind: StorageErrorKind,
        #[source]
        source: BoxError,
    },

    /// A mutation matched no row.
    #[error("not found: {0}")]
    NotFound(String),

    /// A migration file could not be read, executed, or recorded.
    #[error("migration {file} failed: {source}")]
    Migration {
        file: String,
        #[source]
        source: BoxError,
    },

    /// The configured migrations directory does not exist.
    #[error("migrations directory not found: {}", .0.display())]
    MigrationDirectoryNotFound(PathBuf),

    /// The migrations directory exists but holds no `.sql` files.
    #[error("no migration files found in {}", .0.display())]
    NoMigrationsFound(PathBuf),

    /// The caller cancelled the operation before it could complete.
    #[error("{label}: operation cancelled")]
    Cancelled { label: String },

    /// A retryable failure persisted through every allowed attempt.
    #[error("{label}: failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        #[source]
        source: Box<BridgeError>,
    },

    /// A failure the retry wrapper refused to retry.
    #[error("{label}: non-retryable error: {source}")]
    NonRetryable {
        label: String,
        #[source]
        source: Box<BridgeError>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failures produced by the field encryptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The configured secret is missing or shorter than the minimum length.
    #[error("encryption secret must be at least {min_len} characters")]
    InvalidSecret { min_len: usize },

    /// Key derivation produced unusable key material.
    #[error("key derivation failed")]
    KeyDerivation,

    /// The system random source could not produce a nonce.
    #[error("failed to generate nonce")]
    NonceGeneration,

    /// Sealing the plaintext failed.
    #[error("encryption failed")]
    Encrypt,

    /// The stored value is not valid base64.
    #[error("failed to decode ciphertext: {0}")]
    Decode(String),

    /// The decoded payload is shorter than the nonce.
    #[error("ciphertext too short ({len} bytes)")]
    ShortCiphertext { len: usize },

    /// The authentication tag did not verify (corruption, tampering, or wrong key).
    #[error("ciphertext failed authentication")]
    Authentication,

    /// Decrypted bytes are not valid UTF-8.
    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,
}

/// Coarse classification of an engine failure, derived from its result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The database or a table is locked by another writer.
    Locked,
    /// Transient disk I/O failure.
    Io,
    /// UNIQUE, NOT NULL, CHECK, or foreign key violation.
    Constraint,
    /// A table or column referenced by the statement does not exist.
    MissingSchema,
    /// Anything else.
    Other,
}

/// Whether a failed operation may succeed if attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Permanent,
}

impl BridgeError {
    /// Wrap a crypto failure with the field or operation it belongs to.
    pub fn crypto(context: impl Into<String>, source: CryptoError) -> Self {
        Self::Crypto {
            context: context.into(),
            source,
        }
    }

    /// Classify this error for the retry wrapper.
    ///
    /// Only lock contention and transient I/O are retryable; every other
    /// error, including unclassified engine errors, is permanent.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Storage {
                kind: StorageErrorKind::Locked | StorageErrorKind::Io,
                ..
            } => ErrorClass::Retryable,
            _ => ErrorClass::Permanent,
        }
    }

    /// Returns the storage kind if this is (or wraps) an engine error.
    pub fn storage_kind(&self) -> Option<StorageErrorKind> {
        match self {
            Self::Storage { kind, .. } => Some(*kind),
            Self::RetriesExhausted { source, .. } | Self::NonRetryable { source, .. } => {
                source.storage_kind()
            }
            _ => None,
        }
    }

    /// Returns true if this is (or wraps) a crypto failure.
    pub fn is_crypto(&self) -> bool {
        match self {
            Self::Crypto { .. } => true,
            Self::RetriesExhausted { source, .. } | Self::NonRetryable { source, .. } => {
                source.is_crypto()
            }
            _ => false,
        }
    }
}
