// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the chatbridge WhatsApp/Signal bridge.
//!
//! Provides the shared error type, the plaintext domain models persisted by
//! the store, and the [`BridgeStorage`] trait that channel clients use to
//! reach the store.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{BridgeError, CryptoError, ErrorClass, StorageErrorKind};
pub use traits::BridgeStorage;
pub use types::{
    CleanupReport, Contact, DEFAULT_SESSION, DeliveryStatus, Group, HealthStatus,
    IdentifierKind, MessageMapping, PendingSignalMessage, RetentionDays, StoreStats,
};
