// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage trait consumed by the bridge's channel clients and workers.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;
use crate::types::{
    CleanupReport, Contact, DeliveryStatus, Group, HealthStatus, IdentifierKind, MessageMapping,
    PendingSignalMessage, RetentionDays, StoreStats,
};

/// Persistent, encrypted store for cross-platform message correlation.
///
/// Every operation takes a [`CancellationToken`] first. Cancellation is
/// observed before each engine attempt and during retry backoff, not while
/// a single statement is executing.
///
/// Point lookups return `Ok(None)` when nothing matches.
#[async_trait]
pub trait BridgeStorage: Send + Sync + 'static {
    // --- Message mappings ---

    /// Insert a new mapping. Returns the storage-assigned row id.
    async fn save_message_mapping(
        &self,
        cancel: &CancellationToken,
        mapping: &MessageMapping,
    ) -> Result<i64, BridgeError>;

    /// Look up a mapping by an id whose side is known.
    async fn get_message_mapping_by(
        &self,
        cancel: &CancellationToken,
        kind: IdentifierKind,
        id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError>;

    async fn get_message_mapping_by_source_id(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError> {
        self.get_message_mapping_by(cancel, IdentifierKind::Source, id)
            .await
    }

    async fn get_message_mapping_by_dest_id(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError> {
        self.get_message_mapping_by(cancel, IdentifierKind::Dest, id)
            .await
    }

    /// Look up a mapping by an id of unknown side: source first, then dest.
    async fn get_message_mapping(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError> {
        if let Some(found) = self.get_message_mapping_by_source_id(cancel, id).await? {
            return Ok(Some(found));
        }
        self.get_message_mapping_by_dest_id(cancel, id).await
    }

    /// Update the delivery status of the mapping with the given id.
    ///
    /// Fails with [`BridgeError::NotFound`] when no row matches.
    async fn update_delivery_status_by(
        &self,
        cancel: &CancellationToken,
        kind: IdentifierKind,
        id: &str,
        status: DeliveryStatus,
    ) -> Result<(), BridgeError>;

    async fn update_delivery_status_by_source_id(
        &self,
        cancel: &CancellationToken,
        id: &str,
        status: DeliveryStatus,
    ) -> Result<(), BridgeError> {
        self.update_delivery_status_by(cancel, IdentifierKind::Source, id, status)
            .await
    }

    async fn update_delivery_status_by_dest_id(
        &self,
        cancel: &CancellationToken,
        id: &str,
        status: DeliveryStatus,
    ) -> Result<(), BridgeError> {
        self.update_delivery_status_by(cancel, IdentifierKind::Dest, id, status)
            .await
    }

    /// Update by an id of unknown side: source first, then dest.
    async fn update_delivery_status(
        &self,
        cancel: &CancellationToken,
        id: &str,
        status: DeliveryStatus,
    ) -> Result<(), BridgeError> {
        match self
            .update_delivery_status_by_source_id(cancel, id, status)
            .await
        {
            Err(BridgeError::NotFound(_)) => {
                self.update_delivery_status_by_dest_id(cancel, id, status)
                    .await
                    .map_err(|e| match e {
                        BridgeError::NotFound(_) => {
                            BridgeError::NotFound(format!("no message mapping for id {id}"))
                        }
                        other => other,
                    })
            }
            other => other,
        }
    }

    async fn get_latest_message_mapping_by_chat_id(
        &self,
        cancel: &CancellationToken,
        chat_id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError>;

    async fn get_latest_message_mapping_by_session(
        &self,
        cancel: &CancellationToken,
        session_name: &str,
    ) -> Result<Option<MessageMapping>, BridgeError>;

    async fn get_latest_message_mapping(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<MessageMapping>, BridgeError>;

    /// Newest-first mappings for one chat, at most `limit`.
    async fn list_message_mappings_by_chat(
        &self,
        cancel: &CancellationToken,
        chat_id: &str,
        limit: u32,
    ) -> Result<Vec<MessageMapping>, BridgeError>;

    /// Whether any mapping exists for `counterpart_id` in `session_name`.
    async fn has_message_history_between(
        &self,
        cancel: &CancellationToken,
        session_name: &str,
        counterpart_id: &str,
    ) -> Result<bool, BridgeError>;

    /// Delete mappings created more than `retention_days` ago.
    async fn cleanup_old_records(
        &self,
        cancel: &CancellationToken,
        retention_days: u32,
    ) -> Result<usize, BridgeError>;

    // --- Contacts ---

    /// Insert or fully replace the contact keyed by `contact_id`.
    async fn save_contact(
        &self,
        cancel: &CancellationToken,
        contact: &Contact,
    ) -> Result<(), BridgeError>;

    async fn get_contact(
        &self,
        cancel: &CancellationToken,
        contact_id: &str,
    ) -> Result<Option<Contact>, BridgeError>;

    async fn get_contact_by_phone(
        &self,
        cancel: &CancellationToken,
        phone_number: &str,
    ) -> Result<Option<Contact>, BridgeError>;

    async fn cleanup_old_contacts(
        &self,
        cancel: &CancellationToken,
        retention_days: u32,
    ) -> Result<usize, BridgeError>;

    // --- Groups ---

    /// Insert or fully replace the group keyed by `(group_id, session_name)`.
    async fn save_group(&self, cancel: &CancellationToken, group: &Group)
    -> Result<(), BridgeError>;

    async fn get_group(
        &self,
        cancel: &CancellationToken,
        group_id: &str,
        session_name: &str,
    ) -> Result<Option<Group>, BridgeError>;

    async fn cleanup_old_groups(
        &self,
        cancel: &CancellationToken,
        retention_days: u32,
    ) -> Result<usize, BridgeError>;

    // --- Pending Signal messages ---

    /// Queue a message. Re-queuing the same `(message_id, destination)` is a no-op.
    ///
    /// Returns true if a new row was inserted.
    async fn save_pending_signal_message(
        &self,
        cancel: &CancellationToken,
        message: &PendingSignalMessage,
    ) -> Result<bool, BridgeError>;

    /// Oldest-first batch of at most `limit` queued messages.
    async fn get_pending_signal_messages(
        &self,
        cancel: &CancellationToken,
        limit: u32,
    ) -> Result<Vec<PendingSignalMessage>, BridgeError>;

    async fn delete_pending_signal_message(
        &self,
        cancel: &CancellationToken,
        message_id: &str,
        destination: &str,
    ) -> Result<(), BridgeError>;

    async fn increment_pending_signal_message_retry(
        &self,
        cancel: &CancellationToken,
        message_id: &str,
        destination: &str,
    ) -> Result<(), BridgeError>;

    async fn count_pending_signal_messages(
        &self,
        cancel: &CancellationToken,
    ) -> Result<i64, BridgeError>;

    /// Delete queued messages whose retry count reached `max_retries`.
    async fn purge_exhausted_pending_messages(
        &self,
        cancel: &CancellationToken,
        max_retries: u32,
    ) -> Result<usize, BridgeError>;

    // --- Maintenance ---

    /// Run every retention cleanup.
    async fn cleanup_all(
        &self,
        cancel: &CancellationToken,
        retention: RetentionDays,
    ) -> Result<CleanupReport, BridgeError> {
        Ok(CleanupReport {
            message_mappings: self.cleanup_old_records(cancel, retention.messages).await?,
            contacts: self.cleanup_old_contacts(cancel, retention.contacts).await?,
            groups: self.cleanup_old_groups(cancel, retention.groups).await?,
        })
    }

    async fn stats(&self, cancel: &CancellationToken) -> Result<StoreStats, BridgeError>;

    async fn health_check(&self) -> Result<HealthStatus, BridgeError>;

    /// Flush the write-ahead log.
    async fn close(&self) -> Result<(), BridgeError>;
}
