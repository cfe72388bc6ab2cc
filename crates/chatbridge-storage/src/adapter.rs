// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`BridgeStorage`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use chatbridge_cipher::{CipherSettings, Encryptor};
use chatbridge_config::model::BridgeConfig;
use chatbridge_core::types::{
    Contact, DeliveryStatus, Group, HealthStatus, IdentifierKind, MessageMapping,
    PendingSignalMessage, StoreStats,
};
use chatbridge_core::{BridgeError, BridgeStorage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::database::{Database, DatabaseOptions};
use crate::queries;

/// Encrypted SQLite store.
///
/// Wraps a [`Database`] and a shared [`Encryptor`] and delegates every
/// operation to the typed query modules.
pub struct SqliteBridgeStore {
    db: Database,
    enc: Arc<Encryptor>,
}

impl SqliteBridgeStore {
    /// Open the database at `path`, running migrations.
    pub async fn open(
        path: &str,
        options: DatabaseOptions,
        enc: Arc<Encryptor>,
    ) -> Result<Self, BridgeError> {
        let db = Database::open(path, options).await?;
        Ok(Self { db, enc })
    }

    /// Derive keys from the configured secret and open the configured database.
    pub async fn from_config(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let enc = encryptor_from_config(config)?;
        Self::open(
            &config.storage.database_path,
            DatabaseOptions::from_config(config),
            Arc::new(enc),
        )
        .await
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn encryptor(&self) -> &Arc<Encryptor> {
        &self.enc
    }

    /// Checkpoint and release the connection.
    pub async fn shutdown(self) -> Result<(), BridgeError> {
        self.db.close().await
    }
}

/// Build the field encryptor described by `[encryption]`.
pub fn encryptor_from_config(config: &BridgeConfig) -> Result<Encryptor, BridgeError> {
    let secret = config
        .encryption
        .secret()
        .ok_or_else(|| BridgeError::Config("encryption.secret is not set".to_string()))?;
    let settings = CipherSettings {
        salt: config.encryption.salt.clone(),
        lookup_salt: config.encryption.lookup_salt.clone(),
        kdf_iterations: config.encryption.kdf_iterations,
    };
    Encryptor::new(&secret, &settings).map_err(|e| BridgeError::crypto("derive keys", e))
}

#[async_trait]
impl BridgeStorage for SqliteBridgeStore {
    // --- Message mappings ---

    async fn save_message_mapping(
        &self,
        cancel: &CancellationToken,
        mapping: &MessageMapping,
    ) -> Result<i64, BridgeError> {
        queries::mappings::save_message_mapping(&self.db, &self.enc, cancel, mapping).await
    }

    async fn get_message_mapping_by(
        &self,
        cancel: &CancellationToken,
        kind: IdentifierKind,
        id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError> {
        queries::mappings::get_message_mapping_by(&self.db, &self.enc, cancel, kind, id).await
    }

    async fn update_delivery_status_by(
        &self,
        cancel: &CancellationToken,
        kind: IdentifierKind,
        id: &str,
        status: DeliveryStatus,
    ) -> Result<(), BridgeError> {
        queries::mappings::update_delivery_status_by(&self.db, &self.enc, cancel, kind, id, status)
            .await
    }

    async fn get_latest_message_mapping_by_chat_id(
        &self,
        cancel: &CancellationToken,
        chat_id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError> {
        queries::mappings::get_latest_message_mapping_by_chat_id(&self.db, &self.enc, cancel, chat_id)
            .await
    }

    async fn get_latest_message_mapping_by_session(
        &self,
        cancel: &CancellationToken,
        session_name: &str,
    ) -> Result<Option<MessageMapping>, BridgeError> {
        queries::mappings::get_latest_message_mapping_by_session(
            &self.db,
            &self.enc,
            cancel,
            session_name,
        )
        .await
    }

    async fn get_latest_message_mapping(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<MessageMapping>, BridgeError> {
        queries::mappings::get_latest_message_mapping(&self.db, &self.enc, cancel).await
    }

    async fn list_message_mappings_by_chat(
        &self,
        cancel: &CancellationToken,
        chat_id: &str,
        limit: u32,
    ) -> Result<Vec<MessageMapping>, BridgeError> {
        queries::mappings::list_message_mappings_by_chat(&self.db, &self.enc, cancel, chat_id, limit)
            .await
    }

    async fn has_message_history_between(
        &self,
        cancel: &CancellationToken,
        session_name: &str,
        counterpart_id: &str,
    ) -> Result<bool, BridgeError> {
        queries::mappings::has_message_history_between(
            &self.db,
            &self.enc,
            cancel,
            session_name,
            counterpart_id,
        )
        .await
    }

    async fn cleanup_old_records(
        &self,
        cancel: &CancellationToken,
        retention_days: u32,
    ) -> Result<usize, BridgeError> {
        queries::mappings::cleanup_old_records(&self.db, cancel, retention_days).await
    }

    // --- Contacts ---

    async fn save_contact(
        &self,
        cancel: &CancellationToken,
        contact: &Contact,
    ) -> Result<(), BridgeError> {
        queries::contacts::save_contact(&self.db, &self.enc, cancel, contact).await
    }

    async fn get_contact(
        &self,
        cancel: &CancellationToken,
        contact_id: &str,
    ) -> Result<Option<Contact>, BridgeError> {
        queries::contacts::get_contact(&self.db, &self.enc, cancel, contact_id).await
    }

    async fn get_contact_by_phone(
        &self,
        cancel: &CancellationToken,
        phone_number: &str,
    ) -> Result<Option<Contact>, BridgeError> {
        queries::contacts::get_contact_by_phone(&self.db, &self.enc, cancel, phone_number).await
    }

    async fn cleanup_old_contacts(
        &self,
        cancel: &CancellationToken,
        retention_days: u32,
    ) -> Result<usize, BridgeError> {
        queries::contacts::cleanup_old_contacts(&self.db, cancel, retention_days).await
    }

    // --- Groups ---

    async fn save_group(&self, cancel: &CancellationToken, group: &Group) -> Result<(), BridgeError> {
        queries::groups::save_group(&self.db, &self.enc, cancel, group).await
    }

    async fn get_group(
        &self,
        cancel: &CancellationToken,
        group_id: &str,
        session_name: &str,
    ) -> Result<Option<Group>, BridgeError> {
        queries::groups::get_group(&self.db, &self.enc, cancel, group_id, session_name).await
    }

    async fn cleanup_old_groups(
        &self,
        cancel: &CancellationToken,
        retention_days: u32,
    ) -> Result<usize, BridgeError> {
        queries::groups::cleanup_old_groups(&self.db, cancel, retention_days).await
    }

    // --- Pending Signal messages ---

    async fn save_pending_signal_message(
        &self,
        cancel: &CancellationToken,
        message: &PendingSignalMessage,
    ) -> Result<bool, BridgeError> {
        queries::pending::save_pending_signal_message(&self.db, &self.enc, cancel, message).await
    }

    async fn get_pending_signal_messages(
        &self,
        cancel: &CancellationToken,
        limit: u32,
    ) -> Result<Vec<PendingSignalMessage>, BridgeError> {
        queries::pending::get_pending_signal_messages(&self.db, &self.enc, cancel, limit).await
    }

    async fn delete_pending_signal_message(
        &self,
        cancel: &CancellationToken,
        message_id: &str,
        destination: &str,
    ) -> Result<(), BridgeError> {
        queries::pending::delete_pending_signal_message(
            &self.db,
            &self.enc,
            cancel,
            message_id,
            destination,
        )
        .await
    }

    async fn increment_pending_signal_message_retry(
        &self,
        cancel: &CancellationToken,
        message_id: &str,
        destination: &str,
    ) -> Result<(), BridgeError> {
        queries::pending::increment_pending_signal_message_retry(
            &self.db,
            &self.enc,
            cancel,
            message_id,
            destination,
        )
        .await
    }

    async fn count_pending_signal_messages(
        &self,
        cancel: &CancellationToken,
    ) -> Result<i64, BridgeError> {
        queries::pending::count_pending_signal_messages(&self.db, cancel).await
    }

    async fn purge_exhausted_pending_messages(
        &self,
        cancel: &CancellationToken,
        max_retries: u32,
    ) -> Result<usize, BridgeError> {
        queries::pending::purge_exhausted_pending_messages(&self.db, cancel, max_retries).await
    }

    // --- Maintenance ---

    async fn stats(&self, cancel: &CancellationToken) -> Result<StoreStats, BridgeError> {
        queries::stats::stats(&self.db, cancel).await
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        match queries::stats::ping(&self.db, &CancellationToken::new()).await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => {
                warn!(error = %e, "store health check failed");
                Ok(HealthStatus::Unhealthy(e.to_string()))
            }
        }
    }

    async fn close(&self) -> Result<(), BridgeError> {
        self.db.checkpoint().await?;
        debug!("store closed");
        Ok(())
    }
}
