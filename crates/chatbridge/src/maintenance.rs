// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `chatbridge migrate`, `cleanup`, and `stats`.

use chatbridge_config::BridgeConfig;
use chatbridge_core::types::RetentionDays;
use chatbridge_core::{BridgeError, BridgeStorage};
use chatbridge_storage::{Database, DatabaseOptions, SqliteBridgeStore};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Command-line replacements for configured retention settings.
#[derive(Debug, Clone, Default)]
pub struct CleanupOverrides {
    pub message_days: Option<u32>,
    pub contact_days: Option<u32>,
    pub group_days: Option<u32>,
    pub purge_pending: Option<u32>,
}

impl CleanupOverrides {
    pub fn retention(&self, config: &BridgeConfig) -> RetentionDays {
        RetentionDays {
            messages: self.message_days.unwrap_or(config.retention.message_days),
            contacts: self.contact_days.unwrap_or(config.retention.contact_days),
            groups: self.group_days.unwrap_or(config.retention.group_days),
        }
    }
}

/// Open the database, which applies pending migrations, and report what ran.
pub async fn run_migrate(config: &BridgeConfig) -> Result<(), BridgeError> {
    let db = Database::open(
        &config.storage.database_path,
        DatabaseOptions::from_config(config),
    )
    .await?;

    let report = db.migration_report().clone();
    db.close().await?;

    if report.applied.is_empty() {
        println!(
            "Schema up to date ({} migration(s) already applied).",
            report.skipped
        );
    } else {
        for file in &report.applied {
            println!("  applied {file}");
        }
        println!(
            "Applied {} migration(s), {} already applied.",
            report.applied.len(),
            report.skipped
        );
    }
    Ok(())
}

pub async fn run_cleanup(
    config: &BridgeConfig,
    overrides: &CleanupOverrides,
    cancel: &CancellationToken,
) -> Result<(), BridgeError> {
    let retention = overrides.retention(config);
    if retention.messages == 0 || retention.contacts == 0 || retention.groups == 0 {
        return Err(BridgeError::Config(
            "retention overrides must be at least 1 day".to_string(),
        ));
    }

    let store = SqliteBridgeStore::from_config(config).await?;
    let report = store.cleanup_all(cancel, retention).await?;
    let purged = match overrides.purge_pending {
        Some(max_retries) => Some(store.purge_exhausted_pending_messages(cancel, max_retries).await?),
        None => None,
    };
    store.shutdown().await?;

    info!(total = report.total(), "cleanup finished");
    println!(
        "Removed {} message mapping(s) older than {} days",
        report.message_mappings, retention.messages
    );
    println!(
        "Removed {} contact(s) older than {} days",
        report.contacts, retention.contacts
    );
    println!(
        "Removed {} group(s) older than {} days",
        report.groups, retention.groups
    );
    if let (Some(count), Some(max_retries)) = (purged, overrides.purge_pending) {
        println!("Purged {count} pending Signal message(s) with {max_retries}+ failed attempts");
    }
    Ok(())
}

pub async fn run_stats(config: &BridgeConfig, cancel: &CancellationToken) -> Result<(), BridgeError> {
    let store = SqliteBridgeStore::from_config(config).await?;
    let stats = store.stats(cancel).await?;
    store.shutdown().await?;

    println!("  {:<26} {}", "message_mappings", stats.message_mappings);
    println!("  {:<26} {}", "contacts", stats.contacts);
    println!("  {:<26} {}", "groups", stats.groups);
    println!("  {:<26} {}", "pending_signal_messages", stats.pending_signal_messages);
    println!("  {:<26} {}", "applied_migrations", stats.applied_migrations);
    Ok(())
}
