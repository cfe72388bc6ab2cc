// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the chatbridge store.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Top-level chatbridge configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. Every section except `encryption.secret` has a default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Database location and engine settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Field encryption settings.
    #[serde(default)]
    pub encryption: EncryptionConfig,

    /// Retry policy for transient engine failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Retention windows used by cleanup.
    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory holding the numbered `.sql` migration files.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,

    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// How long SQLite waits on a locked database before giving up, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            migrations_dir: default_migrations_dir(),
            wal_mode: true,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("chatbridge").join("chatbridge.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("chatbridge.db"))
        .display()
        .to_string()
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Field encryption configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    /// Master secret. Required; at least 32 characters. Never written back out.
    #[serde(default, skip_serializing)]
    pub secret: Option<SecretString>,

    /// Override for the field encryption salt.
    #[serde(default)]
    pub salt: Option<String>,

    /// Override for the lookup hash salt.
    #[serde(default)]
    pub lookup_salt: Option<String>,

    /// PBKDF2 iteration count.
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            salt: None,
            lookup_salt: None,
            kdf_iterations: default_kdf_iterations(),
        }
    }
}

impl EncryptionConfig {
    /// The configured secret, if any.
    pub fn secret(&self) -> Option<SecretString> {
        self.secret.clone()
    }
}

fn default_kdf_iterations() -> u32 {
    100_000
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

/// Retention configuration, in days.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    #[serde(default = "default_message_days")]
    pub message_days: u32,

    #[serde(default = "default_cache_days")]
    pub contact_days: u32,

    #[serde(default = "default_cache_days")]
    pub group_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_days: default_message_days(),
            contact_days: default_cache_days(),
            group_days: default_cache_days(),
        }
    }
}

fn default_message_days() -> u32 {
    30
}

fn default_cache_days() -> u32 {
    7
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
