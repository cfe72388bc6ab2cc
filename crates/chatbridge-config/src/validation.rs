// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use secrecy::ExposeSecret;

use crate::diagnostic::ConfigError;
use crate::model::BridgeConfig;

/// Minimum secret length, in characters.
pub const MIN_SECRET_CHARS: usize = 32;

/// Lowest PBKDF2 iteration count accepted from configuration.
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }
    if config.storage.migrations_dir.trim().is_empty() {
        fail("storage.migrations_dir must not be empty".to_string());
    }

    match config.encryption.secret.as_ref().map(|s| s.expose_secret()) {
        None => fail(format!(
            "encryption.secret is required (set it in chatbridge.toml or {}ENCRYPTION_SECRET)",
            crate::loader::ENV_PREFIX
        )),
        Some(secret) if secret.chars().count() < MIN_SECRET_CHARS => fail(format!(
            "encryption.secret must be at least {MIN_SECRET_CHARS} characters, got {}",
            secret.chars().count()
        )),
        Some(_) => {}
    }
    if config.encryption.kdf_iterations < MIN_KDF_ITERATIONS {
        fail(format!(
            "encryption.kdf_iterations must be at least {MIN_KDF_ITERATIONS}, got {}",
            config.encryption.kdf_iterations
        ));
    }

    if config.retry.max_attempts < 1 {
        fail("retry.max_attempts must be at least 1, got 0".to_string());
    }
    if config.retry.max_backoff_ms < config.retry.base_backoff_ms {
        fail(format!(
            "retry.max_backoff_ms ({}) must not be less than retry.base_backoff_ms ({})",
            config.retry.max_backoff_ms, config.retry.base_backoff_ms
        ));
    }

    for (key, days) in [
        ("retention.message_days", config.retention.message_days),
        ("retention.contact_days", config.retention.contact_days),
        ("retention.group_days", config.retention.group_days),
    ] {
        if days < 1 {
            fail(format!("{key} must be at least 1, got {days}"));
        }
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "logging.level `{}` is not one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
