// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `chatbridge check` command implementation.
//!
//! Reports whether the loaded configuration can actually be used: keys
//! derive from the secret, migrations are found, and the database answers.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use chatbridge_config::BridgeConfig;
use chatbridge_core::types::HealthStatus;
use chatbridge_core::{BridgeError, BridgeStorage};
use chatbridge_storage::{MigrationRunner, SqliteBridgeStore, encryptor_from_config};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn from_outcome(name: &'static str, start: Instant, outcome: Result<String, String>) -> Self {
        let (status, message) = match outcome {
            Ok(message) => (CheckStatus::Pass, message),
            Err(message) => (CheckStatus::Fail, message),
        };
        Self {
            name,
            status,
            message,
            duration: start.elapsed(),
        }
    }
}

/// Run every check and print a summary. Fails if any check failed.
pub async fn run_check(config: &BridgeConfig, plain: bool) -> Result<(), BridgeError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        check_config(config),
        check_keys(config),
        check_migrations(config),
        check_database(config).await,
    ];

    println!();
    println!("  chatbridge check");
    println!("  {}", "-".repeat(50));
    for result in &results {
        println!("{}", render_line(result, use_color));
    }
    println!();

    let failed = results
        .iter()
        .filter(|r| r.status == CheckStatus::Fail)
        .count();
    if failed == 0 {
        println!("  All checks passed.");
        println!();
        Ok(())
    } else {
        println!("  {failed} check(s) failed.");
        println!();
        Err(BridgeError::Internal(format!("{failed} check(s) failed")))
    }
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    let ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        match result.status {
            CheckStatus::Pass => format!(
                "    {} {:<12} {} ({ms}ms)",
                "✓".green(),
                result.name,
                result.message
            ),
            CheckStatus::Fail => format!(
                "    {} {:<12} {} ({ms}ms)",
                "✗".red(),
                result.name,
                result.message.red()
            ),
        }
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<12} {} ({ms}ms)", result.name, result.message)
    }
}

fn check_config(config: &BridgeConfig) -> CheckResult {
    let start = Instant::now();
    let outcome = chatbridge_config::validation::validate_config(config)
        .map(|()| "valid".to_string())
        .map_err(|errors| {
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        });
    CheckResult::from_outcome("Config", start, outcome)
}

fn check_keys(config: &BridgeConfig) -> CheckResult {
    let start = Instant::now();
    let outcome = encryptor_from_config(config)
        .map(|_| format!("derived ({} iterations)", config.encryption.kdf_iterations))
        .map_err(|e| e.to_string());
    CheckResult::from_outcome("Encryption", start, outcome)
}

fn check_migrations(config: &BridgeConfig) -> CheckResult {
    let start = Instant::now();
    let outcome = MigrationRunner::new(&config.storage.migrations_dir)
        .discover()
        .map(|files| format!("{} file(s) in {}", files.len(), config.storage.migrations_dir))
        .map_err(|e| e.to_string());
    CheckResult::from_outcome("Migrations", start, outcome)
}

async fn check_database(config: &BridgeConfig) -> CheckResult {
    let start = Instant::now();
    let outcome = probe_database(config).await;
    CheckResult::from_outcome("Database", start, outcome)
}

async fn probe_database(config: &BridgeConfig) -> Result<String, String> {
    let store = SqliteBridgeStore::from_config(config)
        .await
        .map_err(|e| e.to_string())?;
    let health = store.health_check().await.map_err(|e| e.to_string());
    let closed = store.shutdown().await.map_err(|e| e.to_string());
    match (health?, closed) {
        (HealthStatus::Healthy, Ok(())) => Ok(format!("healthy ({})", config.storage.database_path)),
        (HealthStatus::Unhealthy(reason), _) => Err(reason),
        (HealthStatus::Healthy, Err(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_tagged() {
        let result = CheckResult {
            name: "Database",
            status: CheckStatus::Fail,
            message: "locked".into(),
            duration: Duration::from_millis(3),
        };
        let line = render_line(&result, false);
        assert!(line.contains("[FAIL]"));
        assert!(line.contains("locked"));
        assert!(line.ends_with("(3ms)"));
    }

    #[test]
    fn missing_secret_fails_key_check() {
        let result = check_keys(&BridgeConfig::default());
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.message.contains("encryption.secret"));
    }

    #[test]
    fn missing_migrations_dir_fails() {
        let mut config = BridgeConfig::default();
        config.storage.migrations_dir = "/nonexistent/chatbridge/migrations".into();
        assert_eq!(check_migrations(&config).status, CheckStatus::Fail);
    }
}
