// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! chatbridge - maintenance CLI for the encrypted bridge store.

mod check;
mod maintenance;
mod shutdown;

use std::path::PathBuf;

use chatbridge_config::BridgeConfig;
use clap::{Parser, Subcommand};

/// Maintenance CLI for the chatbridge message store.
#[derive(Parser, Debug)]
#[command(name = "chatbridge", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending schema migrations.
    Migrate,
    /// Delete rows older than the retention windows.
    Cleanup {
        /// Override `retention.message_days`.
        #[arg(long)]
        message_days: Option<u32>,
        /// Override `retention.contact_days`.
        #[arg(long)]
        contact_days: Option<u32>,
        /// Override `retention.group_days`.
        #[arg(long)]
        group_days: Option<u32>,
        /// Also drop queued Signal messages that failed this many times.
        #[arg(long)]
        purge_pending: Option<u32>,
    },
    /// Print row counts for every table.
    Stats,
    /// Validate configuration, derive keys, and check the database.
    Check {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => chatbridge_config::load_and_validate_path(path),
        None => chatbridge_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            chatbridge_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level);

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &BridgeConfig) -> Result<(), chatbridge_core::BridgeError> {
    let cancel = shutdown::install_signal_handler();
    match command {
        Commands::Migrate => maintenance::run_migrate(config).await,
        Commands::Cleanup {
            message_days,
            contact_days,
            group_days,
            purge_pending,
        } => {
            let overrides = maintenance::CleanupOverrides {
                message_days,
                contact_days,
                group_days,
                purge_pending,
            };
            maintenance::run_cleanup(config, &overrides, &cancel).await
        }
        Commands::Stats => maintenance::run_stats(config, &cancel).await,
        Commands::Check { plain } => check::run_check(config, plain).await,
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatbridge={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cleanup_overrides_parse() {
        let cli = Cli::parse_from([
            "chatbridge",
            "--config",
            "/tmp/c.toml",
            "cleanup",
            "--message-days",
            "10",
            "--purge-pending",
            "5",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        match cli.command {
            Commands::Cleanup {
                message_days,
                contact_days,
                purge_pending,
                ..
            } => {
                assert_eq!(message_days, Some(10));
                assert_eq!(contact_days, None);
                assert_eq!(purge_pending, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
