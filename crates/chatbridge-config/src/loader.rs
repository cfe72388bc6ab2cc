// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./chatbridge.toml` > `~/.config/chatbridge/chatbridge.toml`
//! > `/etc/chatbridge/chatbridge.toml` with environment variable overrides via
//! the `CHATBRIDGE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::BridgeConfig;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "CHATBRIDGE_";

/// Config sections that environment variables may address.
const SECTIONS: &[&str] = &["storage", "encryption", "retry", "retention", "logging"];

const LOCAL_FILE: &str = "chatbridge.toml";
const SYSTEM_FILE: &str = "/etc/chatbridge/chatbridge.toml";

/// Path of the per-user config file, if a config directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chatbridge").join(LOCAL_FILE))
}

/// Every file consulted by [`load_config`], lowest precedence first.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_FILE)];
    paths.extend(user_config_path());
    paths.push(PathBuf::from(LOCAL_FILE));
    paths
}

/// Build the Figment used for hierarchy loading.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/chatbridge/chatbridge.toml` (system-wide)
/// 3. `~/.config/chatbridge/chatbridge.toml` (user XDG config)
/// 4. `./chatbridge.toml` (local directory)
/// 5. `CHATBRIDGE_*` environment variables
pub fn build_figment() -> Figment {
    config_file_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(BridgeConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
pub fn load_config() -> Result<BridgeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env vars).
pub fn load_config_from_str(toml_content: &str) -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider with explicit section mapping.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `CHATBRIDGE_STORAGE_BUSY_TIMEOUT_MS` maps to `storage.busy_timeout_ms`
/// and not `storage.busy.timeout.ms`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(map_env_key("storage_busy_timeout_ms"), "storage.busy_timeout_ms");
        assert_eq!(map_env_key("encryption_secret"), "encryption.secret");
        assert_eq!(map_env_key("retention_message_days"), "retention.message_days");
        assert_eq!(map_env_key("unrelated_key"), "unrelated_key");
    }

    #[test]
    fn file_paths_end_with_local_file() {
        let paths = config_file_paths();
        assert_eq!(paths.first(), Some(&PathBuf::from(SYSTEM_FILE)));
        assert_eq!(paths.last(), Some(&PathBuf::from(LOCAL_FILE)));
    }
}
