// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order: compiled defaults < `/etc/rill/rill.toml` < `./rill.toml`
//! < `RILL_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RillConfig;

/// Load configuration from the standard file hierarchy with env overrides.
pub fn load_config() -> Result<RillConfig, figment::Error> {
    tracing::debug!("loading config: defaults < /etc/rill/rill.toml < ./rill.toml < RILL_* env");
    Figment::new()
        .merge(Serialized::defaults(RillConfig::default()))
        .merge(Toml::file("/etc/rill/rill.toml"))
        .merge(Toml::file("rill.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from an inline TOML string only (no file lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<RillConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RillConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RillConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RillConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `RILL_ROUTER_POLL_TIMEOUT_MS` must map
/// to `router.poll_timeout_ms`, not `router.poll.timeout.ms`.
fn env_provider() -> Env {
    Env::prefixed("RILL_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("cache_", "cache.", 1)
            .replacen("router_", "router.", 1)
            .replacen("stream_", "stream.", 1)
            .replacen("reconnect_", "reconnect.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_empty_string_gives_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.server.port, 7410);
        assert_eq!(config.stream.max_connections, 1024);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [server]
            port = 9000

            [reconnect]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.reconnect.max_attempts, 3);
        // Untouched sections keep their defaults.
        assert_eq!(config.router.poll_timeout_ms, 250);
    }

    #[test]
    fn invalid_section_fails_extraction() {
        let result = load_config_from_str("[nope]\nkey = 1\n");
        assert!(result.is_err());
    }
}
