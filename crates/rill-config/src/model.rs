// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the rill orchestration layer.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup rather than silently ignoring typos.

use serde::{Deserialize, Serialize};

/// Top-level rill configuration.
///
/// Loaded from `rill.toml` with `RILL_*` environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RillConfig {
    /// Gateway server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Key-value cache backend settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Message router settings.
    #[serde(default)]
    pub router: RouterConfig,

    /// Streaming connection settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Client reconnection policy settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token for the ingestion endpoint. `None` means auth is
    /// unconfigured and the gateway rejects all ingestion (fail-closed).
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7410
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Key-value cache backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Redis connection URL. `None` runs on the in-process store only.
    #[serde(default)]
    pub url: Option<String>,

    /// Per-operation timeout in milliseconds before the backend is treated
    /// as unreachable.
    #[serde(default = "default_cache_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// Attempts per operation before falling back.
    #[serde(default = "default_cache_retry_attempts")]
    pub retry_attempts: u32,

    /// Minimum seconds between reconnection probes while degraded.
    #[serde(default = "default_cache_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Interval for the in-process store's expiry sweep.
    #[serde(default = "default_cache_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            op_timeout_ms: default_cache_op_timeout_ms(),
            retry_attempts: default_cache_retry_attempts(),
            probe_interval_secs: default_cache_probe_interval_secs(),
            sweep_interval_secs: default_cache_sweep_interval_secs(),
        }
    }
}

fn default_cache_op_timeout_ms() -> u64 {
    500
}

fn default_cache_retry_attempts() -> u32 {
    2
}

fn default_cache_probe_interval_secs() -> u64 {
    10
}

fn default_cache_sweep_interval_secs() -> u64 {
    60
}

/// Message router configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Bounded ingestion queue capacity; submissions beyond this are
    /// rejected with a resource-exhaustion error.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Worker dequeue poll timeout in milliseconds. Bounds how long the
    /// worker blocks before re-checking for cancellation.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Seconds to wait for the in-flight item during shutdown before
    /// force-cancelling the worker.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            poll_timeout_ms: default_poll_timeout_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_poll_timeout_ms() -> u64 {
    250
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

/// Streaming connection registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    /// Heartbeat interval in seconds for each open connection.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Maximum concurrently open connections across all channels.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Buffered events per connection sink before sends are dropped.
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            max_connections: default_max_connections(),
            connection_buffer: default_connection_buffer(),
        }
    }
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1024
}

fn default_connection_buffer() -> usize {
    64
}

/// Client reconnection policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Base delay in milliseconds; attempt N waits `base * N` capped at max.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on the computed delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Hard cap on automatic attempts; beyond it the connection stays
    /// errored until manually retried.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    10
}
