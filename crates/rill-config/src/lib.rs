// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the rill orchestration layer.
//!
//! Layered loading (defaults, TOML files, `RILL_*` env vars) via Figment,
//! with `deny_unknown_fields` models so typos fail at startup.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    CacheConfig, ReconnectConfig, RillConfig, RouterConfig, ServerConfig, StreamConfig,
};
