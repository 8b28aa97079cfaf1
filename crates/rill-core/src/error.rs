// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the rill orchestration layer.

use thiserror::Error;

/// The primary error type used across all rill crates.
///
/// Propagation policy: connection errors stay scoped to their connection,
/// processing errors are surfaced as channel-scoped `error` events, and
/// cache backend errors never appear here at all -- the cache absorbs them.
#[derive(Debug, Error)]
pub enum RillError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level connection errors. Drives the reconnection policy;
    /// never crashes the registry.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Registration or ingestion input rejected synchronously (bad or missing
    /// resource id, invalid token, missing conversation id).
    #[error("validation error: {0}")]
    Validation(String),

    /// Failure inside an external processing or persistence collaborator.
    /// Caught per-message; the router continues with the next item.
    #[error("processing error: {message}")]
    Processing {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Queue depth or connection count beyond configured bounds. New work is
    /// rejected at the boundary rather than queued unboundedly.
    #[error("resource exhausted: {resource} at limit {limit}")]
    ResourceExhausted { resource: String, limit: usize },

    /// Cleanup did not complete within its budget; the worker was force-cancelled.
    #[error("shutdown did not complete within {duration:?}")]
    ShutdownTimeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_stable() {
        let e = RillError::Validation("resource_id is required".into());
        assert_eq!(e.to_string(), "validation error: resource_id is required");

        let e = RillError::ResourceExhausted {
            resource: "router queue".into(),
            limit: 256,
        };
        assert_eq!(e.to_string(), "resource exhausted: router queue at limit 256");
    }

    #[test]
    fn connection_error_carries_source() {
        let e = RillError::Connection {
            message: "stream closed".into(),
            source: Some(Box::new(std::io::Error::other("reset"))),
        };
        assert!(e.to_string().contains("stream closed"));
    }
}
