// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auth collaborator trait for streaming registration.

use async_trait::async_trait;

use crate::error::RillError;

/// External collaborator that resolves an auth token to a user id.
///
/// Token issuance is out of scope; the registry only needs resolution at
/// registration time. A failed resolution is a `Validation` error and the
/// connection is never opened.
#[async_trait]
pub trait TokenValidator: Send + Sync + 'static {
    /// Resolve `token` to a user id.
    async fn validate(&self, token: &str) -> Result<String, RillError>;
}
