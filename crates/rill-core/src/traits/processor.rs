// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Processing collaborator trait: turns an input message into a reply.

use async_trait::async_trait;

use crate::error::RillError;
use crate::types::{InputMessage, ProcessedMessage};

/// External collaborator that produces a response for an input message.
///
/// Implementations may be slow and IO-bound; the router awaits them from its
/// single worker, which is what serializes per-conversation processing.
#[async_trait]
pub trait MessageProcessor: Send + Sync + 'static {
    /// Produce the reply for `message`. Failures are caught per-message by
    /// the router and surfaced as channel-scoped `error` events.
    async fn process(&self, message: &InputMessage) -> Result<ProcessedMessage, RillError>;
}
