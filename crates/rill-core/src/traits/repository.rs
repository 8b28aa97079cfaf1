// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence collaborator trait for processed replies.

use async_trait::async_trait;

use crate::error::RillError;
use crate::types::ProcessedMessage;

/// External collaborator that stores processing results.
///
/// Conversation and workspace storage live entirely behind this seam; the
/// core never queries them back (events are fire-and-forget).
#[async_trait]
pub trait MessageRepository: Send + Sync + 'static {
    /// Persist `reply` under its conversation.
    async fn persist(
        &self,
        conversation_id: &str,
        reply: &ProcessedMessage,
    ) -> Result<(), RillError>;
}
