// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic mock collaborators for exercising the router and gateway.
//!
//! Each mock implements one of the collaborator traits with scriptable
//! behavior: the processor replays a queue of canned outcomes (falling back
//! to an echo reply), the repository records what was persisted and can be
//! told to fail, and the token validator resolves a fixed token table.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use rill_core::{
    InputMessage, MessageProcessor, MessageRepository, ProcessedMessage, RillError, TokenValidator,
};

/// Scripted [`MessageProcessor`].
///
/// Pops one scripted outcome per call; with an empty script it echoes the
/// input content back as an assistant reply. An optional delay simulates a
/// slow collaborator.
pub struct MockProcessor {
    script: Mutex<VecDeque<Result<String, String>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockProcessor {
    /// A processor that always replies `echo: <content>`.
    pub fn echo() -> Self {
        Self::scripted([])
    }

    /// A processor that replays `outcomes` in order: `Ok(content)` becomes
    /// an assistant reply, `Err(message)` a processing error.
    pub fn scripted(outcomes: impl IntoIterator<Item = Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Add a fixed delay before every outcome.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `process` calls observed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageProcessor for MockProcessor {
    async fn process(&self, message: &InputMessage) -> Result<ProcessedMessage, RillError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().await.pop_front() {
            Some(Ok(content)) => Ok(ProcessedMessage::assistant(&message.conversation_id, content)),
            Some(Err(reason)) => Err(RillError::Processing {
                message: reason,
                source: None,
            }),
            None => Ok(ProcessedMessage::assistant(
                &message.conversation_id,
                format!("echo: {}", message.content),
            )),
        }
    }
}

/// Recording [`MessageRepository`].
///
/// Stores every persisted reply for later assertions. `failing(n)` makes
/// the first `n` persist calls fail with a processing error.
#[derive(Default)]
pub struct MockRepository {
    persisted: Mutex<Vec<ProcessedMessage>>,
    failures_remaining: AtomicUsize,
    calls: AtomicUsize,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose first `n` persist calls fail.
    pub fn failing(n: usize) -> Self {
        Self {
            failures_remaining: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Everything successfully persisted so far, in order.
    pub async fn persisted(&self) -> Vec<ProcessedMessage> {
        self.persisted.lock().await.clone()
    }

    /// Number of `persist` calls observed, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageRepository for MockRepository {
    async fn persist(
        &self,
        conversation_id: &str,
        reply: &ProcessedMessage,
    ) -> Result<(), RillError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.failures_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::Relaxed);
            return Err(RillError::Processing {
                message: format!("persist failed for {conversation_id}"),
                source: None,
            });
        }
        self.persisted.lock().await.push(reply.clone());
        Ok(())
    }
}

/// [`TokenValidator`] backed by a fixed token table.
#[derive(Default)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, String>,
}

impl StaticTokenValidator {
    /// A validator accepting exactly one token.
    pub fn single(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::default().allow(token, user_id)
    }

    pub fn allow(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<String, RillError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| RillError::Validation("unknown token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_processor_reflects_content() {
        let processor = MockProcessor::echo();
        let reply = processor.process(&InputMessage::new("c1", "hi")).await.unwrap();
        assert_eq!(reply.content, "echo: hi");
        assert_eq!(reply.conversation_id, "c1");
        assert_eq!(reply.role, "assistant");
        assert_eq!(processor.calls(), 1);
    }

    #[tokio::test]
    async fn scripted_processor_replays_outcomes_then_echoes() {
        let processor = MockProcessor::scripted([
            Ok("first".to_string()),
            Err("boom".to_string()),
        ]);
        let msg = InputMessage::new("c1", "hi");

        assert_eq!(processor.process(&msg).await.unwrap().content, "first");
        assert!(processor.process(&msg).await.is_err());
        assert_eq!(processor.process(&msg).await.unwrap().content, "echo: hi");
    }

    #[tokio::test]
    async fn failing_repository_recovers_after_n_calls() {
        let repo = MockRepository::failing(1);
        let reply = ProcessedMessage::assistant("c1", "r");

        assert!(repo.persist("c1", &reply).await.is_err());
        assert!(repo.persist("c1", &reply).await.is_ok());
        assert_eq!(repo.persisted().await.len(), 1);
        assert_eq!(repo.calls(), 2);
    }

    #[tokio::test]
    async fn static_validator_resolves_known_tokens_only() {
        let validator = StaticTokenValidator::single("secret", "user-1");
        assert_eq!(validator.validate("secret").await.unwrap(), "user-1");
        assert!(validator.validate("other").await.is_err());
    }
}
