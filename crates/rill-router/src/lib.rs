// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sequential message routing pipeline.
//!
//! Accepted input messages land in one bounded FIFO queue consumed by a
//! single worker. Each message walks a fixed sequence: typing-on, process,
//! persist, result delivery, typing-off. The single worker is what makes
//! per-conversation processing strictly sequential; there is never more
//! than one message of a conversation between its typing indicators.
//!
//! Collaborator failures are caught per message: the typing indicator is
//! forced off, an `error` event goes out with a non-sensitive summary, and
//! the worker moves on. Nothing a collaborator does can stop the router.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rill_bus::EventBus;
use rill_config::RouterConfig;
use rill_core::{
    ChannelId, Event, EventPayload, InputMessage, MessageProcessor, MessageRepository,
    ProcessingPhase, RillError,
};
use rill_registry::ConnectionRegistry;

/// Entry point for the routing pipeline.
pub struct MessageRouter;

impl MessageRouter {
    /// Start the worker and return the handle used to feed and stop it.
    pub fn spawn(
        processor: Arc<dyn MessageProcessor>,
        repository: Arc<dyn MessageRepository>,
        registry: Arc<ConnectionRegistry>,
        bus: Arc<EventBus>,
        config: RouterConfig,
    ) -> RouterHandle {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let phases: Arc<DashMap<String, ProcessingPhase>> = Arc::new(DashMap::new());
        let cancel = CancellationToken::new();

        let worker = Worker {
            processor,
            repository,
            registry,
            bus,
            phases: Arc::clone(&phases),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms.max(1)),
        };
        let task = tokio::spawn(worker.run(rx, cancel.clone()));

        RouterHandle {
            queue: tx,
            phases,
            cancel,
            task: tokio::sync::Mutex::new(Some(task)),
            queue_capacity: config.queue_capacity.max(1),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }
}

/// Handle to a running router: ingestion, phase inspection, shutdown.
pub struct RouterHandle {
    queue: mpsc::Sender<InputMessage>,
    phases: Arc<DashMap<String, ProcessingPhase>>,
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    queue_capacity: usize,
    shutdown_timeout: Duration,
}

impl RouterHandle {
    /// Accept `message` into the queue.
    ///
    /// A missing conversation id is rejected before the queue is touched;
    /// a full queue rejects the message rather than blocking the caller.
    pub fn submit(&self, message: InputMessage) -> Result<(), RillError> {
        if message.conversation_id.trim().is_empty() {
            return Err(RillError::Validation(
                "conversation_id is required".to_string(),
            ));
        }
        let conversation = message.conversation_id.clone();
        match self.queue.try_send(message) {
            Ok(()) => {
                self.phases
                    .entry(conversation)
                    .or_insert(ProcessingPhase::Queued);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(RillError::ResourceExhausted {
                resource: "router queue".to_string(),
                limit: self.queue_capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RillError::Internal(
                "router worker is not running".to_string(),
            )),
        }
    }

    /// Current processing phase for a conversation. Conversations with no
    /// in-flight work are `Idle`.
    pub fn phase(&self, conversation_id: &str) -> ProcessingPhase {
        self.phases
            .get(conversation_id)
            .map(|p| *p)
            .unwrap_or(ProcessingPhase::Idle)
    }

    /// Stop the worker, waiting up to the configured timeout for the
    /// in-flight message to finish its sequence. Safe to call once; later
    /// calls are no-ops.
    pub async fn shutdown(&self) -> Result<(), RillError> {
        self.cancel.cancel();
        let Some(mut task) = self.task.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
            Ok(join) => {
                if join.is_err() {
                    warn!("router worker panicked before shutdown completed");
                }
                info!("router shut down cleanly");
                Ok(())
            }
            Err(_) => {
                task.abort();
                let err = RillError::ShutdownTimeout {
                    duration: self.shutdown_timeout,
                };
                warn!(error = %err, "forcing router worker cancellation");
                Err(err)
            }
        }
    }
}

struct Worker {
    processor: Arc<dyn MessageProcessor>,
    repository: Arc<dyn MessageRepository>,
    registry: Arc<ConnectionRegistry>,
    bus: Arc<EventBus>,
    phases: Arc<DashMap<String, ProcessingPhase>>,
    poll_timeout: Duration,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<InputMessage>, cancel: CancellationToken) {
        info!("router worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            // Bounded poll so cancellation is observed even on an idle queue.
            match tokio::time::timeout(self.poll_timeout, rx.recv()).await {
                Ok(Some(message)) => self.process_one(message).await,
                Ok(None) => break,
                Err(_) => continue,
            }
        }
        info!("router worker stopped");
    }

    async fn process_one(&self, message: InputMessage) {
        let conversation = message.conversation_id.clone();
        let channel = ChannelId::conversation(&conversation);
        debug!(conversation = %conversation, message = %message.id, "processing message");

        self.set_phase(&conversation, ProcessingPhase::Typing);
        self.emit(
            &channel,
            EventPayload::TypingIndicator {
                conversation_id: conversation.clone(),
                is_typing: true,
            },
        );

        self.set_phase(&conversation, ProcessingPhase::Processing);
        let outcome = match self.processor.process(&message).await {
            Ok(reply) => {
                self.set_phase(&conversation, ProcessingPhase::Persisting);
                self.repository
                    .persist(&conversation, &reply)
                    .await
                    .map(|()| reply)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(reply) => {
                self.emit(
                    &channel,
                    EventPayload::MessageCreated {
                        conversation_id: conversation.clone(),
                        message_id: reply.id.clone(),
                        role: reply.role.clone(),
                        content: reply.content.clone(),
                    },
                );
                self.emit_typing_off(&channel, &conversation);
                debug!(conversation = %conversation, reply = %reply.id, "message processed");
            }
            Err(e) => {
                warn!(conversation = %conversation, error = %e, "message processing failed");
                // Clients must never be left with a stuck typing indicator.
                self.emit_typing_off(&channel, &conversation);
                self.emit(
                    &channel,
                    EventPayload::Error {
                        conversation_id: Some(conversation.clone()),
                        message: e.to_string(),
                    },
                );
            }
        }

        self.phases.remove(&conversation);
    }

    fn emit_typing_off(&self, channel: &ChannelId, conversation: &str) {
        self.emit(
            channel,
            EventPayload::TypingIndicator {
                conversation_id: conversation.to_string(),
                is_typing: false,
            },
        );
    }

    /// Deliver on both paths: direct to connections via the registry, then
    /// to bus subscribers (flagged as a duplicate of the direct delivery)
    /// on the event's own channel and mirrored on the global channel.
    fn emit(&self, channel: &ChannelId, payload: EventPayload) {
        let event = Event::new(channel.clone(), payload);
        self.registry.send(channel, &event);
        let copy = event.as_duplicate();
        self.bus.publish(channel, copy.clone());
        self.bus.publish(&ChannelId::global(), copy);
    }

    fn set_phase(&self, conversation: &str, phase: ProcessingPhase) {
        self.phases.insert(conversation.to_string(), phase);
    }
}
