// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rill serve` command implementation.
//!
//! Wires the full pipeline: cache (with sweeper), event bus, connection
//! registry, router worker, and the HTTP gateway, then runs until a
//! shutdown signal arrives and unwinds everything in reverse order.
//!
//! The processing and persistence collaborators here are deliberately thin
//! stand-ins: an echo processor and a cache-backed repository. Production
//! deployments supply their own implementations of the collaborator traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use rill_bus::EventBus;
use rill_cache::KvCache;
use rill_config::model::RillConfig;
use rill_core::{
    ChannelId, InputMessage, MessageProcessor, MessageRepository, ProcessedMessage, RillError,
    TokenValidator,
};
use rill_gateway::{start_server, AuthConfig, GatewayState, HealthState};
use rill_registry::ConnectionRegistry;
use rill_router::MessageRouter;

use crate::shutdown::install_signal_handler;

/// How long persisted replies stay readable in the cache.
const REPLY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Echo collaborator: replies with the input content.
struct EchoProcessor;

#[async_trait]
impl MessageProcessor for EchoProcessor {
    async fn process(&self, message: &InputMessage) -> Result<ProcessedMessage, RillError> {
        Ok(ProcessedMessage::assistant(
            &message.conversation_id,
            format!("echo: {}", message.content),
        ))
    }
}

/// Persistence stand-in that writes replies into the cache under
/// `conversation:<id>:last_reply`.
struct CacheRepository {
    cache: Arc<KvCache>,
}

#[async_trait]
impl MessageRepository for CacheRepository {
    async fn persist(
        &self,
        conversation_id: &str,
        reply: &ProcessedMessage,
    ) -> Result<(), RillError> {
        let value = serde_json::to_string(reply).map_err(|e| RillError::Processing {
            message: format!("reply serialization failed: {e}"),
            source: Some(Box::new(e)),
        })?;
        self.cache
            .set(
                &format!("conversation:{conversation_id}:last_reply"),
                &value,
                Some(REPLY_TTL),
            )
            .await;
        Ok(())
    }
}

/// Stream-token validator reusing the gateway bearer token. Fail-closed:
/// with no token configured, no stream ever opens.
struct BearerTokenValidator {
    token: Option<String>,
    cache: Arc<KvCache>,
}

#[async_trait]
impl TokenValidator for BearerTokenValidator {
    async fn validate(&self, token: &str) -> Result<String, RillError> {
        match self.token {
            Some(ref expected) if token == expected => {
                self.cache.incr("metrics:stream_opens").await;
                Ok("api-user".to_string())
            }
            Some(_) => Err(RillError::Validation("invalid token".to_string())),
            None => Err(RillError::Validation(
                "no stream token configured".to_string(),
            )),
        }
    }
}

/// Runs the `rill serve` command.
pub async fn run_serve(config: RillConfig) -> Result<(), RillError> {
    init_tracing(&config.server.log_level);

    info!("starting rill serve");

    let cancel = install_signal_handler();

    let cache = Arc::new(KvCache::new(config.cache.clone()));
    let sweeper = cache.spawn_sweeper(cancel.child_token());

    let bus = Arc::new(EventBus::new());
    spawn_global_event_log(&bus, cancel.child_token());

    let registry = Arc::new(ConnectionRegistry::new(
        Arc::new(BearerTokenValidator {
            token: config.server.bearer_token.clone(),
            cache: Arc::clone(&cache),
        }),
        config.stream.clone(),
    ));

    let router = Arc::new(MessageRouter::spawn(
        Arc::new(EchoProcessor),
        Arc::new(CacheRepository {
            cache: Arc::clone(&cache),
        }),
        Arc::clone(&registry),
        Arc::clone(&bus),
        config.router.clone(),
    ));

    let state = GatewayState {
        router: Arc::clone(&router),
        registry: Arc::clone(&registry),
        auth: AuthConfig {
            bearer_token: config.server.bearer_token.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
        },
    };

    let result = start_server(&config.server, state, cancel.clone()).await;

    // Unwind: stop accepting, drain the router, drop connections, stop
    // background tasks.
    info!("shutting down");
    cancel.cancel();
    if let Err(e) = router.shutdown().await {
        warn!(error = %e, "router did not drain in time");
    }
    registry.close_all();
    if sweeper.await.is_err() {
        debug!("cache sweeper ended abnormally");
    }

    info!("rill serve stopped");
    result
}

/// Debug-level tap on the global channel so every published event is
/// visible in the logs without any client connected.
fn spawn_global_event_log(bus: &Arc<EventBus>, cancel: tokio_util::sync::CancellationToken) {
    let mut subscription = bus.subscribe(ChannelId::global());
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = subscription.receiver.recv() => {
                    match event {
                        Some(event) => {
                            debug!(
                                kind = %event.kind(),
                                channel = %event.channel,
                                duplicate = event.duplicate,
                                "event published"
                            );
                        }
                        None => break,
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    });
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rill={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_processor_reflects_input() {
        let reply = EchoProcessor
            .process(&InputMessage::new("c1", "hello"))
            .await
            .unwrap();
        assert_eq!(reply.content, "echo: hello");
        assert_eq!(reply.role, "assistant");
    }

    #[tokio::test]
    async fn cache_repository_stores_last_reply() {
        let cache = Arc::new(KvCache::in_memory());
        let repo = CacheRepository {
            cache: Arc::clone(&cache),
        };
        let reply = ProcessedMessage::assistant("c1", "r");
        repo.persist("c1", &reply).await.unwrap();

        let stored = cache.get("conversation:c1:last_reply").await.unwrap();
        assert!(stored.contains("\"content\":\"r\""));
    }

    #[tokio::test]
    async fn bearer_validator_is_fail_closed() {
        let cache = Arc::new(KvCache::in_memory());
        let unconfigured = BearerTokenValidator {
            token: None,
            cache: Arc::clone(&cache),
        };
        assert!(unconfigured.validate("anything").await.is_err());

        let configured = BearerTokenValidator {
            token: Some("secret".to_string()),
            cache,
        };
        assert!(configured.validate("wrong").await.is_err());
        assert_eq!(configured.validate("secret").await.unwrap(), "api-user");
    }
}
