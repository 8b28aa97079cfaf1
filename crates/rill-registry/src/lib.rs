// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of live streaming connections.
//!
//! The registry owns every open client connection: registration (channel
//! validation, token resolution, connection cap), delivery of events to the
//! connections on a channel, per-connection heartbeats, and teardown. A
//! connection whose sink stops accepting events is marked errored and
//! removed; the heartbeat doubles as a liveness monitor for idle channels.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rill_config::StreamConfig;
use rill_core::{
    ChannelId, ChannelKind, Connection, ConnectionState, Event, EventPayload, RillError,
    TokenValidator,
};

struct ConnHandle {
    connection: Connection,
    tx: mpsc::Sender<Event>,
    heartbeat: JoinHandle<()>,
}

/// Owner of all live streaming connections, keyed by channel.
///
/// All map mutations go through `dashmap`; delivery never holds an entry
/// lock across an await point.
pub struct ConnectionRegistry {
    validator: Arc<dyn TokenValidator>,
    config: StreamConfig,
    channels: DashMap<ChannelId, Vec<ConnHandle>>,
    /// connection id -> channel, for O(1) close and cap accounting.
    index: DashMap<String, ChannelId>,
}

impl ConnectionRegistry {
    pub fn new(validator: Arc<dyn TokenValidator>, config: StreamConfig) -> Self {
        Self {
            validator,
            config,
            channels: DashMap::new(),
            index: DashMap::new(),
        }
    }

    /// Open a streaming connection on the requested channel.
    ///
    /// Validates the channel coordinates, resolves the token to a user id,
    /// and enforces the connection cap -- in that order, so an invalid
    /// request never consumes a slot. The returned receiver sees a `connect`
    /// event first, then everything delivered to the channel.
    pub async fn register(
        self: &Arc<Self>,
        kind: ChannelKind,
        resource_id: Option<String>,
        token: &str,
    ) -> Result<(Connection, mpsc::Receiver<Event>), RillError> {
        let channel = ChannelId::new(kind, resource_id)?;
        let user_id = self.validator.validate(token).await?;

        if self.index.len() >= self.config.max_connections {
            return Err(RillError::ResourceExhausted {
                resource: "stream_connections".to_string(),
                limit: self.config.max_connections,
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        let connection = Connection {
            id: uuid::Uuid::new_v4().to_string(),
            channel: channel.clone(),
            user_id,
            state: ConnectionState::Open,
            created_at: now.clone(),
            last_active_at: now,
        };

        let (tx, rx) = mpsc::channel(self.config.connection_buffer.max(1));

        let connect = Event::new(
            channel.clone(),
            EventPayload::Connect {
                connection_id: connection.id.clone(),
            },
        );
        // Fresh sink, cannot be full; a failure here means the caller
        // already dropped the receiver.
        if tx.try_send(connect).is_err() {
            debug!(connection = %connection.id, "receiver dropped before connect event");
        }

        let heartbeat = self.spawn_heartbeat(connection.id.clone(), channel.clone());

        self.index.insert(connection.id.clone(), channel.clone());
        self.channels.entry(channel.clone()).or_default().push(ConnHandle {
            connection: connection.clone(),
            tx,
            heartbeat,
        });

        info!(
            connection = %connection.id,
            channel = %channel,
            user = %connection.user_id,
            "streaming connection registered"
        );
        Ok((connection, rx))
    }

    /// Deliver `event` to every open connection on exactly `channel`.
    ///
    /// A connection that refuses the event (full or closed sink) is marked
    /// errored and torn down. Returns the number of connections reached.
    pub fn send(&self, channel: &ChannelId, event: &Event) -> usize {
        let mut delivered = 0;
        let mut failed: Vec<String> = Vec::new();

        if let Some(mut handles) = self.channels.get_mut(channel) {
            let now = chrono::Utc::now().to_rfc3339();
            for handle in handles.iter_mut() {
                match handle.tx.try_send(event.clone()) {
                    Ok(()) => {
                        handle.connection.last_active_at = now.clone();
                        delivered += 1;
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            connection = %handle.connection.id,
                            channel = %channel,
                            "connection sink full, tearing down"
                        );
                        handle.connection.state = ConnectionState::Error;
                        failed.push(handle.connection.id.clone());
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(
                            connection = %handle.connection.id,
                            channel = %channel,
                            "connection sink closed, tearing down"
                        );
                        handle.connection.state = ConnectionState::Error;
                        failed.push(handle.connection.id.clone());
                    }
                }
            }
        }

        for id in failed {
            self.close(&id);
        }
        delivered
    }

    /// Tear down one connection: abort its heartbeat, drop its sink, and
    /// forget its id. Nothing further is emitted for the id. Unknown ids
    /// are ignored, so teardown paths may race without harm.
    pub fn close(&self, connection_id: &str) {
        let Some((_, channel)) = self.index.remove(connection_id) else {
            return;
        };
        let mut remove_channel = false;
        if let Some(mut handles) = self.channels.get_mut(&channel) {
            if let Some(pos) = handles
                .iter()
                .position(|h| h.connection.id == connection_id)
            {
                let handle = handles.remove(pos);
                handle.heartbeat.abort();
            }
            remove_channel = handles.is_empty();
        }
        if remove_channel {
            self.channels.remove_if(&channel, |_, handles| handles.is_empty());
        }
        info!(connection = %connection_id, channel = %channel, "connection closed");
    }

    /// Close every live connection. Used on process shutdown.
    pub fn close_all(&self) {
        let ids: Vec<String> = self.index.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.close(&id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.index.len()
    }

    /// Snapshot of one connection's metadata, if it is still live.
    pub fn connection(&self, connection_id: &str) -> Option<Connection> {
        let channel = self.index.get(connection_id).map(|r| r.value().clone())?;
        self.channels.get(&channel)?.iter().find_map(|h| {
            (h.connection.id == connection_id).then(|| h.connection.clone())
        })
    }

    fn spawn_heartbeat(self: &Arc<Self>, connection_id: String, channel: ChannelId) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let period = Duration::from_secs(self.config.heartbeat_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; the connect event already
            // proved the sink live, so skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if !registry.heartbeat_tick(&connection_id, &channel) {
                    debug!(connection = %connection_id, "heartbeat undeliverable, closing connection");
                    registry.close(&connection_id);
                    break;
                }
            }
        })
    }

    /// Send one heartbeat to a single connection. False when the connection
    /// is gone or its sink no longer accepts events.
    fn heartbeat_tick(&self, connection_id: &str, channel: &ChannelId) -> bool {
        let Some(mut handles) = self.channels.get_mut(channel) else {
            return false;
        };
        let Some(handle) = handles
            .iter_mut()
            .find(|h| h.connection.id == connection_id)
        else {
            return false;
        };
        let event = Event::new(
            channel.clone(),
            EventPayload::Heartbeat {
                sent_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        match handle.tx.try_send(event) {
            Ok(()) => {
                handle.connection.last_active_at = chrono::Utc::now().to_rfc3339();
                true
            }
            Err(_) => {
                handle.connection.state = ConnectionState::Error;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::EventKind;

    struct AcceptAll;

    #[async_trait::async_trait]
    impl TokenValidator for AcceptAll {
        async fn validate(&self, token: &str) -> Result<String, RillError> {
            Ok(format!("user-{token}"))
        }
    }

    struct RejectAll;

    #[async_trait::async_trait]
    impl TokenValidator for RejectAll {
        async fn validate(&self, _token: &str) -> Result<String, RillError> {
            Err(RillError::Validation("token rejected".to_string()))
        }
    }

    fn registry_with(config: StreamConfig) -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new(Arc::new(AcceptAll), config))
    }

    fn registry() -> Arc<ConnectionRegistry> {
        registry_with(StreamConfig::default())
    }

    fn message_event(conversation: &str) -> Event {
        Event::new(
            ChannelId::conversation(conversation),
            EventPayload::ConversationUpdated {
                conversation_id: conversation.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn register_rejects_invalid_channel() {
        let registry = registry();
        let err = registry
            .register(ChannelKind::Conversation, None, "t")
            .await
            .unwrap_err();
        assert!(matches!(err, RillError::Validation(_)));
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn register_rejects_bad_token_before_opening() {
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(RejectAll),
            StreamConfig::default(),
        ));
        let err = registry
            .register(ChannelKind::Conversation, Some("c1".into()), "bad")
            .await
            .unwrap_err();
        assert!(matches!(err, RillError::Validation(_)));
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn register_emits_connect_event_first() {
        let registry = registry();
        let (connection, mut rx) = registry
            .register(ChannelKind::Conversation, Some("c1".into()), "t")
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind(), EventKind::Connect);
        assert!(matches!(
            first.payload,
            EventPayload::Connect { ref connection_id } if *connection_id == connection.id
        ));
        assert_eq!(connection.state, ConnectionState::Open);
        assert_eq!(connection.user_id, "user-t");
    }

    #[tokio::test]
    async fn connection_cap_is_enforced() {
        let registry = registry_with(StreamConfig {
            max_connections: 1,
            ..StreamConfig::default()
        });
        let _first = registry
            .register(ChannelKind::Conversation, Some("c1".into()), "t")
            .await
            .unwrap();

        let err = registry
            .register(ChannelKind::Conversation, Some("c2".into()), "t")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RillError::ResourceExhausted { limit: 1, .. }
        ));
        assert_eq!(registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn send_reaches_exact_channel_only() {
        let registry = registry();
        let (_, mut on_c1) = registry
            .register(ChannelKind::Conversation, Some("c1".into()), "t")
            .await
            .unwrap();
        let (_, mut on_c2) = registry
            .register(ChannelKind::Conversation, Some("c2".into()), "t")
            .await
            .unwrap();

        // Drain the connect events.
        assert_eq!(on_c1.recv().await.unwrap().kind(), EventKind::Connect);
        assert_eq!(on_c2.recv().await.unwrap().kind(), EventKind::Connect);

        let delivered = registry.send(&ChannelId::conversation("c1"), &message_event("c1"));
        assert_eq!(delivered, 1);

        let got = on_c1.recv().await.unwrap();
        assert_eq!(got.kind(), EventKind::ConversationUpdated);
        assert!(on_c2.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_is_torn_down_on_send() {
        let registry = registry();
        let (connection, rx) = registry
            .register(ChannelKind::Conversation, Some("c1".into()), "t")
            .await
            .unwrap();
        drop(rx);

        let delivered = registry.send(&ChannelId::conversation("c1"), &message_event("c1"));
        assert_eq!(delivered, 0);
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.connection(&connection.id).is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_stops_delivery() {
        let registry = registry();
        let (connection, _rx) = registry
            .register(ChannelKind::Conversation, Some("c1".into()), "t")
            .await
            .unwrap();

        registry.close(&connection.id);
        registry.close(&connection.id);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(
            registry.send(&ChannelId::conversation("c1"), &message_event("c1")),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_flow_on_the_configured_interval() {
        let registry = registry_with(StreamConfig {
            heartbeat_interval_secs: 1,
            ..StreamConfig::default()
        });
        let (_, mut rx) = registry
            .register(ChannelKind::Conversation, Some("c1".into()), "t")
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::Connect);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::Heartbeat);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_heartbeat_tears_the_connection_down() {
        let registry = registry_with(StreamConfig {
            heartbeat_interval_secs: 1,
            ..StreamConfig::default()
        });
        let (_, rx) = registry
            .register(ChannelKind::Conversation, Some("c1".into()), "t")
            .await
            .unwrap();
        drop(rx);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        // Let the heartbeat task observe the dead sink and run close().
        tokio::task::yield_now().await;
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn close_all_empties_the_registry() {
        let registry = registry();
        for id in ["c1", "c2", "c3"] {
            registry
                .register(ChannelKind::Conversation, Some(id.into()), "t")
                .await
                .unwrap();
        }
        assert_eq!(registry.connection_count(), 3);
        registry.close_all();
        assert_eq!(registry.connection_count(), 0);
    }
}
