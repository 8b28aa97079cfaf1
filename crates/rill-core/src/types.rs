// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the rill workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::RillError;

/// The scope class of a delivery channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Global,
    Workspace,
    Conversation,
}

/// Addressable scope for event delivery: a kind plus an optional resource id.
///
/// Non-global kinds require a concrete resource id; the global channel takes
/// none. Channels are implicit -- they exist only as keys in the bus and
/// registry maps while someone is subscribed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub kind: ChannelKind,
    pub resource_id: Option<String>,
}

impl ChannelId {
    /// Build a channel id, enforcing the resource-id rules.
    pub fn new(kind: ChannelKind, resource_id: Option<String>) -> Result<Self, RillError> {
        match (kind, &resource_id) {
            (ChannelKind::Global, None) => Ok(Self { kind, resource_id }),
            (ChannelKind::Global, Some(_)) => Err(RillError::Validation(
                "global channel takes no resource_id".to_string(),
            )),
            (_, Some(id)) if !id.trim().is_empty() => Ok(Self { kind, resource_id }),
            (kind, _) => Err(RillError::Validation(format!(
                "{kind} channel requires a non-empty resource_id"
            ))),
        }
    }

    /// The process-wide global channel.
    pub fn global() -> Self {
        Self {
            kind: ChannelKind::Global,
            resource_id: None,
        }
    }

    /// Channel scoped to a single workspace.
    pub fn workspace(id: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::Workspace,
            resource_id: Some(id.into()),
        }
    }

    /// Channel scoped to a single conversation.
    pub fn conversation(id: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::Conversation,
            resource_id: Some(id.into()),
        }
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.resource_id {
            Some(id) => write!(f, "{}/{}", self.kind, id),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Lifecycle state of a streaming connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Error,
}

/// One client's long-lived subscription to a channel.
///
/// Owned exclusively by the connection registry; never shared across channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub channel: ChannelId,
    pub user_id: String,
    pub state: ConnectionState,
    pub created_at: String,
    pub last_active_at: String,
}

/// Discriminant for event payloads; the wire-level `type` names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageCreated,
    MessageUpdated,
    TypingIndicator,
    ToolExecutionStarted,
    ToolExecutionCompleted,
    ConversationUpdated,
    Heartbeat,
    Connect,
    Notification,
    SystemUpdate,
    Error,
}

/// Closed tagged union of event payloads -- one shape per event type,
/// discriminated by `type` at the serialization boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    MessageCreated {
        conversation_id: String,
        message_id: String,
        role: String,
        content: String,
    },
    MessageUpdated {
        conversation_id: String,
        message_id: String,
        content: String,
    },
    TypingIndicator {
        conversation_id: String,
        is_typing: bool,
    },
    ToolExecutionStarted {
        conversation_id: String,
        tool_name: String,
    },
    ToolExecutionCompleted {
        conversation_id: String,
        tool_name: String,
        success: bool,
    },
    ConversationUpdated {
        conversation_id: String,
    },
    Heartbeat {
        sent_at: String,
    },
    Connect {
        connection_id: String,
    },
    Notification {
        title: Option<String>,
        body: String,
    },
    SystemUpdate {
        message: String,
    },
    Error {
        conversation_id: Option<String>,
        message: String,
    },
}

impl EventPayload {
    /// The event type this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageCreated { .. } => EventKind::MessageCreated,
            Self::MessageUpdated { .. } => EventKind::MessageUpdated,
            Self::TypingIndicator { .. } => EventKind::TypingIndicator,
            Self::ToolExecutionStarted { .. } => EventKind::ToolExecutionStarted,
            Self::ToolExecutionCompleted { .. } => EventKind::ToolExecutionCompleted,
            Self::ConversationUpdated { .. } => EventKind::ConversationUpdated,
            Self::Heartbeat { .. } => EventKind::Heartbeat,
            Self::Connect { .. } => EventKind::Connect,
            Self::Notification { .. } => EventKind::Notification,
            Self::SystemUpdate { .. } => EventKind::SystemUpdate,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

/// A typed, timestamped notification delivered to channel subscribers.
///
/// Events are transient: constructed by the router or a collaborator,
/// fanned out once, never persisted or replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub channel: ChannelId,
    pub payload: EventPayload,
    pub created_at: String,
    /// Set on the bus-published copy of an event that was already delivered
    /// directly by the registry, so consumers subscribed to both paths can
    /// de-duplicate by event id.
    #[serde(default)]
    pub duplicate: bool,
}

impl Event {
    /// Create a fresh event addressed to `channel`.
    pub fn new(channel: ChannelId, payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel,
            payload,
            created_at: chrono::Utc::now().to_rfc3339(),
            duplicate: false,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// A copy of this event flagged as a second-path delivery.
    pub fn as_duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.duplicate = true;
        copy
    }
}

/// A discrete inbound message accepted at the ingestion boundary and
/// consumed exactly once by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputMessage {
    pub id: String,
    /// Required and non-optional; messages without a conversation id are
    /// rejected before they ever reach the queue.
    pub conversation_id: String,
    pub content: String,
    pub role: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl InputMessage {
    /// Create a user-role message with a fresh id.
    pub fn new(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            content: content.into(),
            role: "user".to_string(),
            metadata: None,
        }
    }
}

/// Per-conversation processing phase tracked by the router.
///
/// The router's core ordering invariant: at most one non-idle phase per
/// conversation id at any instant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPhase {
    Idle,
    Queued,
    Typing,
    Processing,
    Persisting,
}

/// The processing collaborator's output for one input message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
}

impl ProcessedMessage {
    /// Create an assistant-role reply with a fresh id.
    pub fn assistant(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_requires_resource_for_scoped_kinds() {
        assert!(ChannelId::new(ChannelKind::Conversation, None).is_err());
        assert!(ChannelId::new(ChannelKind::Workspace, Some("  ".into())).is_err());
        assert!(ChannelId::new(ChannelKind::Conversation, Some("c1".into())).is_ok());
    }

    #[test]
    fn channel_id_global_rejects_resource() {
        assert!(ChannelId::new(ChannelKind::Global, Some("x".into())).is_err());
        assert!(ChannelId::new(ChannelKind::Global, None).is_ok());
    }

    #[test]
    fn channel_id_display() {
        assert_eq!(ChannelId::global().to_string(), "global");
        assert_eq!(ChannelId::conversation("c1").to_string(), "conversation/c1");
        assert_eq!(ChannelId::workspace("w9").to_string(), "workspace/w9");
    }

    #[test]
    fn event_payload_serializes_with_type_tag() {
        let payload = EventPayload::TypingIndicator {
            conversation_id: "c1".into(),
            is_typing: true,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "typing_indicator");
        assert_eq!(json["is_typing"], true);

        let back: EventPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn event_kind_matches_payload() {
        let payload = EventPayload::Error {
            conversation_id: Some("c1".into()),
            message: "boom".into(),
        };
        assert_eq!(payload.kind(), EventKind::Error);
        assert_eq!(EventKind::Error.to_string(), "error");
        assert_eq!(
            EventKind::ToolExecutionStarted.to_string(),
            "tool_execution_started"
        );
    }

    #[test]
    fn event_duplicate_copy_keeps_id() {
        let event = Event::new(
            ChannelId::conversation("c1"),
            EventPayload::ConversationUpdated {
                conversation_id: "c1".into(),
            },
        );
        assert!(!event.duplicate);
        let copy = event.as_duplicate();
        assert!(copy.duplicate);
        assert_eq!(copy.id, event.id);
    }

    #[test]
    fn input_message_defaults_to_user_role() {
        let msg = InputMessage::new("c1", "hi");
        assert_eq!(msg.role, "user");
        assert_eq!(msg.conversation_id, "c1");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn processing_phase_display() {
        assert_eq!(ProcessingPhase::Idle.to_string(), "idle");
        assert_eq!(ProcessingPhase::Typing.to_string(), "typing");
    }
}
