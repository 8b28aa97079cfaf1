// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for ingestion and health.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use rill_core::{InputMessage, RillError};

use crate::server::GatewayState;

/// Request body for POST /v1/messages.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    /// Conversation the message belongs to. Required; the field is optional
    /// here only so its absence produces a 400 rather than a decode error.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Message content text.
    pub content: String,
    /// Sender role; defaults to "user".
    #[serde(default)]
    pub role: Option<String>,
    /// Opaque caller metadata, passed through to the processing collaborator.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Response body for an accepted message.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    /// Id assigned to the queued message.
    pub id: String,
    /// Always "accepted"; processing is asynchronous.
    pub status: String,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// POST /v1/messages
///
/// Accepts a message into the router queue and returns immediately; results
/// arrive on the conversation's event stream.
pub async fn post_messages(
    State(state): State<GatewayState>,
    Json(body): Json<MessageRequest>,
) -> Response {
    let conversation_id = match body.conversation_id {
        Some(ref id) if !id.trim().is_empty() => id.clone(),
        _ => {
            return error_response(StatusCode::BAD_REQUEST, "conversation_id is required");
        }
    };

    let mut message = InputMessage::new(conversation_id, body.content);
    if let Some(role) = body.role {
        message.role = role;
    }
    message.metadata = body.metadata;
    let id = message.id.clone();

    match state.router.submit(message) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(AcceptedResponse {
                id,
                status: "accepted".to_string(),
            }),
        )
            .into_response(),
        Err(e @ RillError::Validation(_)) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ RillError::ResourceExhausted { .. }) => {
            error_response(StatusCode::TOO_MANY_REQUESTS, e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "message submission failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// GET /health (unauthenticated).
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}
