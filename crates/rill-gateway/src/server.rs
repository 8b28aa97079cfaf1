// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use rill_config::ServerConfig;
use rill_core::RillError;
use rill_registry::ConnectionRegistry;
use rill_router::RouterHandle;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;
use crate::sse;

/// Health state for the unauthenticated health endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Handle into the routing pipeline.
    pub router: Arc<RouterHandle>,
    /// Registry opening and owning streaming connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Authentication configuration for the ingestion API.
    pub auth: AuthConfig,
    /// Health state for unauthenticated endpoints.
    pub health: HealthState,
}

/// Assemble the gateway route tree.
///
/// Split out from [`start_server`] so tests can drive the router without a
/// listening socket.
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    // Unauthenticated public routes (health for systemd and load balancers).
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    // Ingestion requires bearer auth; the stream endpoint authenticates its
    // own token through the registry.
    let api_routes = Router::new()
        .route("/v1/messages", post(handlers::post_messages))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state.clone());

    let stream_routes = Router::new()
        .route("/v1/stream", get(sse::get_stream))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(stream_routes)
        .layer(ConcurrencyLimitLayer::new(1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the gateway HTTP server.
///
/// Binds to the configured host:port and serves until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), RillError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RillError::Connection {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| RillError::Connection {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}
