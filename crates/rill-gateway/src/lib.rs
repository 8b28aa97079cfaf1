// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the rill orchestration layer.
//!
//! Exposes the two external surfaces: message ingestion
//! (`POST /v1/messages`, bearer-authenticated, fail-closed) and the
//! long-lived event stream (`GET /v1/stream`, token-authenticated via the
//! connection registry), plus an unauthenticated `/health` endpoint.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod sse;

pub use auth::AuthConfig;
pub use server::{build_router, start_server, GatewayState, HealthState};
