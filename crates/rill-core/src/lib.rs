// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the rill orchestration layer.
//!
//! This crate provides the shared data model (channels, events, input
//! messages, connection and processing state), the `RillError` taxonomy,
//! and the collaborator traits the core consumes external systems through.

pub mod error;
pub mod traits;
pub mod types;

pub use error::RillError;
pub use types::{
    ChannelId, ChannelKind, Connection, ConnectionState, Event, EventKind, EventPayload,
    InputMessage, ProcessedMessage, ProcessingPhase,
};

pub use traits::{MessageProcessor, MessageRepository, TokenValidator};
