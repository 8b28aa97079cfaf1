// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! These are the narrow seams through which the core consumes external
//! systems: the response-producing algorithm, the persistence layer, and
//! the auth service. All use `#[async_trait]` for dynamic dispatch.

pub mod auth;
pub mod processor;
pub mod repository;

pub use auth::TokenValidator;
pub use processor::MessageProcessor;
pub use repository::MessageRepository;
