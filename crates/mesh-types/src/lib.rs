//! # Mesh Types - Wire Format for Agent Messaging
//!
//! Defines the `AgentMessage` envelope and the registration records shared by
//! every crate in the workspace.
//!
//! ## Envelope Rules
//!
//! - All inter-agent communication is wrapped in an [`AgentMessage`] envelope
//! - The `sender` field of the envelope is the sole authority on identity
//! - A recipient of `"*"` addresses every subscribed agent except the sender
//! - The HMAC signature covers the canonical serialization of
//!   `{id, sender, recipient, action, payload, timestamp}` in that fixed
//!   order; `signature` and the mutable `status` field are excluded

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod errors;
pub mod message;
pub mod registration;

// Re-export main types
pub use errors::ValidationError;
pub use message::{
    response_action, AgentId, AgentMessage, DeliveryStatus, Recipient, RESPONSE_SUFFIX,
};
pub use registration::{AgentRegistration, AgentStatus, Capability};

/// API version stamped on registrations produced by this crate version.
pub const API_VERSION: &str = "1.0";
