//! # Validation Errors
//!
//! Synchronous rejections for malformed registrations and messages.
//! These are never persisted; the caller gets them back immediately.

use crate::message::AgentId;
use thiserror::Error;

/// Errors from validating registrations and outgoing messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Registration id was empty.
    #[error("agent id must not be empty")]
    EmptyAgentId,

    /// Registration name was empty.
    #[error("agent name must not be empty")]
    EmptyAgentName,

    /// Registration declared no capabilities.
    #[error("agent {agent} must declare at least one capability")]
    NoCapabilities { agent: AgentId },

    /// The acting agent has not registered with the bus.
    #[error("agent {agent} is not registered")]
    NotRegistered { agent: AgentId },

    /// Message action was empty.
    #[error("message action must not be empty")]
    EmptyAction,
}
