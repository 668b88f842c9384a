//! # Agent Message Envelope
//!
//! Core message struct and addressing types for agent-to-agent routing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Action suffix that marks a message as the response half of a
/// request/response pair.
pub const RESPONSE_SUFFIX: &str = "Response";

/// Stable string identifier of an agent (tool, assistant, UI panel).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for AgentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message addressing: a single agent or every subscriber (`"*"`).
///
/// Serializes as the bare agent id string so the persisted record matches
/// the wire format (`recipient: "agent.b"` or `recipient: "*"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Recipient {
    /// Deliver to all subscribed agents except the sender.
    Broadcast,
    /// Deliver to the callbacks registered for one agent.
    Agent(AgentId),
}

impl Recipient {
    /// The wire token for broadcast addressing.
    pub const BROADCAST_TOKEN: &'static str = "*";

    pub fn agent(id: impl Into<AgentId>) -> Self {
        Self::Agent(id.into())
    }

    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast)
    }

    /// The addressed agent, `None` for broadcast.
    #[must_use]
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Self::Broadcast => None,
            Self::Agent(id) => Some(id),
        }
    }
}

impl From<AgentId> for Recipient {
    fn from(id: AgentId) -> Self {
        Self::Agent(id)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => f.write_str(Self::BROADCAST_TOKEN),
            Self::Agent(id) => f.write_str(id.as_str()),
        }
    }
}

impl Serialize for Recipient {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Broadcast => serializer.serialize_str(Self::BROADCAST_TOKEN),
            Self::Agent(id) => serializer.serialize_str(id.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for Recipient {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == Self::BROADCAST_TOKEN {
            Ok(Self::Broadcast)
        } else {
            Ok(Self::Agent(AgentId::new(raw)))
        }
    }
}

/// Delivery-status metadata appended to a persisted message.
///
/// Not covered by the signature: it is the only field mutated after signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Persisted, awaiting pickup by a consumer loop.
    #[default]
    Pending,
    /// Picked up by a consumer, delivery in progress.
    Processing,
    /// Delivery was attempted; the record is about to be removed.
    Processed,
}

/// The universal envelope for all agent-to-agent communication.
///
/// Immutable once signed, except for the `status` field which tracks the
/// persisted-delivery lifecycle (`pending → processing → processed`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique message id (UUID v4). Doubles as the `requestId` for
    /// request-style sends.
    pub id: Uuid,

    /// The sending agent. THE source of truth for identity.
    pub sender: AgentId,

    /// The addressed agent, or `"*"` for broadcast.
    pub recipient: Recipient,

    /// Application-level verb, e.g. `"echo"`. Responses use
    /// `"<action>Response"`.
    pub action: String,

    /// Opaque JSON payload.
    pub payload: Value,

    /// Milliseconds since the Unix epoch, stamped at send time.
    pub timestamp: i64,

    /// Hex-encoded HMAC-SHA256 over [`AgentMessage::canonical_bytes`].
    /// `None` only before signing; never persisted unsigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// Delivery-status metadata for persisted records.
    #[serde(default)]
    pub status: DeliveryStatus,
}

/// Signable view of a message: fixed field order, signature and status
/// excluded. This struct IS the canonical serialization; do not reorder.
#[derive(Serialize)]
struct SignableFields<'a> {
    id: &'a Uuid,
    sender: &'a AgentId,
    recipient: &'a Recipient,
    action: &'a str,
    payload: &'a Value,
    timestamp: i64,
}

impl AgentMessage {
    /// Create an unsigned message with a fresh id.
    pub fn new(
        sender: impl Into<AgentId>,
        recipient: Recipient,
        action: impl Into<String>,
        payload: Value,
        timestamp: i64,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), sender, recipient, action, payload, timestamp)
    }

    /// Create an unsigned message with an explicit id.
    ///
    /// Request-style sends use this so the message id and the payload
    /// `requestId` are the same value.
    pub fn with_id(
        id: Uuid,
        sender: impl Into<AgentId>,
        recipient: Recipient,
        action: impl Into<String>,
        payload: Value,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            sender: sender.into(),
            recipient,
            action: action.into(),
            payload,
            timestamp,
            signature: None,
            status: DeliveryStatus::Pending,
        }
    }

    /// Canonical byte encoding used as the signing input.
    ///
    /// # Errors
    ///
    /// Fails only if the payload cannot be serialized to JSON.
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&SignableFields {
            id: &self.id,
            sender: &self.sender,
            recipient: &self.recipient,
            action: &self.action,
            payload: &self.payload,
            timestamp: self.timestamp,
        })
    }

    /// Whether the action marks this message as a response.
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.action.ends_with(RESPONSE_SUFFIX)
    }

    /// The correlated request id, if this is a response message carrying a
    /// `requestId` in its payload.
    #[must_use]
    pub fn response_request_id(&self) -> Option<Uuid> {
        if !self.is_response() {
            return None;
        }
        self.payload.get("requestId")?.as_str()?.parse().ok()
    }
}

/// Derive the response action for a request action (`"ping"` → `"pingResponse"`).
#[must_use]
pub fn response_action(action: &str) -> String {
    format!("{action}{RESPONSE_SUFFIX}")
}
