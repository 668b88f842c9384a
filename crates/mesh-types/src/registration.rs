//! # Agent Registration
//!
//! Registration records and liveness status for the agent registry.

use crate::errors::ValidationError;
use crate::message::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Interned capability identifier, e.g. `"echo"` or `"code-review"`.
///
/// Capabilities are compared by value, not identity; a `BTreeSet` keeps the
/// serialized form stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Capability {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Liveness status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Heartbeating within the liveness window.
    Connected,
    /// Connected but occupied; still receives messages.
    Busy,
    /// No heartbeat within the liveness window.
    Disconnected,
}

impl AgentStatus {
    /// `Connected` and `Busy` both count as live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

/// Registration record an agent submits to join the mesh.
///
/// Wire format: `{id, name, capabilities: string[], version, apiVersion}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    pub id: AgentId,
    pub name: String,
    pub capabilities: BTreeSet<Capability>,
    pub version: String,
    pub api_version: String,
}

impl AgentRegistration {
    /// Build a registration stamped with the current [`crate::API_VERSION`].
    pub fn new(
        id: impl Into<AgentId>,
        name: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities: capabilities.into_iter().collect(),
            version: version.into(),
            api_version: crate::API_VERSION.to_owned(),
        }
    }

    /// Validate required fields.
    ///
    /// # Errors
    ///
    /// Rejects an empty id, empty name, or empty capability set. Invalid
    /// registrations are never inserted into the registry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyAgentId);
        }
        if self.name.is_empty() {
            return Err(ValidationError::EmptyAgentName);
        }
        if self.capabilities.is_empty() {
            return Err(ValidationError::NoCapabilities {
                agent: self.id.clone(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }
}
