//! # Agent Registry
//!
//! Tracks known agents, their capabilities, and liveness. Holds no timer of
//! its own: an external scheduler (or test) calls [`AgentRegistry::check_health`]
//! periodically.

use crate::ports::TimeSource;
use mesh_types::{AgentId, AgentRegistration, AgentStatus, Capability, ValidationError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capacity of the registry-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Status-change notifications emitted by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// An agent registered (or re-registered, replacing its record).
    Registered { agent: AgentId },
    /// An agent was explicitly removed.
    Unregistered { agent: AgentId },
    /// An agent's liveness status changed.
    StatusChanged { agent: AgentId, status: AgentStatus },
}

/// Registry-owned record for one agent.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub registration: AgentRegistration,
    pub status: AgentStatus,
    /// Milliseconds since epoch of the last registration/heartbeat/update.
    pub last_seen_ms: i64,
}

/// Central registry for all agents on this bus.
pub struct AgentRegistry {
    /// Registered agents by id.
    agents: RwLock<HashMap<AgentId, AgentRecord>>,

    /// Status-change notification channel.
    events: broadcast::Sender<RegistryEvent>,

    /// `last_seen` staleness threshold for `check_health`.
    liveness_timeout: Duration,

    /// Clock, injected for testability.
    time: Arc<dyn TimeSource>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new(liveness_timeout: Duration, time: Arc<dyn TimeSource>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            agents: RwLock::new(HashMap::new()),
            events,
            liveness_timeout,
            time,
        }
    }

    /// Subscribe to registry notifications.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register an agent, replacing any existing record for the same id and
    /// stamping `last_seen = now`.
    ///
    /// # Errors
    ///
    /// Rejects registrations failing [`AgentRegistration::validate`]; invalid
    /// records are never inserted.
    pub fn register(&self, registration: AgentRegistration) -> Result<(), ValidationError> {
        registration.validate()?;

        let agent = registration.id.clone();
        let record = AgentRecord {
            registration,
            status: AgentStatus::Connected,
            last_seen_ms: self.time.now_ms(),
        };

        let replaced = self.agents.write().insert(agent.clone(), record).is_some();
        if replaced {
            warn!(%agent, "agent already registered, replacing record");
        } else {
            debug!(%agent, "agent registered");
        }

        self.emit(RegistryEvent::Registered { agent });
        Ok(())
    }

    /// Remove an agent. Returns `false` if it was not registered.
    pub fn unregister(&self, agent: &AgentId) -> bool {
        let removed = self.agents.write().remove(agent).is_some();
        if removed {
            debug!(%agent, "agent unregistered");
            self.emit(RegistryEvent::Unregistered {
                agent: agent.clone(),
            });
        }
        removed
    }

    /// Look up one agent's record.
    #[must_use]
    pub fn get(&self, agent: &AgentId) -> Option<AgentRecord> {
        self.agents.read().get(agent).cloned()
    }

    /// All registered agents.
    #[must_use]
    pub fn list_all(&self) -> Vec<AgentRecord> {
        self.agents.read().values().cloned().collect()
    }

    #[must_use]
    pub fn is_registered(&self, agent: &AgentId) -> bool {
        self.agents.read().contains_key(agent)
    }

    /// Set an agent's status and stamp `last_seen`. Returns `false` for an
    /// unknown agent.
    pub fn update_status(&self, agent: &AgentId, status: AgentStatus) -> bool {
        let changed = {
            let mut agents = self.agents.write();
            let Some(record) = agents.get_mut(agent) else {
                return false;
            };
            record.last_seen_ms = self.time.now_ms();
            let changed = record.status != status;
            record.status = status;
            changed
        };

        if changed {
            self.emit(RegistryEvent::StatusChanged {
                agent: agent.clone(),
                status,
            });
        }
        true
    }

    /// Stamp `last_seen = now`; a disconnected agent heartbeating back is
    /// marked connected again. Returns `false` for an unknown agent.
    pub fn heartbeat(&self, agent: &AgentId) -> bool {
        let reconnected = {
            let mut agents = self.agents.write();
            let Some(record) = agents.get_mut(agent) else {
                return false;
            };
            record.last_seen_ms = self.time.now_ms();
            if record.status == AgentStatus::Disconnected {
                record.status = AgentStatus::Connected;
                true
            } else {
                false
            }
        };

        if reconnected {
            self.emit(RegistryEvent::StatusChanged {
                agent: agent.clone(),
                status: AgentStatus::Connected,
            });
        }
        true
    }

    /// Mark agents whose `last_seen` is older than the liveness timeout as
    /// disconnected. Returns the agents newly marked.
    ///
    /// Invoked by an external scheduler; the registry holds no timer.
    pub fn check_health(&self) -> Vec<AgentId> {
        let threshold_ms = self.liveness_timeout.as_millis() as i64;
        let now = self.time.now_ms();

        let stale: Vec<AgentId> = {
            let mut agents = self.agents.write();
            agents
                .iter_mut()
                .filter(|(_, record)| {
                    record.status.is_connected()
                        && now.saturating_sub(record.last_seen_ms) > threshold_ms
                })
                .map(|(agent, record)| {
                    record.status = AgentStatus::Disconnected;
                    agent.clone()
                })
                .collect()
        };

        for agent in &stale {
            warn!(%agent, "agent missed liveness window, marked disconnected");
            self.emit(RegistryEvent::StatusChanged {
                agent: agent.clone(),
                status: AgentStatus::Disconnected,
            });
        }
        stale
    }

    /// All agents except `exclude` whose capability set contains
    /// `capability`. Used for assistance-request routing.
    #[must_use]
    pub fn find_by_capability(&self, capability: &Capability, exclude: &AgentId) -> Vec<AgentId> {
        self.agents
            .read()
            .values()
            .filter(|record| {
                record.registration.id != *exclude
                    && record.registration.has_capability(capability)
            })
            .map(|record| record.registration.id.clone())
            .collect()
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    fn emit(&self, event: RegistryEvent) {
        // No receivers is fine; notifications are best-effort.
        let _ = self.events.send(event);
    }
}
