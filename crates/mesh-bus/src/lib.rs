//! # Mesh Bus - Signed Agent Messaging Core
//!
//! Broker-less message routing between agent processes: authentication,
//! registry, unicast/broadcast delivery with a persistent-queue fallback,
//! request/response correlation, and deduplication of re-delivered messages.
//!
//! ## Delivery Flow
//!
//! ```text
//! ┌──────────────┐  send()                      ┌──────────────┐
//! │   Agent A    │ ───────→ [sign] → [Router] ──→ │   Agent B    │
//! └──────────────┘                     │          └──────────────┘
//!                          no live subscriber            ↑
//!                                      ▼                 │
//!                              ┌──────────────┐   deliver│
//!                              │ MessageStore │ ─────────┘
//!                              │ (keyed, JSON)│   ConsumerLoop:
//!                              └──────────────┘   verify → dedup → route
//! ```
//!
//! ## Guarantees
//!
//! - A broadcast (`"*"`) is never delivered back to its sender, on either
//!   the in-process or the persisted path
//! - Handler invocations per recipient happen in subscription order; a
//!   failing handler never blocks the remaining handlers
//! - The dedup window is process-local: delivery is at-least-once across
//!   the system, exactly-once per consumer process within the window
//! - No global singletons: each [`MessageBus`] is a self-contained
//!   composition root, so tests can run isolated buses side by side

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod config;
pub mod consumer;
pub mod dedup;
pub mod errors;
pub mod pending;
pub mod ports;
pub mod registry;
pub mod router;

// Re-export main types
pub use bus::{MessageBus, SendReceipt};
pub use config::BusConfig;
pub use consumer::{ConsumerHandle, ConsumerLoop};
pub use dedup::{DedupWindow, DEFAULT_DEDUP_CAPACITY};
pub use errors::BusError;
pub use pending::{PendingRequestTable, PendingResponse, RequestError};
pub use ports::{
    FileMessageStore, InMemoryMessageStore, MessageStore, SharedStore, StoreError,
    SystemTimeSource, TimeSource,
};
pub use registry::{AgentRecord, AgentRegistry, RegistryEvent};
pub use router::{handler_fn, DeliveryResult, HandlerError, MessageHandler, Router};
