//! # Bus Errors
//!
//! Failures surfaced to the calling agent. The rest of the taxonomy is
//! recovered locally: authentication failures drop the message (logged at
//! WARN by the consumer), and handler failures are contained per-callback
//! by the router. Nothing in this layer is fatal to the process.

use crate::pending::RequestError;
use crate::ports::StoreError;
use mesh_crypto::CryptoError;
use mesh_types::ValidationError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by [`crate::MessageBus`] operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Malformed registration or message; rejected synchronously, never
    /// persisted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The outgoing message could not be signed.
    #[error("message {message_id} could not be signed")]
    Signing {
        message_id: Uuid,
        #[source]
        source: CryptoError,
    },

    /// No live subscriber and the persistence fallback failed too.
    #[error("message {message_id} has no live subscriber and could not be persisted")]
    Delivery {
        message_id: Uuid,
        #[source]
        source: StoreError,
    },

    /// Request registration or completion failed (timeout, shutdown, table
    /// full).
    #[error(transparent)]
    Request(#[from] RequestError),
}
