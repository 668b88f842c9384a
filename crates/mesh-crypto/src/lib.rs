//! # Mesh Crypto - Message Authentication
//!
//! HMAC-SHA256 signing and verification for [`mesh_types::AgentMessage`]
//! envelopes, plus provisioning of the per-installation shared secret.
//!
//! ## Security Properties
//!
//! - **Single shared secret**: provisioned once per installation, 256-bit,
//!   zeroized on drop. Key exchange is out of scope.
//! - **Canonical signing input**: the fixed-order encoding from
//!   [`mesh_types::AgentMessage::canonical_bytes`]; the mutable `status`
//!   field is never signed.
//! - **Constant-time verification**: signature mismatch and timing
//!   side-channels surface identically as `false`.
//! - **Verification never fails the caller**: absent, malformed, or wrong
//!   signatures all return `false` so the delivery loop can drop-and-log.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod key;
pub mod signer;

pub use key::{CryptoError, SecretKey};
pub use signer::MessageSigner;
