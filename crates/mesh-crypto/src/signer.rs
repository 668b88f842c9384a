//! # Message Signer
//!
//! HMAC-SHA256 over the canonical envelope encoding.

use crate::key::{CryptoError, SecretKey};
use hmac::{Hmac, Mac};
use mesh_types::AgentMessage;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies [`AgentMessage`] envelopes with the shared secret.
///
/// Pure function of message + secret; holds no other state.
pub struct MessageSigner {
    key: SecretKey,
}

impl MessageSigner {
    #[must_use]
    pub fn new(key: SecretKey) -> Self {
        Self { key }
    }

    /// Compute the hex-encoded signature for a message.
    ///
    /// # Errors
    ///
    /// Fails only if the payload cannot be canonically encoded.
    pub fn sign(&self, message: &AgentMessage) -> Result<String, CryptoError> {
        let bytes = message.canonical_bytes()?;
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC key size is always valid");
        mac.update(&bytes);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Sign a message and store the signature on the envelope.
    ///
    /// # Errors
    ///
    /// Fails only if the payload cannot be canonically encoded.
    pub fn attach(&self, message: &mut AgentMessage) -> Result<(), CryptoError> {
        message.signature = Some(self.sign(message)?);
        Ok(())
    }

    /// Verify a message signature in constant time.
    ///
    /// Returns `false` for an absent, malformed, or mismatched signature.
    /// Never errors: an unverifiable message is dropped by the caller, not
    /// allowed to crash the delivery loop.
    #[must_use]
    pub fn verify(&self, message: &AgentMessage) -> bool {
        let Some(encoded) = message.signature.as_deref() else {
            return false;
        };
        let Ok(signature) = hex::decode(encoded) else {
            return false;
        };
        let Ok(bytes) = message.canonical_bytes() else {
            return false;
        };

        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC key size is always valid");
        mac.update(&bytes);

        // verify_slice is constant-time over the MAC output
        mac.verify_slice(&signature).is_ok()
    }
}
