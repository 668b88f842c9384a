//! # Shared Secret Key
//!
//! The process-wide HMAC secret, provisioned once and persisted hex-encoded.

use std::path::Path;
use thiserror::Error;
use zeroize::Zeroize;

/// Errors from key handling and canonical encoding.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Reading or writing the key file failed.
    #[error("key file error: {message}")]
    KeyIo { message: String },

    /// The persisted key was not 32 hex-encoded bytes.
    #[error("malformed secret key: expected 32 hex-encoded bytes")]
    MalformedKey,

    /// The message payload could not be canonically encoded.
    #[error("canonical encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Shared secret key (256-bit).
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Parse a hex-encoded key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedKey` if the input is not 64 hex chars.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let decoded = hex::decode(encoded.trim()).map_err(|_| CryptoError::MalformedKey)?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|_| CryptoError::MalformedKey)?;
        Ok(Self(bytes))
    }

    /// Hex encoding of the key material, as written to the key file.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get inner bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Load the key from `path`, generating and persisting a fresh one on
    /// first use. The key is provisioned exactly once per installation.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyIo` on filesystem failure and
    /// `CryptoError::MalformedKey` if an existing file is corrupt.
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let path = path.as_ref();

        if path.exists() {
            let encoded = std::fs::read_to_string(path).map_err(|e| CryptoError::KeyIo {
                message: e.to_string(),
            })?;
            return Self::from_hex(&encoded);
        }

        let key = Self::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CryptoError::KeyIo {
                message: e.to_string(),
            })?;
        }
        std::fs::write(path, key.to_hex()).map_err(|e| CryptoError::KeyIo {
            message: e.to_string(),
        })?;
        Ok(key)
    }
}
