//! Key-derivation collaborator interface.
//!
//! WireGuard key material is generated by the installer on the remote
//! host; deriving the matching public key from the extracted private key
//! is a pure function supplied by the embedding application.

use thiserror::Error;

/// Errors surfaced while deriving a public key.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KeyError {
    /// Raised when the private key material cannot be decoded.
    #[error("invalid private key material: {message}")]
    InvalidMaterial {
        /// Human-readable error message.
        message: String,
    },
}

/// Derives WireGuard public keys from private key material.
pub trait KeyDerivation: Send + Sync {
    /// Returns the base64 public key matching `private_key`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidMaterial`] when the input is not valid
    /// key material.
    fn derive_public_key(&self, private_key: &str) -> Result<String, KeyError>;
}
