//! Error types for signing backend operations

use thiserror::Error;

/// Signing backend errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The backend could not produce a key pair
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// The backend could not produce a signature
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// No key is bound to the given alias
    #[error("Unknown key alias: {0}")]
    UnknownAlias(String),

    /// Algorithm not handled by this backend
    #[error("Unsupported algorithm")]
    UnsupportedAlgorithm,

    /// Invalid private key provided
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Invalid public key provided
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Invalid signature format or signature mismatch
    #[error("Invalid signature")]
    InvalidSignature,
}

/// Result type alias for signing backend operations
pub type Result<T> = core::result::Result<T, CryptoError>;
