//! Error taxonomy for codec, attestation and ceremony failures

use thiserror::Error;

/// Result type for authenticator operations
pub type Result<T> = core::result::Result<T, Error>;

/// Authenticator errors
///
/// Ceremony failures are reported exactly once to the ceremony's caller and
/// never retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bytes are not valid CBOR for the subset in use
    #[error("Malformed CBOR encoding: {0}")]
    MalformedEncoding(String),

    /// Unknown command byte
    #[error("Invalid command")]
    InvalidCommand,

    /// CBOR decoded but the parameters are semantically invalid
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Capability mismatch or deliberately unimplemented feature
    #[error("Unsupported")]
    Unsupported,

    /// Signing backend could not create a key pair
    #[error("Key generation failed")]
    KeyGenerationFailed,

    /// Signing backend could not produce a signature
    #[error("Signing failed")]
    SigningFailed,

    /// Authenticator data or attestation object could not be serialized
    #[error("Encoding failed")]
    EncodingFailed,

    /// Ceremony lifetime elapsed
    #[error("Timeout")]
    Timeout,

    /// Session unavailable or user denied the request
    #[error("Not allowed")]
    NotAllowed,

    /// Programmer or protocol misuse, such as starting a ceremony twice
    #[error("Bad operation")]
    BadOperation,

    /// Ceremony cancelled by its caller
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Error::MalformedEncoding(detail.into())
    }

    pub(crate) fn invalid_parameters(detail: impl Into<String>) -> Self {
        Error::InvalidParameters(detail.into())
    }
}
