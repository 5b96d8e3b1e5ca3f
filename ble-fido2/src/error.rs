//! Error types for the facade

use std::fmt;

/// Error type for client ceremonies and service setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A ceremony or CTAP-level failure
    Ctap(ble_fido2_ctap::Error),
    /// BLE transport failure
    Transport(ble_fido2_transport::Error),
    /// Signing backend failure
    Crypto(ble_fido2_crypto::CryptoError),
    /// Origin is not an absolute URL with a host
    InvalidOrigin(String),
    /// RP ID is not a registrable suffix of the origin's host
    RpIdMismatch(String),
    /// Client data could not be serialized
    ClientData(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Ctap(e) => write!(f, "CTAP error: {}", e),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Crypto(e) => write!(f, "Crypto error: {}", e),
            Error::InvalidOrigin(origin) => write!(f, "Invalid origin: {}", origin),
            Error::RpIdMismatch(rp_id) => write!(f, "RP ID {} not valid for origin", rp_id),
            Error::ClientData(msg) => write!(f, "Client data error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<ble_fido2_ctap::Error> for Error {
    fn from(e: ble_fido2_ctap::Error) -> Self {
        Error::Ctap(e)
    }
}

impl From<ble_fido2_transport::Error> for Error {
    fn from(e: ble_fido2_transport::Error) -> Self {
        Error::Transport(e)
    }
}

impl From<ble_fido2_crypto::CryptoError> for Error {
    fn from(e: ble_fido2_crypto::CryptoError) -> Self {
        Error::Crypto(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ClientData(e.to_string())
    }
}

/// Result type for facade operations
pub type Result<T> = std::result::Result<T, Error>;
