//! Signing backends for a BLE FIDO2 authenticator
//!
//! The authenticator never touches private key material directly. Every key
//! lives behind a [`SigningOracle`], addressed by an alias chosen at
//! credential creation time. This crate provides:
//!
//! - **Oracle interface**: key generation, signing, hardware-isolation probe
//!   and attestation certificate chain lookup
//! - **ECDSA**: P-256 / SHA-256 (COSE ES256) primitives
//! - **RSA**: PKCS#1 v1.5 / SHA-256 (COSE RS256) primitives
//! - **Software key store**: an in-memory oracle built on the two above
//!
//! COSE algorithm registry: <https://www.iana.org/assignments/cose/cose.xhtml#algorithms>

pub mod ecdsa;
pub mod error;
pub mod oracle;
pub mod rsa;
pub mod software;

// Re-export commonly used types
pub use error::{CryptoError, Result};
pub use oracle::{KeyAlgorithm, PublicKeyMaterial, SigningOracle};
pub use software::SoftwareKeyStore;
