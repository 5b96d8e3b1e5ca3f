//! CTAP2 protocol layer of a BLE FIDO2 authenticator
//!
//! This crate provides:
//! - **CBOR**: the encoding subset used by CTAP2, with canonical map ordering
//! - **COSE / attestation**: credential public keys, authenticator data and
//!   attestation objects ("packed", "android-key", "none")
//! - **Key support**: algorithm-selected signing strategies over a
//!   [`SigningOracle`](ble_fido2_crypto::SigningOracle)
//! - **Operations**: cancelable, timed make-credential and get-assertion
//!   ceremonies driving an authenticator session
//! - **Dispatcher**: CTAP2 command routing for BLE MSG frames
//!
//! Implements the FIDO2 specification:
//! <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html>

pub mod attestation;
pub mod authenticator;
#[cfg(feature = "transport")]
pub mod bridge;
pub mod callbacks;
pub mod cbor;
pub mod commands;
pub mod cose;
pub mod dispatcher;
pub mod error;
pub mod key_support;
pub mod operation;
pub mod session;
pub mod status;
pub mod types;

// Re-export commonly used types
pub use attestation::{AttestationFormat, AttestationObject, AttestationStatement, AuthenticatorData};
pub use authenticator::{AuthenticatorConfig, InternalAuthenticator};
#[cfg(feature = "transport")]
pub use bridge::CtapBridge;
pub use callbacks::{AutoConsent, CredentialSource, CredentialStore, MemoryCredentialStore, UserConsent};
pub use cose::CoseKey;
pub use dispatcher::CommandDispatcher;
pub use error::{Error, Result};
pub use key_support::KeySupport;
pub use operation::{CreateOperation, GetOperation, OperationState};
pub use session::Authenticator;
pub use status::StatusCode;
pub use types::{
    PublicKeyCredentialCreationOptions, PublicKeyCredentialDescriptor,
    PublicKeyCredentialParameters, PublicKeyCredentialRequestOptions,
    PublicKeyCredentialRpEntity, PublicKeyCredentialUserEntity, UserVerificationRequirement,
};
