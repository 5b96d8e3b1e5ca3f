#![warn(unused_extern_crates)]

//! # ble-fido2
//!
//! A FIDO2/WebAuthn authenticator exposed over Bluetooth Low Energy.
//!
//! ## Architecture
//!
//! - **Crypto** ([`crypto`]): signing oracle interface and a software key store
//! - **Transport** ([`transport`]): BLE framing, reassembly and the FIDO GATT service
//! - **CTAP** ([`ctap`]): CBOR, attestation, ceremony operations and the CTAP2 dispatcher
//! - **Client** ([`client`]): client data and ceremony construction for a web origin
//! - **BLE** ([`ble`]): the GATT service stacked on the dispatcher
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> Result<(), ble_fido2::Error> {
//! use std::sync::Arc;
//! use ble_fido2::{
//!     AuthenticatorConfig, AutoConsent, InternalAuthenticator, MemoryCredentialStore,
//!     PublicKeyCredentialCreationOptions, PublicKeyCredentialRpEntity,
//!     PublicKeyCredentialUserEntity, SoftwareKeyStore, WebAuthnClient,
//! };
//!
//! let authenticator = InternalAuthenticator::new(
//!     AuthenticatorConfig::new(),
//!     Arc::new(AutoConsent),
//!     Arc::new(MemoryCredentialStore::new()),
//!     Arc::new(SoftwareKeyStore::new()),
//! );
//! let client = WebAuthnClient::new("https://example.com", Arc::new(authenticator))?;
//!
//! let mut options = PublicKeyCredentialCreationOptions::new(
//!     PublicKeyCredentialRpEntity::new("example.com", "Example"),
//!     PublicKeyCredentialUserEntity::new(vec![1, 2, 3], "alice", "Alice"),
//!     b"random challenge".to_vec(),
//! );
//! options.add_pub_key_cred_param(-7);
//! let credential = client.create(options).await?;
//! println!("created {}", credential.id);
//! # Ok(())
//! # }
//! ```

pub mod ble;
pub mod client;
pub mod error;

pub use ble_fido2_crypto as crypto;
pub use ble_fido2_ctap as ctap;
pub use ble_fido2_transport as transport;

// Re-export main types at root level for convenience
pub use ble::CtapBleService;
pub use ble_fido2_crypto::{SigningOracle, SoftwareKeyStore};
pub use ble_fido2_ctap::{
    AuthenticatorConfig, AutoConsent, CredentialStore, InternalAuthenticator,
    MemoryCredentialStore, PublicKeyCredentialCreationOptions, PublicKeyCredentialDescriptor,
    PublicKeyCredentialRequestOptions, PublicKeyCredentialRpEntity, PublicKeyCredentialUserEntity,
    UserConsent, UserVerificationRequirement,
};
pub use ble_fido2_transport::{Notifier, ServiceConfig};
pub use client::{ClientDataHash, CollectedClientData, WebAuthnClient};
pub use error::{Error, Result};
