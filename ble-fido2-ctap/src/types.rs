//! WebAuthn data types
//!
//! Option and response structures exchanged between a relying party client
//! and the authenticator. Field names serialize in WebAuthn camelCase.
//!
//! See <https://www.w3.org/TR/webauthn-2/#sctn-dictionaries>

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Credential type string, the only one WebAuthn defines
pub const PUBLIC_KEY_TYPE: &str = "public-key";

fn public_key_type() -> String {
    PUBLIC_KEY_TYPE.to_string()
}

/// User verification requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    #[default]
    Discouraged,
}

/// How an authenticator is attached to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

/// Transport an authenticator is reachable over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    Internal,
}

impl AuthenticatorTransport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Nfc => "nfc",
            Self::Ble => "ble",
            Self::Internal => "internal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "usb" => Some(Self::Usb),
            "nfc" => Some(Self::Nfc),
            "ble" => Some(Self::Ble),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

/// Relying party preference for attestation conveyance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyancePreference {
    #[default]
    None,
    Indirect,
    Direct,
}

/// Relying party entity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicKeyCredentialRpEntity {
    /// RP ID; defaults to the caller origin's effective domain when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl PublicKeyCredentialRpEntity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            icon: None,
        }
    }
}

/// User account entity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialUserEntity {
    /// Opaque user handle
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl PublicKeyCredentialUserEntity {
    pub fn new(id: Vec<u8>, name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            display_name: display_name.into(),
            icon: None,
        }
    }
}

/// Acceptable credential type and algorithm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type", default = "public_key_type")]
    pub cred_type: String,

    /// COSE algorithm identifier
    pub alg: i32,
}

impl PublicKeyCredentialParameters {
    pub fn new(alg: i32) -> Self {
        Self {
            cred_type: public_key_type(),
            alg,
        }
    }
}

/// Reference to an existing credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type", default = "public_key_type")]
    pub cred_type: String,

    pub id: Vec<u8>,

    /// Transport hints; an empty list means any transport
    #[serde(default)]
    pub transports: Vec<AuthenticatorTransport>,
}

impl PublicKeyCredentialDescriptor {
    pub fn new(id: Vec<u8>) -> Self {
        Self {
            cred_type: public_key_type(),
            id,
            transports: Vec::new(),
        }
    }

    pub fn with_transports(id: Vec<u8>, transports: Vec<AuthenticatorTransport>) -> Self {
        Self {
            cred_type: public_key_type(),
            id,
            transports,
        }
    }

    /// Whether this credential may be reached over `transport`
    pub fn reachable_over(&self, transport: AuthenticatorTransport) -> bool {
        self.transports.is_empty() || self.transports.contains(&transport)
    }
}

/// Authenticator requirements of a create request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    #[serde(default)]
    pub require_resident_key: bool,
    #[serde(default)]
    pub user_verification: UserVerificationRequirement,
}

/// Options for a make-credential ceremony
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: PublicKeyCredentialRpEntity,
    pub user: PublicKeyCredentialUserEntity,
    pub challenge: Vec<u8>,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    /// Ceremony lifetime in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_selection: Option<AuthenticatorSelectionCriteria>,
    #[serde(default)]
    pub attestation: AttestationConveyancePreference,
}

impl PublicKeyCredentialCreationOptions {
    pub fn new(
        rp: PublicKeyCredentialRpEntity,
        user: PublicKeyCredentialUserEntity,
        challenge: Vec<u8>,
    ) -> Self {
        Self {
            rp,
            user,
            challenge,
            ..Default::default()
        }
    }

    pub fn add_pub_key_cred_param(&mut self, alg: i32) {
        self.pub_key_cred_params
            .push(PublicKeyCredentialParameters::new(alg));
    }

    pub fn add_exclude_credential(&mut self, descriptor: PublicKeyCredentialDescriptor) {
        self.exclude_credentials.push(descriptor);
    }
}

/// Options for a get-assertion ceremony
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    pub challenge: Vec<u8>,
    /// Ceremony lifetime in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
    #[serde(default)]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    #[serde(default)]
    pub user_verification: UserVerificationRequirement,
}

impl PublicKeyCredentialRequestOptions {
    pub fn new(challenge: Vec<u8>) -> Self {
        Self {
            challenge,
            ..Default::default()
        }
    }

    pub fn add_allow_credential(&mut self, descriptor: PublicKeyCredentialDescriptor) {
        self.allow_credentials.push(descriptor);
    }
}

/// Response of a make-credential ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: Vec<u8>,
}

/// Response of a get-assertion ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<Vec<u8>>,
}

/// Public key credential envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredential<R> {
    #[serde(rename = "type")]
    pub cred_type: String,
    /// base64url of `raw_id`, without padding
    pub id: String,
    pub raw_id: Vec<u8>,
    pub response: R,
}

impl<R> PublicKeyCredential<R> {
    pub fn new(raw_id: Vec<u8>, response: R) -> Self {
        Self {
            cred_type: public_key_type(),
            id: URL_SAFE_NO_PAD.encode(&raw_id),
            raw_id,
            response,
        }
    }
}

pub type MakeCredentialResponse = PublicKeyCredential<AuthenticatorAttestationResponse>;
pub type GetAssertionResponse = PublicKeyCredential<AuthenticatorAssertionResponse>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_id_is_base64url() {
        let cred = PublicKeyCredential::new(vec![0xFB, 0xFF, 0x01], ());
        assert_eq!(cred.id, "-_8B");
        assert_eq!(cred.cred_type, "public-key");
    }

    #[test]
    fn test_descriptor_transport_filter() {
        let any = PublicKeyCredentialDescriptor::new(vec![1]);
        assert!(any.reachable_over(AuthenticatorTransport::Internal));

        let usb = PublicKeyCredentialDescriptor::with_transports(
            vec![2],
            vec![AuthenticatorTransport::Usb, AuthenticatorTransport::Nfc],
        );
        assert!(usb.reachable_over(AuthenticatorTransport::Nfc));
        assert!(!usb.reachable_over(AuthenticatorTransport::Internal));
    }

    #[test]
    fn test_user_verification_default() {
        assert_eq!(
            UserVerificationRequirement::default(),
            UserVerificationRequirement::Discouraged
        );
        assert_eq!(
            AuthenticatorSelectionCriteria::default().user_verification,
            UserVerificationRequirement::Discouraged
        );
    }

    #[test]
    fn test_transport_names() {
        for transport in [
            AuthenticatorTransport::Usb,
            AuthenticatorTransport::Nfc,
            AuthenticatorTransport::Ble,
            AuthenticatorTransport::Internal,
        ] {
            assert_eq!(AuthenticatorTransport::from_name(transport.as_str()), Some(transport));
        }
        assert_eq!(AuthenticatorTransport::from_name("hybrid"), None);
    }
}
