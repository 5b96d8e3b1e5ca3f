//! WebAuthn client layer
//!
//! Builds the client data for a ceremony, derives the relying party ID from
//! the caller's origin, and runs the ceremony operation against a session of
//! the given authenticator.
//!
//! See <https://www.w3.org/TR/webauthn-2/#sctn-createCredential>

use crate::error::{Error, Result};

use ble_fido2_ctap::operation::{CreateOperation, GetOperation};
use ble_fido2_ctap::types::{GetAssertionResponse, MakeCredentialResponse};
use ble_fido2_ctap::{
    Authenticator, PublicKeyCredentialCreationOptions, PublicKeyCredentialRequestOptions,
};

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Ceremony lifetime used when the options carry no timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A SHA-256 hash of the client data JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientDataHash([u8; 32]);

impl ClientDataHash {
    pub fn new(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// Hash serialized client data
    pub fn of(client_data_json: &str) -> Self {
        Self(Sha256::digest(client_data_json.as_bytes()).into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ClientDataHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Which ceremony the client data belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyType {
    Create,
    Get,
}

impl CeremonyType {
    pub fn as_str(self) -> &'static str {
        match self {
            CeremonyType::Create => "webauthn.create",
            CeremonyType::Get => "webauthn.get",
        }
    }
}

/// Client data collected for one ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String,
    /// base64url of the challenge, without padding
    pub challenge: String,
    pub origin: String,
}

impl CollectedClientData {
    pub fn new(ceremony_type: CeremonyType, challenge: &[u8], origin: impl Into<String>) -> Self {
        Self {
            ceremony_type: ceremony_type.as_str().to_string(),
            challenge: URL_SAFE_NO_PAD.encode(challenge),
            origin: origin.into(),
        }
    }

    /// Serialize to `clientDataJSON` together with its hash
    pub fn to_json(&self) -> Result<(String, ClientDataHash)> {
        let json = serde_json::to_string(self)?;
        let hash = ClientDataHash::of(&json);
        Ok((json, hash))
    }
}

/// Host part of an origin such as `https://login.example.com:8443`
pub fn origin_host(origin: &str) -> Result<&str> {
    let invalid = || Error::InvalidOrigin(origin.to_string());

    let (_, rest) = origin.split_once("://").ok_or_else(invalid)?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = if let Some(bracketed) = authority.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else {
        authority.split(':').next().unwrap_or_default()
    };

    if host.is_empty() {
        return Err(invalid());
    }
    Ok(host)
}

/// Whether `rp_id` may be claimed by a page served from `host`
fn is_registrable_suffix(rp_id: &str, host: &str) -> bool {
    host == rp_id
        || host
            .strip_suffix(rp_id)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Client for running WebAuthn ceremonies from one origin
pub struct WebAuthnClient {
    origin: String,
    host: String,
    authenticator: Arc<dyn Authenticator>,
    default_timeout: Duration,
}

impl WebAuthnClient {
    pub fn new(origin: impl Into<String>, authenticator: Arc<dyn Authenticator>) -> Result<Self> {
        let origin = origin.into();
        let host = origin_host(&origin)?.to_string();
        Ok(Self {
            origin,
            host,
            authenticator,
            default_timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn lifetime(&self, timeout_ms: Option<u64>) -> Duration {
        timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }

    fn resolve_rp_id(&self, requested: Option<&str>) -> Result<String> {
        let rp_id = requested.unwrap_or(&self.host);
        if !is_registrable_suffix(rp_id, &self.host) {
            tracing::debug!(rp_id, host = %self.host, "rp id not valid for origin");
            return Err(Error::RpIdMismatch(rp_id.to_string()));
        }
        Ok(rp_id.to_string())
    }

    /// Build a make-credential operation without starting it
    pub fn create_operation(
        &self,
        options: PublicKeyCredentialCreationOptions,
    ) -> Result<CreateOperation> {
        let rp_id = self.resolve_rp_id(options.rp.id.as_deref())?;
        let client_data =
            CollectedClientData::new(CeremonyType::Create, &options.challenge, &self.origin);
        let (json, hash) = client_data.to_json()?;
        let lifetime = self.lifetime(options.timeout);

        tracing::debug!(%rp_id, ?lifetime, "new create operation");
        Ok(CreateOperation::new(
            options,
            rp_id,
            self.authenticator.new_make_credential_session(),
            json,
            hash.as_slice().to_vec(),
            lifetime,
        ))
    }

    /// Build a get-assertion operation without starting it
    pub fn get_operation(&self, options: PublicKeyCredentialRequestOptions) -> Result<GetOperation> {
        let rp_id = self.resolve_rp_id(options.rp_id.as_deref())?;
        let client_data =
            CollectedClientData::new(CeremonyType::Get, &options.challenge, &self.origin);
        let (json, hash) = client_data.to_json()?;
        let lifetime = self.lifetime(options.timeout);

        tracing::debug!(%rp_id, ?lifetime, "new get operation");
        Ok(GetOperation::new(
            options,
            rp_id,
            self.authenticator.new_get_assertion_session(),
            json,
            hash.as_slice().to_vec(),
            lifetime,
        ))
    }

    /// Create a new credential
    pub async fn create(
        &self,
        options: PublicKeyCredentialCreationOptions,
    ) -> Result<MakeCredentialResponse> {
        let operation = self.create_operation(options)?;
        Ok(operation.start().await?)
    }

    /// Get an assertion for an existing credential
    pub async fn get(&self, options: PublicKeyCredentialRequestOptions) -> Result<GetAssertionResponse> {
        let operation = self.get_operation(options)?;
        Ok(operation.start().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_host() {
        assert_eq!(origin_host("https://example.com").unwrap(), "example.com");
        assert_eq!(
            origin_host("https://login.example.com:8443/path?q=1").unwrap(),
            "login.example.com"
        );
        assert_eq!(origin_host("http://[::1]:8080").unwrap(), "::1");
        assert!(matches!(origin_host("example.com"), Err(Error::InvalidOrigin(_))));
        assert!(matches!(origin_host("https://"), Err(Error::InvalidOrigin(_))));
    }

    #[test]
    fn test_registrable_suffix() {
        assert!(is_registrable_suffix("example.com", "example.com"));
        assert!(is_registrable_suffix("example.com", "login.example.com"));
        assert!(!is_registrable_suffix("example.com", "badexample.com"));
        assert!(!is_registrable_suffix("login.example.com", "example.com"));
    }

    #[test]
    fn test_client_data_json() {
        let data = CollectedClientData::new(CeremonyType::Create, &[0xFB, 0xFF], "https://example.com");
        let (json, hash) = data.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"type":"webauthn.create","challenge":"-_8","origin":"https://example.com"}"#
        );
        assert_eq!(hash.as_slice(), Sha256::digest(json.as_bytes()).as_slice());

        let parsed: CollectedClientData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, data);
    }
}
