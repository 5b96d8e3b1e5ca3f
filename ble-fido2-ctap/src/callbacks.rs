//! Collaborators of the internal authenticator
//!
//! [`UserConsent`] stands in for the platform's consent prompt and
//! [`CredentialStore`] for the persistence of credential sources. Both are
//! supplied by the embedding application.

use crate::error::{Error, Result};
use crate::types::{PublicKeyCredentialRpEntity, PublicKeyCredentialUserEntity};

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

/// A credential known to the authenticator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSource {
    /// Credential ID
    pub id: Vec<u8>,

    /// Relying party ID
    pub rp_id: String,

    /// User handle
    pub user_handle: Vec<u8>,

    pub user_name: String,

    pub user_display_name: String,

    /// COSE algorithm of the credential key
    pub alg: i32,

    /// Signing oracle alias of the credential key
    pub key_alias: String,

    /// Signature counter
    pub sign_count: u32,

    /// Discoverable without a credential ID hint
    pub resident: bool,
}

/// User consent prompt
///
/// Denial is reported as [`Error::NotAllowed`], an expired prompt as
/// [`Error::Timeout`].
#[async_trait]
pub trait UserConsent: Send + Sync {
    /// Ask the user to approve a new credential
    async fn request_registration(
        &self,
        rp: &PublicKeyCredentialRpEntity,
        user: &PublicKeyCredentialUserEntity,
        user_verification: bool,
    ) -> Result<()>;

    /// Ask the user to pick one of `candidates`, returning its index
    async fn select_credential(
        &self,
        rp_id: &str,
        candidates: &[CredentialSource],
        user_verification: bool,
    ) -> Result<usize>;
}

/// Consent that approves every registration and picks the first candidate
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConsent;

#[async_trait]
impl UserConsent for AutoConsent {
    async fn request_registration(
        &self,
        rp: &PublicKeyCredentialRpEntity,
        user: &PublicKeyCredentialUserEntity,
        _user_verification: bool,
    ) -> Result<()> {
        tracing::debug!(rp = ?rp.id, user = %user.name, "auto-approving registration");
        Ok(())
    }

    async fn select_credential(
        &self,
        rp_id: &str,
        candidates: &[CredentialSource],
        _user_verification: bool,
    ) -> Result<usize> {
        if candidates.is_empty() {
            return Err(Error::NotAllowed);
        }
        tracing::debug!(rp_id, count = candidates.len(), "auto-selecting first credential");
        Ok(0)
    }
}

/// Persistence of credential sources
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the source with the same ID
    fn write_credential(&self, source: &CredentialSource) -> Result<()>;

    fn get_credential(&self, credential_id: &[u8]) -> Result<Option<CredentialSource>>;

    /// All sources for `rp_id`, oldest first
    fn read_credentials(&self, rp_id: &str) -> Result<Vec<CredentialSource>>;

    /// Returns whether a source was removed
    fn delete_credential(&self, credential_id: &[u8]) -> Result<bool>;

    fn credential_count(&self) -> Result<usize>;
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    sources: Mutex<Vec<CredentialSource>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sources(&self) -> MutexGuard<'_, Vec<CredentialSource>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn write_credential(&self, source: &CredentialSource) -> Result<()> {
        let mut sources = self.sources();
        match sources.iter_mut().find(|s| s.id == source.id) {
            Some(existing) => *existing = source.clone(),
            None => sources.push(source.clone()),
        }
        Ok(())
    }

    fn get_credential(&self, credential_id: &[u8]) -> Result<Option<CredentialSource>> {
        Ok(self
            .sources()
            .iter()
            .find(|s| s.id == credential_id)
            .cloned())
    }

    fn read_credentials(&self, rp_id: &str) -> Result<Vec<CredentialSource>> {
        Ok(self
            .sources()
            .iter()
            .filter(|s| s.rp_id == rp_id)
            .cloned()
            .collect())
    }

    fn delete_credential(&self, credential_id: &[u8]) -> Result<bool> {
        let mut sources = self.sources();
        let before = sources.len();
        sources.retain(|s| s.id != credential_id);
        Ok(sources.len() != before)
    }

    fn credential_count(&self) -> Result<usize> {
        Ok(self.sources().len())
    }
}
