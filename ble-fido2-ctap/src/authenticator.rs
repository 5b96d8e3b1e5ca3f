//! Internal (platform) authenticator
//!
//! Issues make-credential and get-assertion sessions that consult the user
//! through [`UserConsent`], persist credential sources in a
//! [`CredentialStore`], and keep private keys behind a [`SigningOracle`].
//! Oracle calls run on tokio's blocking pool so a slow key store never
//! stalls frame handling.

use crate::attestation::{AttestationObject, AttestedCredentialData, AuthenticatorData};
use crate::callbacks::{CredentialSource, CredentialStore, UserConsent};
use crate::cose::{alg, CoseKey};
use crate::error::{Error, Result};
use crate::key_support::KeySupport;
use crate::session::{
    Assertion, Authenticator, GetAssertionRequest, GetAssertionSession,
    GetAssertionSessionListener, MakeCredentialRequest, MakeCredentialSession,
    MakeCredentialSessionListener, SessionCapabilities,
};
use crate::types::{AuthenticatorAttachment, AuthenticatorTransport, PUBLIC_KEY_TYPE};

use ble_fido2_crypto::SigningOracle;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use tokio::task::JoinHandle;

/// Length of generated credential IDs
pub const CREDENTIAL_ID_LEN: usize = 16;

/// Default ceremony lifetime
pub const DEFAULT_CEREMONY_TIMEOUT: Duration = Duration::from_secs(60);

/// Authenticator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorConfig {
    /// Authenticator Attestation GUID embedded in attested credential data
    pub aaguid: [u8; 16],

    /// Signature counter increment per assertion
    ///
    /// Zero keeps the counter constant, which hides usage patterns from
    /// relying parties.
    pub counter_step: u32,

    /// Whether the consent prompt can verify the user
    pub allow_user_verification: bool,

    /// Whether discoverable credentials may be created
    pub allow_resident_key: bool,

    /// Lifetime of a ceremony started through the dispatcher
    pub ceremony_timeout: Duration,

    /// COSE algorithms the authenticator will generate keys for
    pub algorithms: Vec<i32>,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthenticatorConfig {
    pub fn new() -> Self {
        Self {
            aaguid: [0u8; 16],
            counter_step: 1,
            allow_user_verification: true,
            allow_resident_key: true,
            ceremony_timeout: DEFAULT_CEREMONY_TIMEOUT,
            algorithms: vec![alg::ES256, alg::RS256],
        }
    }

    pub fn with_aaguid(mut self, aaguid: [u8; 16]) -> Self {
        self.aaguid = aaguid;
        self
    }

    pub fn with_counter_step(mut self, step: u32) -> Self {
        self.counter_step = step;
        self
    }

    pub fn with_user_verification(mut self, allow: bool) -> Self {
        self.allow_user_verification = allow;
        self
    }

    pub fn with_resident_key(mut self, allow: bool) -> Self {
        self.allow_resident_key = allow;
        self
    }

    pub fn with_ceremony_timeout(mut self, timeout: Duration) -> Self {
        self.ceremony_timeout = timeout;
        self
    }

    /// Set supported algorithms, in no particular order
    pub fn with_algorithms(mut self, algorithms: Vec<i32>) -> Self {
        self.algorithms = algorithms;
        self
    }
}

struct Shared {
    config: AuthenticatorConfig,
    consent: Arc<dyn UserConsent>,
    store: Arc<dyn CredentialStore>,
    oracle: Arc<dyn SigningOracle>,
}

impl Shared {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            resident_key: self.config.allow_resident_key,
            user_verification: self.config.allow_user_verification,
        }
    }
}

#[derive(Clone, Copy)]
struct Capabilities {
    resident_key: bool,
    user_verification: bool,
}

/// Platform authenticator reachable over the internal transport
pub struct InternalAuthenticator {
    shared: Arc<Shared>,
}

impl InternalAuthenticator {
    pub fn new(
        config: AuthenticatorConfig,
        consent: Arc<dyn UserConsent>,
        store: Arc<dyn CredentialStore>,
        oracle: Arc<dyn SigningOracle>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                consent,
                store,
                oracle,
            }),
        }
    }

    pub fn config(&self) -> &AuthenticatorConfig {
        &self.shared.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.shared.store
    }
}

impl Authenticator for InternalAuthenticator {
    fn attachment(&self) -> AuthenticatorAttachment {
        AuthenticatorAttachment::Platform
    }

    fn transport(&self) -> AuthenticatorTransport {
        AuthenticatorTransport::Internal
    }

    fn new_make_credential_session(&self) -> Arc<dyn MakeCredentialSession> {
        tracing::debug!("new make-credential session");
        Arc::new(InternalMakeCredentialSession {
            shared: self.shared.clone(),
            core: SessionCore::new(),
        })
    }

    fn new_get_assertion_session(&self) -> Arc<dyn GetAssertionSession> {
        tracing::debug!("new get-assertion session");
        Arc::new(InternalGetAssertionSession {
            shared: self.shared.clone(),
            core: SessionCore::new(),
        })
    }
}

#[derive(Default)]
struct CoreState {
    started: bool,
    task: Option<JoinHandle<()>>,
}

/// Listener slot, start flag and the single in-flight task of a session
struct SessionCore<L: ?Sized> {
    listener: Mutex<Option<Arc<L>>>,
    state: Mutex<CoreState>,
    cancelled: Arc<AtomicBool>,
}

impl<L: ?Sized + Send + Sync + 'static> SessionCore<L> {
    fn new() -> Self {
        Self {
            listener: Mutex::new(None),
            state: Mutex::new(CoreState::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn state(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_listener(&self, listener: Arc<L>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn listener(&self) -> Option<Arc<L>> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if listener.is_none() {
            tracing::warn!("session used without a listener");
        }
        listener
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns false when already started or cancelled
    fn mark_started(&self) -> bool {
        let mut state = self.state();
        if state.started || self.is_cancelled() {
            return false;
        }
        state.started = true;
        true
    }

    /// Run `work` and hand its outcome to `deliver` unless cancelled first
    fn run<T, W, D>(&self, work: W, deliver: D)
    where
        T: Send + 'static,
        W: Future<Output = T> + Send + 'static,
        D: FnOnce(T) + Send + 'static,
    {
        let mut state = self.state();
        if self.is_cancelled() {
            tracing::debug!("session already cancelled");
            return;
        }
        let cancelled = self.cancelled.clone();
        if let Some(previous) = state.task.take() {
            previous.abort();
        }
        state.task = Some(tokio::spawn(async move {
            let outcome = work.await;
            if cancelled.load(Ordering::SeqCst) {
                tracing::debug!("session cancelled, dropping outcome");
                return;
            }
            deliver(outcome);
        }));
    }

    fn cancel(&self, reason: &Error) {
        tracing::debug!(%reason, "session cancel");
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.state().task.take() {
            task.abort();
        }
    }
}

/// Run a blocking oracle call off the async workers
async fn blocking<T, F>(failure: Error, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "blocking key store call did not finish");
            Err(failure)
        }
    }
}

fn key_alias(rp_id: &str, credential_id: &[u8]) -> String {
    format!("{}/{}", rp_id, URL_SAFE_NO_PAD.encode(credential_id))
}

/// Key of a credential that has not been stored yet
///
/// Dropped without [`PendingKey::commit`], it removes the key from the
/// oracle. This also runs when the ceremony task is aborted. Generation and
/// removal share a lock, so a key generated after the drop is never kept.
struct PendingKey {
    oracle: Arc<dyn SigningOracle>,
    alias: String,
    discarded: Arc<Mutex<bool>>,
    committed: bool,
}

impl PendingKey {
    fn new(oracle: Arc<dyn SigningOracle>, alias: String) -> Self {
        Self {
            oracle,
            alias,
            discarded: Arc::new(Mutex::new(false)),
            committed: false,
        }
    }

    async fn generate(&self, support: KeySupport, challenge: Vec<u8>) -> Result<CoseKey> {
        let oracle = self.oracle.clone();
        let alias = self.alias.clone();
        let discarded = self.discarded.clone();
        blocking(Error::KeyGenerationFailed, move || {
            let discarded = discarded.lock().unwrap_or_else(PoisonError::into_inner);
            if *discarded {
                return Err(Error::Cancelled);
            }
            support.create_key_pair(oracle.as_ref(), &alias, &challenge)
        })
        .await
    }

    /// Keep the key once its credential is stored
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingKey {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let oracle = self.oracle.clone();
        let alias = std::mem::take(&mut self.alias);
        let discarded = self.discarded.clone();
        let discard = move || {
            *discarded.lock().unwrap_or_else(PoisonError::into_inner) = true;
            match oracle.delete_key(&alias) {
                Ok(()) => tracing::debug!(alias, "discarded key of unfinished credential"),
                Err(e) => tracing::warn!(alias, error = %e, "failed to discard unused key"),
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(discard);
            }
            Err(_) => discard(),
        }
    }
}

/// Make-credential session of the internal authenticator
pub struct InternalMakeCredentialSession {
    shared: Arc<Shared>,
    core: SessionCore<dyn MakeCredentialSessionListener>,
}

impl SessionCapabilities for InternalMakeCredentialSession {
    fn attachment(&self) -> AuthenticatorAttachment {
        AuthenticatorAttachment::Platform
    }

    fn transport(&self) -> AuthenticatorTransport {
        AuthenticatorTransport::Internal
    }

    fn can_store_resident_key(&self) -> bool {
        self.shared.capabilities().resident_key
    }

    fn can_perform_user_verification(&self) -> bool {
        self.shared.capabilities().user_verification
    }
}

impl MakeCredentialSession for InternalMakeCredentialSession {
    fn set_listener(&self, listener: Arc<dyn MakeCredentialSessionListener>) {
        self.core.set_listener(listener);
    }

    fn start(&self) {
        let Some(listener) = self.core.listener() else {
            return;
        };
        if self.core.mark_started() {
            self.core.run(async {}, move |()| listener.on_available());
        } else {
            tracing::debug!("session already started or cancelled");
            tokio::spawn(async move { listener.on_unavailable() });
        }
    }

    fn cancel(&self, reason: Error) {
        self.core.cancel(&reason);
    }

    fn make_credential(&self, request: MakeCredentialRequest) {
        let Some(listener) = self.core.listener() else {
            return;
        };
        let shared = self.shared.clone();
        self.core
            .run(create_credential(shared, request), move |outcome| match outcome {
                Ok(attestation) => listener.on_credential_created(attestation),
                Err(reason) => listener.on_operation_stopped(reason),
            });
    }
}

#[tracing::instrument(skip_all, fields(rp_id = ?request.rp.id))]
async fn create_credential(
    shared: Arc<Shared>,
    request: MakeCredentialRequest,
) -> Result<AttestationObject> {
    let config = &shared.config;
    let rp_id = request
        .rp
        .id
        .clone()
        .ok_or_else(|| Error::invalid_parameters("rp id missing"))?;

    let requested: Vec<i32> = request
        .cred_params
        .iter()
        .filter(|p| p.cred_type == PUBLIC_KEY_TYPE && config.algorithms.contains(&p.alg))
        .map(|p| p.alg)
        .collect();
    let support = KeySupport::choose(&requested).ok_or(Error::Unsupported)?;

    if request.require_resident_key && !config.allow_resident_key {
        tracing::debug!("resident key requested but disabled");
        return Err(Error::Unsupported);
    }
    if request.require_user_verification && !config.allow_user_verification {
        tracing::debug!("user verification requested but disabled");
        return Err(Error::Unsupported);
    }

    for descriptor in &request.exclude_credentials {
        if let Some(existing) = shared.store.get_credential(&descriptor.id)? {
            if existing.rp_id == rp_id {
                tracing::debug!("excluded credential already registered");
                return Err(Error::NotAllowed);
            }
        }
    }

    shared
        .consent
        .request_registration(&request.rp, &request.user, request.require_user_verification)
        .await?;

    let mut credential_id = vec![0u8; CREDENTIAL_ID_LEN];
    rand::thread_rng().fill_bytes(&mut credential_id);
    let pending = PendingKey::new(shared.oracle.clone(), key_alias(&rp_id, &credential_id));
    let key = pending
        .generate(support, request.client_data_hash.clone())
        .await?;

    let auth_data = AuthenticatorData::new(
        &rp_id,
        true,
        request.require_user_verification,
        0,
        Some(AttestedCredentialData::new(
            config.aaguid,
            credential_id.clone(),
            key,
        )),
    );

    let attestation = {
        let oracle = shared.oracle.clone();
        let alias = pending.alias.clone();
        let hash = request.client_data_hash.clone();
        blocking(Error::SigningFailed, move || {
            support.build_attestation_object(oracle.as_ref(), &alias, &hash, auth_data)
        })
        .await?
    };

    let source = CredentialSource {
        id: credential_id,
        rp_id,
        user_handle: request.user.id.clone(),
        user_name: request.user.name.clone(),
        user_display_name: request.user.display_name.clone(),
        alg: support.alg(),
        key_alias: pending.alias.clone(),
        sign_count: 0,
        resident: request.require_resident_key,
    };
    shared.store.write_credential(&source)?;
    pending.commit();

    tracing::debug!(fmt = attestation.format().as_str(), "credential created");
    Ok(attestation)
}

/// Get-assertion session of the internal authenticator
pub struct InternalGetAssertionSession {
    shared: Arc<Shared>,
    core: SessionCore<dyn GetAssertionSessionListener>,
}

impl SessionCapabilities for InternalGetAssertionSession {
    fn attachment(&self) -> AuthenticatorAttachment {
        AuthenticatorAttachment::Platform
    }

    fn transport(&self) -> AuthenticatorTransport {
        AuthenticatorTransport::Internal
    }

    fn can_store_resident_key(&self) -> bool {
        self.shared.capabilities().resident_key
    }

    fn can_perform_user_verification(&self) -> bool {
        self.shared.capabilities().user_verification
    }
}

impl GetAssertionSession for InternalGetAssertionSession {
    fn set_listener(&self, listener: Arc<dyn GetAssertionSessionListener>) {
        self.core.set_listener(listener);
    }

    fn start(&self) {
        let Some(listener) = self.core.listener() else {
            return;
        };
        if self.core.mark_started() {
            self.core.run(async {}, move |()| listener.on_available());
        } else {
            tracing::debug!("session already started or cancelled");
            tokio::spawn(async move { listener.on_unavailable() });
        }
    }

    fn cancel(&self, reason: Error) {
        self.core.cancel(&reason);
    }

    fn get_assertion(&self, request: GetAssertionRequest) {
        let Some(listener) = self.core.listener() else {
            return;
        };
        let shared = self.shared.clone();
        self.core
            .run(assert_credential(shared, request), move |outcome| match outcome {
                Ok(assertion) => listener.on_assertion_created(assertion),
                Err(reason) => listener.on_operation_stopped(reason),
            });
    }
}

#[tracing::instrument(skip_all, fields(rp_id = %request.rp_id))]
async fn assert_credential(shared: Arc<Shared>, request: GetAssertionRequest) -> Result<Assertion> {
    let config = &shared.config;

    if request.require_user_verification && !config.allow_user_verification {
        tracing::debug!("user verification requested but disabled");
        return Err(Error::Unsupported);
    }

    let mut candidates = shared.store.read_credentials(&request.rp_id)?;
    if !request.allow_credentials.is_empty() {
        candidates.retain(|c| request.allow_credentials.iter().any(|d| d.id == c.id));
    }
    if candidates.is_empty() {
        tracing::debug!("no matching credential");
        return Err(Error::NotAllowed);
    }

    let index = shared
        .consent
        .select_credential(&request.rp_id, &candidates, request.require_user_verification)
        .await?;
    let mut source = candidates.get(index).cloned().ok_or_else(|| {
        tracing::warn!(index, "consent selected a credential out of range");
        Error::BadOperation
    })?;

    let support = KeySupport::for_algorithm(source.alg).ok_or(Error::Unsupported)?;

    source.sign_count = source.sign_count.wrapping_add(config.counter_step);
    shared.store.write_credential(&source)?;

    let authenticator_data = AuthenticatorData::new(
        &request.rp_id,
        true,
        request.require_user_verification,
        source.sign_count,
        None,
    )
    .to_bytes()?;

    let mut to_be_signed = authenticator_data.clone();
    to_be_signed.extend_from_slice(&request.client_data_hash);

    let signature = {
        let oracle = shared.oracle.clone();
        let alias = source.key_alias.clone();
        blocking(Error::SigningFailed, move || {
            support.sign(oracle.as_ref(), &alias, &to_be_signed)
        })
        .await?
    };

    tracing::debug!(sign_count = source.sign_count, "assertion created");
    Ok(Assertion {
        credential_id: source.id,
        authenticator_data,
        signature,
        user_handle: Some(source.user_handle),
    })
}
