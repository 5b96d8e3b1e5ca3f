//! Get-assertion ceremony

use super::{drive, judge_user_verification, Ceremony, Lifecycle, Listener, OperationState};
use crate::error::{Error, Result};
use crate::session::{
    Assertion, GetAssertionRequest, GetAssertionSession, GetAssertionSessionListener,
};
use crate::types::{
    AuthenticatorAssertionResponse, GetAssertionResponse, PublicKeyCredential,
    PublicKeyCredentialRequestOptions, UserVerificationRequirement,
};

use std::sync::Arc;
use std::time::Duration;

/// One get-assertion ceremony against one session
pub struct GetOperation {
    inner: Arc<Inner>,
}

struct Inner {
    options: PublicKeyCredentialRequestOptions,
    rp_id: String,
    session: Arc<dyn GetAssertionSession>,
    client_data_json: String,
    client_data_hash: Vec<u8>,
    lifetime: Duration,
    lifecycle: Lifecycle<GetAssertionResponse>,
}

impl GetOperation {
    pub fn new(
        options: PublicKeyCredentialRequestOptions,
        rp_id: impl Into<String>,
        session: Arc<dyn GetAssertionSession>,
        client_data_json: String,
        client_data_hash: Vec<u8>,
        lifetime: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                rp_id: rp_id.into(),
                session,
                client_data_json,
                client_data_hash,
                lifetime,
                lifecycle: Lifecycle::new(),
            }),
        }
    }

    pub fn state(&self) -> OperationState {
        self.inner.lifecycle.state()
    }

    #[tracing::instrument(skip_all, fields(rp_id = %self.inner.rp_id))]
    pub async fn start(&self) -> Result<GetAssertionResponse> {
        drive(&self.inner).await
    }

    pub fn cancel(&self) {
        tracing::debug!("cancel");
        self.inner.stop(Error::Cancelled);
    }
}

impl Ceremony for Inner {
    type Output = GetAssertionResponse;

    fn lifecycle(&self) -> &Lifecycle<GetAssertionResponse> {
        &self.lifecycle
    }

    fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn open_session(&self, listener: Listener<Self>) {
        self.session.set_listener(Arc::new(listener));
        self.session.start();
    }

    fn cancel_session(&self, reason: Error) {
        self.session.cancel(reason);
    }
}

impl Inner {
    fn on_available(&self) {
        tracing::debug!("session available");
        if !self.lifecycle.is_started() {
            tracing::debug!("already stopped");
            return;
        }

        let session = &*self.session;
        if self.options.user_verification == UserVerificationRequirement::Required
            && !session.can_perform_user_verification()
        {
            tracing::debug!("authenticator can't perform user verification");
            self.stop(Error::Unsupported);
            return;
        }

        let user_verification = judge_user_verification(self.options.user_verification, session);

        let transport = session.transport();
        let allow_credentials = self
            .options
            .allow_credentials
            .iter()
            .filter(|d| d.reachable_over(transport))
            .cloned()
            .collect();

        session.get_assertion(GetAssertionRequest {
            rp_id: self.rp_id.clone(),
            client_data_hash: self.client_data_hash.clone(),
            allow_credentials,
            require_user_presence: !user_verification,
            require_user_verification: user_verification,
        });
    }

    fn on_assertion_created(&self, assertion: Assertion) {
        tracing::debug!("assertion created");
        if !self.lifecycle.is_started() {
            tracing::debug!("already stopped");
            return;
        }

        let credential = PublicKeyCredential::new(
            assertion.credential_id,
            AuthenticatorAssertionResponse {
                client_data_json: self.client_data_json.clone(),
                authenticator_data: assertion.authenticator_data,
                signature: assertion.signature,
                user_handle: assertion.user_handle,
            },
        );

        if self.lifecycle.complete(credential) {
            tracing::debug!("completed");
        }
    }
}

impl GetAssertionSessionListener for Listener<Inner> {
    fn on_available(&self) {
        self.with_ceremony(Inner::on_available);
    }

    fn on_unavailable(&self) {
        self.unavailable();
    }

    fn on_assertion_created(&self, assertion: Assertion) {
        self.with_ceremony(|inner| inner.on_assertion_created(assertion));
    }

    fn on_operation_stopped(&self, reason: Error) {
        self.stopped(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionCapabilities;
    use crate::types::{
        AuthenticatorAttachment, AuthenticatorTransport, PublicKeyCredentialDescriptor,
    };

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Session that answers with a fixed assertion unless told to hang
    struct MockSession {
        respond: bool,
        user_verification: bool,
        listener: Mutex<Option<Arc<dyn GetAssertionSessionListener>>>,
        request: Mutex<Option<GetAssertionRequest>>,
        cancels: AtomicUsize,
    }

    impl MockSession {
        fn new(respond: bool) -> Self {
            Self {
                respond,
                user_verification: true,
                listener: Mutex::new(None),
                request: Mutex::new(None),
                cancels: AtomicUsize::new(0),
            }
        }

        fn request(&self) -> GetAssertionRequest {
            self.request.lock().unwrap().clone().unwrap()
        }
    }

    impl SessionCapabilities for MockSession {
        fn attachment(&self) -> AuthenticatorAttachment {
            AuthenticatorAttachment::Platform
        }

        fn transport(&self) -> AuthenticatorTransport {
            AuthenticatorTransport::Internal
        }

        fn can_store_resident_key(&self) -> bool {
            true
        }

        fn can_perform_user_verification(&self) -> bool {
            self.user_verification
        }
    }

    impl GetAssertionSession for MockSession {
        fn set_listener(&self, listener: Arc<dyn GetAssertionSessionListener>) {
            *self.listener.lock().unwrap() = Some(listener);
        }

        fn start(&self) {
            let listener = self.listener.lock().unwrap().clone().unwrap();
            tokio::spawn(async move { listener.on_available() });
        }

        fn cancel(&self, _reason: Error) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }

        fn get_assertion(&self, request: GetAssertionRequest) {
            *self.request.lock().unwrap() = Some(request);
            if !self.respond {
                return;
            }
            let listener = self.listener.lock().unwrap().clone().unwrap();
            tokio::spawn(async move {
                listener.on_assertion_created(Assertion {
                    credential_id: vec![0xC1, 0xC2],
                    authenticator_data: vec![0xAD; 37],
                    signature: vec![0x30, 0x45],
                    user_handle: Some(b"alice".to_vec()),
                })
            });
        }
    }

    fn operation(options: PublicKeyCredentialRequestOptions, session: &Arc<MockSession>) -> GetOperation {
        GetOperation::new(
            options,
            "example.com",
            session.clone(),
            r#"{"type":"webauthn.get"}"#.to_string(),
            vec![0x11; 32],
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_assertion_response() {
        let session = Arc::new(MockSession::new(true));
        let op = operation(PublicKeyCredentialRequestOptions::new(vec![1; 16]), &session);

        let credential = op.start().await.unwrap();
        assert_eq!(credential.raw_id, vec![0xC1, 0xC2]);
        assert_eq!(credential.response.authenticator_data, vec![0xAD; 37]);
        assert_eq!(credential.response.signature, vec![0x30, 0x45]);
        assert_eq!(credential.response.user_handle.as_deref(), Some(&b"alice"[..]));
        assert_eq!(credential.response.client_data_json, r#"{"type":"webauthn.get"}"#);

        let request = session.request();
        assert_eq!(request.rp_id, "example.com");
        assert!(!request.require_user_verification);
        assert!(request.require_user_presence);
    }

    #[tokio::test]
    async fn test_allow_list_filtered_by_transport() {
        let session = Arc::new(MockSession::new(true));
        let mut options = PublicKeyCredentialRequestOptions::new(vec![1; 16]);
        options.add_allow_credential(PublicKeyCredentialDescriptor::with_transports(
            vec![1],
            vec![AuthenticatorTransport::Nfc],
        ));
        options.add_allow_credential(PublicKeyCredentialDescriptor::with_transports(
            vec![2],
            vec![AuthenticatorTransport::Internal],
        ));
        let op = operation(options, &session);
        op.start().await.unwrap();

        let allowed = session.request().allow_credentials;
        assert_eq!(allowed.len(), 1);
        assert_eq!(allowed[0].id, vec![2]);
    }

    #[tokio::test]
    async fn test_required_verification_without_capability() {
        let mut mock = MockSession::new(true);
        mock.user_verification = false;
        let session = Arc::new(mock);
        let mut options = PublicKeyCredentialRequestOptions::new(vec![1; 16]);
        options.user_verification = UserVerificationRequirement::Required;
        let op = operation(options, &session);

        assert_eq!(op.start().await, Err(Error::Unsupported));
        assert_eq!(session.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_preferred_verification_uses_capability() {
        let session = Arc::new(MockSession::new(true));
        let mut options = PublicKeyCredentialRequestOptions::new(vec![1; 16]);
        options.user_verification = UserVerificationRequirement::Preferred;
        let op = operation(options, &session);
        op.start().await.unwrap();

        let request = session.request();
        assert!(request.require_user_verification);
        assert!(!request.require_user_presence);
    }

    #[tokio::test]
    async fn test_assertion_after_cancel_ignored() {
        let session = Arc::new(MockSession::new(false));
        let op = Arc::new(operation(PublicKeyCredentialRequestOptions::new(vec![1; 16]), &session));
        let runner = {
            let op = op.clone();
            tokio::spawn(async move { op.start().await })
        };

        while session.request.lock().unwrap().is_none() {
            tokio::task::yield_now().await;
        }
        op.cancel();

        let listener = session.listener.lock().unwrap().clone().unwrap();
        listener.on_assertion_created(Assertion {
            credential_id: vec![0xC3],
            authenticator_data: vec![0xAD; 37],
            signature: vec![0x30, 0x44],
            user_handle: None,
        });

        assert_eq!(runner.await.unwrap(), Err(Error::Cancelled));
        assert_eq!(op.state(), OperationState::Stopped(Error::Cancelled));
        assert_eq!(session.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_cancel_is_noop() {
        let session = Arc::new(MockSession::new(false));
        let op = operation(PublicKeyCredentialRequestOptions::new(vec![1; 16]), &session);

        assert_eq!(op.start().await, Err(Error::Timeout));
        op.cancel();
        assert_eq!(op.state(), OperationState::Stopped(Error::Timeout));
        assert_eq!(session.cancels.load(Ordering::SeqCst), 1);
    }
}
