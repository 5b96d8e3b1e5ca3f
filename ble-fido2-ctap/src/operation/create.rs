//! Make-credential ceremony

use super::{drive, judge_user_verification, Ceremony, Lifecycle, Listener, OperationState};
use crate::attestation::AttestationObject;
use crate::error::{Error, Result};
use crate::session::{MakeCredentialRequest, MakeCredentialSession, MakeCredentialSessionListener};
use crate::types::{
    AttestationConveyancePreference, AuthenticatorAttestationResponse, MakeCredentialResponse,
    PublicKeyCredential, PublicKeyCredentialCreationOptions, PublicKeyCredentialRpEntity,
    UserVerificationRequirement,
};

use std::sync::Arc;
use std::time::Duration;

/// One make-credential ceremony against one session
///
/// `start` suspends until the session produces a credential, reports a
/// stop, becomes unavailable, the lifetime elapses, or `cancel` is called.
pub struct CreateOperation {
    inner: Arc<Inner>,
}

struct Inner {
    options: PublicKeyCredentialCreationOptions,
    rp_id: String,
    session: Arc<dyn MakeCredentialSession>,
    client_data_json: String,
    client_data_hash: Vec<u8>,
    lifetime: Duration,
    lifecycle: Lifecycle<MakeCredentialResponse>,
}

impl CreateOperation {
    pub fn new(
        options: PublicKeyCredentialCreationOptions,
        rp_id: impl Into<String>,
        session: Arc<dyn MakeCredentialSession>,
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

    /// Run the ceremony to its single outcome
    ///
    /// Fails with [`Error::BadOperation`] if this operation was already
    /// started or stopped.
    #[tracing::instrument(skip_all, fields(rp_id = %self.inner.rp_id))]
    pub async fn start(&self) -> Result<MakeCredentialResponse> {
        drive(&self.inner).await
    }

    /// Stop the ceremony; a no-op once it has settled
    pub fn cancel(&self) {
        tracing::debug!("cancel");
        self.inner.stop(Error::Cancelled);
    }
}

impl Ceremony for Inner {
    type Output = MakeCredentialResponse;

    fn lifecycle(&self) -> &Lifecycle<MakeCredentialResponse> {
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
        let selection = self.options.authenticator_selection.as_ref();

        if let Some(selection) = selection {
            if let Some(attachment) = selection.authenticator_attachment {
                if attachment != session.attachment() {
                    tracing::debug!(?attachment, "attachment doesn't match the RP's request");
                    self.stop(Error::Unsupported);
                    return;
                }
            }

            if selection.require_resident_key && !session.can_store_resident_key() {
                tracing::debug!("authenticator can't store resident keys");
                self.stop(Error::Unsupported);
                return;
            }

            if selection.user_verification == UserVerificationRequirement::Required
                && !session.can_perform_user_verification()
            {
                tracing::debug!("authenticator can't perform user verification");
                self.stop(Error::Unsupported);
                return;
            }
        }

        let requirement = selection
            .map(|s| s.user_verification)
            .unwrap_or(UserVerificationRequirement::Discouraged);
        let user_verification = judge_user_verification(requirement, session);

        let transport = session.transport();
        let exclude_credentials = self
            .options
            .exclude_credentials
            .iter()
            .filter(|d| d.reachable_over(transport))
            .cloned()
            .collect();

        let rp = PublicKeyCredentialRpEntity {
            id: Some(self.rp_id.clone()),
            name: self.options.rp.name.clone(),
            icon: self.options.rp.icon.clone(),
        };

        session.make_credential(MakeCredentialRequest {
            client_data_hash: self.client_data_hash.clone(),
            rp,
            user: self.options.user.clone(),
            require_resident_key: selection.is_some_and(|s| s.require_resident_key),
            require_user_presence: !user_verification,
            require_user_verification: user_verification,
            cred_params: self.options.pub_key_cred_params.clone(),
            exclude_credentials,
        });
    }

    fn on_credential_created(&self, attestation: AttestationObject) {
        tracing::debug!(fmt = attestation.format().as_str(), "credential created");
        if !self.lifecycle.is_started() {
            tracing::debug!("already stopped");
            return;
        }

        let Some(credential_id) = attestation
            .auth_data
            .attested_credential_data
            .as_ref()
            .map(|attested| attested.credential_id.clone())
        else {
            tracing::warn!("attested credential data not found");
            self.stop(Error::BadOperation);
            return;
        };

        let reduce = self.options.attestation == AttestationConveyancePreference::None
            && attestation.is_self_attestation();
        let encoded = if reduce {
            attestation.to_none_form().and_then(|none| none.to_bytes())
        } else {
            attestation.to_bytes()
        };
        let attestation_object = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to build attestation object");
                self.stop(Error::EncodingFailed);
                return;
            }
        };

        let credential = PublicKeyCredential::new(
            credential_id,
            AuthenticatorAttestationResponse {
                client_data_json: self.client_data_json.clone(),
                attestation_object,
            },
        );

        if self.lifecycle.complete(credential) {
            tracing::debug!("completed");
        }
    }
}

impl MakeCredentialSessionListener for Listener<Inner> {
    fn on_available(&self) {
        self.with_ceremony(Inner::on_available);
    }

    fn on_unavailable(&self) {
        self.unavailable();
    }

    fn on_credential_created(&self, attestation: AttestationObject) {
        self.with_ceremony(|inner| inner.on_credential_created(attestation));
    }

    fn on_operation_stopped(&self, reason: Error) {
        self.stopped(reason);
    }
}
