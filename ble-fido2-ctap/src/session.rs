//! Authenticator session interfaces
//!
//! A ceremony operation drives exactly one session. The session reports
//! progress through a listener registered before `start`; all events may be
//! delivered from any task, and a session must not call its listener from
//! inside `cancel`.

use crate::attestation::AttestationObject;
use crate::error::Error;
use crate::types::{
    AuthenticatorAttachment, AuthenticatorTransport, PublicKeyCredentialDescriptor,
    PublicKeyCredentialParameters, PublicKeyCredentialRpEntity, PublicKeyCredentialUserEntity,
};

use std::sync::Arc;

/// Parameters handed to a make-credential session once it is available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeCredentialRequest {
    pub client_data_hash: Vec<u8>,
    /// RP entity with its id resolved
    pub rp: PublicKeyCredentialRpEntity,
    pub user: PublicKeyCredentialUserEntity,
    pub require_resident_key: bool,
    pub require_user_presence: bool,
    pub require_user_verification: bool,
    pub cred_params: Vec<PublicKeyCredentialParameters>,
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
}

/// Parameters handed to a get-assertion session once it is available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAssertionRequest {
    pub rp_id: String,
    pub client_data_hash: Vec<u8>,
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub require_user_presence: bool,
    pub require_user_verification: bool,
}

/// Raw assertion produced by a get-assertion session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub credential_id: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

pub trait MakeCredentialSessionListener: Send + Sync {
    fn on_available(&self);
    fn on_unavailable(&self);
    fn on_credential_created(&self, attestation: AttestationObject);
    fn on_operation_stopped(&self, reason: Error);
}

pub trait GetAssertionSessionListener: Send + Sync {
    fn on_available(&self);
    fn on_unavailable(&self);
    fn on_assertion_created(&self, assertion: Assertion);
    fn on_operation_stopped(&self, reason: Error);
}

/// Session capabilities shared by both ceremony kinds
pub trait SessionCapabilities: Send + Sync {
    fn attachment(&self) -> AuthenticatorAttachment;
    fn transport(&self) -> AuthenticatorTransport;
    fn can_store_resident_key(&self) -> bool;
    fn can_perform_user_verification(&self) -> bool;
}

pub trait MakeCredentialSession: SessionCapabilities {
    fn set_listener(&self, listener: Arc<dyn MakeCredentialSessionListener>);

    /// Request activation; answered with `on_available` or `on_unavailable`
    fn start(&self);

    /// Abort any in-flight work; no listener events follow
    fn cancel(&self, reason: Error);

    fn make_credential(&self, request: MakeCredentialRequest);
}

pub trait GetAssertionSession: SessionCapabilities {
    fn set_listener(&self, listener: Arc<dyn GetAssertionSessionListener>);

    /// Request activation; answered with `on_available` or `on_unavailable`
    fn start(&self);

    /// Abort any in-flight work; no listener events follow
    fn cancel(&self, reason: Error);

    fn get_assertion(&self, request: GetAssertionRequest);
}

/// Source of ceremony sessions
pub trait Authenticator: Send + Sync {
    fn attachment(&self) -> AuthenticatorAttachment;
    fn transport(&self) -> AuthenticatorTransport;
    fn new_make_credential_session(&self) -> Arc<dyn MakeCredentialSession>;
    fn new_get_assertion_session(&self) -> Arc<dyn GetAssertionSession>;
}
