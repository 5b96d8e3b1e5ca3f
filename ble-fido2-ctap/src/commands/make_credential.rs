//! authenticatorMakeCredential command
//!
//! The request map is turned into WebAuthn creation options and run as a
//! [`CreateOperation`](crate::operation::CreateOperation) by the dispatcher.
//! The client sends only the client data hash, so the response carries the
//! attestation object the authenticator produced without any conveyance
//! reduction.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#authenticatorMakeCredential>

use super::{credential_parameters, descriptors, member_text, Params, RequestOptions};
use crate::attestation::AttestationObject;
use crate::cbor::{self, Value};
use crate::error::{Error, Result};
use crate::types::{
    AttestationConveyancePreference, AuthenticatorSelectionCriteria, MakeCredentialResponse,
    PublicKeyCredentialCreationOptions, PublicKeyCredentialRpEntity,
    PublicKeyCredentialUserEntity,
};

/// Request parameter keys
mod keys {
    pub const CLIENT_DATA_HASH: i64 = 0x01;
    pub const RP: i64 = 0x02;
    pub const USER: i64 = 0x03;
    pub const PUB_KEY_CRED_PARAMS: i64 = 0x04;
    pub const EXCLUDE_LIST: i64 = 0x05;
    pub const OPTIONS: i64 = 0x07;
}

/// Length of a SHA-256 client data hash
pub const CLIENT_DATA_HASH_LEN: usize = 32;

/// Parsed authenticatorMakeCredential request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeCredentialCommand {
    pub rp_id: String,
    pub client_data_hash: Vec<u8>,
    pub options: PublicKeyCredentialCreationOptions,
}

/// Parse a request parameter map
///
/// Extensions (key 0x06) are ignored.
pub fn parse(request: &[u8]) -> Result<MakeCredentialCommand> {
    let params = Params::decode(request)?;

    let client_data_hash = params.bytes(keys::CLIENT_DATA_HASH, "clientDataHash")?;
    if client_data_hash.len() != CLIENT_DATA_HASH_LEN {
        return Err(Error::invalid_parameters("clientDataHash must be 32 bytes"));
    }

    let rp_value = params.require(keys::RP, "rp")?;
    let rp_id = member_text(rp_value, "id")?
        .ok_or_else(|| Error::invalid_parameters("rp.id missing"))?;
    let rp = PublicKeyCredentialRpEntity {
        id: Some(rp_id.clone()),
        name: member_text(rp_value, "name")?.unwrap_or_default(),
        icon: member_text(rp_value, "icon")?,
    };

    let user_value = params.require(keys::USER, "user")?;
    let user = PublicKeyCredentialUserEntity {
        id: user_value
            .get_text("id")
            .and_then(Value::as_bytes)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::invalid_parameters("user.id missing"))?,
        name: member_text(user_value, "name")?.unwrap_or_default(),
        display_name: member_text(user_value, "displayName")?.unwrap_or_default(),
        icon: member_text(user_value, "icon")?,
    };

    let pub_key_cred_params =
        credential_parameters(params.require(keys::PUB_KEY_CRED_PARAMS, "pubKeyCredParams")?)?;
    let exclude_credentials = descriptors(params.get(keys::EXCLUDE_LIST, "excludeList"))?;
    let flags = RequestOptions::parse(params.get(keys::OPTIONS, "options"))?;

    let options = PublicKeyCredentialCreationOptions {
        rp,
        user,
        challenge: Vec::new(),
        pub_key_cred_params,
        timeout: None,
        exclude_credentials,
        authenticator_selection: Some(AuthenticatorSelectionCriteria {
            authenticator_attachment: None,
            require_resident_key: flags.rk,
            user_verification: flags.user_verification(),
        }),
        attestation: AttestationConveyancePreference::Direct,
    };

    Ok(MakeCredentialCommand {
        rp_id,
        client_data_hash,
        options,
    })
}

/// Encode the `{1: fmt, 2: authData, 3: attStmt}` response map
pub fn encode_response(credential: &MakeCredentialResponse) -> Result<Vec<u8>> {
    let object = AttestationObject::from_bytes(&credential.response.attestation_object)?;
    cbor::encode(&object.to_ctap_value()?)
}
