//! authenticatorGetAssertion command
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#authenticatorGetAssertion>

use super::make_credential::CLIENT_DATA_HASH_LEN;
use super::{descriptors, Params, RequestOptions};
use crate::cbor::{MapBuilder, Value};
use crate::error::{Error, Result};
use crate::types::{GetAssertionResponse, PublicKeyCredentialRequestOptions, PUBLIC_KEY_TYPE};

/// Request parameter keys
mod keys {
    pub const RP_ID: i64 = 0x01;
    pub const CLIENT_DATA_HASH: i64 = 0x02;
    pub const ALLOW_LIST: i64 = 0x03;
    pub const OPTIONS: i64 = 0x05;
}

/// Response keys
mod response_keys {
    pub const CREDENTIAL: i64 = 0x01;
    pub const AUTH_DATA: i64 = 0x02;
    pub const SIGNATURE: i64 = 0x03;
    pub const USER: i64 = 0x04;
}

/// Parsed authenticatorGetAssertion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAssertionCommand {
    pub rp_id: String,
    pub client_data_hash: Vec<u8>,
    pub options: PublicKeyCredentialRequestOptions,
}

pub fn parse(request: &[u8]) -> Result<GetAssertionCommand> {
    let params = Params::decode(request)?;

    let rp_id = params.text(keys::RP_ID, "rpId")?;
    let client_data_hash = params.bytes(keys::CLIENT_DATA_HASH, "clientDataHash")?;
    if client_data_hash.len() != CLIENT_DATA_HASH_LEN {
        return Err(Error::invalid_parameters("clientDataHash must be 32 bytes"));
    }
    let allow_credentials = descriptors(params.get(keys::ALLOW_LIST, "allowList"))?;
    let flags = RequestOptions::parse(params.get(keys::OPTIONS, "options"))?;

    let options = PublicKeyCredentialRequestOptions {
        challenge: Vec::new(),
        timeout: None,
        rp_id: Some(rp_id.clone()),
        allow_credentials,
        user_verification: flags.user_verification(),
    };

    Ok(GetAssertionCommand {
        rp_id,
        client_data_hash,
        options,
    })
}

/// Encode the `{1: credential, 2: authData, 3: signature, 4: user}` map
///
/// The user member is present only when the authenticator returned a user
/// handle.
pub fn encode_response(credential: &GetAssertionResponse) -> Result<Vec<u8>> {
    let descriptor = MapBuilder::new()
        .insert_bytes("id", &credential.raw_id)
        .insert("type", PUBLIC_KEY_TYPE)
        .build_value();
    let user = credential
        .response
        .user_handle
        .as_deref()
        .map(|handle| MapBuilder::new().insert_bytes("id", handle).build_value());

    MapBuilder::new()
        .insert(response_keys::CREDENTIAL, descriptor)
        .insert_bytes(response_keys::AUTH_DATA, &credential.response.authenticator_data)
        .insert_bytes(response_keys::SIGNATURE, &credential.response.signature)
        .insert_opt(response_keys::USER, user)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor;
    use crate::types::{AuthenticatorAssertionResponse, PublicKeyCredential, UserVerificationRequirement};

    #[test]
    fn test_parse() {
        let request = MapBuilder::new()
            .insert(keys::RP_ID, "example.com")
            .insert_bytes(keys::CLIENT_DATA_HASH, &[0x11; 32])
            .insert(
                keys::ALLOW_LIST,
                Value::Array(vec![Value::map([
                    ("id", Value::from(vec![0xC1u8])),
                    ("type", Value::from("public-key")),
                ])]),
            )
            .insert(keys::OPTIONS, Value::map([("uv", Value::from(true))]))
            .build()
            .unwrap();

        let command = parse(&request).unwrap();
        assert_eq!(command.rp_id, "example.com");
        assert_eq!(command.options.rp_id.as_deref(), Some("example.com"));
        assert_eq!(command.options.allow_credentials[0].id, vec![0xC1]);
        assert_eq!(
            command.options.user_verification,
            UserVerificationRequirement::Required
        );
    }

    #[test]
    fn test_parse_requires_rp_id() {
        let request = MapBuilder::new()
            .insert_bytes(keys::CLIENT_DATA_HASH, &[0x11; 32])
            .build()
            .unwrap();
        assert!(matches!(parse(&request), Err(Error::InvalidParameters(_))));
    }

    #[test]
    fn test_encode_response() {
        let credential = PublicKeyCredential::new(
            vec![0xC1, 0xC2],
            AuthenticatorAssertionResponse {
                client_data_json: String::new(),
                authenticator_data: vec![0xAD; 37],
                signature: vec![0x30, 0x44],
                user_handle: Some(vec![0x05]),
            },
        );
        let value = cbor::decode(&encode_response(&credential).unwrap()).unwrap();

        let descriptor = value.get_int(1).unwrap();
        assert_eq!(descriptor.get_text("id").and_then(Value::as_bytes), Some(&[0xC1, 0xC2][..]));
        assert_eq!(descriptor.get_text("type").and_then(Value::as_text), Some("public-key"));
        assert_eq!(value.get_int(2).and_then(Value::as_bytes), Some(&[0xAD; 37][..]));
        assert_eq!(value.get_int(3).and_then(Value::as_bytes), Some(&[0x30, 0x44][..]));
        assert_eq!(
            value.get_int(4).and_then(|u| u.get_text("id")).and_then(Value::as_bytes),
            Some(&[0x05][..])
        );
    }

    #[test]
    fn test_encode_response_without_user() {
        let credential = PublicKeyCredential::new(
            vec![0xC1],
            AuthenticatorAssertionResponse {
                client_data_json: String::new(),
                authenticator_data: vec![0xAD; 37],
                signature: vec![0x30],
                user_handle: None,
            },
        );
        let value = cbor::decode(&encode_response(&credential).unwrap()).unwrap();
        assert!(value.get_int(4).is_none());
    }
}
