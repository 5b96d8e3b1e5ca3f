//! CTAP command handlers
//!
//! Only the commands this authenticator answers over BLE MSG frames are
//! modelled here. Request parameter maps are accepted int-keyed (CTAP2
//! member keys) or text-keyed (WebAuthn member names).
//!
//! See FIDO2 spec section 6 for command definitions:
//! <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#authenticator-api>

pub mod get_assertion;
pub mod get_info;
pub mod make_credential;

use crate::cbor::{self, MapKey, Value};
use crate::error::{Error, Result};
use crate::types::{
    AuthenticatorTransport, PublicKeyCredentialDescriptor, PublicKeyCredentialParameters,
    UserVerificationRequirement, PUBLIC_KEY_TYPE,
};

/// CTAP command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandCode {
    MakeCredential = 0x01,
    GetAssertion = 0x02,
    GetInfo = 0x04,
    ClientPin = 0x06,
    Reset = 0x07,
    GetNextAssertion = 0x08,
}

impl CommandCode {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::MakeCredential),
            0x02 => Some(Self::GetAssertion),
            0x04 => Some(Self::GetInfo),
            0x06 => Some(Self::ClientPin),
            0x07 => Some(Self::Reset),
            0x08 => Some(Self::GetNextAssertion),
            _ => None,
        }
    }
}

/// Decoded request parameter map
///
/// Every member is looked up by its CTAP2 integer key first and then by its
/// WebAuthn name, so both encodings share one parser.
pub(crate) struct Params {
    map: Vec<(MapKey, Value)>,
}

impl Params {
    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        let value = cbor::decode(bytes)
            .map_err(|e| Error::invalid_parameters(format!("request map: {}", e)))?;
        match value {
            Value::Map(map) => Ok(Self { map }),
            _ => Err(Error::invalid_parameters("request is not a map")),
        }
    }

    pub(crate) fn get(&self, key: i64, name: &str) -> Option<&Value> {
        self.map
            .iter()
            .find(|(k, _)| match k {
                MapKey::Int(i) => *i == key,
                MapKey::Text(t) => t == name,
            })
            .map(|(_, v)| v)
    }

    pub(crate) fn require(&self, key: i64, name: &str) -> Result<&Value> {
        self.get(key, name)
            .ok_or_else(|| Error::invalid_parameters(format!("missing {}", name)))
    }

    pub(crate) fn bytes(&self, key: i64, name: &str) -> Result<Vec<u8>> {
        self.require(key, name)?
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::invalid_parameters(format!("{} must be a byte string", name)))
    }

    pub(crate) fn text(&self, key: i64, name: &str) -> Result<String> {
        self.require(key, name)?
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| Error::invalid_parameters(format!("{} must be a text string", name)))
    }
}

/// Text member of a nested entity map
pub(crate) fn member_text(entity: &Value, name: &str) -> Result<Option<String>> {
    match entity.get_text(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_text()
            .map(|t| Some(t.to_string()))
            .ok_or_else(|| Error::invalid_parameters(format!("{} must be a text string", name))),
    }
}

/// Credential descriptor list (`excludeList` / `allowList`)
///
/// Transport hints are kept when present and recognised.
pub(crate) fn descriptors(value: Option<&Value>) -> Result<Vec<PublicKeyCredentialDescriptor>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let items = value
        .as_array()
        .ok_or_else(|| Error::invalid_parameters("credential list must be an array"))?;

    let mut descriptors = Vec::with_capacity(items.len());
    for item in items {
        let cred_type = member_text(item, "type")?
            .ok_or_else(|| Error::invalid_parameters("descriptor type missing"))?;
        let id = item
            .get_text("id")
            .and_then(Value::as_bytes)
            .ok_or_else(|| Error::invalid_parameters("descriptor id missing"))?;
        if cred_type != PUBLIC_KEY_TYPE {
            tracing::debug!(cred_type, "skipping descriptor of unknown type");
            continue;
        }
        let transports = item
            .get_text("transports")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_text)
                    .filter_map(AuthenticatorTransport::from_name)
                    .collect()
            })
            .unwrap_or_default();
        descriptors.push(PublicKeyCredentialDescriptor::with_transports(
            id.to_vec(),
            transports,
        ));
    }
    Ok(descriptors)
}

/// `pubKeyCredParams`, keeping unknown types out
pub(crate) fn credential_parameters(value: &Value) -> Result<Vec<PublicKeyCredentialParameters>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::invalid_parameters("pubKeyCredParams must be an array"))?;

    let mut params = Vec::with_capacity(items.len());
    for item in items {
        let cred_type = member_text(item, "type")?
            .ok_or_else(|| Error::invalid_parameters("parameter type missing"))?;
        let alg = item
            .get_text("alg")
            .and_then(Value::as_i64)
            .and_then(|a| i32::try_from(a).ok())
            .ok_or_else(|| Error::invalid_parameters("parameter alg missing"))?;
        if cred_type == PUBLIC_KEY_TYPE {
            params.push(PublicKeyCredentialParameters::new(alg));
        }
    }
    Ok(params)
}

/// Authenticator options map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RequestOptions {
    pub rk: bool,
    pub uv: bool,
}

impl RequestOptions {
    pub(crate) fn parse(value: Option<&Value>) -> Result<Self> {
        let Some(value) = value else {
            return Ok(Self::default());
        };
        if value.as_map().is_none() {
            return Err(Error::invalid_parameters("options must be a map"));
        }
        let flag = |name: &str| -> Result<bool> {
            match value.get_text(name) {
                None => Ok(false),
                Some(v) => v
                    .as_bool()
                    .ok_or_else(|| Error::invalid_parameters(format!("option {} must be bool", name))),
            }
        };
        Ok(Self {
            rk: flag("rk")?,
            uv: flag("uv")?,
        })
    }

    pub(crate) fn user_verification(&self) -> UserVerificationRequirement {
        if self.uv {
            UserVerificationRequirement::Required
        } else {
            UserVerificationRequirement::Discouraged
        }
    }
}
