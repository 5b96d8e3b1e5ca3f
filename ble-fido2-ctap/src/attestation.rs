//! Authenticator data and attestation objects
//!
//! Layout of authenticator data:
//!
//! ```text
//! rpIdHash (32) | flags (1) | signCount (4, big-endian)
//!   [ aaguid (16) | credentialIdLength (2, big-endian) | credentialId | credentialPublicKey ]
//! ```
//!
//! See <https://www.w3.org/TR/webauthn-2/#sctn-authenticator-data>

use crate::cbor::{self, MapKey, Reader, Value};
use crate::cose::CoseKey;
use crate::error::{Error, Result};

use sha2::{Digest, Sha256};

/// Authenticator data flag bits
pub mod flags {
    /// User present
    pub const UP: u8 = 0x01;
    /// User verified
    pub const UV: u8 = 0x04;
    /// Attested credential data included
    pub const AT: u8 = 0x40;
    /// Extension data included
    pub const ED: u8 = 0x80;
}

pub const RP_ID_HASH_LEN: usize = 32;
pub const FLAGS_LEN: usize = 1;
pub const SIGN_COUNT_LEN: usize = 4;
pub const AAGUID_LEN: usize = 16;

/// Position of the AAGUID inside authenticator data
pub const AAGUID_OFFSET: usize = RP_ID_HASH_LEN + FLAGS_LEN + SIGN_COUNT_LEN;

const FIXED_LEN: usize = AAGUID_OFFSET;

/// Attested credential data block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    pub credential_public_key: CoseKey,
}

impl AttestedCredentialData {
    pub fn new(aaguid: [u8; AAGUID_LEN], credential_id: Vec<u8>, key: CoseKey) -> Self {
        Self {
            aaguid,
            credential_id,
            credential_public_key: key,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let id_len = u16::try_from(self.credential_id.len()).map_err(|_| Error::EncodingFailed)?;
        let key = self
            .credential_public_key
            .to_cbor()
            .map_err(|_| Error::EncodingFailed)?;

        out.extend_from_slice(&self.aaguid);
        out.extend_from_slice(&id_len.to_be_bytes());
        out.extend_from_slice(&self.credential_id);
        out.extend_from_slice(&key);
        Ok(())
    }
}

/// Authenticator data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub user_present: bool,
    pub user_verified: bool,
    pub sign_count: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    /// Build authenticator data for `rp_id`, hashing it with SHA-256
    pub fn new(
        rp_id: &str,
        user_present: bool,
        user_verified: bool,
        sign_count: u32,
        attested_credential_data: Option<AttestedCredentialData>,
    ) -> Self {
        Self {
            rp_id_hash: Sha256::digest(rp_id.as_bytes()).into(),
            user_present,
            user_verified,
            sign_count,
            attested_credential_data,
        }
    }

    pub fn flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.user_present {
            flags |= flags::UP;
        }
        if self.user_verified {
            flags |= flags::UV;
        }
        if self.attested_credential_data.is_some() {
            flags |= flags::AT;
        }
        flags
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(FIXED_LEN + 128);
        out.extend_from_slice(&self.rp_id_hash);
        out.push(self.flags());
        out.extend_from_slice(&self.sign_count.to_be_bytes());
        if let Some(attested) = &self.attested_credential_data {
            attested.write_to(&mut out)?;
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIXED_LEN {
            return Err(Error::malformed("authenticator data too short"));
        }

        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(&bytes[..RP_ID_HASH_LEN]);
        let flag_byte = bytes[RP_ID_HASH_LEN];
        let mut count = [0u8; SIGN_COUNT_LEN];
        count.copy_from_slice(&bytes[RP_ID_HASH_LEN + FLAGS_LEN..FIXED_LEN]);

        if flag_byte & flags::ED != 0 {
            return Err(Error::Unsupported);
        }

        let rest = &bytes[FIXED_LEN..];
        let attested_credential_data = if flag_byte & flags::AT != 0 {
            Some(parse_attested(rest)?)
        } else if !rest.is_empty() {
            return Err(Error::malformed("unexpected bytes after sign count"));
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            user_present: flag_byte & flags::UP != 0,
            user_verified: flag_byte & flags::UV != 0,
            sign_count: u32::from_be_bytes(count),
            attested_credential_data,
        })
    }
}

fn parse_attested(bytes: &[u8]) -> Result<AttestedCredentialData> {
    if bytes.len() < AAGUID_LEN + 2 {
        return Err(Error::malformed("attested credential data too short"));
    }
    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&bytes[..AAGUID_LEN]);
    let id_len = u16::from_be_bytes([bytes[AAGUID_LEN], bytes[AAGUID_LEN + 1]]) as usize;
    let id_start = AAGUID_LEN + 2;
    let key_start = id_start + id_len;
    if bytes.len() < key_start {
        return Err(Error::malformed("credential id exceeds authenticator data"));
    }

    let mut reader = Reader::new(&bytes[key_start..]);
    let key = CoseKey::from_value(&reader.read_any()?)?;
    if reader.rest_size() != 0 {
        return Err(Error::malformed("unexpected bytes after credential key"));
    }

    Ok(AttestedCredentialData {
        aaguid,
        credential_id: bytes[id_start..key_start].to_vec(),
        credential_public_key: key,
    })
}

/// Attestation statement formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationFormat {
    Packed,
    AndroidKey,
    None,
}

impl AttestationFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            AttestationFormat::Packed => "packed",
            AttestationFormat::AndroidKey => "android-key",
            AttestationFormat::None => "none",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "packed" => Some(AttestationFormat::Packed),
            "android-key" => Some(AttestationFormat::AndroidKey),
            "none" => Some(AttestationFormat::None),
            _ => None,
        }
    }
}

/// Format-specific attestation statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationStatement {
    /// `packed`; self attestation when `x5c` is absent
    Packed {
        alg: i32,
        sig: Vec<u8>,
        x5c: Option<Vec<Vec<u8>>>,
    },
    /// `android-key`, always carrying a certificate chain
    AndroidKey {
        alg: i32,
        sig: Vec<u8>,
        x5c: Vec<Vec<u8>>,
    },
    /// `none`, an empty map
    None,
}

impl AttestationStatement {
    pub fn format(&self) -> AttestationFormat {
        match self {
            AttestationStatement::Packed { .. } => AttestationFormat::Packed,
            AttestationStatement::AndroidKey { .. } => AttestationFormat::AndroidKey,
            AttestationStatement::None => AttestationFormat::None,
        }
    }

    pub fn to_value(&self) -> Value {
        let chain = |x5c: &[Vec<u8>]| Value::Array(x5c.iter().cloned().map(Value::Bytes).collect());
        match self {
            AttestationStatement::Packed { alg, sig, x5c } => {
                let mut entries = vec![
                    ("alg", Value::from(*alg)),
                    ("sig", Value::Bytes(sig.clone())),
                ];
                if let Some(x5c) = x5c {
                    entries.push(("x5c", chain(x5c)));
                }
                Value::map(entries)
            }
            AttestationStatement::AndroidKey { alg, sig, x5c } => Value::map([
                ("alg", Value::from(*alg)),
                ("sig", Value::Bytes(sig.clone())),
                ("x5c", chain(x5c)),
            ]),
            AttestationStatement::None => Value::Map(Vec::new()),
        }
    }

    fn from_value(format: AttestationFormat, value: &Value) -> Result<Self> {
        if value.as_map().is_none() {
            return Err(Error::malformed("attStmt is not a map"));
        }
        let alg = || -> Result<i32> {
            value
                .get_text("alg")
                .and_then(Value::as_i64)
                .and_then(|a| i32::try_from(a).ok())
                .ok_or_else(|| Error::malformed("attStmt alg missing"))
        };
        let sig = || -> Result<Vec<u8>> {
            value
                .get_text("sig")
                .and_then(Value::as_bytes)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| Error::malformed("attStmt sig missing"))
        };
        let x5c = || -> Result<Option<Vec<Vec<u8>>>> {
            let Some(chain) = value.get_text("x5c") else {
                return Ok(None);
            };
            chain
                .as_array()
                .ok_or_else(|| Error::malformed("x5c is not an array"))?
                .iter()
                .map(|cert| {
                    cert.as_bytes()
                        .map(<[u8]>::to_vec)
                        .ok_or_else(|| Error::malformed("x5c entry is not a byte string"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some)
        };

        match format {
            AttestationFormat::Packed => Ok(AttestationStatement::Packed {
                alg: alg()?,
                sig: sig()?,
                x5c: x5c()?,
            }),
            AttestationFormat::AndroidKey => Ok(AttestationStatement::AndroidKey {
                alg: alg()?,
                sig: sig()?,
                x5c: x5c()?.ok_or_else(|| Error::malformed("android-key without x5c"))?,
            }),
            AttestationFormat::None => Ok(AttestationStatement::None),
        }
    }
}

/// Attestation object returned from a make-credential ceremony
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationObject {
    pub auth_data: AuthenticatorData,
    pub statement: AttestationStatement,
}

impl AttestationObject {
    pub fn new(auth_data: AuthenticatorData, statement: AttestationStatement) -> Self {
        Self {
            auth_data,
            statement,
        }
    }

    pub fn format(&self) -> AttestationFormat {
        self.statement.format()
    }

    /// True when the statement is signed by the credential key itself
    pub fn is_self_attestation(&self) -> bool {
        matches!(self.statement, AttestationStatement::Packed { x5c: None, .. })
    }

    /// Copy of this object in "none" form: AAGUID zeroed, empty statement
    ///
    /// Only self attestation may be reduced this way.
    pub fn to_none_form(&self) -> Result<Self> {
        if !self.is_self_attestation() {
            return Err(Error::BadOperation);
        }

        let mut auth_data = self.auth_data.clone();
        if let Some(attested) = auth_data.attested_credential_data.as_mut() {
            attested.aaguid = [0u8; AAGUID_LEN];
        }

        Ok(Self {
            auth_data,
            statement: AttestationStatement::None,
        })
    }

    /// Encode as the WebAuthn text-keyed map `{fmt, attStmt, authData}`
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let auth_data = self.auth_data.to_bytes()?;
        let value = Value::map([
            ("fmt", Value::from(self.format().as_str())),
            ("attStmt", self.statement.to_value()),
            ("authData", Value::Bytes(auth_data)),
        ]);
        cbor::encode(&value).map_err(|_| Error::EncodingFailed)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value = cbor::decode(bytes)?;
        let fmt = value
            .get_text("fmt")
            .and_then(Value::as_text)
            .ok_or_else(|| Error::malformed("fmt missing"))?;
        let format = AttestationFormat::from_name(fmt).ok_or(Error::Unsupported)?;
        let auth_data = value
            .get_text("authData")
            .and_then(Value::as_bytes)
            .ok_or_else(|| Error::malformed("authData missing"))?;
        let statement = value
            .get_text("attStmt")
            .ok_or_else(|| Error::malformed("attStmt missing"))?;

        Ok(Self {
            auth_data: AuthenticatorData::from_bytes(auth_data)?,
            statement: AttestationStatement::from_value(format, statement)?,
        })
    }

    /// Re-key into the CTAP2 response map `{1: fmt, 2: authData, 3: attStmt}`
    pub fn to_ctap_value(&self) -> Result<Value> {
        Ok(Value::Map(vec![
            (MapKey::Int(1), Value::from(self.format().as_str())),
            (MapKey::Int(2), Value::Bytes(self.auth_data.to_bytes()?)),
            (MapKey::Int(3), self.statement.to_value()),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cose::{alg, CRV_P256};

    fn ec_key() -> CoseKey {
        CoseKey::Ec2 {
            algorithm: alg::ES256,
            curve: CRV_P256,
            x: vec![0x0A; 32],
            y: vec![0x0B; 32],
        }
    }

    fn auth_data_with_credential() -> AuthenticatorData {
        AuthenticatorData::new(
            "example.com",
            true,
            false,
            7,
            Some(AttestedCredentialData::new(
                [0xAB; AAGUID_LEN],
                vec![1, 2, 3, 4],
                ec_key(),
            )),
        )
    }

    #[test]
    fn test_aaguid_offset() {
        assert_eq!(AAGUID_OFFSET, 37);
    }

    #[test]
    fn test_authenticator_data_layout() {
        let data = auth_data_with_credential();
        let bytes = data.to_bytes().unwrap();

        let expected_hash: [u8; 32] = Sha256::digest(b"example.com").into();
        assert_eq!(&bytes[..32], &expected_hash);
        assert_eq!(bytes[32], flags::UP | flags::AT);
        assert_eq!(&bytes[33..37], &[0, 0, 0, 7]);
        assert_eq!(&bytes[37..53], &[0xAB; 16]);
        assert_eq!(&bytes[53..55], &[0, 4]);
        assert_eq!(&bytes[55..59], &[1, 2, 3, 4]);
        assert_eq!(&bytes[59..], ec_key().to_cbor().unwrap().as_slice());

        assert_eq!(AuthenticatorData::from_bytes(&bytes).unwrap(), data);
    }

    #[test]
    fn test_assertion_authenticator_data() {
        let data = AuthenticatorData::new("example.com", false, true, 0x01020304, None);
        let bytes = data.to_bytes().unwrap();
        assert_eq!(bytes.len(), 37);
        assert_eq!(bytes[32], flags::UV);
        assert_eq!(&bytes[33..], &[1, 2, 3, 4]);
        assert_eq!(AuthenticatorData::from_bytes(&bytes).unwrap(), data);
    }

    #[test]
    fn test_oversized_credential_id_fails_encoding() {
        let mut data = auth_data_with_credential();
        if let Some(attested) = data.attested_credential_data.as_mut() {
            attested.credential_id = vec![0; u16::MAX as usize + 1];
        }
        assert_eq!(data.to_bytes(), Err(Error::EncodingFailed));
    }

    #[test]
    fn test_packed_attestation_object() {
        let object = AttestationObject::new(
            auth_data_with_credential(),
            AttestationStatement::Packed {
                alg: alg::ES256,
                sig: vec![0x30, 0x44],
                x5c: None,
            },
        );

        let bytes = object.to_bytes().unwrap();
        let value = cbor::decode(&bytes).unwrap();
        let keys: Vec<_> = value.as_map().unwrap().iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec![
                MapKey::from("fmt"),
                MapKey::from("attStmt"),
                MapKey::from("authData")
            ]
        );
        assert_eq!(value.get_text("fmt").unwrap().as_text(), Some("packed"));

        assert!(object.is_self_attestation());
        assert_eq!(AttestationObject::from_bytes(&bytes).unwrap(), object);
    }

    #[test]
    fn test_none_form_zeroes_only_aaguid() {
        let object = AttestationObject::new(
            auth_data_with_credential(),
            AttestationStatement::Packed {
                alg: alg::ES256,
                sig: vec![0x30, 0x45, 0x02],
                x5c: None,
            },
        );
        let original = object.auth_data.to_bytes().unwrap();

        let none = object.to_none_form().unwrap();
        let reduced = none.auth_data.to_bytes().unwrap();

        assert_eq!(reduced.len(), original.len());
        for (i, (a, b)) in original.iter().zip(reduced.iter()).enumerate() {
            if (AAGUID_OFFSET..AAGUID_OFFSET + AAGUID_LEN).contains(&i) {
                assert_eq!(*b, 0);
            } else {
                assert_eq!(a, b, "byte {} changed", i);
            }
        }

        assert_eq!(none.format(), AttestationFormat::None);
        assert_eq!(none.statement.to_value(), Value::Map(vec![]));

        // The source object is untouched
        assert_eq!(
            object.auth_data.attested_credential_data.as_ref().unwrap().aaguid,
            [0xAB; 16]
        );
    }

    #[test]
    fn test_none_form_requires_self_attestation() {
        let object = AttestationObject::new(
            auth_data_with_credential(),
            AttestationStatement::AndroidKey {
                alg: alg::ES256,
                sig: vec![1],
                x5c: vec![vec![0x30, 0x82]],
            },
        );
        assert!(!object.is_self_attestation());
        assert_eq!(object.to_none_form(), Err(Error::BadOperation));

        let bytes = object.to_bytes().unwrap();
        let decoded = AttestationObject::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.format(), AttestationFormat::AndroidKey);
    }

    #[test]
    fn test_ctap_response_keys() {
        let object = AttestationObject::new(
            auth_data_with_credential(),
            AttestationStatement::Packed {
                alg: alg::ES256,
                sig: vec![9],
                x5c: None,
            },
        );
        let value = object.to_ctap_value().unwrap();
        assert_eq!(value.get_int(1).unwrap().as_text(), Some("packed"));
        assert!(value.get_int(2).unwrap().as_bytes().is_some());
        assert_eq!(
            value.get_int(3).unwrap().get_text("alg").unwrap().as_i64(),
            Some(-7)
        );
    }
}
