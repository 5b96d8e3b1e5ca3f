//! COSE public keys
//!
//! See RFC 9052/9053 and the WebAuthn "credentialPublicKey" encoding:
//! <https://www.w3.org/TR/webauthn-2/#sctn-encoded-credPubKey-examples>

use crate::cbor::{self, MapBuilder, Value};
use crate::error::{Error, Result};

use ble_fido2_crypto::PublicKeyMaterial;

/// COSE algorithm identifiers
pub mod alg {
    /// ECDSA with SHA-256 on P-256
    pub const ES256: i32 = -7;
    /// RSASSA-PKCS1-v1_5 with SHA-256
    pub const RS256: i32 = -257;
}

/// COSE key map labels
mod label {
    pub const KTY: i64 = 1;
    pub const ALG: i64 = 3;
    pub const CRV: i64 = -1;
    pub const X: i64 = -2;
    pub const Y: i64 = -3;
    pub const N: i64 = -1;
    pub const E: i64 = -2;
}

/// Key type: elliptic curve with x and y coordinates
pub const KTY_EC2: i64 = 2;

/// Key type: RSA
pub const KTY_RSA: i64 = 3;

/// Curve identifier for NIST P-256
pub const CRV_P256: i32 = 1;

/// Credential public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ec2 {
        algorithm: i32,
        curve: i32,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    Rsa {
        algorithm: i32,
        modulus: Vec<u8>,
        exponent: Vec<u8>,
    },
}

impl CoseKey {
    /// Wrap public key material returned by the signing oracle
    pub fn from_material(algorithm: i32, material: PublicKeyMaterial) -> Self {
        match material {
            PublicKeyMaterial::Ec { x, y } => CoseKey::Ec2 {
                algorithm,
                curve: CRV_P256,
                x,
                y,
            },
            PublicKeyMaterial::Rsa { modulus, exponent } => CoseKey::Rsa {
                algorithm,
                modulus,
                exponent,
            },
        }
    }

    pub fn algorithm(&self) -> i32 {
        match self {
            CoseKey::Ec2 { algorithm, .. } | CoseKey::Rsa { algorithm, .. } => *algorithm,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            CoseKey::Ec2 {
                algorithm,
                curve,
                x,
                y,
            } => MapBuilder::new()
                .insert(label::KTY, KTY_EC2)
                .insert(label::ALG, *algorithm)
                .insert(label::CRV, *curve)
                .insert_bytes(label::X, x)
                .insert_bytes(label::Y, y)
                .build_value(),
            CoseKey::Rsa {
                algorithm,
                modulus,
                exponent,
            } => MapBuilder::new()
                .insert(label::KTY, KTY_RSA)
                .insert(label::ALG, *algorithm)
                .insert_bytes(label::N, modulus)
                .insert_bytes(label::E, exponent)
                .build_value(),
        }
    }

    /// Encode as a canonical CBOR map
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        cbor::encode(&self.to_value())
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let int = |key: i64| -> Result<i64> {
            value
                .get_int(key)
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::malformed(format!("COSE key label {} missing", key)))
        };
        let bytes = |key: i64| -> Result<Vec<u8>> {
            value
                .get_int(key)
                .and_then(Value::as_bytes)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| Error::malformed(format!("COSE key label {} missing", key)))
        };
        let algorithm =
            i32::try_from(int(label::ALG)?).map_err(|_| Error::malformed("COSE alg out of range"))?;

        match int(label::KTY)? {
            KTY_EC2 => Ok(CoseKey::Ec2 {
                algorithm,
                curve: i32::try_from(int(label::CRV)?)
                    .map_err(|_| Error::malformed("COSE curve out of range"))?,
                x: bytes(label::X)?,
                y: bytes(label::Y)?,
            }),
            KTY_RSA => Ok(CoseKey::Rsa {
                algorithm,
                modulus: bytes(label::N)?,
                exponent: bytes(label::E)?,
            }),
            other => Err(Error::malformed(format!("unknown COSE key type {}", other))),
        }
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        Self::from_value(&cbor::decode(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ec2_key_encoding() {
        let key = CoseKey::Ec2 {
            algorithm: alg::ES256,
            curve: CRV_P256,
            x: vec![0x11; 32],
            y: vec![0x22; 32],
        };

        let bytes = key.to_cbor().unwrap();

        // {1: 2, 3: -7, -1: 1, -2: h'11..', -3: h'22..'}
        assert_eq!(&bytes[..8], &[0xA5, 0x01, 0x02, 0x03, 0x26, 0x20, 0x01, 0x21]);
        assert_eq!(bytes[8], 0x58);
        assert_eq!(bytes[9], 32);
        assert_eq!(bytes[42], 0x22);
        assert_eq!(bytes.len(), 1 + 2 + 2 + 2 + 1 + 2 + 32 + 1 + 2 + 32);

        assert_eq!(CoseKey::from_cbor(&bytes).unwrap(), key);
    }

    #[test]
    fn test_rsa_key_encoding() {
        let key = CoseKey::Rsa {
            algorithm: alg::RS256,
            modulus: vec![0xC3; 256],
            exponent: vec![0x01, 0x00, 0x01],
        };

        let value = key.to_value();
        let keys: Vec<_> = value.as_map().unwrap().iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec![1.into(), 3.into(), (-1).into(), (-2).into()]
        );
        assert_eq!(value.get_int(3).unwrap().as_i64(), Some(-257));

        let bytes = key.to_cbor().unwrap();
        assert_eq!(CoseKey::from_cbor(&bytes).unwrap(), key);
    }

    #[test]
    fn test_from_material() {
        let key = CoseKey::from_material(
            alg::ES256,
            PublicKeyMaterial::Ec {
                x: vec![1; 32],
                y: vec![2; 32],
            },
        );
        assert_eq!(key.algorithm(), alg::ES256);
        assert!(matches!(key, CoseKey::Ec2 { curve: CRV_P256, .. }));
    }

    #[test]
    fn test_unknown_key_type_rejected() {
        let bytes = MapBuilder::new()
            .insert(1, 4)
            .insert(3, -7)
            .build()
            .unwrap();
        assert!(matches!(
            CoseKey::from_cbor(&bytes),
            Err(Error::MalformedEncoding(_))
        ));
    }
}
