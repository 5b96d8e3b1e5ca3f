//! Key support strategies
//!
//! A [`KeySupport`] is picked once per make-credential session from the
//! relying party's algorithm preference list. It holds no ceremony state;
//! every operation is a function of the algorithm, the key alias, and the
//! input bytes, with keys living behind a [`SigningOracle`].

use crate::attestation::{AttestationObject, AttestationStatement, AuthenticatorData};
use crate::cose::{alg, CoseKey};
use crate::error::{Error, Result};

use ble_fido2_crypto::{KeyAlgorithm, PublicKeyMaterial, SigningOracle};

/// Signing strategy selected by COSE algorithm identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySupport {
    /// P-256 keys, ES256 signatures
    Ecdsa { alg: i32 },
    /// RSA keys, RS256 signatures
    LegacyRsa { alg: i32 },
}

impl KeySupport {
    /// Strategy for a single algorithm identifier
    pub fn for_algorithm(algorithm: i32) -> Option<Self> {
        match algorithm {
            alg::ES256 => Some(KeySupport::Ecdsa { alg: algorithm }),
            alg::RS256 => Some(KeySupport::LegacyRsa { alg: algorithm }),
            _ => None,
        }
    }

    /// First supported algorithm in preference order
    pub fn choose(algorithms: &[i32]) -> Option<Self> {
        let chosen = algorithms.iter().find_map(|a| Self::for_algorithm(*a));
        match chosen {
            Some(support) => tracing::debug!(alg = support.alg(), "key support chosen"),
            None => tracing::warn!(?algorithms, "no key support for requested algorithms"),
        }
        chosen
    }

    pub fn alg(&self) -> i32 {
        match self {
            KeySupport::Ecdsa { alg } | KeySupport::LegacyRsa { alg } => *alg,
        }
    }

    fn key_algorithm(&self) -> KeyAlgorithm {
        match self {
            KeySupport::Ecdsa { .. } => KeyAlgorithm::EcdsaP256,
            KeySupport::LegacyRsa { .. } => KeyAlgorithm::RsaPkcs1Sha256,
        }
    }

    /// Generate a key pair under `alias` and return its COSE public key
    pub fn create_key_pair(
        &self,
        oracle: &dyn SigningOracle,
        alias: &str,
        challenge: &[u8],
    ) -> Result<CoseKey> {
        let material = oracle
            .generate_key_pair(alias, self.key_algorithm(), challenge)
            .map_err(|e| {
                tracing::warn!(alias, error = %e, "failed to create key pair");
                Error::KeyGenerationFailed
            })?;

        let matches = matches!(
            (self, &material),
            (KeySupport::Ecdsa { .. }, PublicKeyMaterial::Ec { .. })
                | (KeySupport::LegacyRsa { .. }, PublicKeyMaterial::Rsa { .. })
        );
        if !matches {
            tracing::warn!(alias, "oracle returned key material of the wrong family");
            return Err(Error::KeyGenerationFailed);
        }

        Ok(CoseKey::from_material(self.alg(), material))
    }

    pub fn sign(&self, oracle: &dyn SigningOracle, alias: &str, data: &[u8]) -> Result<Vec<u8>> {
        oracle.sign(alias, data).map_err(|e| {
            tracing::warn!(alias, error = %e, "failed to sign");
            Error::SigningFailed
        })
    }

    /// Sign `authenticatorData || clientDataHash` and wrap the result
    ///
    /// Keys isolated in secure hardware get an `android-key` statement
    /// carrying the oracle's certificate chain; all others get `packed`
    /// self attestation.
    pub fn build_attestation_object(
        &self,
        oracle: &dyn SigningOracle,
        alias: &str,
        client_data_hash: &[u8],
        auth_data: AuthenticatorData,
    ) -> Result<AttestationObject> {
        let mut to_be_signed = auth_data.to_bytes().map_err(|e| {
            tracing::debug!(error = %e, "failed to build authenticator data");
            Error::EncodingFailed
        })?;
        to_be_signed.extend_from_slice(client_data_hash);

        let sig = self.sign(oracle, alias, &to_be_signed)?;

        let hardware_backed = oracle.is_hardware_backed(alias).map_err(|e| {
            tracing::warn!(alias, error = %e, "failed to query hardware isolation");
            Error::SigningFailed
        })?;

        let statement = if hardware_backed {
            tracing::debug!(alias, "key is hardware backed, using android-key attestation");
            let x5c = oracle.certificate_chain(alias).map_err(|e| {
                tracing::warn!(alias, error = %e, "failed to read certificate chain");
                Error::SigningFailed
            })?;
            AttestationStatement::AndroidKey {
                alg: self.alg(),
                sig,
                x5c,
            }
        } else {
            tracing::debug!(alias, "key is not hardware backed, using self attestation");
            AttestationStatement::Packed {
                alg: self.alg(),
                sig,
                x5c: None,
            }
        };

        Ok(AttestationObject::new(auth_data, statement))
    }
}
