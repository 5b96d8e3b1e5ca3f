//! Signing oracle interface
//!
//! A signing oracle owns asymmetric keys on behalf of the authenticator.
//! Implementations may be backed by a platform secure element, a TPM, or
//! plain process memory; callers only see aliases and public material.
//!
//! All methods are blocking. Async callers are expected to run them on a
//! blocking-capable worker so frame handling is never stalled.

use crate::error::Result;

/// Key families an oracle can be asked to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// NIST P-256 key, signatures are ECDSA with SHA-256
    EcdsaP256,
    /// RSA key, signatures are PKCS#1 v1.5 with SHA-256
    RsaPkcs1Sha256,
}

/// Public half of a generated key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyMaterial {
    /// Affine coordinates of an EC point, 32 bytes each for P-256
    Ec { x: Vec<u8>, y: Vec<u8> },
    /// Big-endian RSA modulus and public exponent
    Rsa { modulus: Vec<u8>, exponent: Vec<u8> },
}

impl PublicKeyMaterial {
    /// Key family this material belongs to
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::Ec { .. } => KeyAlgorithm::EcdsaP256,
            Self::Rsa { .. } => KeyAlgorithm::RsaPkcs1Sha256,
        }
    }
}

/// Opaque key store that generates keys and signs with them
pub trait SigningOracle: Send + Sync {
    /// Generate a key pair bound to `alias`
    ///
    /// `challenge` is the attestation challenge (the client data hash);
    /// hardware backends embed it in their attestation certificate, software
    /// backends may ignore it. Generating under an existing alias replaces
    /// the previous key.
    fn generate_key_pair(
        &self,
        alias: &str,
        algorithm: KeyAlgorithm,
        challenge: &[u8],
    ) -> Result<PublicKeyMaterial>;

    /// Sign `data` with the key bound to `alias`
    ///
    /// The oracle hashes the data itself (SHA-256 for both families).
    fn sign(&self, alias: &str, data: &[u8]) -> Result<Vec<u8>>;

    /// Whether the key bound to `alias` is isolated in secure hardware
    fn is_hardware_backed(&self, alias: &str) -> Result<bool>;

    /// DER certificates attesting the key bound to `alias`, leaf first
    fn certificate_chain(&self, alias: &str) -> Result<Vec<Vec<u8>>>;

    /// Remove the key bound to `alias`
    ///
    /// Deleting an alias that holds no key is not an error.
    fn delete_key(&self, alias: &str) -> Result<()>;
}
