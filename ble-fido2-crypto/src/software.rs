//! In-memory signing oracle
//!
//! Keeps private keys in process memory, keyed by alias. Keys are never
//! reported as hardware backed and carry no attestation certificates, so
//! credentials created through this store always self-attest.

use crate::error::{CryptoError, Result};
use crate::oracle::{KeyAlgorithm, PublicKeyMaterial, SigningOracle};
use crate::{ecdsa, rsa};

use ::rsa::RsaPrivateKey;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

enum StoredKey {
    Ec([u8; 32]),
    Rsa(Box<RsaPrivateKey>),
}

/// Software key store implementing [`SigningOracle`]
pub struct SoftwareKeyStore {
    keys: Mutex<HashMap<String, StoredKey>>,
    rsa_bits: usize,
}

impl SoftwareKeyStore {
    /// Create an empty store using 2048-bit RSA keys
    pub fn new() -> Self {
        Self::with_rsa_bits(rsa::DEFAULT_MODULUS_BITS)
    }

    /// Create an empty store with a custom RSA modulus size
    pub fn with_rsa_bits(rsa_bits: usize) -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            rsa_bits,
        }
    }

    /// Number of aliases currently holding a key
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    fn keys(&self) -> MutexGuard<'_, HashMap<String, StoredKey>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SoftwareKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningOracle for SoftwareKeyStore {
    fn generate_key_pair(
        &self,
        alias: &str,
        algorithm: KeyAlgorithm,
        _challenge: &[u8],
    ) -> Result<PublicKeyMaterial> {
        let (stored, public) = match algorithm {
            KeyAlgorithm::EcdsaP256 => {
                let (private_key, public) = ecdsa::generate_keypair()?;
                (StoredKey::Ec(private_key), public)
            }
            KeyAlgorithm::RsaPkcs1Sha256 => {
                let (private_key, public) = rsa::generate_keypair(self.rsa_bits)?;
                (StoredKey::Rsa(Box::new(private_key)), public)
            }
        };

        tracing::debug!(alias, ?algorithm, "generated software key pair");
        self.keys().insert(alias.to_string(), stored);
        Ok(public)
    }

    fn sign(&self, alias: &str, data: &[u8]) -> Result<Vec<u8>> {
        let keys = self.keys();
        let key = keys
            .get(alias)
            .ok_or_else(|| CryptoError::UnknownAlias(alias.to_string()))?;

        match key {
            StoredKey::Ec(private_key) => ecdsa::sign(private_key, data),
            StoredKey::Rsa(private_key) => rsa::sign(private_key, data),
        }
    }

    fn is_hardware_backed(&self, alias: &str) -> Result<bool> {
        if !self.keys().contains_key(alias) {
            return Err(CryptoError::UnknownAlias(alias.to_string()));
        }
        Ok(false)
    }

    fn certificate_chain(&self, alias: &str) -> Result<Vec<Vec<u8>>> {
        if !self.keys().contains_key(alias) {
            return Err(CryptoError::UnknownAlias(alias.to_string()));
        }
        Ok(Vec::new())
    }

    fn delete_key(&self, alias: &str) -> Result<()> {
        if self.keys().remove(alias).is_some() {
            tracing::debug!(alias, "deleted software key");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ec_key_lifecycle() {
        let store = SoftwareKeyStore::new();
        assert!(store.is_empty());

        let public = store
            .generate_key_pair("cred-1", KeyAlgorithm::EcdsaP256, &[0u8; 32])
            .unwrap();
        assert_eq!(public.algorithm(), KeyAlgorithm::EcdsaP256);
        assert_eq!(store.len(), 1);

        let signature = store.sign("cred-1", b"data").unwrap();
        let PublicKeyMaterial::Ec { x, y } = public else {
            panic!("expected EC material");
        };
        assert!(ecdsa::verify(&x, &y, b"data", &signature).is_ok());

        assert_eq!(store.is_hardware_backed("cred-1"), Ok(false));
        assert_eq!(store.certificate_chain("cred-1"), Ok(vec![]));

        assert_eq!(store.delete_key("cred-1"), Ok(()));
        assert!(store.is_empty());
        assert_eq!(store.delete_key("cred-1"), Ok(()));
        assert!(store.sign("cred-1", b"data").is_err());
    }

    #[test]
    fn test_rsa_key_lifecycle() {
        let store = SoftwareKeyStore::with_rsa_bits(1024);
        let public = store
            .generate_key_pair("legacy", KeyAlgorithm::RsaPkcs1Sha256, &[])
            .unwrap();

        let signature = store.sign("legacy", b"data").unwrap();
        let PublicKeyMaterial::Rsa { modulus, exponent } = public else {
            panic!("expected RSA material");
        };
        assert!(rsa::verify(&modulus, &exponent, b"data", &signature).is_ok());
    }

    #[test]
    fn test_unknown_alias() {
        let store = SoftwareKeyStore::new();
        let expected = CryptoError::UnknownAlias("missing".to_string());

        assert_eq!(store.sign("missing", b"data"), Err(expected.clone()));
        assert_eq!(store.is_hardware_backed("missing"), Err(expected.clone()));
        assert_eq!(store.certificate_chain("missing"), Err(expected));
    }
}
