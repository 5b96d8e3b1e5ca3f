//! RSA PKCS#1 v1.5 with SHA-256 (RS256) primitives
//!
//! COSE algorithm identifier: -257 (RS256)
//! Spec: <https://www.rfc-editor.org/rfc/rfc8812.html#section-2>

use crate::error::{CryptoError, Result};
use crate::oracle::PublicKeyMaterial;

use rand::rngs::OsRng;
use ::rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use ::rsa::signature::{SignatureEncoding, Signer, Verifier};
use ::rsa::traits::PublicKeyParts;
use ::rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// Modulus size used when the caller does not pick one
pub const DEFAULT_MODULUS_BITS: usize = 2048;

/// Generate an RSA private key with the given modulus size
pub fn generate_keypair(bits: usize) -> Result<(RsaPrivateKey, PublicKeyMaterial)> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
    let public = public_material(&private_key.to_public_key());
    Ok((private_key, public))
}

/// Big-endian modulus and exponent of a public key
pub fn public_material(public_key: &RsaPublicKey) -> PublicKeyMaterial {
    PublicKeyMaterial::Rsa {
        modulus: public_key.n().to_bytes_be(),
        exponent: public_key.e().to_bytes_be(),
    }
}

/// Sign data with RS256
pub fn sign(private_key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature = signing_key
        .try_sign(data)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
    Ok(signature.to_vec())
}

/// Verify an RS256 signature against big-endian public components
pub fn verify(modulus: &[u8], exponent: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    let public_key = RsaPublicKey::new(
        BigUint::from_bytes_be(modulus),
        BigUint::from_bytes_be(exponent),
    )
    .map_err(|_| CryptoError::InvalidPublicKey)?;

    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let sig = Signature::try_from(signature).map_err(|_| CryptoError::InvalidSignature)?;

    verifying_key
        .verify(data, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small modulus keeps debug-mode key generation fast
    const TEST_BITS: usize = 1024;

    #[test]
    fn test_sign_and_verify() {
        let (private_key, public) = generate_keypair(TEST_BITS).unwrap();
        let PublicKeyMaterial::Rsa { modulus, exponent } = public else {
            panic!("expected RSA material");
        };

        assert_eq!(modulus.len(), TEST_BITS / 8);
        assert_eq!(exponent, vec![0x01, 0x00, 0x01]);

        let signature = sign(&private_key, b"payload").unwrap();
        assert_eq!(signature.len(), TEST_BITS / 8);
        assert!(verify(&modulus, &exponent, b"payload", &signature).is_ok());
        assert_eq!(
            verify(&modulus, &exponent, b"other payload", &signature),
            Err(CryptoError::InvalidSignature)
        );
    }
}
