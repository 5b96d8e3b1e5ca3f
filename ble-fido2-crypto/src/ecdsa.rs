//! P-256 ECDSA (ES256) primitives
//!
//! COSE algorithm identifier: -7 (ES256)
//! Spec: <https://www.rfc-editor.org/rfc/rfc8152.html#section-8.1>
//!
//! Attestation and assertion signatures are DER encoded, as WebAuthn
//! relying parties expect for ES256.

use crate::error::{CryptoError, Result};
use crate::oracle::PublicKeyMaterial;

use p256::ecdsa::{Signature, SigningKey, VerifyingKey, signature::Signer, signature::Verifier};
use rand::rngs::OsRng;

/// Length of one affine coordinate on P-256
pub const COORDINATE_LEN: usize = 32;

/// Generate a random ES256 key pair
///
/// Returns the 32-byte private scalar together with the public point split
/// into its affine coordinates.
///
/// # Examples
///
/// ```
/// use ble_fido2_crypto::{ecdsa, PublicKeyMaterial};
///
/// let (private_key, public) = ecdsa::generate_keypair().unwrap();
/// assert_eq!(private_key.len(), 32);
/// match public {
///     PublicKeyMaterial::Ec { x, y } => assert_eq!((x.len(), y.len()), (32, 32)),
///     _ => unreachable!(),
/// }
/// ```
pub fn generate_keypair() -> Result<([u8; 32], PublicKeyMaterial)> {
    let signing_key = SigningKey::random(&mut OsRng);
    let private_key: [u8; 32] = signing_key.to_bytes().into();
    let public = point_of(signing_key.verifying_key())?;
    Ok((private_key, public))
}

/// Derive the public point from a private scalar
pub fn public_from_private(private_key: &[u8; 32]) -> Result<PublicKeyMaterial> {
    let signing_key =
        SigningKey::from_bytes(private_key.into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
    point_of(signing_key.verifying_key())
}

fn point_of(verifying_key: &VerifyingKey) -> Result<PublicKeyMaterial> {
    let point = verifying_key.to_encoded_point(false);
    let x = point.x().ok_or(CryptoError::InvalidPublicKey)?;
    let y = point.y().ok_or(CryptoError::InvalidPublicKey)?;
    Ok(PublicKeyMaterial::Ec {
        x: x.to_vec(),
        y: y.to_vec(),
    })
}

/// Sign data with ES256, returning a DER signature
///
/// The data is hashed with SHA-256 by the signing operation.
pub fn sign(private_key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    let signing_key =
        SigningKey::from_bytes(private_key.into()).map_err(|_| CryptoError::InvalidPrivateKey)?;

    let signature: Signature = signing_key.sign(data);
    Ok(signature.to_der().to_bytes().to_vec())
}

/// Verify a DER ES256 signature against affine public coordinates
pub fn verify(x: &[u8], y: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    if x.len() != COORDINATE_LEN || y.len() != COORDINATE_LEN {
        return Err(CryptoError::InvalidPublicKey);
    }

    let mut sec1 = Vec::with_capacity(1 + 2 * COORDINATE_LEN);
    sec1.push(0x04);
    sec1.extend_from_slice(x);
    sec1.extend_from_slice(y);

    let verifying_key =
        VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = Signature::from_der(signature).map_err(|_| CryptoError::InvalidSignature)?;

    verifying_key
        .verify(data, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}
