//! RSA-SHA1 signatures.
//!
//! Used both for XML-DSig `SignatureValue` elements and for the detached
//! signature carried in the query string of the HTTP-Redirect binding.

use rsa::Pkcs1v15Sign;
use sha1::Sha1;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::sha1;
use crate::keys::{PrivateKey, PublicKey};

/// Signs data with RSA PKCS#1 v1.5 over a SHA-1 digest.
///
/// # Errors
///
/// Returns [`CryptoError::SigningFailed`] if the RSA operation fails.
pub fn rsa_sha1_sign(key: &PrivateKey, data: &[u8]) -> CryptoResult<Vec<u8>> {
    let digest = sha1(data);
    key.as_rsa()
        .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))
}

/// Verifies an RSA PKCS#1 v1.5 SHA-1 signature.
///
/// Returns `false` for any mismatch, including malformed signature bytes.
#[must_use]
pub fn rsa_sha1_verify(key: &PublicKey, data: &[u8], signature: &[u8]) -> bool {
    let digest = sha1(data);
    key.as_rsa()
        .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, signature)
        .is_ok()
}
