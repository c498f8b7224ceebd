//! RSA key loading.
//!
//! Keys arrive from entity metadata in a handful of shapes:
//!
//! - X.509 certificates, PEM armored or as a bare base64 body
//! - SubjectPublicKeyInfo (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) public keys
//! - PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`) private keys
//!
//! Only RSA keys are accepted.

use base64::Engine;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// An RSA public key used to verify signatures and wrap session keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    /// Loads a public key from a certificate or public key encoding.
    ///
    /// Input without PEM armor is treated as a base64 DER certificate, which
    /// is how metadata usually carries signing certificates.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the input is not a usable RSA key.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let (label, der) = decode_pem(pem)?;
        let inner = match label.as_deref() {
            None | Some("CERTIFICATE") => return Self::from_certificate_der(&der),
            Some("PUBLIC KEY") => RsaPublicKey::from_public_key_der(&der)
                .map_err(|e| CryptoError::InvalidKey(format!("public key: {e}")))?,
            Some("RSA PUBLIC KEY") => RsaPublicKey::from_pkcs1_der(&der)
                .map_err(|e| CryptoError::InvalidKey(format!("RSA public key: {e}")))?,
            Some(other) => {
                return Err(CryptoError::InvalidKey(format!(
                    "unexpected PEM block '{other}'"
                )))
            }
        };
        Ok(Self { inner })
    }

    /// Extracts the RSA public key from a DER encoded X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the certificate cannot be parsed
    /// or does not carry an RSA key.
    pub fn from_certificate_der(der: &[u8]) -> CryptoResult<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| CryptoError::InvalidKey(format!("certificate: {e}")))?;
        let inner = RsaPublicKey::from_public_key_der(cert.public_key().raw)
            .map_err(|e| CryptoError::InvalidKey(format!("certificate key: {e}")))?;
        Ok(Self { inner })
    }

    /// Returns the modulus length in bytes.
    #[must_use]
    pub fn modulus_len(&self) -> usize {
        self.inner.size()
    }

    pub(crate) const fn as_rsa(&self) -> &RsaPublicKey {
        &self.inner
    }
}

/// An RSA private key used to sign messages and unwrap session keys.
///
/// The key material is zeroized when dropped.
#[derive(Clone)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl PrivateKey {
    /// Loads a PKCS#8 or PKCS#1 PEM private key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the input is not an RSA private key.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let (label, der) = decode_pem(pem)?;
        let inner = match label.as_deref() {
            Some("PRIVATE KEY") => RsaPrivateKey::from_pkcs8_der(&der)
                .map_err(|e| CryptoError::InvalidKey(format!("private key: {e}")))?,
            Some("RSA PRIVATE KEY") => RsaPrivateKey::from_pkcs1_der(&der)
                .map_err(|e| CryptoError::InvalidKey(format!("RSA private key: {e}")))?,
            Some(other) => {
                return Err(CryptoError::InvalidKey(format!(
                    "unexpected PEM block '{other}'"
                )))
            }
            None => {
                return Err(CryptoError::InvalidKey(
                    "private key must be PEM armored".to_string(),
                ))
            }
        };
        Ok(Self { inner })
    }

    /// Returns the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.to_public_key(),
        }
    }

    pub(crate) const fn as_rsa(&self) -> &RsaPrivateKey {
        &self.inner
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("modulus_len", &self.inner.size())
            .finish_non_exhaustive()
    }
}

/// Splits PEM armor and decodes the base64 body.
///
/// Returns `None` as label when the input has no armor.
fn decode_pem(input: &str) -> CryptoResult<(Option<String>, Zeroizing<Vec<u8>>)> {
    let trimmed = input.trim();
    let (label, body) = match trimmed.strip_prefix("-----BEGIN ") {
        Some(rest) => {
            let (label, rest) = rest
                .split_once("-----")
                .ok_or_else(|| CryptoError::InvalidKey("malformed PEM header".to_string()))?;
            let footer = format!("-----END {label}-----");
            let (body, _) = rest
                .split_once(footer.as_str())
                .ok_or_else(|| CryptoError::InvalidKey("missing PEM footer".to_string()))?;
            (Some(label.to_string()), body)
        }
        None => (None, trimmed),
    };

    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let der = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| CryptoError::InvalidKey(format!("PEM body: {e}")))?;
    Ok((label, Zeroizing::new(der)))
}
