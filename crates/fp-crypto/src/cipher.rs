//! XML-Encryption payload cipher and key transport.
//!
//! The payload cipher is AES-128-CBC. The cipher value is the 16 byte IV
//! followed by the ciphertext. On decryption the padding length is read from
//! the last plaintext byte and only its range is checked. The session key is
//! transported with RSA PKCS#1 v1.5.

use aes::Aes128;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand_core::OsRng;
use rsa::Pkcs1v15Encrypt;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PrivateKey, PublicKey};
use crate::random;

/// AES-128 key length in bytes.
pub const AES_128_KEY_LEN: usize = 16;

/// AES block length in bytes, which is also the IV length.
pub const AES_BLOCK_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// A symmetric AES-128 session key.
///
/// The key bytes are zeroized when dropped.
pub struct SessionKey(Zeroizing<[u8; AES_128_KEY_LEN]>);

impl SessionKey {
    /// Generates a fresh random session key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomUnavailable`] if the system source fails.
    pub fn generate() -> CryptoResult<Self> {
        let mut key = Zeroizing::new([0u8; AES_128_KEY_LEN]);
        random::fill(&mut key[..])?;
        Ok(Self(key))
    }

    /// Builds a session key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyUnwrapFailed`] if the length is not 16 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; AES_128_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::KeyUnwrapFailed)?;
        Ok(Self(Zeroizing::new(arr)))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Encrypts the session key for a recipient with RSA PKCS#1 v1.5.
///
/// # Errors
///
/// Returns [`CryptoError::EncryptionFailed`] if the RSA operation fails.
pub fn wrap_session_key(recipient: &PublicKey, key: &SessionKey) -> CryptoResult<Vec<u8>> {
    recipient
        .as_rsa()
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, key.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(format!("key transport: {e}")))
}

/// Decrypts a transported session key with the hosted private key.
///
/// # Errors
///
/// Returns [`CryptoError::KeyUnwrapFailed`] if decryption fails or the key
/// is not an AES-128 key.
pub fn unwrap_session_key(key: &PrivateKey, wrapped: &[u8]) -> CryptoResult<SessionKey> {
    let raw = Zeroizing::new(
        key.as_rsa()
            .decrypt(Pkcs1v15Encrypt, wrapped)
            .map_err(|_| CryptoError::KeyUnwrapFailed)?,
    );
    SessionKey::from_bytes(&raw)
}

/// Encrypts plaintext with AES-128-CBC under a random IV.
///
/// Returns `IV || ciphertext`.
///
/// # Errors
///
/// Returns an error if the random source fails.
pub fn aes128_cbc_encrypt(key: &SessionKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut iv = [0u8; AES_BLOCK_LEN];
    random::fill(&mut iv)?;

    let cipher = Aes128CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(AES_BLOCK_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts `IV || ciphertext` with AES-128-CBC.
///
/// The last plaintext byte gives the number of padding bytes to strip. A
/// value of zero, above the block size, or above the plaintext length is
/// rejected.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidCiphertext`] for truncated or unaligned
/// input and [`CryptoError::InvalidPadding`] for an impossible pad length.
pub fn aes128_cbc_decrypt(key: &SessionKey, data: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.len() < AES_BLOCK_LEN * 2 {
        return Err(CryptoError::InvalidCiphertext(format!(
            "{} bytes is shorter than IV plus one block",
            data.len()
        )));
    }
    let (iv, ciphertext) = data.split_at(AES_BLOCK_LEN);
    if ciphertext.len() % AES_BLOCK_LEN != 0 {
        return Err(CryptoError::InvalidCiphertext(
            "ciphertext is not block aligned".to_string(),
        ));
    }

    let cipher = Aes128CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| CryptoError::InvalidCiphertext(e.to_string()))?;
    let mut plaintext = cipher
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::InvalidCiphertext("block decryption failed".to_string()))?;

    let pad = usize::from(*plaintext.last().ok_or(CryptoError::InvalidPadding)?);
    if pad == 0 || pad > AES_BLOCK_LEN || pad > plaintext.len() {
        return Err(CryptoError::InvalidPadding);
    }
    plaintext.truncate(plaintext.len() - pad);
    Ok(plaintext)
}
