//! Error types for cryptographic operations.

use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Cryptographic failures.
///
/// Every variant is terminal for the message being processed.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key could not be parsed from its PEM or DER encoding.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The hosted entity has no private key configured.
    #[error("no private key configured for hosted entity '{0}'")]
    MissingPrivateKey(String),

    /// RSA-PKCS1 unwrapping of the symmetric session key failed.
    #[error("unable to unwrap symmetric key with private key")]
    KeyUnwrapFailed,

    /// The decrypted payload carries an impossible padding length.
    #[error("invalid padding on decrypted payload")]
    InvalidPadding,

    /// The ciphertext is too short or not block aligned.
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Symmetric or asymmetric encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// An XML-Encryption algorithm other than the fixed one was declared.
    #[error("unsupported encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Signature creation failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// The system random source failed.
    #[error("random source unavailable")]
    RandomUnavailable,
}
