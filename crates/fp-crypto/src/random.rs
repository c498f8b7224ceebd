//! Cryptographically secure random material.

use aws_lc_rs::rand::{SecureRandom, SystemRandom};

use crate::error::{CryptoError, CryptoResult};

/// Fills the buffer with random bytes from the system CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomUnavailable`] if the system source fails.
pub fn fill(buf: &mut [u8]) -> CryptoResult<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| CryptoError::RandomUnavailable)
}
