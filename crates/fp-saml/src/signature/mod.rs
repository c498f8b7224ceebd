//! XML Signature support.
//!
//! Signing and verification use exactly one algorithm per role: exclusive
//! C14N for canonicalization, SHA-1 for reference digests and RSA-SHA1 for
//! the signature value. Any other identifier is rejected on input and never
//! produced on output.
//!
//! - [`XmlSigner`] signs an element in place.
//! - [`SignatureVerifier`] verifies detached and enveloped signatures.
//! - [`c14n`] is the canonicalization both of them share.

pub mod c14n;
mod signer;
mod verifier;

pub use signer::XmlSigner;
pub use verifier::{find_unique_by_id, SignaturePolicy, SignatureVerifier, VerificationKeys};

use fp_crypto::CryptoError;

use crate::trust::RemoteEntity;

impl VerificationKeys {
    /// Loads the primary and fallback keys of a peer.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if no primary key is configured or
    /// a configured key does not parse.
    pub fn for_entity(entity: &RemoteEntity) -> Result<Self, CryptoError> {
        let primary = entity.certificates.public_key(&entity.entity_id)?;
        let fallback = entity.certificates.fallback_public_key()?;
        Ok(Self::new(primary, fallback))
    }
}
