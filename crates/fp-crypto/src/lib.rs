//! # fp-crypto
//!
//! Cryptographic primitives for the federation proxy.
//!
//! Every primitive here is pinned to the single algorithm the SAML bindings
//! engine accepts. There is no algorithm negotiation in this crate:
//!
//! - Digest: SHA-1
//! - Signature: RSA PKCS#1 v1.5 with SHA-1
//! - Key transport: RSA PKCS#1 v1.5 encryption
//! - Payload cipher: AES-128-CBC with an IV prefix
//!
//! SHA-1 and RSA-1.5 are kept for interoperability with deployed SAML peers.
//! They are not suitable for new protocol designs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cipher;
pub mod error;
pub mod hash;
pub mod keys;
pub mod random;
pub mod signature;

pub use cipher::{
    aes128_cbc_decrypt, aes128_cbc_encrypt, unwrap_session_key, wrap_session_key, SessionKey,
    AES_128_KEY_LEN, AES_BLOCK_LEN,
};
pub use error::{CryptoError, CryptoResult};
pub use hash::{sha1, sha1_hex, shared_secret_signature};
pub use keys::{PrivateKey, PublicKey};
pub use signature::{rsa_sha1_sign, rsa_sha1_verify};
