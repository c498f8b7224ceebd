//! SHA-1 digests.
//!
//! SHA-1 is the only digest the XML-DSig profile of the proxy accepts. It is
//! also the building block of the legacy shared-secret signature some peers
//! are configured with.

use aws_lc_rs::digest;
use base64::Engine;

/// Length of a SHA-1 digest in bytes.
pub const SHA1_LEN: usize = 20;

/// Computes the SHA-1 digest of the input data.
#[must_use]
pub fn sha1(data: &[u8]) -> [u8; SHA1_LEN] {
    let d = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data);
    let mut out = [0u8; SHA1_LEN];
    out.copy_from_slice(d.as_ref());
    out
}

/// Computes the SHA-1 digest of the input as lowercase hex.
#[must_use]
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(sha1(data))
}

/// Computes the legacy shared-secret "signature".
///
/// The value is `base64(hex(sha1(secret || hex(sha1(data)))))`. This is not
/// an HMAC and offers no length-extension protection. It is kept bit for bit
/// because existing peers verify exactly this construction.
#[must_use]
pub fn shared_secret_signature(secret: &str, data: &str) -> String {
    let inner = sha1_hex(data.as_bytes());
    let mut keyed = String::with_capacity(secret.len() + inner.len());
    keyed.push_str(secret);
    keyed.push_str(&inner);
    base64::engine::general_purpose::STANDARD.encode(sha1_hex(keyed.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_known_vector() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn sha1_empty_input() {
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn shared_secret_signature_is_base64_of_hex() {
        let sig = shared_secret_signature("secret", "SAMLRequest=abc");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&sig)
            .unwrap();
        // base64 wraps the 40 character hex string, not the raw digest
        assert_eq!(decoded.len(), 40);
        assert!(decoded.iter().all(u8::is_ascii_hexdigit));

        let expected_inner = sha1_hex(b"SAMLRequest=abc");
        let expected = sha1_hex(format!("secret{expected_inner}").as_bytes());
        assert_eq!(decoded, expected.as_bytes());
    }

    #[test]
    fn shared_secret_signature_depends_on_secret() {
        assert_ne!(
            shared_secret_signature("a", "payload"),
            shared_secret_signature("b", "payload")
        );
    }
}
