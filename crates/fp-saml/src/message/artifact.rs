//! SAML artifact encoding.
//!
//! An artifact is a fixed 44 byte structure in network byte order:
//! a 2 byte type code, a 2 byte endpoint index, the 20 byte SHA-1 of the
//! issuing entity id and a 20 byte random message handle. On the wire it is
//! base64 encoded. Resolving an artifact to a message is not done here.

use base64::Engine;

use crate::error::{ProxyResult, TransportError};

/// Length of the source id and message handle.
pub const ARTIFACT_FIELD_LEN: usize = 20;

/// Total encoded length of an artifact.
pub const ARTIFACT_LEN: usize = 4 + 2 * ARTIFACT_FIELD_LEN;

/// A decoded SAML 2.0 artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Artifact type code.
    pub type_code: u16,
    /// Index of the resolution endpoint of the issuer.
    pub endpoint_index: u16,
    /// SHA-1 of the issuer entity id.
    pub source_id: [u8; ARTIFACT_FIELD_LEN],
    /// Random handle of the referenced message.
    pub message_handle: [u8; ARTIFACT_FIELD_LEN],
}

impl Artifact {
    /// The SAML 2.0 artifact type code.
    pub const TYPE_CODE: u16 = 0x0004;

    /// Creates an artifact for a message issued by `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the random source fails.
    pub fn issue(entity_id: &str, endpoint_index: u16) -> ProxyResult<Self> {
        let mut message_handle = [0u8; ARTIFACT_FIELD_LEN];
        fp_crypto::random::fill(&mut message_handle)?;
        Ok(Self {
            type_code: Self::TYPE_CODE,
            endpoint_index,
            source_id: fp_crypto::sha1(entity_id.as_bytes()),
            message_handle,
        })
    }

    /// Returns true if this artifact was issued by `entity_id`.
    #[must_use]
    pub fn is_from(&self, entity_id: &str) -> bool {
        self.source_id == fp_crypto::sha1(entity_id.as_bytes())
    }

    /// Returns the binary layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ARTIFACT_LEN] {
        let mut out = [0u8; ARTIFACT_LEN];
        out[0..2].copy_from_slice(&self.type_code.to_be_bytes());
        out[2..4].copy_from_slice(&self.endpoint_index.to_be_bytes());
        out[4..24].copy_from_slice(&self.source_id);
        out[24..44].copy_from_slice(&self.message_handle);
        out
    }

    /// Parses the binary layout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MalformedPayload`] if the length is wrong.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        if bytes.len() != ARTIFACT_LEN {
            return Err(TransportError::MalformedPayload(format!(
                "artifact must be {ARTIFACT_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut source_id = [0u8; ARTIFACT_FIELD_LEN];
        source_id.copy_from_slice(&bytes[4..24]);
        let mut message_handle = [0u8; ARTIFACT_FIELD_LEN];
        message_handle.copy_from_slice(&bytes[24..44]);
        Ok(Self {
            type_code: u16::from_be_bytes([bytes[0], bytes[1]]),
            endpoint_index: u16::from_be_bytes([bytes[2], bytes[3]]),
            source_id,
            message_handle,
        })
    }

    /// Encodes the artifact for the `SAMLart` parameter.
    #[must_use]
    pub fn encode(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    /// Decodes a `SAMLart` parameter value.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidEncoding`] for bad base64 and
    /// [`TransportError::MalformedPayload`] for a bad length.
    pub fn decode(encoded: &str) -> Result<Self, TransportError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| TransportError::InvalidEncoding {
                param: "SAMLart".to_string(),
                reason: e.to_string(),
            })?;
        Self::from_bytes(&bytes)
    }
}
