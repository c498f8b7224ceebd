//! HTTP-Redirect sender.
//!
//! The message is DEFLATE compressed, base64 encoded and URL encoded into
//! the query string. Signatures cover the query string, so an XML signature
//! on the message is stripped first.

use std::io::{Read, Write};

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use tracing::debug;

use fp_crypto::{rsa_sha1_sign, shared_secret_signature};

use crate::config::HostedEntity;
use crate::context::{RequestContext, ResponseOutput};
use crate::error::{DispatchError, ProxyResult};
use crate::message::{Message, NsScope};
use crate::trust::{RemoteEntity, TrustResolver};
use crate::types::{algorithms, MessageKind, XMLDSIG_NS};

use super::{action_url, BindingSender};

/// Sends messages with the HTTP-Redirect binding, as XML or JSON.
pub struct RedirectSender<'a> {
    hosted: &'a HostedEntity,
    json: bool,
}

impl<'a> RedirectSender<'a> {
    /// Creates a sender acting for a hosted entity.
    #[must_use]
    pub fn new(hosted: &'a HostedEntity, json: bool) -> Self {
        Self { hosted, json }
    }

    /// Builds the query string, signed as the peer requires.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Encoding`] if compression fails, or a
    /// [`fp_crypto::CryptoError`] if signing fails.
    pub fn query(&self, message: &mut Message, remote: &RemoteEntity) -> ProxyResult<String> {
        let param = message.param_name().to_string();
        let must_sign = MessageKind::from_param_name(&param) == Some(MessageKind::Request)
            && TrustResolver::request_signing_mandated(remote, self.hosted);

        if must_sign && message.root.remove_children_ns("Signature", XMLDSIG_NS, &NsScope::new()) > 0 {
            debug!(id = ?message.id(), "embedded signature stripped for Redirect binding");
        }

        let payload = if self.json { message.to_json() } else { message.to_xml() };
        let compressed =
            deflate(payload.as_bytes()).map_err(|e| DispatchError::Encoding(format!("deflate: {e}")))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(compressed);

        let mut query = format!("{param}={}", urlencoding::encode(&encoded));
        if let Some(relay_state) = message.meta.relay_state.as_deref().filter(|rs| !rs.is_empty()) {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(relay_state));
        }

        if let Some(secret) = remote.shared_key.as_deref() {
            let signature = shared_secret_signature(secret, &query);
            query.push_str("&Signature=");
            query.push_str(&urlencoding::encode(&signature));
        } else if must_sign {
            let key = self.hosted.certificates.private_key(&self.hosted.entity_id)?;
            query.push_str("&SigAlg=");
            query.push_str(&urlencoding::encode(algorithms::RSA_SHA1));
            let signature = rsa_sha1_sign(&key, query.as_bytes())?;
            query.push_str("&Signature=");
            query.push_str(&urlencoding::encode(
                &base64::engine::general_purpose::STANDARD.encode(signature),
            ));
        }
        Ok(query)
    }
}

impl BindingSender for RedirectSender<'_> {
    fn send(&self, mut message: Message, remote: &RemoteEntity, ctx: &mut RequestContext) -> ProxyResult<()> {
        let query = self.query(&mut message, remote)?;
        let action = action_url(&message)?;
        let separator = if action.contains('?') { '&' } else { '?' };
        let location = format!("{action}{separator}{query}");

        debug!(destination = %action, "sending message with HTTP-Redirect");
        ctx.output = Some(ResponseOutput::Redirect { location });
        Ok(())
    }
}

/// Compresses data using DEFLATE (raw, no zlib header).
pub(crate) fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompresses raw DEFLATE data, refusing output beyond `limit` bytes.
pub(crate) fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>, String> {
    let mut decompressed = Vec::new();
    let bound = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    DeflateDecoder::new(data)
        .take(bound)
        .read_to_end(&mut decompressed)
        .map_err(|e| format!("decompression error: {e}"))?;
    if decompressed.len() > limit {
        return Err(format!("inflated payload exceeds {limit} bytes"));
    }
    if decompressed.is_empty() {
        return Err("empty payload".to_string());
    }
    Ok(decompressed)
}
