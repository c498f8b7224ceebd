//! Extraction of an inbound message from the request.
//!
//! Sources are tried in a fixed order: the internal store, the POST body,
//! the Redirect query. The first one carrying the parameter wins.

use base64::Engine;
use tracing::debug;

use crate::context::RequestContext;
use crate::error::TransportError;
use crate::message::{BindingSource, DetachedSignature, Message};
use crate::types::{BindingKind, MessageKind};

use super::redirect::inflate;

/// Reads messages of one kind from a [`RequestContext`].
#[derive(Debug, Clone, Copy)]
pub struct MessageReceiver {
    max_inflated_bytes: usize,
}

impl MessageReceiver {
    /// Creates a receiver with a bound on inflated Redirect payloads.
    #[must_use]
    pub fn new(max_inflated_bytes: usize) -> Self {
        Self { max_inflated_bytes }
    }

    /// Receives a message of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoMessage`] if no source carries one, or the
    /// decoding error of the source that does.
    pub fn receive(&self, kind: MessageKind, ctx: &RequestContext) -> Result<Message, TransportError> {
        let param = kind.param_name();
        let message = if let Some(message) = from_internal(param, ctx) {
            message
        } else if let Some(message) = from_post(param, ctx)? {
            message
        } else if let Some(message) = self.from_redirect(param, ctx)? {
            message
        } else {
            return Err(TransportError::NoMessage(kind));
        };

        debug!(
            kind = %kind,
            source = ?message.meta.source,
            id = ?message.id(),
            "message received"
        );
        Ok(message)
    }

    fn from_redirect(&self, param: &str, ctx: &RequestContext) -> Result<Option<Message>, TransportError> {
        let input = &ctx.input;
        let Some(encoded) = input.query_param(param) else {
            return Ok(None);
        };

        let compressed = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| TransportError::InvalidEncoding {
                param: param.to_string(),
                reason: e.to_string(),
            })?;
        let payload = inflate(&compressed, self.max_inflated_bytes).map_err(|reason| {
            TransportError::InvalidCompression {
                param: param.to_string(),
                reason,
            }
        })?;

        let mut message = Message::decode(payload)?;
        let meta = &mut message.meta;
        meta.source = Some(BindingSource::HttpRedirect);
        meta.protocol_binding = Some(BindingKind::HttpRedirect.uri().to_string());
        meta.relay_state = input.query_param("RelayState");
        meta.param_name = Some(param.to_string());

        if let Some(signature) = input.query_param("Signature") {
            meta.detached_signature = Some(DetachedSignature {
                signature,
                sig_alg: input.query_param("SigAlg").unwrap_or_default(),
                signed_octets: signed_octets(param, ctx),
            });
        }
        Ok(Some(message))
    }
}

fn from_internal(param: &str, ctx: &RequestContext) -> Option<Message> {
    let mut message = ctx.internal.get(param)?.clone();
    message.meta.source = Some(BindingSource::Internal);
    Some(message)
}

fn from_post(param: &str, ctx: &RequestContext) -> Result<Option<Message>, TransportError> {
    let input = &ctx.input;
    let Some(encoded) = input.form_param(param) else {
        return Ok(None);
    };

    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let payload = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| TransportError::InvalidEncoding {
            param: param.to_string(),
            reason: e.to_string(),
        })?;

    let mut message = Message::decode(payload)?;
    let meta = &mut message.meta;
    meta.source = Some(BindingSource::HttpPost);
    meta.protocol_binding = Some(BindingKind::HttpPost.uri().to_string());
    meta.relay_state = input.form_param("RelayState").map(str::to_string);
    meta.param_name = Some(param.to_string());
    meta.return_url = input.form_param("return").map(str::to_string);
    Ok(Some(message))
}

/// Rebuilds the octets covered by a detached signature from the untouched
/// query values.
fn signed_octets(param: &str, ctx: &RequestContext) -> String {
    let input = &ctx.input;
    let mut octets = format!("{param}={}", input.raw_query_param(param).unwrap_or_default());
    if let Some(relay_state) = input.raw_query_param("RelayState") {
        octets.push_str("&RelayState=");
        octets.push_str(relay_state);
    }
    octets.push_str("&SigAlg=");
    octets.push_str(input.raw_query_param("SigAlg").unwrap_or_default());
    octets
}
