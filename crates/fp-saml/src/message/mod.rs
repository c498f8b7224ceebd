//! The canonical message model.
//!
//! A [`Message`] pairs the element tree that goes on the wire with
//! [`MessageMeta`], the private metadata recorded at receipt time. Metadata
//! is never serialized: [`Message::to_xml`] and [`Message::to_json`] only see
//! the tree.

pub mod artifact;
mod element;
pub mod json;
pub mod ordering;
pub mod xml;

use std::fmt;

pub use artifact::Artifact;
pub use element::{split_qname, Attribute, Element, Node, NsScope};

use crate::error::{TransportError, VerificationError};
use crate::types::BindingKind;

/// Where a message was obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    /// The in-process store filled by the internal sender.
    Internal,
    /// An HTTP-POST form field.
    HttpPost,
    /// An HTTP-Redirect query parameter.
    HttpRedirect,
}

/// Encoding of a received payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// XML document.
    #[default]
    Xml,
    /// JSON object.
    Json,
}

impl PayloadFormat {
    /// Decides the format from the first byte: `{` means JSON.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.first() == Some(&b'{') {
            Self::Json
        } else {
            Self::Xml
        }
    }
}

/// A detached Redirect-binding signature as captured from the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    /// Decoded `Signature` parameter (base64 text).
    pub signature: String,
    /// Decoded `SigAlg` parameter.
    pub sig_alg: String,
    /// The exact octets that were signed, built from untouched wire values.
    pub signed_octets: String,
}

/// Private metadata of a message.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MessageMeta {
    /// Binding the message was received over.
    pub source: Option<BindingSource>,
    /// Protocol binding identifier, also used to choose the outbound sender.
    pub protocol_binding: Option<String>,
    /// Relay state to round-trip.
    pub relay_state: Option<String>,
    /// The decoded payload exactly as received.
    pub raw: Option<Vec<u8>>,
    /// Parameter name the message travels under.
    pub param_name: Option<String>,
    /// Externally supplied return URL.
    pub return_url: Option<String>,
    /// Suffix appended to the destination when sending.
    pub recipient: Option<String>,
    /// Detached signature from the Redirect query.
    pub detached_signature: Option<DetachedSignature>,
    /// Encoding of the received payload.
    pub format: PayloadFormat,
    /// Plaintext of a decrypted assertion, for verifying its signature.
    pub assertion_raw: Option<Vec<u8>>,
    /// Set once a signature on the message has been verified.
    pub was_signed: bool,
}

impl fmt::Debug for MessageMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageMeta")
            .field("source", &self.source)
            .field("protocol_binding", &self.protocol_binding)
            .field("relay_state", &self.relay_state)
            .field("raw_len", &self.raw.as_ref().map(Vec::len))
            .field("param_name", &self.param_name)
            .field("return_url", &self.return_url)
            .field("recipient", &self.recipient)
            .field("detached_signature", &self.detached_signature.is_some())
            .field("format", &self.format)
            .field("assertion_raw_len", &self.assertion_raw.as_ref().map(Vec::len))
            .field("was_signed", &self.was_signed)
            .finish()
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The element tree.
    pub root: Element,
    /// Private metadata.
    pub meta: MessageMeta,
}

impl Message {
    /// Wraps a tree with empty metadata.
    #[must_use]
    pub fn new(root: Element) -> Self {
        Self {
            root,
            meta: MessageMeta::default(),
        }
    }

    /// Decodes a payload, choosing JSON or XML by its first byte.
    ///
    /// The payload is recorded as the raw capture of the message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MalformedPayload`] if the payload does not parse.
    pub fn decode(payload: Vec<u8>) -> Result<Self, TransportError> {
        let format = PayloadFormat::sniff(&payload);
        let root = match format {
            PayloadFormat::Json => json::parse(&payload)?,
            PayloadFormat::Xml => xml::parse(&payload)?,
        };
        Ok(Self {
            root,
            meta: MessageMeta {
                format,
                raw: Some(payload),
                ..MessageMeta::default()
            },
        })
    }

    /// Returns the `ID` of the root element.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.root.id()
    }

    /// Returns the trimmed text of the `Issuer` child.
    #[must_use]
    pub fn issuer(&self) -> Option<String> {
        self.root
            .child("Issuer")
            .map(|issuer| issuer.text().trim().to_string())
            .filter(|issuer| !issuer.is_empty())
    }

    /// Returns the `Destination` attribute.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.root.attr("Destination")
    }

    /// Returns the embedded plaintext assertion.
    #[must_use]
    pub fn assertion(&self) -> Option<&Element> {
        self.root.child("Assertion")
    }

    /// Fails unless the root carries at most one assertion, counting
    /// plaintext and encrypted ones together.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MultipleAssertions`] otherwise.
    pub fn ensure_single_assertion(&self) -> Result<(), VerificationError> {
        let count = self
            .root
            .child_elements()
            .filter(|c| matches!(c.local_name(), "Assertion" | "EncryptedAssertion"))
            .count();
        if count > 1 {
            return Err(VerificationError::MultipleAssertions(count));
        }
        Ok(())
    }

    /// Mutable variant of [`Message::assertion`].
    pub fn assertion_mut(&mut self) -> Option<&mut Element> {
        self.root.child_mut("Assertion")
    }

    /// Returns the parameter name, defaulting by the root element.
    #[must_use]
    pub fn param_name(&self) -> &str {
        if let Some(name) = self.meta.param_name.as_deref() {
            return name;
        }
        if self.root.local_name() == "Response" {
            "SAMLResponse"
        } else {
            "SAMLRequest"
        }
    }

    /// Parses the protocol binding identifier.
    ///
    /// `None` means no identifier was set, `Some(Err(..))` an unknown one.
    #[must_use]
    pub fn binding(&self) -> Option<Result<BindingKind, &str>> {
        self.meta
            .protocol_binding
            .as_deref()
            .map(|uri| BindingKind::from_uri(uri).ok_or(uri))
    }

    /// Serializes the tree as XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        xml::to_xml(&self.root)
    }

    /// Serializes the tree as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        json::to_json(&self.root)
    }
}

/// `ForceAuthn` and `IsPassive` of a request, as booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthnRequestFlags {
    /// The requester demands fresh authentication.
    pub force_authn: bool,
    /// The requester forbids user interaction.
    pub is_passive: bool,
}

impl AuthnRequestFlags {
    /// Reads the flags, treating `"true"` and `"1"` as set.
    #[must_use]
    pub fn of(request: &Element) -> Self {
        let flag = |name: &str| matches!(request.attr(name), Some("true" | "1"));
        Self {
            force_authn: flag("ForceAuthn"),
            is_passive: flag("IsPassive"),
        }
    }

    /// Rewrites both attributes as `"true"` or `"false"`.
    pub fn normalize(request: &mut Element) -> Self {
        let flags = Self::of(request);
        request.set_attr("ForceAuthn", flags.force_authn.to_string());
        request.set_attr("IsPassive", flags.is_passive.to_string());
        flags
    }
}
