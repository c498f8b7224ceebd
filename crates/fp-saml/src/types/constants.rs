//! SAML 2.0 constants and URIs.
//!
//! Contains namespace URIs, binding identifiers, the fixed algorithm
//! allow-list and status codes used by the proxy.

use std::fmt;

/// SAML 2.0 assertion namespace URI.
pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// SAML 2.0 protocol namespace URI.
pub const SAMLP_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// XML Digital Signature namespace URI.
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Encryption namespace URI.
pub const XMLENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";

/// Namespace of the `InclusiveNamespaces` element of exclusive C14N.
pub const EXC_C14N_NS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// The namespace bound to the reserved `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

// ============================================================================
// Message kinds
// ============================================================================

/// The two kinds of protocol message a binding carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A request, such as an `AuthnRequest`.
    Request,
    /// A response.
    Response,
}

impl MessageKind {
    /// Returns the parameter name this kind travels under.
    #[must_use]
    pub const fn param_name(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }

    /// Parses a message kind from its parameter name.
    #[must_use]
    pub fn from_param_name(name: &str) -> Option<Self> {
        match name {
            "SAMLRequest" => Some(Self::Request),
            "SAMLResponse" => Some(Self::Response),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.param_name())
    }
}

// ============================================================================
// Binding identifiers
// ============================================================================

/// Outbound bindings the dispatcher knows how to send with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// SAML HTTP-Redirect binding.
    HttpRedirect,
    /// SAML HTTP-POST binding.
    HttpPost,
    /// In-process hand-off to another service of the proxy.
    Internal,
    /// HTTP-Redirect carrying a JSON encoded message.
    JsonRedirect,
    /// HTTP-POST carrying a JSON encoded message.
    JsonPost,
}

impl BindingKind {
    /// Returns the identifier for this binding.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::HttpRedirect => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect",
            Self::HttpPost => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST",
            Self::Internal => "INTERNAL",
            Self::JsonRedirect => "JSON-Redirect",
            Self::JsonPost => "JSON-POST",
        }
    }

    /// Parses a binding from its identifier.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" => Some(Self::HttpRedirect),
            "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" => Some(Self::HttpPost),
            "INTERNAL" => Some(Self::Internal),
            "JSON-Redirect" => Some(Self::JsonRedirect),
            "JSON-POST" => Some(Self::JsonPost),
            _ => None,
        }
    }

    /// Returns true if the payload is JSON rather than XML.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self, Self::JsonRedirect | Self::JsonPost)
    }
}

// ============================================================================
// Algorithms
// ============================================================================

/// The fixed algorithm allow-list. There is exactly one accepted identifier
/// per role.
pub mod algorithms {
    /// Exclusive C14N without comments.
    pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

    /// Enveloped signature transform.
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

    /// SHA-1 digest.
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";

    /// RSA-SHA1 signature.
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";

    /// RSA PKCS#1 v1.5 key transport.
    pub const RSA_1_5: &str = "http://www.w3.org/2001/04/xmlenc#rsa-1_5";

    /// AES-128-CBC payload cipher.
    pub const AES128_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes128-cbc";

    /// `EncryptedData` type for an encrypted element.
    pub const ENCRYPTED_ELEMENT_TYPE: &str = "http://www.w3.org/2001/04/xmlenc#Element";
}

// ============================================================================
// Status Codes
// ============================================================================

/// Top-level SAML status codes.
pub mod status_codes {
    /// Requester error status code.
    pub const REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";

    /// Responder error status code.
    pub const RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";

    /// Request denied.
    pub const REQUEST_DENIED: &str = "urn:oasis:names:tc:SAML:2.0:status:RequestDenied";

    /// Unknown principal.
    pub const UNKNOWN_PRINCIPAL: &str = "urn:oasis:names:tc:SAML:2.0:status:UnknownPrincipal";

    /// Unsupported binding.
    pub const UNSUPPORTED_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:status:UnsupportedBinding";
}
