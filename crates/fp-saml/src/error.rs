//! Error taxonomy of the binding engine.
//!
//! Each failure family has its own type. All of them are terminal for the
//! message being processed and are wrapped by [`ProxyError`] for the caller.

use thiserror::Error;

use crate::types::{status_codes, MessageKind};

pub use fp_crypto::CryptoError;

/// Result type for binding engine operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// No message could be obtained from the transport, or its encoding is broken.
#[derive(Debug, Error)]
pub enum TransportError {
    /// None of the internal store, POST body or Redirect query carried a message.
    #[error("unable to receive message: no {0} in internal store, POST body or Redirect query")]
    NoMessage(MessageKind),

    /// The payload is not valid base64.
    #[error("'{param}' is not base64 encoded: {reason}")]
    InvalidEncoding {
        /// The parameter the payload arrived under.
        param: String,
        /// Decoder detail.
        reason: String,
    },

    /// The payload is not a valid raw DEFLATE stream or inflates past the limit.
    #[error("'{param}' is not DEFLATE compressed: {reason}")]
    InvalidCompression {
        /// The parameter the payload arrived under.
        param: String,
        /// Decoder detail.
        reason: String,
    },

    /// The decoded payload is not a well-formed XML or JSON message.
    #[error("malformed message payload: {0}")]
    MalformedPayload(String),
}

/// The message issuer is not a known remote entity.
#[derive(Debug, Error)]
#[error("issuer '{issuer}' is not a known remote entity")]
pub struct UnknownIssuerError {
    /// The offending issuer identifier.
    pub issuer: String,
}

/// Signature, digest or algorithm verification failed.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// A required element or attribute is absent.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Signing is mandated but the message carries no signature.
    #[error("{0} is not signed")]
    MissingSignature(String),

    /// The message signature did not verify with any configured key.
    #[error("invalid signature on message")]
    InvalidMessageSignature,

    /// The assertion signature did not verify with any configured key.
    #[error("invalid signature on assertion")]
    InvalidAssertionSignature,

    /// A reference URI is not a same-document fragment.
    #[error("unsupported reference URI '{0}', only '#id' fragments are accepted")]
    UnsupportedReference(String),

    /// A reference id matched zero or several elements.
    #[error("reference '#{id}' matched {matches} elements, exactly one is required")]
    AmbiguousOrMissingReference {
        /// The fragment id.
        id: String,
        /// How many elements carried it.
        matches: usize,
    },

    /// No reference of the signature covers the signed element itself.
    #[error("signature does not reference its element '#{0}'")]
    ReferenceMismatch(String),

    /// The element a signature covers is not the element the message exposes.
    #[error("signed element '#{0}' differs from the one carried by the message")]
    SignedElementMismatch(String),

    /// A response carries more than one assertion, plain or encrypted.
    #[error("response carries {0} assertions, at most one is accepted")]
    MultipleAssertions(usize),

    /// Embedded signatures cannot be checked on this payload format.
    #[error("embedded signatures on {0} payloads cannot be verified")]
    UnsupportedFormat(&'static str),

    /// The recomputed digest differs from the declared one.
    #[error("digest mismatch for reference '#{0}'")]
    DigestMismatch(String),

    /// An algorithm outside the allow-list was declared.
    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// A transform other than enveloped-signature or exclusive C14N was declared.
    #[error("unsupported transform '{0}'")]
    UnsupportedTransform(String),

    /// The signature structure is broken.
    #[error("malformed signature: {0}")]
    Malformed(String),
}

/// One or more validity windows were violated.
#[derive(Debug, Error)]
#[error("problems detected with timings, check the server clock: {}", .issues.join("; "))]
pub struct TimingError {
    /// Every violated check, in evaluation order.
    pub issues: Vec<String>,
}

/// The message could not be sent.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The declared protocol binding is not supported.
    #[error("unknown binding: {0}")]
    UnknownBinding(String),

    /// The message has no `Destination`.
    #[error("message has no Destination to send to")]
    MissingDestination,

    /// An internal destination does not follow the proxy URL layout.
    #[error("invalid internal destination '{0}'")]
    InvalidDestination(String),

    /// The active hosted entity is not configured.
    #[error("unknown hosted entity '{0}'")]
    UnknownHostedEntity(String),

    /// The service table has no handler for the requested name.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// The message could not be encoded for the wire.
    #[error("unable to encode message: {0}")]
    Encoding(String),

    /// The template renderer failed.
    #[error("template rendering failed: {0}")]
    Render(String),
}

/// Any failure of the binding engine.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Untrusted peer.
    #[error(transparent)]
    UnknownIssuer(#[from] UnknownIssuerError),

    /// Signature verification failure.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Validity window failure.
    #[error(transparent)]
    Timing(#[from] TimingError),

    /// Key or cipher failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Outbound failure.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ProxyError {
    /// Returns the SAML top-level status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        match self {
            Self::Transport(_) | Self::Verification(_) | Self::Timing(_) => {
                status_codes::REQUESTER
            }
            Self::UnknownIssuer(_) => status_codes::REQUEST_DENIED,
            Self::Dispatch(DispatchError::UnknownBinding(_)) => status_codes::UNSUPPORTED_BINDING,
            Self::Crypto(_) | Self::Dispatch(_) => status_codes::RESPONDER,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Transport(_) | Self::Timing(_) => 400,
            Self::Verification(_) => 401,
            Self::UnknownIssuer(_) => 403,
            Self::Crypto(_) | Self::Dispatch(_) => 500,
        }
    }
}
