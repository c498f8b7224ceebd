//! SAML 2.0 binding and message-security engine for the federation proxy.
//!
//! This crate receives protocol messages over the HTTP-Redirect, HTTP-POST
//! and internal bindings, checks who sent them, verifies their signatures,
//! decrypts their assertions and sends messages back out, signed and
//! encrypted the way each peer requires.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`message`] - The canonical message model and its XML/JSON codecs
//! - [`bindings`] - The receiver and the Redirect, POST and internal senders
//! - [`trust`] - Entity registry, issuer resolution and timing validation
//! - [`signature`] - Exclusive C14N, XML signature signing and verification
//! - [`encryption`] - XML Encryption of assertions
//! - [`engine`] - [`BindingEngine`], which ties the pieces together
//! - [`error`] - Error types for every failure family
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fp_saml::{BindingEngine, HttpInput, InMemoryEntityRegistry, ProxyConfig};
//!
//! let engine = BindingEngine::new(config, Arc::new(registry));
//! let ctx = engine.new_context(HttpInput::from_query(query));
//! let received = engine.receive_request(&ctx)?;
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [Exclusive XML Canonicalization](https://www.w3.org/TR/xml-exc-c14n/)
//! - [XML Encryption](https://www.w3.org/TR/xmlenc-core/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod config;
pub mod context;
pub mod encryption;
pub mod engine;
pub mod error;
pub mod message;
pub mod render;
pub mod signature;
pub mod trust;
pub mod types;

pub use config::{HostedEntity, ProxyConfig};
pub use context::{HttpInput, RequestContext, ResponseOutput};
pub use engine::{BindingEngine, Received};
pub use error::{ProxyError, ProxyResult};
pub use message::{AuthnRequestFlags, Message};
pub use render::{AutoSubmitFormRenderer, FormFields, TemplateRenderer};
pub use trust::{EntityRegistry, InMemoryEntityRegistry, RemoteEntity};
pub use types::*;
