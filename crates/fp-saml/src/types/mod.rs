//! SAML 2.0 identifiers.
//!
//! Namespace URIs, message kinds, binding identifiers, the fixed algorithm
//! allow-list and status codes.

mod constants;

pub use constants::*;
