//! Engine configuration.
//!
//! Loaded by the host (typically deserialized from a file) and optionally
//! adjusted from environment variables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::trust::{Certificates, DEFAULT_MAX_AGE_SECONDS};

/// Default upper bound on an inflated Redirect payload.
pub const DEFAULT_MAX_INFLATED_BYTES: usize = 1024 * 1024;

/// An entity hosted by the proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedEntity {
    /// Entity identifier used as `Issuer` on outgoing messages.
    #[serde(rename = "EntityID")]
    pub entity_id: String,
    /// Key material, including the private key.
    #[serde(default)]
    pub certificates: Certificates,
    /// Incoming requests must be signed, whatever the peer declares.
    #[serde(rename = "WantsAuthnRequestsSigned", default)]
    pub wants_authn_requests_signed: bool,
    /// Incoming assertions must be signed.
    #[serde(rename = "WantsAssertionsSigned", default)]
    pub wants_assertions_signed: bool,
}

impl HostedEntity {
    /// Creates a hosted entity with no keys or policy flags.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Self::default()
        }
    }
}

/// Binding engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Clock-skew window for timing validation, in seconds.
    pub max_age_seconds: i64,
    /// Upper bound on an inflated Redirect payload, in bytes.
    pub max_inflated_bytes: usize,
    /// Hosted entities by entity code.
    pub hosted_entities: HashMap<String, HostedEntity>,
    /// Entity code a request context starts with.
    pub default_hosted_entity: String,
    /// Include a readable trace of outgoing messages in POST forms.
    pub debug: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
            max_inflated_bytes: DEFAULT_MAX_INFLATED_BYTES,
            hosted_entities: HashMap::new(),
            default_hosted_entity: "main".to_string(),
            debug: false,
        }
    }
}

impl ProxyConfig {
    /// Adds a hosted entity, builder style.
    #[must_use]
    pub fn with_hosted_entity(mut self, code: impl Into<String>, entity: HostedEntity) -> Self {
        self.hosted_entities.insert(code.into(), entity);
        self
    }

    /// Applies `FP_MAX_AGE_SECONDS`, `FP_MAX_INFLATED_BYTES` and `FP_DEBUG`.
    ///
    /// Unset or unparsable variables leave the current value.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(seconds) = std::env::var("FP_MAX_AGE_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.max_age_seconds = seconds;
        }
        if let Some(bytes) = std::env::var("FP_MAX_INFLATED_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.max_inflated_bytes = bytes;
        }
        if let Ok(debug) = std::env::var("FP_DEBUG") {
            self.debug = debug.to_lowercase() == "true" || debug == "1";
        }
        self
    }

    /// Returns the hosted entity registered under `code`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownHostedEntity`] for an unknown code.
    pub fn hosted_entity(&self, code: &str) -> Result<&HostedEntity, DispatchError> {
        self.hosted_entities
            .get(code)
            .ok_or_else(|| DispatchError::UnknownHostedEntity(code.to_string()))
    }
}
