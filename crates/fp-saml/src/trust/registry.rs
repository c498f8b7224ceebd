//! Remote entity metadata and the registry it is looked up in.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use fp_crypto::{CryptoError, PrivateKey, PublicKey};

/// A binding endpoint of a remote entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Binding identifier.
    #[serde(rename = "Binding")]
    pub binding: String,
    /// Endpoint URL.
    #[serde(rename = "Location")]
    pub location: String,
}

/// PEM encoded key material of an entity.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificates {
    /// Certificate or public key used to verify the entity's signatures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<String>,
    /// Second verification key, tried when the first one fails.
    #[serde(
        rename = "public-fallback",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub public_fallback: Option<String>,
    /// Private key, only ever set for a hosted entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
}

impl std::fmt::Debug for Certificates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificates")
            .field("public", &self.public.is_some())
            .field("public_fallback", &self.public_fallback.is_some())
            .field("private", &self.private.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Certificates {
    /// Parses the primary public key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if no key is configured or it does
    /// not parse.
    pub fn public_key(&self, entity_id: &str) -> Result<PublicKey, CryptoError> {
        let pem = self
            .public
            .as_deref()
            .ok_or_else(|| CryptoError::InvalidKey(format!("no public key known for {entity_id}")))?;
        PublicKey::from_pem(pem)
    }

    /// Parses the fallback public key, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the configured key does not parse.
    pub fn fallback_public_key(&self) -> Result<Option<PublicKey>, CryptoError> {
        self.public_fallback
            .as_deref()
            .map(PublicKey::from_pem)
            .transpose()
    }

    /// Parses the private key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MissingPrivateKey`] if none is configured and
    /// [`CryptoError::InvalidKey`] if it does not parse.
    pub fn private_key(&self, entity_id: &str) -> Result<PrivateKey, CryptoError> {
        let pem = self
            .private
            .as_deref()
            .ok_or_else(|| CryptoError::MissingPrivateKey(entity_id.to_string()))?;
        PrivateKey::from_pem(pem)
    }
}

/// Metadata of a peer, as returned by the entity registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntity {
    /// Entity identifier.
    #[serde(rename = "EntityID")]
    pub entity_id: String,
    /// Endpoints by service name, e.g. `AssertionConsumerService`.
    #[serde(flatten)]
    pub endpoints: HashMap<String, Endpoint>,
    /// Key material.
    #[serde(default)]
    pub certificates: Certificates,
    /// The peer signs, and wants to receive, signed requests.
    #[serde(rename = "AuthnRequestsSigned", default)]
    pub authn_requests_signed: bool,
    /// The peer wants signed assertions.
    #[serde(rename = "WantsAssertionsSigned", default)]
    pub wants_assertions_signed: bool,
    /// The peer wants signed responses.
    #[serde(rename = "WantsResponsesSigned", default)]
    pub wants_responses_signed: bool,
    /// Secret for the legacy keyed hash signature.
    #[serde(rename = "SharedKey", default, skip_serializing_if = "Option::is_none")]
    pub shared_key: Option<String>,
}

impl RemoteEntity {
    /// Creates an entity with no endpoints, keys or flags.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Self::default()
        }
    }

    /// Returns the endpoint registered for a service.
    #[must_use]
    pub fn endpoint(&self, service: &str) -> Option<&Endpoint> {
        self.endpoints.get(service)
    }
}

/// Source of remote entity metadata.
///
/// Lookups are read-only; the returned value is a snapshot for one message.
pub trait EntityRegistry: Send + Sync {
    /// Looks up an entity by identifier.
    fn lookup(&self, entity_id: &str) -> Option<RemoteEntity>;
}

/// An [`EntityRegistry`] over a static map.
#[derive(Debug, Default)]
pub struct InMemoryEntityRegistry {
    entities: RwLock<HashMap<String, RemoteEntity>>,
}

impl InMemoryEntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity, builder style.
    #[must_use]
    pub fn with_entity(self, entity: RemoteEntity) -> Self {
        self.insert(entity);
        self
    }

    /// Adds or replaces an entity.
    pub fn insert(&self, entity: RemoteEntity) {
        if let Ok(mut entities) = self.entities.write() {
            entities.insert(entity.entity_id.clone(), entity);
        }
    }
}

impl EntityRegistry for InMemoryEntityRegistry {
    fn lookup(&self, entity_id: &str) -> Option<RemoteEntity> {
        self.entities.read().ok()?.get(entity_id).cloned()
    }
}
