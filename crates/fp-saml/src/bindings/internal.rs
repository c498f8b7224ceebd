//! The internal binding: an in-process hand-off to another proxy service.
//!
//! The message is stored in the request context, the acting hosted entity
//! is switched to the one named by the destination, and the destination's
//! service is invoked directly. The invoked service receives the message
//! through the usual receive calls.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::context::RequestContext;
use crate::engine::BindingEngine;
use crate::error::{DispatchError, ProxyResult};
use crate::message::{Message, PayloadFormat};
use crate::trust::RemoteEntity;

use super::BindingSender;

/// The proxy services reachable through the internal binding.
pub trait ServiceDispatch: Send + Sync {
    /// Invokes a service by name.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownService`] for an unknown name, or
    /// whatever the service fails with.
    fn invoke(&self, service: &str, engine: &BindingEngine, ctx: &mut RequestContext) -> ProxyResult<()>;
}

/// A service handler.
pub type ServiceHandler = Box<dyn Fn(&BindingEngine, &mut RequestContext) -> ProxyResult<()> + Send + Sync>;

/// A [`ServiceDispatch`] over a table of handlers.
#[derive(Default)]
pub struct ServiceTable {
    handlers: HashMap<String, ServiceHandler>,
}

impl ServiceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, builder style.
    #[must_use]
    pub fn with_service<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&BindingEngine, &mut RequestContext) -> ProxyResult<()> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }
}

impl std::fmt::Debug for ServiceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("ServiceTable").field("services", &names).finish()
    }
}

impl ServiceDispatch for ServiceTable {
    fn invoke(&self, service: &str, engine: &BindingEngine, ctx: &mut RequestContext) -> ProxyResult<()> {
        let handler = self
            .handlers
            .get(service)
            .ok_or_else(|| DispatchError::UnknownService(service.to_string()))?;
        handler(engine, ctx)
    }
}

/// Routing parameters encoded in a proxy URL.
///
/// The last two path segments are `{entity code}[_{remote IdP hash}]` and
/// `{service name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalDestination {
    /// Hosted entity the service runs as.
    pub entity_code: String,
    /// MD5 hex selector of a remote IdP.
    pub remote_idp: Option<String>,
    /// Service to invoke.
    pub service: String,
}

impl InternalDestination {
    /// Parses a destination URL.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidDestination`] if the path does not end
    /// with an entity segment and a service name.
    pub fn parse(destination: &str) -> Result<Self, DispatchError> {
        let invalid = || DispatchError::InvalidDestination(destination.to_string());
        let path = match url::Url::parse(destination) {
            Ok(url) => url.path().to_string(),
            Err(_) if destination.starts_with('/') => destination
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
            Err(_) => return Err(invalid()),
        };

        let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
        let service = segments.next().ok_or_else(invalid)?;
        let entity = segments.next().ok_or_else(invalid)?;

        let (entity_code, remote_idp) = match entity.rsplit_once('_') {
            Some((code, hash)) if !code.is_empty() && is_md5_hex(hash) => (code, Some(hash.to_string())),
            _ => (entity, None),
        };
        Ok(Self {
            entity_code: entity_code.to_string(),
            remote_idp,
            service: service.to_string(),
        })
    }
}

fn is_md5_hex(value: &str) -> bool {
    value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Sends a message to another service of the proxy in-process.
pub struct InternalSender<'a> {
    engine: &'a BindingEngine,
}

impl<'a> InternalSender<'a> {
    /// Creates a sender dispatching through the engine's service table.
    #[must_use]
    pub fn new(engine: &'a BindingEngine) -> Self {
        Self { engine }
    }
}

impl BindingSender for InternalSender<'_> {
    fn send(&self, mut message: Message, _remote: &RemoteEntity, ctx: &mut RequestContext) -> ProxyResult<()> {
        let destination = message
            .destination()
            .ok_or(DispatchError::MissingDestination)
            .and_then(InternalDestination::parse)?;

        // the receiving side verifies against what is handed over now
        message.meta.raw = Some(message.to_xml().into_bytes());
        message.meta.format = PayloadFormat::Xml;
        message.meta.detached_signature = None;
        message.meta.assertion_raw = None;
        message.meta.was_signed = false;

        let param_name = message.param_name().to_string();
        ctx.internal.insert(param_name.clone(), message);
        ctx.set_current_entity(destination.entity_code.clone(), destination.remote_idp.clone());

        debug!(
            entity = %destination.entity_code,
            remote_idp = ?destination.remote_idp,
            param = %param_name,
            "using internal binding"
        );
        info!(service = %destination.service, "calling service");
        self.engine.services().invoke(&destination.service, self.engine, ctx)?;
        debug!(service = %destination.service, "done calling service");
        Ok(())
    }
}
