//! The binding engine.
//!
//! [`BindingEngine`] ties the receiver, the trust resolver, the encryption
//! engine and the senders together. It holds only immutable configuration
//! and collaborators; all per-request state lives in the
//! [`RequestContext`] passed to each call.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bindings::{
    resolve_binding, BindingSender, InternalSender, MessageReceiver, PostSender, RedirectSender,
    ServiceDispatch, ServiceTable,
};
use crate::config::ProxyConfig;
use crate::context::{HttpInput, RequestContext};
use crate::encryption::EncryptionEngine;
use crate::error::ProxyResult;
use crate::message::{AuthnRequestFlags, BindingSource, Message};
use crate::render::{AutoSubmitFormRenderer, TemplateRenderer};
use crate::trust::{EntityRegistry, RemoteEntity, TimingValidator, TrustResolver};
use crate::types::{BindingKind, MessageKind};

/// A received and accepted message with the peer that issued it.
#[derive(Debug, Clone)]
pub struct Received {
    /// The message, decrypted and verified.
    pub message: Message,
    /// Metadata of the issuer.
    pub remote: RemoteEntity,
}

/// Receives and sends protocol messages for the hosted entities.
pub struct BindingEngine {
    config: ProxyConfig,
    registry: Arc<dyn EntityRegistry>,
    renderer: Arc<dyn TemplateRenderer>,
    services: Arc<dyn ServiceDispatch>,
}

impl std::fmt::Debug for BindingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BindingEngine {
    /// Creates an engine with the default form renderer and no services.
    #[must_use]
    pub fn new(config: ProxyConfig, registry: Arc<dyn EntityRegistry>) -> Self {
        Self {
            config,
            registry,
            renderer: Arc::new(AutoSubmitFormRenderer),
            services: Arc::new(ServiceTable::new()),
        }
    }

    /// Replaces the POST form renderer, builder style.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replaces the services reachable over the internal binding, builder style.
    #[must_use]
    pub fn with_services(mut self, services: Arc<dyn ServiceDispatch>) -> Self {
        self.services = services;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Returns the entity registry.
    #[must_use]
    pub fn registry(&self) -> &dyn EntityRegistry {
        self.registry.as_ref()
    }

    /// Returns the services reachable over the internal binding.
    #[must_use]
    pub fn services(&self) -> &dyn ServiceDispatch {
        self.services.as_ref()
    }

    /// Creates a request context acting as the default hosted entity.
    #[must_use]
    pub fn new_context(&self, input: HttpInput) -> RequestContext {
        RequestContext::new(self.config.default_hosted_entity.clone(), input)
    }

    /// Receives a request and applies the request signing policy.
    ///
    /// `ForceAuthn` and `IsPassive` of an `AuthnRequest` are normalized.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::TransportError`] if no message can be read,
    /// [`crate::error::UnknownIssuerError`] for an untrusted issuer, or a
    /// [`crate::error::VerificationError`] if a mandated signature fails.
    pub fn receive_request(&self, ctx: &RequestContext) -> ProxyResult<Received> {
        let mut message = self.receiver().receive(MessageKind::Request, ctx)?;
        let hosted = self.config.hosted_entity(&ctx.hosted_entity)?;
        let trust = TrustResolver::new(self.registry.as_ref());

        let remote = trust.resolve_issuer(&message)?;
        trust.verify_request_policy(&mut message, &remote, hosted)?;

        if message.root.local_name() == "AuthnRequest" {
            let flags = AuthnRequestFlags::normalize(&mut message.root);
            debug!(force_authn = flags.force_authn, is_passive = flags.is_passive, "request flags");
        }
        info!(issuer = %remote.entity_id, id = ?message.id(), "request accepted");
        Ok(Received { message, remote })
    }

    /// Receives a response, decrypts its assertion and applies the response
    /// policy.
    ///
    /// A response with more than one assertion, plain or encrypted, is
    /// refused. Messages handed over by the internal binding are never
    /// decrypted.
    ///
    /// # Errors
    ///
    /// As [`BindingEngine::receive_request`], plus
    /// [`crate::error::VerificationError::MultipleAssertions`], a [`fp_crypto::CryptoError`]
    /// if decryption fails and a [`crate::error::TimingError`] if the
    /// validity window is violated.
    pub fn receive_response(&self, ctx: &RequestContext) -> ProxyResult<Received> {
        let mut message = self.receiver().receive(MessageKind::Response, ctx)?;
        let hosted = self.config.hosted_entity(&ctx.hosted_entity)?;
        let trust = TrustResolver::new(self.registry.as_ref());

        let remote = trust.resolve_issuer(&message)?;
        message.ensure_single_assertion()?;

        let internal = message.meta.source == Some(BindingSource::Internal);
        if !internal && message.root.child("EncryptedAssertion").is_some() {
            let key = hosted.certificates.private_key(&hosted.entity_id)?;
            EncryptionEngine::new().decrypt_assertion(&mut message, &key)?;
        }

        let timing = TimingValidator::at(self.config.max_age_seconds, ctx.now);
        trust.verify_response_policy(&mut message, &remote, hosted, &timing)?;

        info!(issuer = %remote.entity_id, id = ?message.id(), "response accepted");
        Ok(Received { message, remote })
    }

    /// Sends a message over the binding it declares.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::DispatchError`] for an unknown binding,
    /// hosted entity or destination, or a signing error.
    pub fn send(&self, message: Message, remote: &RemoteEntity, ctx: &mut RequestContext) -> ProxyResult<()> {
        let kind = resolve_binding(&message)?;
        let hosted = self.config.hosted_entity(&ctx.hosted_entity)?;
        info!(
            binding = kind.uri(),
            destination = ?message.destination(),
            param = %message.param_name(),
            "sending message"
        );

        match kind {
            BindingKind::HttpRedirect | BindingKind::JsonRedirect => {
                RedirectSender::new(hosted, kind.is_json()).send(message, remote, ctx)
            }
            BindingKind::HttpPost | BindingKind::JsonPost => {
                PostSender::new(hosted, self.renderer.as_ref(), kind.is_json())
                    .with_trace(self.config.debug)
                    .send(message, remote, ctx)
            }
            BindingKind::Internal => InternalSender::new(self).send(message, remote, ctx),
        }
    }

    /// Encrypts the assertion of a message for a peer.
    ///
    /// Returns false if the message has no plaintext assertion.
    ///
    /// # Errors
    ///
    /// Returns a [`fp_crypto::CryptoError`] if the peer has no usable public
    /// key or encryption fails.
    pub fn encrypt_assertion(&self, message: &mut Message, remote: &RemoteEntity) -> ProxyResult<bool> {
        let key = remote.certificates.public_key(&remote.entity_id)?;
        EncryptionEngine::new().encrypt_assertion(message, &key)
    }

    fn receiver(&self) -> MessageReceiver {
        MessageReceiver::new(self.config.max_inflated_bytes)
    }
}
