//! Issuer resolution and the signing policies applied on receipt.

use tracing::{debug, warn};

use crate::config::HostedEntity;
use crate::error::{ProxyResult, UnknownIssuerError, VerificationError};
use crate::message::{BindingSource, Message};
use crate::signature::{SignaturePolicy, SignatureVerifier, VerificationKeys};

use super::registry::{EntityRegistry, RemoteEntity};
use super::timing::TimingValidator;

/// Resolves issuers against the entity registry and enforces the receive
/// policies of the hosted entity.
pub struct TrustResolver<'a> {
    registry: &'a dyn EntityRegistry,
}

impl<'a> TrustResolver<'a> {
    /// Creates a resolver over a registry.
    #[must_use]
    pub fn new(registry: &'a dyn EntityRegistry) -> Self {
        Self { registry }
    }

    /// Looks up the issuer of a message.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MissingElement`] if the message has no
    /// `Issuer` and [`UnknownIssuerError`] if the registry does not know it.
    pub fn resolve_issuer(&self, message: &Message) -> ProxyResult<RemoteEntity> {
        let issuer = message
            .issuer()
            .ok_or_else(|| VerificationError::MissingElement("Issuer".to_string()))?;
        match self.registry.lookup(&issuer) {
            Some(entity) => Ok(entity),
            None => {
                warn!(issuer = %issuer, "message from unknown issuer");
                Err(UnknownIssuerError { issuer }.into())
            }
        }
    }

    /// Returns true if requests exchanged with `remote` must be signed.
    ///
    /// The peer declares it with `AuthnRequestsSigned`, the hosted entity
    /// with `WantsAuthnRequestsSigned`; either is enough.
    #[must_use]
    pub fn request_signing_mandated(remote: &RemoteEntity, hosted: &HostedEntity) -> bool {
        remote.authn_requests_signed || hosted.wants_authn_requests_signed
    }

    /// Applies the request policy.
    ///
    /// Without a signing mandate no verification is attempted. With one, a
    /// request received over HTTP must verify; a request handed over by the
    /// internal binding has its embedded signatures verified if it has any.
    ///
    /// # Errors
    ///
    /// Returns a [`VerificationError`] or a key loading error.
    pub fn verify_request_policy(
        &self,
        message: &mut Message,
        remote: &RemoteEntity,
        hosted: &HostedEntity,
    ) -> ProxyResult<()> {
        if !Self::request_signing_mandated(remote, hosted) {
            debug!(issuer = %remote.entity_id, "request signing not mandated, skipping verification");
            return Ok(());
        }
        let policy = policy_for(message, SignaturePolicy::Required);
        let verifier = SignatureVerifier::new(VerificationKeys::for_entity(remote)?);
        let signed = verifier.verify_message(message, policy)?;
        message.meta.was_signed |= signed;
        Ok(())
    }

    /// Applies the response policy.
    ///
    /// If the hosted entity wants signed assertions the response must carry
    /// a verifying signature. Timing is validated in every case.
    ///
    /// # Errors
    ///
    /// Returns a [`VerificationError`], a key loading error or a
    /// [`crate::error::TimingError`].
    pub fn verify_response_policy(
        &self,
        message: &mut Message,
        remote: &RemoteEntity,
        hosted: &HostedEntity,
        timing: &TimingValidator,
    ) -> ProxyResult<()> {
        if hosted.wants_assertions_signed {
            let policy = policy_for(message, SignaturePolicy::Required);
            let verifier = SignatureVerifier::new(VerificationKeys::for_entity(remote)?);
            let signed = verifier.verify_message(message, policy)?;
            message.meta.was_signed |= signed;
        }
        timing.validate(message)?;
        Ok(())
    }
}

fn policy_for(message: &Message, mandated: SignaturePolicy) -> SignaturePolicy {
    if message.meta.source == Some(BindingSource::Internal) {
        SignaturePolicy::IfPresent
    } else {
        mandated
    }
}
