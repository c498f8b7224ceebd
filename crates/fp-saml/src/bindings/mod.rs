//! SAML bindings: inbound extraction and outbound senders.
//!
//! - [`MessageReceiver`] reads a message from the internal store, the POST
//!   body or the Redirect query, in that order.
//! - [`RedirectSender`] and [`PostSender`] put a message on the wire as XML
//!   or JSON, signing it the way the peer requires.
//! - [`InternalSender`] hands a message to another proxy service in-process.
//!
//! The sender for an outbound message is chosen by [`resolve_binding`].

mod internal;
mod post;
mod receiver;
pub(crate) mod redirect;

pub use internal::{InternalDestination, InternalSender, ServiceDispatch, ServiceHandler, ServiceTable};
pub use post::PostSender;
pub use receiver::MessageReceiver;
pub use redirect::RedirectSender;

use crate::context::RequestContext;
use crate::error::{DispatchError, ProxyResult};
use crate::message::Message;
use crate::trust::RemoteEntity;
use crate::types::BindingKind;

/// Puts a message on its way to a peer.
pub trait BindingSender {
    /// Sends the message, leaving the HTTP result in `ctx.output`.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`], or a signing or key loading error.
    fn send(&self, message: Message, remote: &RemoteEntity, ctx: &mut RequestContext) -> ProxyResult<()>;
}

/// Chooses the outbound binding of a message.
///
/// A message without a protocol binding goes out over HTTP-Redirect.
///
/// # Errors
///
/// Returns [`DispatchError::UnknownBinding`] for an unrecognized identifier.
pub fn resolve_binding(message: &Message) -> Result<BindingKind, DispatchError> {
    match message.binding() {
        None => Ok(BindingKind::HttpRedirect),
        Some(Ok(kind)) => Ok(kind),
        Some(Err(uri)) => Err(DispatchError::UnknownBinding(uri.to_string())),
    }
}

/// Returns `Destination` with the recipient suffix appended.
pub(crate) fn action_url(message: &Message) -> Result<String, DispatchError> {
    let destination = message.destination().ok_or(DispatchError::MissingDestination)?;
    Ok(format!(
        "{destination}{}",
        message.meta.recipient.as_deref().unwrap_or_default()
    ))
}
