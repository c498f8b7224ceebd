//! HTTP-POST sender.
//!
//! The message is base64 encoded into a hidden field of an auto-submitting
//! form. Requests and responses are (re-)signed as the peer declares before
//! they are serialized.

use base64::Engine;
use tracing::debug;

use fp_crypto::shared_secret_signature;

use crate::config::HostedEntity;
use crate::context::{RequestContext, ResponseOutput};
use crate::error::ProxyResult;
use crate::message::{ordering, xml, Element, Message, NsScope};
use crate::render::{FormFields, TemplateRenderer};
use crate::signature::XmlSigner;
use crate::trust::{RemoteEntity, TrustResolver};
use crate::types::{MessageKind, SAML_NS};

use super::{action_url, BindingSender};

/// Sends messages with the HTTP-POST binding, as XML or JSON.
pub struct PostSender<'a> {
    hosted: &'a HostedEntity,
    renderer: &'a dyn TemplateRenderer,
    json: bool,
    debug: bool,
}

impl<'a> PostSender<'a> {
    /// Creates a sender acting for a hosted entity.
    #[must_use]
    pub fn new(hosted: &'a HostedEntity, renderer: &'a dyn TemplateRenderer, json: bool) -> Self {
        Self {
            hosted,
            renderer,
            json,
            debug: false,
        }
    }

    /// Includes a readable trace of the message in the form, builder style.
    #[must_use]
    pub fn with_trace(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Builds the form fields for a message.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DispatchError::MissingDestination`] without a
    /// `Destination`, or a signing error.
    pub fn form_fields(&self, message: &mut Message, remote: &RemoteEntity) -> ProxyResult<FormFields> {
        let mut name = message.param_name().to_string();
        let mut hidden = Vec::new();

        let encoded = if self.json {
            let json = message.to_json();
            name = format!("j{name}");
            if let Some(secret) = remote.shared_key.as_deref() {
                let mut signed = format!("{name}={json}");
                if let Some(relay_state) = message.meta.relay_state.as_deref().filter(|rs| !rs.is_empty()) {
                    signed.push_str("&RelayState=");
                    signed.push_str(relay_state);
                }
                hidden.push(("Signature".to_string(), shared_secret_signature(secret, &signed)));
            }
            json
        } else {
            self.sign_for(message, remote)?;
            message.to_xml()
        };

        if let Some(relay_state) = &message.meta.relay_state {
            hidden.push(("RelayState".to_string(), relay_state.clone()));
        }
        if let Some(return_url) = &message.meta.return_url {
            hidden.push(("return".to_string(), return_url.clone()));
        }

        Ok(FormFields {
            action: action_url(message)?,
            name,
            message: base64::engine::general_purpose::STANDARD.encode(encoded),
            hidden,
            trace: self.debug.then(|| xml::to_pretty_xml(&message.root)),
        })
    }

    /// Applies the signatures the peer asks for.
    ///
    /// Requests are signed when signing is mandated. For responses the
    /// assertion is signed first if the peer wants signed assertions, then
    /// the response if it wants signed responses.
    fn sign_for(&self, message: &mut Message, remote: &RemoteEntity) -> ProxyResult<()> {
        match MessageKind::from_param_name(message.param_name()) {
            Some(MessageKind::Request) => {
                if TrustResolver::request_signing_mandated(remote, self.hosted) {
                    let key = self.hosted.certificates.private_key(&self.hosted.entity_id)?;
                    XmlSigner::new(&key).sign(&mut message.root, &NsScope::new())?;
                    debug!(id = ?message.id(), "request signed for HTTP-POST");
                }
            }
            Some(MessageKind::Response) => {
                if !remote.wants_assertions_signed && !remote.wants_responses_signed {
                    return Ok(());
                }
                let key = self.hosted.certificates.private_key(&self.hosted.entity_id)?;
                let signer = XmlSigner::new(&key);
                let scope = NsScope::within(&message.root);

                if let Some(assertion) = message.assertion_mut() {
                    if remote.wants_assertions_signed {
                        declare_own_namespace(assertion, &scope);
                        ordering::order_assertion(assertion);
                        signer.sign(assertion, &scope)?;
                        debug!(id = ?assertion.id(), "assertion signed for HTTP-POST");
                    } else {
                        ordering::order_assertion(assertion);
                    }
                }
                if remote.wants_responses_signed {
                    signer.sign(&mut message.root, &NsScope::new())?;
                    debug!(id = ?message.id(), "response signed for HTTP-POST");
                }
            }
            None => {}
        }
        Ok(())
    }
}

impl BindingSender for PostSender<'_> {
    fn send(&self, mut message: Message, remote: &RemoteEntity, ctx: &mut RequestContext) -> ProxyResult<()> {
        let fields = self.form_fields(&mut message, remote)?;
        debug!(destination = %fields.action, name = %fields.name, "sending message with HTTP-POST");
        let body = self.renderer.render(&fields)?;
        ctx.output = Some(ResponseOutput::Html { body });
        Ok(())
    }
}

/// Declares the namespace of the element's own prefix on the element.
fn declare_own_namespace(element: &mut Element, inherited: &NsScope) {
    let prefix = element.prefix().unwrap_or("").to_string();
    let declaration = if prefix.is_empty() {
        "xmlns".to_string()
    } else {
        format!("xmlns:{prefix}")
    };
    if element.attr(&declaration).is_some() {
        return;
    }
    let uri = inherited.lookup(&prefix).unwrap_or(SAML_NS).to_string();
    element.set_attr(declaration, uri);
}
