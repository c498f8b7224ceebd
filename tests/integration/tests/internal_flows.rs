//! Internal binding flows.

use std::sync::{Arc, Mutex};

use fp_saml::bindings::ServiceTable;
use fp_saml::error::{DispatchError, VerificationError};
use fp_saml::message::{xml, BindingSource, Message, Node};
use fp_saml::{BindingKind, HttpInput, ProxyError, RemoteEntity};

use crate::common::{
    authn_request, descendant_mut, fresh_response, post_input, remote, sign_assertion, TestEnv, IDP_KEY,
    PROXY_CERT, PROXY_ID, SP_ID,
};

fn internal_request(destination: &str) -> anyhow::Result<Message> {
    let mut message = Message::new(xml::parse_str(&authn_request(SP_ID, destination))?);
    message.meta.protocol_binding = Some(BindingKind::Internal.uri().to_string());
    message.meta.relay_state = Some("consent-state".to_string());
    Ok(message)
}

/// Tests a request handed to another service and received there.
#[test]
fn test_internal_binding_reenters_service() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let services = ServiceTable::new().with_service("singleSignOnService", move |engine, ctx| {
        let received = engine.receive_request(ctx)?;
        tracing::info!(entity = %ctx.hosted_entity, "service reached");
        if let Ok(mut seen) = recorded.lock() {
            seen.push((
                ctx.hosted_entity.clone(),
                ctx.remote_idp.clone(),
                received.message.meta.source,
                received.message.meta.relay_state.clone(),
            ));
        }
        Ok(())
    });
    let env = TestEnv::build(|_| {}, services);

    let mut ctx = env.engine.new_context(HttpInput::new());
    env.engine.send(
        internal_request(&format!(
            "{PROXY_ID}/consent_0123456789abcdef0123456789abcdef/singleSignOnService"
        ))?,
        &RemoteEntity::new(PROXY_ID),
        &mut ctx,
    )?;

    let seen = seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
    assert_eq!(
        seen.as_slice(),
        &[(
            "consent".to_string(),
            Some("0123456789abcdef0123456789abcdef".to_string()),
            Some(BindingSource::Internal),
            Some("consent-state".to_string()),
        )]
    );
    // the stored message stays available to later receives in this request
    assert!(ctx.internal.get("SAMLRequest").is_some());
    assert!(ctx.output.is_none());
    Ok(())
}

/// Tests that an embedded signature is still checked on an internal hand-off.
#[test]
fn test_internal_binding_verifies_embedded_signature() -> anyhow::Result<()> {
    let services = ServiceTable::new().with_service("singleSignOnService", |engine, ctx| {
        engine.receive_request(ctx).map(|_| ())
    });
    let env = TestEnv::build(|main| main.wants_authn_requests_signed = true, services);

    // the target entity mandates signing, yet an unsigned internal request passes
    let mut ctx = env.engine.new_context(HttpInput::new());
    env.engine.send(
        internal_request(&format!("{PROXY_ID}/main/singleSignOnService"))?,
        &RemoteEntity::new(PROXY_ID),
        &mut ctx,
    )?;

    // a forged signature element does not
    let mut forged = internal_request(&format!("{PROXY_ID}/main/singleSignOnService"))?;
    forged.root.children.push(fp_saml::message::Node::Element(
        xml::parse_str(
            r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo/></ds:Signature>"#,
        )?,
    ));
    let mut ctx = env.engine.new_context(HttpInput::new());
    let err = env.engine.send(forged, &RemoteEntity::new(PROXY_ID), &mut ctx).unwrap_err();
    assert!(matches!(err, ProxyError::Verification(_) | ProxyError::Crypto(_)));
    Ok(())
}

fn consent_handover(mut message: Message) -> Message {
    message
        .root
        .set_attr("Destination", format!("{PROXY_ID}/consent/assertionConsumerService"));
    message.meta.protocol_binding = Some(BindingKind::Internal.uri().to_string());
    message
}

/// Tests that a decrypted assertion is verified again after a hand-off,
/// against the tree that was handed over.
#[test]
fn test_handed_over_assertion_is_verified_as_sent() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let services = ServiceTable::new().with_service("assertionConsumerService", move |engine, ctx| {
        let received = engine.receive_response(ctx)?;
        if let Ok(mut seen) = recorded.lock() {
            seen.push(received.message.meta.was_signed);
        }
        Ok(())
    });
    let env = TestEnv::build(|entity| entity.wants_assertions_signed = true, services);

    let mut response = fresh_response();
    sign_assertion(&mut response, IDP_KEY)?;
    let mut encrypted = Message::new(response);
    env.engine
        .encrypt_assertion(&mut encrypted, &remote(PROXY_ID, PROXY_CERT))?;
    let ctx = env
        .engine
        .new_context(post_input("SAMLResponse", &xml::to_xml(&encrypted.root), None));
    let decrypted = env.engine.receive_response(&ctx)?.message;
    assert!(decrypted.meta.assertion_raw.is_some());
    assert!(decrypted.meta.was_signed);

    // untouched, the signature verifies inside the handed-over response
    let mut ctx = env.engine.new_context(HttpInput::new());
    env.engine
        .send(consent_handover(decrypted.clone()), &RemoteEntity::new(PROXY_ID), &mut ctx)?;
    let stored = ctx
        .internal
        .get("SAMLResponse")
        .ok_or_else(|| anyhow::anyhow!("nothing handed over"))?;
    assert!(stored.meta.assertion_raw.is_none());

    // changed after decryption, it does not
    let mut changed = decrypted;
    let value = changed
        .assertion_mut()
        .and_then(|assertion| descendant_mut(assertion, &["AttributeStatement", "Attribute", "AttributeValue"]))
        .ok_or_else(|| anyhow::anyhow!("fixture has no attribute value"))?;
    value.children = vec![Node::Text("mallory@example.org".to_string())];

    let mut ctx = env.engine.new_context(HttpInput::new());
    let err = env
        .engine
        .send(consent_handover(changed), &RemoteEntity::new(PROXY_ID), &mut ctx)
        .unwrap_err();
    assert!(matches!(
        err,
        ProxyError::Verification(VerificationError::DigestMismatch(_))
    ));

    let seen = seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
    assert_eq!(seen.as_slice(), &[true]);
    Ok(())
}

/// Tests destinations that do not name a service.
#[test]
fn test_internal_binding_errors() -> anyhow::Result<()> {
    let env = TestEnv::new();

    let mut ctx = env.engine.new_context(HttpInput::new());
    let err = env
        .engine
        .send(internal_request("https://proxy.example.org/")?, &RemoteEntity::new(PROXY_ID), &mut ctx)
        .unwrap_err();
    assert!(matches!(err, ProxyError::Dispatch(DispatchError::InvalidDestination(_))));

    let mut ctx = env.engine.new_context(HttpInput::new());
    let err = env
        .engine
        .send(
            internal_request(&format!("{PROXY_ID}/main/unknownService"))?,
            &RemoteEntity::new(PROXY_ID),
            &mut ctx,
        )
        .unwrap_err();
    assert!(matches!(err, ProxyError::Dispatch(DispatchError::UnknownService(_))));
    Ok(())
}

/// Tests that an unknown outbound binding is refused.
#[test]
fn test_unknown_binding_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let mut message = internal_request(&format!("{SP_ID}/acs"))?;
    message.meta.protocol_binding = Some("urn:oasis:names:tc:SAML:2.0:bindings:PAOS".to_string());

    let mut ctx = env.engine.new_context(HttpInput::new());
    match env.engine.send(message, &RemoteEntity::new(SP_ID), &mut ctx) {
        Err(err @ ProxyError::Dispatch(DispatchError::UnknownBinding(_))) => {
            assert_eq!(err.status_code(), fp_saml::status_codes::UNSUPPORTED_BINDING);
        }
        other => panic!("expected an unknown binding, got {other:?}"),
    }
    Ok(())
}
