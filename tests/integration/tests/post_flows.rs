//! HTTP-POST binding flows: responses, signatures, encryption and timing.

use base64::Engine;
use chrono::{Duration, Utc};

use fp_saml::bindings::ServiceTable;
use fp_saml::error::{CryptoError, VerificationError};
use fp_saml::message::{Element, Message, Node};
use fp_saml::signature::{SignaturePolicy, SignatureVerifier, VerificationKeys};
use fp_saml::trust::Certificates;
use fp_saml::{BindingKind, HttpInput, ProxyError, RemoteEntity, ResponseOutput};

use crate::common::{
    descendant_mut, form_message, fresh_response, idp_response, post_input, remote, sign_assertion, TestEnv,
    IDP_CERT, IDP_ID, IDP_KEY, PROXY_CERT, PROXY_ID, ROLLOVER_CERT, ROLLOVER_KEY, SP_ID,
};

fn signed_policy() -> TestEnv {
    TestEnv::build(|main| main.wants_assertions_signed = true, ServiceTable::new())
}

fn forged_assertion() -> anyhow::Result<Element> {
    let mut forged = fresh_response()
        .child("Assertion")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("fixture has no assertion"))?;
    let name_id = descendant_mut(&mut forged, &["Subject", "NameID"])
        .ok_or_else(|| anyhow::anyhow!("fixture has no NameID"))?;
    name_id.children = vec![Node::Text("mallory".to_string())];
    Ok(forged)
}

fn receive(env: &TestEnv, response: &Element) -> Result<fp_saml::Received, ProxyError> {
    let xml = fp_saml::message::xml::to_xml(response);
    let ctx = env
        .engine
        .new_context(post_input("SAMLResponse", &xml, Some("relay-1")));
    env.engine.receive_response(&ctx)
}

/// Tests a response whose assertion is signed by the IdP.
#[test]
fn test_signed_assertion_is_accepted() -> anyhow::Result<()> {
    let env = signed_policy();
    let mut response = fresh_response();
    sign_assertion(&mut response, IDP_KEY)?;

    let received = receive(&env, &response)?;
    assert_eq!(received.remote.entity_id, IDP_ID);
    assert!(received.message.meta.was_signed);
    assert_eq!(received.message.meta.relay_state.as_deref(), Some("relay-1"));
    assert_eq!(
        received.message.meta.protocol_binding.as_deref(),
        Some(BindingKind::HttpPost.uri())
    );
    Ok(())
}

/// Tests that a signed-assertion policy rejects an unsigned assertion.
#[test]
fn test_unsigned_assertion_is_rejected() -> anyhow::Result<()> {
    let env = signed_policy();
    let err = receive(&env, &fresh_response()).unwrap_err();
    assert!(matches!(err, ProxyError::Verification(VerificationError::MissingSignature(_))));
    Ok(())
}

/// Tests that an edited attribute value breaks the digest.
#[test]
fn test_modified_assertion_fails_digest() -> anyhow::Result<()> {
    let env = signed_policy();
    let mut response = fresh_response();
    sign_assertion(&mut response, IDP_KEY)?;

    let value = descendant_mut(
        &mut response,
        &["Assertion", "AttributeStatement", "Attribute", "AttributeValue"],
    )
    .ok_or_else(|| anyhow::anyhow!("fixture has no attribute value"))?;
    value.children = vec![Node::Text("mallory@example.org".to_string())];

    assert!(matches!(
        receive(&env, &response),
        Err(ProxyError::Verification(VerificationError::DigestMismatch(_)))
    ));
    Ok(())
}

/// Tests that a duplicated ID is never resolved to its first match.
#[test]
fn test_wrapped_assertion_is_rejected() -> anyhow::Result<()> {
    let env = signed_policy();
    let mut response = fresh_response();
    sign_assertion(&mut response, IDP_KEY)?;

    let decoy = Element::new("samlp:Extensions")
        .with_child(Element::new("saml:Assertion").with_attr("ID", "_assert1"));
    response.children.insert(1, Node::Element(decoy));

    assert!(matches!(
        receive(&env, &response),
        Err(ProxyError::Verification(VerificationError::AmbiguousOrMissingReference { .. }))
    ));
    Ok(())
}

/// Tests that a plaintext assertion next to an encrypted one is refused.
#[test]
fn test_plaintext_assertion_beside_encrypted_is_rejected() -> anyhow::Result<()> {
    let env = signed_policy();
    let mut response = fresh_response();
    sign_assertion(&mut response, IDP_KEY)?;
    let mut message = Message::new(response);
    env.engine
        .encrypt_assertion(&mut message, &remote(PROXY_ID, PROXY_CERT))?;
    // same ID as the encrypted assertion, placed first
    message.root.children.insert(1, Node::Element(forged_assertion()?));

    assert!(matches!(
        receive(&env, &message.root),
        Err(ProxyError::Verification(VerificationError::MultipleAssertions(2)))
    ));
    assert!(matches!(
        receive(&TestEnv::new(), &message.root),
        Err(ProxyError::Verification(VerificationError::MultipleAssertions(2)))
    ));
    Ok(())
}

/// Tests that a response carrying two plaintext assertions is refused.
#[test]
fn test_multiple_assertions_are_rejected() -> anyhow::Result<()> {
    let env = signed_policy();
    let mut signed = fresh_response();
    sign_assertion(&mut signed, IDP_KEY)?;

    for position in [1, 2] {
        let mut response = signed.clone();
        response
            .children
            .insert(position, Node::Element(forged_assertion()?));
        assert!(matches!(
            receive(&env, &response),
            Err(ProxyError::Verification(VerificationError::MultipleAssertions(2)))
        ));
    }
    Ok(())
}

/// Tests key rollover through the fallback certificate.
#[test]
fn test_fallback_key_verifies_rollover_signature() -> anyhow::Result<()> {
    let env = signed_policy();
    env.registry.insert(RemoteEntity {
        certificates: Certificates {
            public: Some(IDP_CERT.to_string()),
            public_fallback: Some(ROLLOVER_CERT.to_string()),
            ..Certificates::default()
        },
        ..RemoteEntity::new(IDP_ID)
    });

    let mut response = fresh_response();
    sign_assertion(&mut response, ROLLOVER_KEY)?;
    assert!(receive(&env, &response)?.message.meta.was_signed);

    // neither configured key matches
    env.registry.insert(remote(IDP_ID, PROXY_CERT));
    assert!(matches!(
        receive(&env, &response),
        Err(ProxyError::Verification(VerificationError::InvalidAssertionSignature))
    ));
    Ok(())
}

/// Tests an encrypted, signed assertion end to end.
#[test]
fn test_encrypted_assertion_is_decrypted_and_verified() -> anyhow::Result<()> {
    let env = signed_policy();
    let mut response = fresh_response();
    sign_assertion(&mut response, IDP_KEY)?;

    let mut message = Message::new(response);
    let proxy = remote(PROXY_ID, PROXY_CERT);
    assert!(env.engine.encrypt_assertion(&mut message, &proxy)?);
    assert!(message.root.child("EncryptedAssertion").is_some());
    assert!(message.assertion().is_none());

    let received = receive(&env, &message.root)?;
    let assertion = received
        .message
        .assertion()
        .ok_or_else(|| anyhow::anyhow!("assertion was not decrypted"))?;
    assert_eq!(assertion.id(), Some("_assert1"));
    assert!(received.message.root.child("EncryptedAssertion").is_none());
    assert!(received.message.meta.assertion_raw.is_some());
    assert!(received.message.meta.was_signed);
    Ok(())
}

/// Tests that a tampered last block fails on padding instead of yielding data.
#[test]
fn test_tampered_ciphertext_fails_padding() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let mut message = Message::new(fresh_response());
    env.engine
        .encrypt_assertion(&mut message, &remote(PROXY_ID, PROXY_CERT))?;

    let cipher_value = descendant_mut(
        &mut message.root,
        &["EncryptedAssertion", "EncryptedData", "CipherData", "CipherValue"],
    )
    .ok_or_else(|| anyhow::anyhow!("no cipher value"))?;
    let mut data = base64::engine::general_purpose::STANDARD.decode(cipher_value.text().trim())?;
    // flips the high bit of the final plaintext byte, so the pad length exceeds a block
    let len = data.len();
    data[len - 17] ^= 0x80;
    cipher_value.children = vec![Node::Text(
        base64::engine::general_purpose::STANDARD.encode(&data),
    )];

    assert!(matches!(
        receive(&env, &message.root),
        Err(ProxyError::Crypto(CryptoError::InvalidPadding))
    ));
    Ok(())
}

/// Tests the validity window around the default skew.
#[test]
fn test_timing_window() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let now = Utc::now();
    let at = |response: &Element| {
        let xml = fp_saml::message::xml::to_xml(response);
        let ctx = env
            .engine
            .new_context(post_input("SAMLResponse", &xml, None))
            .with_now(now);
        env.engine.receive_response(&ctx)
    };

    let expired = idp_response(now - Duration::hours(3), now - Duration::hours(2));
    match at(&expired) {
        Err(ProxyError::Timing(err)) => assert_eq!(err.issues.len(), 2),
        other => panic!("expected a timing error, got {other:?}"),
    }

    let recently_expired = idp_response(now - Duration::hours(1), now - Duration::minutes(30));
    assert!(at(&recently_expired).is_ok());

    let not_yet_valid = idp_response(now + Duration::hours(2), now + Duration::hours(3));
    match at(&not_yet_valid) {
        Err(ProxyError::Timing(err)) => {
            assert!(err.issues.iter().any(|issue| issue.contains("not valid yet")));
        }
        other => panic!("expected a timing error, got {other:?}"),
    }
    Ok(())
}

/// Tests the proxy posting a response with a signed assertion to the SP.
#[test]
fn test_post_response_signs_assertion_for_sp() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let sp = RemoteEntity {
        wants_assertions_signed: true,
        ..RemoteEntity::new(SP_ID)
    };

    let mut response = fresh_response();
    response.set_attr("Destination", format!("{SP_ID}/acs"));
    let mut message = Message::new(response);
    message.meta.protocol_binding = Some(BindingKind::HttpPost.uri().to_string());
    message.meta.relay_state = Some("sp-state".to_string());

    let mut ctx = env.engine.new_context(HttpInput::new());
    env.engine.send(message, &sp, &mut ctx)?;
    assert!(matches!(ctx.output, Some(ResponseOutput::Html { .. })));

    let fields = env
        .forms
        .last()
        .ok_or_else(|| anyhow::anyhow!("nothing rendered"))?;
    assert_eq!(fields.action, format!("{SP_ID}/acs"));
    assert_eq!(fields.name, "SAMLResponse");
    assert_eq!(fields.hidden_field("RelayState"), Some("sp-state"));

    let sent = form_message(&fields)?;
    let verifier = SignatureVerifier::new(VerificationKeys::new(
        fp_crypto::PublicKey::from_pem(PROXY_CERT)?,
        None,
    ));
    assert!(verifier.verify_message(&sent, SignaturePolicy::Required)?);
    assert!(sent.root.child("Signature").is_none());
    Ok(())
}
