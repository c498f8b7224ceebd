//! HTTP-Redirect binding flows.

use fp_crypto::shared_secret_signature;
use fp_saml::bindings::ServiceTable;
use fp_saml::error::{TransportError, VerificationError};
use fp_saml::message::{xml, Message};
use fp_saml::{BindingKind, HttpInput, ProxyError, RemoteEntity, ResponseOutput};

use crate::common::{
    authn_request, peer_engine, query_of, redirect_value, remote, TestEnv, IDP_CERT, IDP_ID, PROXY_ID, ROLLOVER_CERT,
    ROLLOVER_KEY, SP_ID,
};

fn outgoing_request(issuer: &str, destination: &str, relay_state: &str) -> anyhow::Result<Message> {
    let mut message = Message::new(xml::parse_str(&authn_request(issuer, destination))?);
    message.meta.protocol_binding = Some(BindingKind::HttpRedirect.uri().to_string());
    message.meta.relay_state = Some(relay_state.to_string());
    Ok(message)
}

fn redirect_location(output: Option<ResponseOutput>) -> anyhow::Result<String> {
    match output {
        Some(ResponseOutput::Redirect { location }) => Ok(location),
        other => anyhow::bail!("expected a redirect, got {other:?}"),
    }
}

/// Tests a signed request from the SP through the Redirect binding.
#[test]
fn test_signed_redirect_request_is_accepted() -> anyhow::Result<()> {
    let env = TestEnv::new();
    env.registry.insert(RemoteEntity {
        authn_requests_signed: true,
        ..remote(SP_ID, ROLLOVER_CERT)
    });

    // the SP signs because the proxy declares it wants signed requests
    let sp = peer_engine(SP_ID, ROLLOVER_KEY);
    let proxy = RemoteEntity {
        authn_requests_signed: true,
        ..RemoteEntity::new(PROXY_ID)
    };
    let mut sp_ctx = sp.new_context(HttpInput::new());
    sp.send(
        outgoing_request(SP_ID, &format!("{PROXY_ID}/main/singleSignOnService"), "state/1")?,
        &proxy,
        &mut sp_ctx,
    )?;
    let location = redirect_location(sp_ctx.output)?;
    assert!(location.contains("&SigAlg="));

    let ctx = env.engine.new_context(HttpInput::from_query(query_of(&location)?));
    let received = env.engine.receive_request(&ctx)?;

    assert_eq!(received.remote.entity_id, SP_ID);
    assert!(received.message.meta.was_signed);
    assert_eq!(received.message.meta.relay_state.as_deref(), Some("state/1"));
    assert_eq!(received.message.root.attr("ForceAuthn"), Some("true"));
    assert_eq!(received.message.root.attr("IsPassive"), Some("false"));
    Ok(())
}

/// Tests that a changed RelayState breaks the detached signature.
#[test]
fn test_tampered_redirect_query_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new();
    env.registry.insert(RemoteEntity {
        authn_requests_signed: true,
        ..remote(SP_ID, ROLLOVER_CERT)
    });

    let sp = peer_engine(SP_ID, ROLLOVER_KEY);
    let proxy = RemoteEntity {
        authn_requests_signed: true,
        ..RemoteEntity::new(PROXY_ID)
    };
    let mut sp_ctx = sp.new_context(HttpInput::new());
    sp.send(
        outgoing_request(SP_ID, &format!("{PROXY_ID}/main/singleSignOnService"), "original")?,
        &proxy,
        &mut sp_ctx,
    )?;
    let location = redirect_location(sp_ctx.output)?;
    let tampered = query_of(&location)?.replace("RelayState=original", "RelayState=forged");

    let ctx = env.engine.new_context(HttpInput::from_query(tampered));
    let err = env.engine.receive_request(&ctx).unwrap_err();
    assert!(matches!(
        err,
        ProxyError::Verification(VerificationError::InvalidMessageSignature)
    ));
    Ok(())
}

/// Tests that an unsigned request is rejected when the peer declares it signs.
#[test]
fn test_unsigned_request_rejected_when_signing_mandated() -> anyhow::Result<()> {
    let env = TestEnv::new();
    env.registry.insert(RemoteEntity {
        authn_requests_signed: true,
        ..remote(SP_ID, ROLLOVER_CERT)
    });

    let request = authn_request(SP_ID, &format!("{PROXY_ID}/main/singleSignOnService"));
    let query = format!("SAMLRequest={}&RelayState=abc", redirect_value(&request)?);
    let ctx = env.engine.new_context(HttpInput::from_query(query));

    let err = env.engine.receive_request(&ctx).unwrap_err();
    assert!(matches!(err, ProxyError::Verification(VerificationError::MissingSignature(_))));
    assert_eq!(err.http_status(), 401);
    Ok(())
}

/// Tests that the hosted policy alone mandates signed requests.
#[test]
fn test_hosted_policy_mandates_signed_requests() -> anyhow::Result<()> {
    let env = TestEnv::build(|main| main.wants_authn_requests_signed = true, ServiceTable::new());

    let request = authn_request(SP_ID, &format!("{PROXY_ID}/main/singleSignOnService"));
    let query = format!("SAMLRequest={}", redirect_value(&request)?);
    let ctx = env.engine.new_context(HttpInput::from_query(query));

    assert!(matches!(
        env.engine.receive_request(&ctx),
        Err(ProxyError::Verification(VerificationError::MissingSignature(_)))
    ));
    Ok(())
}

/// Tests that an unsigned request passes when nothing mandates signing.
#[test]
fn test_unsigned_request_accepted_without_mandate() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let request = authn_request(SP_ID, &format!("{PROXY_ID}/main/singleSignOnService"));
    let query = format!("SAMLRequest={}", redirect_value(&request)?);
    let ctx = env.engine.new_context(HttpInput::from_query(query));

    let received = env.engine.receive_request(&ctx)?;
    assert!(!received.message.meta.was_signed);
    assert!(received.message.meta.relay_state.is_none());
    Ok(())
}

/// Tests that bad base64 and bad DEFLATE data fail differently.
#[test]
fn test_redirect_decoding_errors_are_distinct() -> anyhow::Result<()> {
    let env = TestEnv::new();

    let ctx = env.engine.new_context(HttpInput::from_query("SAMLRequest=not*base64"));
    assert!(matches!(
        env.engine.receive_request(&ctx),
        Err(ProxyError::Transport(TransportError::InvalidEncoding { .. }))
    ));

    let ctx = env.engine.new_context(HttpInput::from_query("SAMLRequest=////////"));
    assert!(matches!(
        env.engine.receive_request(&ctx),
        Err(ProxyError::Transport(TransportError::InvalidCompression { .. }))
    ));

    let ctx = env.engine.new_context(HttpInput::new());
    assert!(matches!(
        env.engine.receive_request(&ctx),
        Err(ProxyError::Transport(TransportError::NoMessage(_)))
    ));
    Ok(())
}

/// Tests that a request from an unregistered issuer is refused.
#[test]
fn test_unknown_issuer_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let request = authn_request("https://rogue.example.org", &format!("{PROXY_ID}/main/singleSignOnService"));
    let query = format!("SAMLRequest={}", redirect_value(&request)?);
    let ctx = env.engine.new_context(HttpInput::from_query(query));

    match env.engine.receive_request(&ctx) {
        Err(ProxyError::UnknownIssuer(err)) => assert_eq!(err.issuer, "https://rogue.example.org"),
        other => panic!("expected an unknown issuer, got {other:?}"),
    }
    Ok(())
}

/// Tests the proxy forwarding a request to the IdP.
#[test]
fn test_proxy_signs_request_for_idp() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let idp = RemoteEntity {
        authn_requests_signed: true,
        ..remote(IDP_ID, IDP_CERT)
    };

    let mut ctx = env.engine.new_context(HttpInput::new());
    env.engine.send(
        outgoing_request(PROXY_ID, &format!("{IDP_ID}/sso?tenant=a"), "")?,
        &idp,
        &mut ctx,
    )?;
    let location = redirect_location(ctx.output)?;

    assert!(location.starts_with(&format!("{IDP_ID}/sso?tenant=a&SAMLRequest=")));
    assert!(!location.contains("RelayState="));
    assert!(location.contains("&SigAlg="));
    Ok(())
}

/// Tests the keyed hash signature of the JSON Redirect variant.
#[test]
fn test_json_redirect_with_shared_key() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let sp = RemoteEntity {
        shared_key: Some("s3cret".to_string()),
        ..RemoteEntity::new(SP_ID)
    };

    let mut message = outgoing_request(PROXY_ID, &format!("{SP_ID}/acs"), "rs")?;
    message.meta.protocol_binding = Some(BindingKind::JsonRedirect.uri().to_string());
    let mut ctx = env.engine.new_context(HttpInput::new());
    env.engine.send(message, &sp, &mut ctx)?;

    let location = redirect_location(ctx.output)?;
    let query = query_of(&location)?;
    let (signed, signature) = query
        .split_once("&Signature=")
        .ok_or_else(|| anyhow::anyhow!("unsigned query {query}"))?;
    assert!(signed.ends_with("&RelayState=rs"));
    assert!(!signed.contains("SigAlg"));
    assert_eq!(urlencoding::decode(signature)?, shared_secret_signature("s3cret", signed));

    // the JSON payload decodes back into the same request
    let input = HttpInput::from_query(query);
    let received = fp_saml::bindings::MessageReceiver::new(1 << 20)
        .receive(fp_saml::MessageKind::Request, &fp_saml::RequestContext::new("main", input))?;
    assert_eq!(received.meta.format, fp_saml::message::PayloadFormat::Json);
    assert_eq!(received.id(), Some("_req1"));
    Ok(())
}
