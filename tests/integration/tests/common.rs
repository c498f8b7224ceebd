//! Common test utilities and fixtures.

use std::io::Write;
use std::sync::{Arc, Mutex};

use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use flate2::write::DeflateEncoder;
use flate2::Compression;

use fp_saml::bindings::ServiceTable;
use fp_saml::error::DispatchError;
use fp_saml::message::{xml, Element, Message, NsScope};
use fp_saml::signature::XmlSigner;
use fp_saml::trust::Certificates;
use fp_saml::{
    AutoSubmitFormRenderer, BindingEngine, FormFields, HostedEntity, HttpInput, InMemoryEntityRegistry,
    ProxyConfig, RemoteEntity, TemplateRenderer, SAMLP_NS, SAML_NS,
};

pub const PROXY_ID: &str = "https://proxy.example.org";
pub const IDP_ID: &str = "https://idp.example.org";
pub const SP_ID: &str = "https://sp.example.org";

pub const PROXY_KEY: &str = include_str!("../../../crates/fp-saml/testdata/proxy_key.pem");
pub const PROXY_CERT: &str = include_str!("../../../crates/fp-saml/testdata/proxy_cert.pem");
pub const IDP_KEY: &str = include_str!("../../../crates/fp-saml/testdata/idp_key.pem");
pub const IDP_CERT: &str = include_str!("../../../crates/fp-saml/testdata/idp_cert.pem");
pub const ROLLOVER_KEY: &str = include_str!("../../../crates/fp-saml/testdata/idp_rollover_key.pem");
pub const ROLLOVER_CERT: &str = include_str!("../../../crates/fp-saml/testdata/idp_rollover_cert.pem");

/// A renderer that keeps every form it renders.
#[derive(Default)]
pub struct RecordingRenderer {
    forms: Mutex<Vec<FormFields>>,
}

impl RecordingRenderer {
    /// Returns the last rendered form.
    pub fn last(&self) -> Option<FormFields> {
        self.forms.lock().ok()?.last().cloned()
    }
}

impl TemplateRenderer for RecordingRenderer {
    fn render(&self, fields: &FormFields) -> Result<String, DispatchError> {
        let html = AutoSubmitFormRenderer.render(fields)?;
        if let Ok(mut forms) = self.forms.lock() {
            forms.push(fields.clone());
        }
        Ok(html)
    }
}

/// Test environment: the proxy engine, its registry and its renderer.
pub struct TestEnv {
    /// The proxy.
    pub engine: BindingEngine,
    /// Metadata of the proxy's peers.
    pub registry: Arc<InMemoryEntityRegistry>,
    /// Forms rendered by the POST binding.
    pub forms: Arc<RecordingRenderer>,
}

impl TestEnv {
    /// Creates a proxy with no signing policy and no services.
    pub fn new() -> Self {
        Self::build(|_| {}, ServiceTable::new())
    }

    /// Creates a proxy whose `main` and `consent` entities are adjusted by `policy`.
    pub fn build(policy: impl FnOnce(&mut HostedEntity), services: ServiceTable) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("fp_saml=debug")
            .with_test_writer()
            .try_init();

        let mut main = hosted(PROXY_ID, PROXY_KEY);
        policy(&mut main);
        let config = ProxyConfig::default()
            .with_hosted_entity("consent", main.clone())
            .with_hosted_entity("main", main);

        let registry = Arc::new(
            InMemoryEntityRegistry::new()
                .with_entity(remote(IDP_ID, IDP_CERT))
                .with_entity(remote(SP_ID, ROLLOVER_CERT)),
        );
        let forms = Arc::new(RecordingRenderer::default());
        let engine = BindingEngine::new(config, registry.clone())
            .with_renderer(forms.clone())
            .with_services(Arc::new(services));

        Self {
            engine,
            registry,
            forms,
        }
    }
}

/// A hosted entity with a private key.
pub fn hosted(entity_id: &str, key: &str) -> HostedEntity {
    HostedEntity {
        certificates: Certificates {
            private: Some(key.to_string()),
            ..Certificates::default()
        },
        ..HostedEntity::new(entity_id)
    }
}

/// A remote entity with a verification key.
pub fn remote(entity_id: &str, cert: &str) -> RemoteEntity {
    RemoteEntity {
        certificates: Certificates {
            public: Some(cert.to_string()),
            ..Certificates::default()
        },
        ..RemoteEntity::new(entity_id)
    }
}

/// An engine acting as a peer of the proxy, for producing signed traffic.
pub fn peer_engine(entity_id: &str, key: &str) -> BindingEngine {
    let config = ProxyConfig::default().with_hosted_entity("main", hosted(entity_id, key));
    BindingEngine::new(config, Arc::new(InMemoryEntityRegistry::new()))
}

/// Formats an instant the way SAML does.
pub fn instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// An `AuthnRequest` from `issuer` to `destination`.
pub fn authn_request(issuer: &str, destination: &str) -> String {
    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="_req1" Version="2.0" IssueInstant="{now}" Destination="{destination}" ForceAuthn="1"><saml:Issuer>{issuer}</saml:Issuer></samlp:AuthnRequest>"#,
        now = instant(Utc::now()),
    )
}

/// A response of the IdP to the proxy with an unsigned assertion.
pub fn idp_response(not_before: DateTime<Utc>, not_on_or_after: DateTime<Utc>) -> Element {
    let xml = format!(
        r#"<samlp:Response xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="_resp1" Version="2.0" Destination="{PROXY_ID}/main/assertionConsumerService"><saml:Issuer>{IDP_ID}</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status><saml:Assertion ID="_assert1" Version="2.0"><saml:Issuer>{IDP_ID}</saml:Issuer><saml:Subject><saml:NameID>alice</saml:NameID><saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer"><saml:SubjectConfirmationData NotOnOrAfter="{noa}"/></saml:SubjectConfirmation></saml:Subject><saml:Conditions NotBefore="{nb}" NotOnOrAfter="{noa}"/><saml:AttributeStatement><saml:Attribute Name="mail"><saml:AttributeValue>alice@example.org</saml:AttributeValue></saml:Attribute></saml:AttributeStatement></saml:Assertion></samlp:Response>"#,
        nb = instant(not_before),
        noa = instant(not_on_or_after),
    );
    xml::parse_str(&xml).expect("response fixture parses")
}

/// An IdP response valid for five minutes around now.
pub fn fresh_response() -> Element {
    let now = Utc::now();
    idp_response(now - Duration::minutes(5), now + Duration::minutes(5))
}

/// Follows a path of local names to a nested element.
pub fn descendant_mut<'a>(element: &'a mut Element, path: &[&str]) -> Option<&'a mut Element> {
    let (first, rest) = path.split_first()?;
    let child = element.child_mut(first)?;
    if rest.is_empty() {
        Some(child)
    } else {
        descendant_mut(child, rest)
    }
}

/// Signs the assertion of a response in place.
pub fn sign_assertion(response: &mut Element, key_pem: &str) -> anyhow::Result<()> {
    let key = fp_crypto::PrivateKey::from_pem(key_pem)?;
    let scope = NsScope::within(response);
    let assertion = response
        .child_mut("Assertion")
        .ok_or_else(|| anyhow::anyhow!("response has no assertion"))?;
    XmlSigner::new(&key).sign(assertion, &scope)?;
    Ok(())
}

/// The POST input carrying a message.
pub fn post_input(param: &str, payload: &str, relay_state: Option<&str>) -> HttpInput {
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
    let mut fields = vec![(param.to_string(), encoded)];
    if let Some(relay_state) = relay_state {
        fields.push(("RelayState".to_string(), relay_state.to_string()));
    }
    HttpInput::from_form(fields)
}

/// The Redirect query value of a payload.
pub fn redirect_value(payload: &str) -> anyhow::Result<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload.as_bytes())?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(encoder.finish()?);
    Ok(urlencoding::encode(&encoded).into_owned())
}

/// The query part of a redirect location.
pub fn query_of(location: &str) -> anyhow::Result<&str> {
    location
        .split_once('?')
        .map(|(_, query)| query)
        .ok_or_else(|| anyhow::anyhow!("no query in {location}"))
}

/// Decodes the message field of a POST form.
pub fn form_message(fields: &FormFields) -> anyhow::Result<Message> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(&fields.message)?;
    Ok(Message::decode(bytes)?)
}
