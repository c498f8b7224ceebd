//! XML signature verification.
//!
//! References are resolved against a fresh parse of the bytes captured at
//! receipt, never against the application tree. A reference id must match
//! exactly one element of that document.

use base64::Engine;
use tracing::{debug, warn};

use fp_crypto::{rsa_sha1_verify, sha1, PublicKey};

use crate::error::VerificationError;
use crate::message::{xml, DetachedSignature, Element, Message, Node, NsScope, PayloadFormat};
use crate::types::{algorithms, EXC_C14N_NS, XMLDSIG_NS};

use super::c14n::{canonicalize, parse_prefix_list};

/// Whether a signature must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePolicy {
    /// Signing is mandated; an unsigned message is rejected.
    Required,
    /// Signatures that are present are verified, none are demanded.
    IfPresent,
}

/// The keys a peer may have signed with.
#[derive(Debug, Clone)]
pub struct VerificationKeys {
    primary: PublicKey,
    fallback: Option<PublicKey>,
}

impl VerificationKeys {
    /// Creates a key set.
    #[must_use]
    pub fn new(primary: PublicKey, fallback: Option<PublicKey>) -> Self {
        Self { primary, fallback }
    }

    /// Verifies with the primary key, then with the fallback key.
    #[must_use]
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        if rsa_sha1_verify(&self.primary, data, signature) {
            return true;
        }
        match &self.fallback {
            Some(fallback) if rsa_sha1_verify(fallback, data, signature) => {
                debug!("signature verified with fallback key");
                true
            }
            _ => false,
        }
    }
}

/// Verifies the signatures of received messages.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    keys: VerificationKeys,
}

impl SignatureVerifier {
    /// Creates a verifier for one peer.
    #[must_use]
    pub fn new(keys: VerificationKeys) -> Self {
        Self { keys }
    }

    /// Verifies every signature a message carries.
    ///
    /// A detached Redirect signature is verified on its own. Otherwise the
    /// signature on the message root is verified if present, and an embedded
    /// assertion must be signed, using its own raw capture if it was
    /// decrypted. The element the assertion signature covers must equal the
    /// assertion the message exposes. Returns true if at least one signature
    /// was verified.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MultipleAssertions`] for a response with
    /// more than one assertion, [`VerificationError::UnsupportedFormat`] for
    /// a JSON payload without a detached signature, another
    /// [`VerificationError`] for any failed check, or
    /// [`VerificationError::MissingSignature`] if `policy` is
    /// [`SignaturePolicy::Required`] and nothing is signed.
    pub fn verify_message(&self, message: &Message, policy: SignaturePolicy) -> Result<bool, VerificationError> {
        message.ensure_single_assertion()?;
        if let Some(detached) = &message.meta.detached_signature {
            self.verify_detached(detached)?;
            return Ok(true);
        }
        if message.meta.format == PayloadFormat::Json {
            warn!(issuer = ?message.issuer(), "embedded signature check on a JSON payload");
            return Err(VerificationError::UnsupportedFormat("JSON"));
        }

        let raw = message
            .meta
            .raw
            .as_deref()
            .ok_or_else(|| VerificationError::Malformed("no raw capture of the message".to_string()))?;
        let document = parse_raw(raw)?;
        let mut signed = false;

        if has_signature(&document, &NsScope::new()) {
            let id = document
                .id()
                .ok_or_else(|| VerificationError::MissingElement("ID of the signed message".to_string()))?;
            self.verify_enveloped(&document, id, VerificationError::InvalidMessageSignature)?;
            signed = true;
        }

        if let Some(assertion) = message.assertion() {
            let id = assertion
                .id()
                .ok_or_else(|| VerificationError::MissingElement("ID of the Assertion".to_string()))?;
            let assertion_document = match message.meta.assertion_raw.as_deref() {
                Some(assertion_raw) => Some(parse_raw(assertion_raw)?),
                None => None,
            };
            let source = assertion_document.as_ref().unwrap_or(&document);
            let (located, scope) = find_unique_by_id(source, id)?;
            if located != assertion {
                warn!(assertion = id, "signed assertion is not the one carried by the message");
                return Err(VerificationError::SignedElementMismatch(id.to_string()));
            }
            let assertion_signed = has_signature(located, &scope);
            if assertion_signed {
                self.verify_enveloped(source, id, VerificationError::InvalidAssertionSignature)?;
                signed = true;
            } else if policy == SignaturePolicy::Required {
                warn!(assertion = id, "assertion is not signed");
                return Err(VerificationError::MissingSignature(format!("Assertion '{id}'")));
            }
        }

        if !signed && policy == SignaturePolicy::Required {
            warn!(issuer = ?message.issuer(), "message is not signed");
            return Err(VerificationError::MissingSignature(message.root.local_name().to_string()));
        }
        Ok(signed)
    }

    /// Verifies a detached Redirect-binding signature.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::UnsupportedAlgorithm`] for any `SigAlg`
    /// but RSA-SHA1 and [`VerificationError::InvalidMessageSignature`] if
    /// neither key verifies.
    pub fn verify_detached(&self, detached: &DetachedSignature) -> Result<(), VerificationError> {
        if detached.sig_alg != algorithms::RSA_SHA1 {
            return Err(VerificationError::UnsupportedAlgorithm(detached.sig_alg.clone()));
        }
        let signature = decode_base64(&detached.signature, "Signature")?;
        if self.keys.verify(detached.signed_octets.as_bytes(), &signature) {
            Ok(())
        } else {
            warn!("detached signature does not verify");
            Err(VerificationError::InvalidMessageSignature)
        }
    }

    /// Verifies the enveloped signature of the element with the given id.
    ///
    /// `invalid` is returned when the signature value does not verify.
    ///
    /// # Errors
    ///
    /// Returns a [`VerificationError`] for a missing or ambiguous reference,
    /// an unsupported algorithm or transform, a digest mismatch or an invalid
    /// signature value.
    pub fn verify_enveloped(
        &self,
        document: &Element,
        target_id: &str,
        invalid: VerificationError,
    ) -> Result<(), VerificationError> {
        let (target, target_scope) = find_unique_by_id(document, target_id)?;

        let mut scope = target_scope;
        scope.push(target);
        let signature = dsig_child(target, "Signature", &scope)
            .ok_or_else(|| VerificationError::MissingSignature(target.local_name().to_string()))?;
        scope.push(signature);

        let signed_info = dsig_child(signature, "SignedInfo", &scope)
            .ok_or_else(|| VerificationError::MissingElement("ds:SignedInfo".to_string()))?;

        let c14n_method = signed_info
            .child("CanonicalizationMethod")
            .ok_or_else(|| VerificationError::MissingElement("ds:CanonicalizationMethod".to_string()))?;
        require_algorithm(c14n_method, algorithms::EXC_C14N)?;
        let signed_info_prefixes = inclusive_prefixes(c14n_method);

        let signature_method = signed_info
            .child("SignatureMethod")
            .ok_or_else(|| VerificationError::MissingElement("ds:SignatureMethod".to_string()))?;
        require_algorithm(signature_method, algorithms::RSA_SHA1)?;

        let references: Vec<&Element> = signed_info.children_named("Reference").collect();
        if references.is_empty() {
            return Err(VerificationError::MissingElement("ds:Reference".to_string()));
        }
        let mut ids = Vec::with_capacity(references.len());
        for reference in &references {
            ids.push(reference_id(reference)?);
        }
        if !ids.iter().any(|id| *id == target_id) {
            return Err(VerificationError::ReferenceMismatch(target_id.to_string()));
        }
        for (reference, id) in references.iter().zip(ids) {
            verify_reference(document, reference, id)?;
        }

        let canonical_signed_info = canonicalize(signed_info, &scope, &signed_info_prefixes);
        let signature_value = signature
            .child("SignatureValue")
            .ok_or_else(|| VerificationError::MissingElement("ds:SignatureValue".to_string()))?;
        let signature_bytes = decode_base64(&signature_value.text(), "SignatureValue")?;

        if self.keys.verify(canonical_signed_info.as_bytes(), &signature_bytes) {
            debug!(reference = target_id, "enveloped signature verified");
            Ok(())
        } else {
            warn!(reference = target_id, "enveloped signature does not verify");
            Err(invalid)
        }
    }
}

fn verify_reference(document: &Element, reference: &Element, id: &str) -> Result<(), VerificationError> {
    let (referenced, scope) = find_unique_by_id(document, id)?;
    let mut subject = referenced.clone();
    let mut prefixes = Vec::new();

    if let Some(transforms) = reference.child("Transforms") {
        for transform in transforms.children_named("Transform") {
            let algorithm = transform.attr("Algorithm").unwrap_or_default();
            match algorithm {
                algorithms::ENVELOPED_SIGNATURE => remove_enveloped_signature(&mut subject, &scope),
                algorithms::EXC_C14N => prefixes = inclusive_prefixes(transform),
                other => return Err(VerificationError::UnsupportedTransform(other.to_string())),
            }
        }
    }

    let digest_method = reference
        .child("DigestMethod")
        .ok_or_else(|| VerificationError::MissingElement("ds:DigestMethod".to_string()))?;
    require_algorithm(digest_method, algorithms::SHA1)?;
    let declared = reference
        .child("DigestValue")
        .ok_or_else(|| VerificationError::MissingElement("ds:DigestValue".to_string()))?;
    let declared = decode_base64(&declared.text(), "DigestValue")?;

    let computed = sha1(canonicalize(&subject, &scope, &prefixes).as_bytes());
    if computed.as_slice() == declared.as_slice() {
        Ok(())
    } else {
        warn!(reference = id, "digest mismatch");
        Err(VerificationError::DigestMismatch(id.to_string()))
    }
}

fn reference_id(reference: &Element) -> Result<&str, VerificationError> {
    let uri = reference.attr("URI").unwrap_or_default();
    match uri.strip_prefix('#') {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(VerificationError::UnsupportedReference(uri.to_string())),
    }
}

fn require_algorithm(method: &Element, expected: &str) -> Result<(), VerificationError> {
    match method.attr("Algorithm") {
        Some(algorithm) if algorithm == expected => Ok(()),
        Some(algorithm) => Err(VerificationError::UnsupportedAlgorithm(algorithm.to_string())),
        None => Err(VerificationError::MissingElement(format!(
            "Algorithm of ds:{}",
            method.local_name()
        ))),
    }
}

fn inclusive_prefixes(method: &Element) -> Vec<String> {
    let scope = NsScope::within(method);
    method
        .child_elements()
        .find(|c| c.local_name() == "InclusiveNamespaces" && scope.element_namespace(c) == Some(EXC_C14N_NS))
        .and_then(|c| c.attr("PrefixList"))
        .map(parse_prefix_list)
        .unwrap_or_default()
}

/// Removes the signature enveloped by `element`: its first ds:Signature child.
fn remove_enveloped_signature(element: &mut Element, inherited: &NsScope) {
    let mut scope = inherited.clone();
    scope.push(element);
    let position = element.children.iter().position(|node| match node {
        Node::Element(child) => {
            child.local_name() == "Signature" && scope.element_namespace(child) == Some(XMLDSIG_NS)
        }
        Node::Text(_) => false,
    });
    if let Some(position) = position {
        element.children.remove(position);
    }
}

/// Returns the first child with the given local name in the xmldsig namespace.
///
/// `scope` must already include `parent`.
fn dsig_child<'a>(parent: &'a Element, local: &str, scope: &NsScope) -> Option<&'a Element> {
    parent
        .child_elements()
        .find(|c| c.local_name() == local && scope.element_namespace(c) == Some(XMLDSIG_NS))
}

fn has_signature(element: &Element, inherited: &NsScope) -> bool {
    element.has_child_ns("Signature", XMLDSIG_NS, inherited)
}

/// Finds the single element carrying `ID="id"`, with the scope of its parent.
///
/// # Errors
///
/// Returns [`VerificationError::AmbiguousOrMissingReference`] unless exactly
/// one element matches.
pub fn find_unique_by_id<'a>(document: &'a Element, id: &str) -> Result<(&'a Element, NsScope), VerificationError> {
    let mut matches = Vec::new();
    collect_by_id(document, id, &mut NsScope::new(), &mut matches);
    if matches.len() == 1 {
        if let Some(found) = matches.pop() {
            return Ok(found);
        }
    }
    warn!(reference = id, matches = matches.len(), "reference does not resolve to exactly one element");
    Err(VerificationError::AmbiguousOrMissingReference {
        id: id.to_string(),
        matches: matches.len(),
    })
}

fn collect_by_id<'a>(
    element: &'a Element,
    id: &str,
    scope: &mut NsScope,
    matches: &mut Vec<(&'a Element, NsScope)>,
) {
    if element.id() == Some(id) {
        matches.push((element, scope.clone()));
    }
    scope.push(element);
    for child in element.child_elements() {
        collect_by_id(child, id, scope, matches);
    }
    scope.pop();
}

fn parse_raw(raw: &[u8]) -> Result<Element, VerificationError> {
    xml::parse(raw).map_err(|e| VerificationError::Malformed(format!("raw capture does not parse: {e}")))
}

fn decode_base64(value: &str, what: &str) -> Result<Vec<u8>, VerificationError> {
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| VerificationError::Malformed(format!("{what} is not base64: {e}")))
}
