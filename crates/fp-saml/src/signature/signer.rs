//! XML signature creation.
//!
//! Produces an enveloped RSA-SHA1 signature with a single reference to the
//! signed element's `ID`, inserted right after its `Issuer`.

use base64::Engine;
use tracing::debug;

use fp_crypto::{rsa_sha1_sign, sha1, CryptoError, PrivateKey};

use crate::error::ProxyResult;
use crate::message::{Element, Node, NsScope};
use crate::types::{algorithms, XMLDSIG_NS};

use super::c14n::canonicalize;

/// Signs elements with the private key of a hosted entity.
pub struct XmlSigner<'a> {
    key: &'a PrivateKey,
}

impl<'a> XmlSigner<'a> {
    /// Creates a signer.
    #[must_use]
    pub fn new(key: &'a PrivateKey) -> Self {
        Self { key }
    }

    /// Signs `element` in place.
    ///
    /// # Arguments
    ///
    /// * `element` - The element to sign; it must carry an `ID`
    /// * `inherited` - Namespace bindings in scope at the element's parent
    ///
    /// Any existing `ds:Signature` child is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningFailed`] if the element has no `ID` or
    /// the RSA operation fails.
    pub fn sign(&self, element: &mut Element, inherited: &NsScope) -> ProxyResult<()> {
        let id = element
            .id()
            .ok_or_else(|| CryptoError::SigningFailed(format!("<{}> has no ID to reference", element.name)))?
            .to_string();

        element.remove_children_ns("Signature", XMLDSIG_NS, inherited);
        let digest = sha1(canonicalize(element, inherited, &[]).as_bytes());

        let mut signature = Element::new("ds:Signature")
            .with_attr("xmlns:ds", XMLDSIG_NS)
            .with_child(signed_info(&id, &digest));

        let mut scope = inherited.clone();
        scope.push(element);
        scope.push(&signature);
        let canonical_signed_info = signature
            .child("SignedInfo")
            .map(|info| canonicalize(info, &scope, &[]))
            .unwrap_or_default();
        let value = rsa_sha1_sign(self.key, canonical_signed_info.as_bytes())?;
        signature = signature.with_child(
            Element::new("ds:SignatureValue")
                .with_text(base64::engine::general_purpose::STANDARD.encode(value)),
        );

        insert_after_issuer(element, signature);
        debug!(reference = %id, element = %element.name, "element signed");
        Ok(())
    }
}

fn signed_info(id: &str, digest: &[u8]) -> Element {
    Element::new("ds:SignedInfo")
        .with_attr("xmlns:ds", XMLDSIG_NS)
        .with_child(Element::new("ds:CanonicalizationMethod").with_attr("Algorithm", algorithms::EXC_C14N))
        .with_child(Element::new("ds:SignatureMethod").with_attr("Algorithm", algorithms::RSA_SHA1))
        .with_child(
            Element::new("ds:Reference")
                .with_attr("URI", format!("#{id}"))
                .with_child(
                    Element::new("ds:Transforms")
                        .with_child(
                            Element::new("ds:Transform")
                                .with_attr("Algorithm", algorithms::ENVELOPED_SIGNATURE),
                        )
                        .with_child(Element::new("ds:Transform").with_attr("Algorithm", algorithms::EXC_C14N)),
                )
                .with_child(Element::new("ds:DigestMethod").with_attr("Algorithm", algorithms::SHA1))
                .with_child(
                    Element::new("ds:DigestValue")
                        .with_text(base64::engine::general_purpose::STANDARD.encode(digest)),
                ),
        )
}

/// Inserts `signature` right after the `Issuer` child, or first if there is none.
fn insert_after_issuer(element: &mut Element, signature: Element) {
    let position = element
        .child_position("Issuer")
        .map_or(0, |issuer| issuer + 1);
    element.children.insert(position, Node::Element(signature));
}
