//! XML Encryption of assertions.
//!
//! The only supported layout is an `EncryptedData` element carrying an
//! AES-128-CBC ciphertext (IV prefixed) and an `EncryptedKey` holding the
//! session key wrapped with RSA PKCS#1 v1.5.

use base64::Engine;
use tracing::debug;

use fp_crypto::{
    aes128_cbc_decrypt, aes128_cbc_encrypt, unwrap_session_key, wrap_session_key, CryptoError,
    PrivateKey, PublicKey, SessionKey,
};

use crate::error::{ProxyResult, VerificationError};
use crate::message::{xml, Element, Message, Node, NsScope};
use crate::types::{algorithms, XMLDSIG_NS, XMLENC_NS};

/// Encrypts and decrypts assertions.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptionEngine;

impl EncryptionEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Replaces an `EncryptedAssertion` of the message by its plaintext.
    ///
    /// The decrypted bytes are kept as the raw capture of the assertion, so
    /// its signature is verified against exactly what was decrypted. Returns
    /// false if the message has no encrypted assertion.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MultipleAssertions`] if the response
    /// carries another assertion beside the encrypted one,
    /// [`CryptoError::KeyUnwrapFailed`] if the session key cannot be
    /// unwrapped, [`CryptoError::InvalidPadding`] for a bad pad length and
    /// [`VerificationError::MissingElement`] for an incomplete structure.
    pub fn decrypt_assertion(&self, message: &mut Message, key: &PrivateKey) -> ProxyResult<bool> {
        message.ensure_single_assertion()?;
        let Some(position) = message.root.child_position("EncryptedAssertion") else {
            return Ok(false);
        };
        let plaintext = match &message.root.children[position] {
            Node::Element(encrypted) => decrypt_element(encrypted, key)?,
            Node::Text(_) => return Ok(false),
        };
        let assertion = xml::parse(&plaintext).map_err(|e| {
            CryptoError::InvalidCiphertext(format!("decrypted assertion does not parse: {e}"))
        })?;

        debug!(assertion = ?assertion.id(), "assertion decrypted");
        message.root.children[position] = Node::Element(assertion);
        message.meta.assertion_raw = Some(plaintext);
        Ok(true)
    }

    /// Encrypts an element for a peer.
    ///
    /// `inherited` holds the namespace bindings in scope at the element's
    /// position; they are declared on the serialized copy so that the
    /// plaintext parses on its own. Returns the `xenc:EncryptedData` element.
    ///
    /// # Errors
    ///
    /// Returns a [`CryptoError`] if key generation or encryption fails.
    pub fn encrypt_element(
        &self,
        element: &Element,
        inherited: &NsScope,
        peer: &PublicKey,
    ) -> ProxyResult<Element> {
        let plaintext = xml::to_xml(&standalone(element, inherited));
        let session_key = SessionKey::generate()?;
        let data = aes128_cbc_encrypt(&session_key, plaintext.as_bytes())?;
        let wrapped = wrap_session_key(peer, &session_key)?;
        let b64 = base64::engine::general_purpose::STANDARD;

        Ok(Element::new("xenc:EncryptedData")
            .with_attr("xmlns:xenc", XMLENC_NS)
            .with_attr("Type", algorithms::ENCRYPTED_ELEMENT_TYPE)
            .with_child(Element::new("xenc:EncryptionMethod").with_attr("Algorithm", algorithms::AES128_CBC))
            .with_child(
                Element::new("ds:KeyInfo").with_attr("xmlns:ds", XMLDSIG_NS).with_child(
                    Element::new("xenc:EncryptedKey")
                        .with_attr("Id", format!("_{}", uuid::Uuid::new_v4().simple()))
                        .with_child(
                            Element::new("xenc:EncryptionMethod").with_attr("Algorithm", algorithms::RSA_1_5),
                        )
                        .with_child(cipher_data(b64.encode(wrapped))),
                ),
            )
            .with_child(cipher_data(b64.encode(data))))
    }

    /// Replaces the `Assertion` of a message by an `EncryptedAssertion`.
    ///
    /// Returns false if the message has no plaintext assertion.
    ///
    /// # Errors
    ///
    /// See [`EncryptionEngine::encrypt_element`].
    pub fn encrypt_assertion(&self, message: &mut Message, peer: &PublicKey) -> ProxyResult<bool> {
        let Some(position) = message.root.child_position("Assertion") else {
            return Ok(false);
        };
        let scope = NsScope::within(&message.root);
        let encrypted = match &message.root.children[position] {
            Node::Element(assertion) => {
                let prefix = assertion.prefix().map_or_else(String::new, |p| format!("{p}:"));
                Element::new(format!("{prefix}EncryptedAssertion"))
                    .with_child(self.encrypt_element(assertion, &scope, peer)?)
            }
            Node::Text(_) => return Ok(false),
        };
        message.root.children[position] = Node::Element(encrypted);
        debug!("assertion encrypted for peer");
        Ok(true)
    }
}

fn decrypt_element(encrypted_assertion: &Element, key: &PrivateKey) -> ProxyResult<Vec<u8>> {
    let encrypted_data = encrypted_assertion
        .child("EncryptedData")
        .ok_or_else(|| missing("xenc:EncryptedData"))?;
    check_method(encrypted_data, algorithms::AES128_CBC)?;

    let encrypted_key = encrypted_data
        .path(&["KeyInfo", "EncryptedKey"])
        .or_else(|| encrypted_assertion.child("EncryptedKey"))
        .ok_or_else(|| missing("xenc:EncryptedKey"))?;
    check_method(encrypted_key, algorithms::RSA_1_5)?;

    let wrapped = cipher_value(encrypted_key)?;
    let data = cipher_value(encrypted_data)?;

    let session_key = unwrap_session_key(key, &wrapped)?;
    Ok(aes128_cbc_decrypt(&session_key, &data)?)
}

/// Checks the `EncryptionMethod` of an element, if it declares one.
fn check_method(element: &Element, expected: &str) -> Result<(), CryptoError> {
    match element.child("EncryptionMethod").and_then(|m| m.attr("Algorithm")) {
        Some(algorithm) if algorithm != expected => {
            Err(CryptoError::UnsupportedAlgorithm(algorithm.to_string()))
        }
        _ => Ok(()),
    }
}

fn cipher_value(element: &Element) -> ProxyResult<Vec<u8>> {
    let value = element
        .path(&["CipherData", "CipherValue"])
        .ok_or_else(|| missing(&format!("xenc:CipherValue of {}", element.name)))?;
    let compact: String = value.text().chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| CryptoError::InvalidCiphertext(format!("CipherValue is not base64: {e}")).into())
}

fn cipher_data(value: String) -> Element {
    Element::new("xenc:CipherData").with_child(Element::new("xenc:CipherValue").with_text(value))
}

/// Copies `element` with every inherited binding it lacks declared on it.
fn standalone(element: &Element, inherited: &NsScope) -> Element {
    let mut copy = element.clone();
    let declared: Vec<String> = element
        .namespace_declarations()
        .map(|(prefix, _)| prefix.to_string())
        .collect();
    for (prefix, uri) in inherited.visible() {
        if declared.iter().any(|p| p == prefix) || uri.is_empty() {
            continue;
        }
        let name = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{prefix}")
        };
        copy.set_attr(name, uri);
    }
    copy
}

fn missing(what: &str) -> VerificationError {
    VerificationError::MissingElement(what.to_string())
}
