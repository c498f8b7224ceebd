//! Deterministic ordering of an element before it is signed.
//!
//! Every key of an element, whether it is metadata, tag name, namespace
//! declaration, attribute or child element, maps to one sort key. Sorting
//! by that tuple puts a container into the same shape on every run, which
//! is what canonicalization and signing depend on.

use super::element::{split_qname, Attribute, Element, Node};

/// Canonical order of the children of a SAML `Assertion`, by local name.
pub const ASSERTION_SEQUENCE: [&str; 9] = [
    "Issuer",
    "Signature",
    "Subject",
    "Conditions",
    "Advice",
    "Statement",
    "AuthnStatement",
    "AuthzDecisionStatement",
    "AttributeStatement",
];

/// The category of a key in the flattened element representation.
///
/// The names follow the JSON wire form: `__` marks metadata, `__t` the tag
/// name, `__v` the text, `_xmlns...` a namespace declaration and `_name` an
/// attribute. Anything else is a child element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKey<'a> {
    /// Private metadata, never part of the wire form.
    Private(&'a str),
    /// The element's tag name.
    TagName,
    /// The element's text content.
    Text,
    /// A namespace declaration, named like `xmlns:saml`.
    NamespaceDecl(&'a str),
    /// An attribute, named without the leading underscore.
    Attribute(&'a str),
    /// A child element, by qualified name.
    Element(&'a str),
}

impl<'a> NodeKey<'a> {
    /// Classifies a key of the flattened representation.
    #[must_use]
    pub fn classify(key: &'a str) -> Self {
        match key {
            "__t" => Self::TagName,
            "__v" => Self::Text,
            _ if key.starts_with("__") => Self::Private(key),
            _ => match key.strip_prefix('_') {
                Some(name) if name == "xmlns" || name.starts_with("xmlns:") => {
                    Self::NamespaceDecl(name)
                }
                Some(name) => Self::Attribute(name),
                None => Self::Element(key),
            },
        }
    }

    /// Returns the key as `(category rank, sequence position, name)`.
    ///
    /// Tuples compare lexicographically, so a whole container sorts in one
    /// pass: metadata, tag and text, namespace declarations, attributes,
    /// elements of [`ASSERTION_SEQUENCE`] in sequence order, then every other
    /// element by name.
    #[must_use]
    pub fn sort_key(&self) -> (u8, usize, &'a str) {
        match *self {
            Self::Private(name) => (0, 0, name),
            Self::TagName => (1, 0, "__t"),
            Self::Text => (1, 0, "__v"),
            Self::NamespaceDecl(name) => (2, 0, name),
            Self::Attribute(name) => (3, 0, name),
            Self::Element(name) => {
                let local = split_qname(name).1;
                match ASSERTION_SEQUENCE.iter().position(|s| *s == local) {
                    Some(index) => (4, index, ""),
                    None => (5, 0, name),
                }
            }
        }
    }
}

fn attribute_key(attr: &Attribute) -> NodeKey<'_> {
    if attr.name == "xmlns" || attr.name.starts_with("xmlns:") {
        NodeKey::NamespaceDecl(&attr.name)
    } else {
        NodeKey::Attribute(&attr.name)
    }
}

fn node_key(node: &Node) -> NodeKey<'_> {
    match node {
        Node::Element(e) => NodeKey::Element(&e.name),
        Node::Text(_) => NodeKey::Text,
    }
}

/// Puts the attributes and children of an assertion into canonical order.
///
/// Whitespace-only text between children is dropped. The sort is stable, so
/// repeated elements keep their relative order. Only direct children move.
pub fn order_assertion(element: &mut Element) {
    element
        .attributes
        .sort_by(|a, b| attribute_key(a).sort_key().cmp(&attribute_key(b).sort_key()));

    element
        .children
        .retain(|n| !matches!(n, Node::Text(t) if t.trim().is_empty()));
    element
        .children
        .sort_by(|a, b| node_key(a).sort_key().cmp(&node_key(b).sort_key()));
}
