//! The element tree shared by every stage of the engine.
//!
//! Names are kept exactly as they appear on the wire (`saml:Issuer`), and
//! namespace declarations are ordinary attributes (`xmlns:saml`). Namespace
//! resolution is done on demand through [`NsScope`].

use crate::types::XML_NS;

/// An attribute, including namespace declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name as written, e.g. `ID` or `xmlns:ds`.
    pub name: String,
    /// Unescaped value.
    pub value: String,
}

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A nested element.
    Element(Element),
    /// Character data, unescaped.
    Text(String),
}

/// An XML element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Qualified name as written.
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<Attribute>,
    /// Children in document order.
    pub children: Vec<Node>,
}

/// Splits a qualified name into prefix and local part.
#[must_use]
pub fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

impl Element {
    /// Creates an empty element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an attribute, builder style.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Appends a child element, builder style.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Appends a text node, builder style.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Returns the prefix of the element name, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    /// Returns the local part of the element name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Returns an attribute value by qualified name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Sets an attribute, replacing an existing one in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }

    /// Removes an attribute and returns its value.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(pos).value)
    }

    /// Returns the `ID` attribute.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attr("ID")
    }

    /// Concatenates the direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Iterates over child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Returns the first child element with the given local name.
    #[must_use]
    pub fn child(&self, local: &str) -> Option<&Self> {
        self.child_elements().find(|e| e.local_name() == local)
    }

    /// Mutable variant of [`Element::child`].
    pub fn child_mut(&mut self, local: &str) -> Option<&mut Self> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.local_name() == local => Some(e),
            _ => None,
        })
    }

    /// Returns every child element with the given local name.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.child_elements().filter(move |e| e.local_name() == local)
    }

    /// Follows a path of local names through first matching children.
    #[must_use]
    pub fn path(&self, locals: &[&str]) -> Option<&Self> {
        locals.iter().try_fold(self, |el, local| el.child(local))
    }

    /// Returns the position in `children` of the first element with this local name.
    #[must_use]
    pub fn child_position(&self, local: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.local_name() == local))
    }

    /// Removes every child element with the given local name, returning how many.
    pub fn remove_children(&mut self, local: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|n| !matches!(n, Node::Element(e) if e.local_name() == local));
        before - self.children.len()
    }

    /// Removes every child element with the given local name in namespace
    /// `ns`, returning how many.
    ///
    /// `inherited` holds the bindings in scope at this element's parent.
    pub fn remove_children_ns(&mut self, local: &str, ns: &str, inherited: &NsScope) -> usize {
        let mut scope = inherited.clone();
        scope.push(self);
        let before = self.children.len();
        self.children.retain(|n| {
            !matches!(n, Node::Element(e) if e.local_name() == local && scope.element_namespace(e) == Some(ns))
        });
        before - self.children.len()
    }

    /// Iterates over the namespace declarations as `(prefix, uri)`.
    ///
    /// The default namespace has the empty prefix.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|a| {
            if a.name == "xmlns" {
                Some(("", a.value.as_str()))
            } else {
                a.name
                    .strip_prefix("xmlns:")
                    .map(|prefix| (prefix, a.value.as_str()))
            }
        })
    }

    /// Returns true if the element has a direct child in the given namespace.
    #[must_use]
    pub fn has_child_ns(&self, local: &str, ns: &str, inherited: &NsScope) -> bool {
        let mut scope = inherited.clone();
        scope.push(self);
        self.child_elements()
            .any(|c| c.local_name() == local && scope.element_namespace(c) == Some(ns))
    }
}

/// Namespace bindings in scope at some point of a document.
///
/// Pushing an element adds its declarations, popping removes them again.
/// Cloning yields a snapshot that can be carried alongside a sub-tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NsScope {
    bindings: Vec<(String, String)>,
    marks: Vec<usize>,
}

impl NsScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the scope seen by the children of `element`, assuming it is a root.
    #[must_use]
    pub fn within(element: &Element) -> Self {
        let mut scope = Self::new();
        scope.push(element);
        scope
    }

    /// Enters an element.
    pub fn push(&mut self, element: &Element) {
        self.marks.push(self.bindings.len());
        for (prefix, uri) in element.namespace_declarations() {
            self.bindings.push((prefix.to_string(), uri.to_string()));
        }
    }

    /// Leaves the most recently entered element.
    pub fn pop(&mut self) {
        if let Some(mark) = self.marks.pop() {
            self.bindings.truncate(mark);
        }
    }

    /// Returns the raw binding of a prefix, where `""` is the default namespace.
    ///
    /// An undeclared default namespace (`xmlns=""`) yields `Some("")`.
    #[must_use]
    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Returns the namespace URI of an element name.
    ///
    /// Declarations on the element itself take precedence over the scope.
    #[must_use]
    pub fn element_namespace<'a>(&'a self, element: &'a Element) -> Option<&'a str> {
        let prefix = element.prefix().unwrap_or("");
        element
            .namespace_declarations()
            .find(|(p, _)| *p == prefix)
            .map(|(_, uri)| uri)
            .or_else(|| self.lookup(prefix))
            .filter(|uri| !uri.is_empty())
    }

    /// Returns every binding visible in this scope, innermost first, once per prefix.
    #[must_use]
    pub fn visible(&self) -> Vec<(&str, &str)> {
        let mut seen: Vec<(&str, &str)> = Vec::new();
        for (prefix, uri) in self.bindings.iter().rev() {
            if !seen.iter().any(|(p, _)| p == prefix) {
                seen.push((prefix.as_str(), uri.as_str()));
            }
        }
        seen
    }
}
