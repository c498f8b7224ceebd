//! Exclusive XML canonicalization (without comments).
//!
//! Works on a sub-tree together with the namespace bindings in scope at its
//! parent. Only visibly utilized namespaces, plus the prefixes named in an
//! `InclusiveNamespaces` prefix list, are rendered, and only where the
//! nearest output ancestor did not already render the same binding.

use std::collections::BTreeSet;

use crate::message::{split_qname, Element, Node, NsScope};

/// Canonicalizes `element` as the apex of a document subset.
///
/// `inherited` holds the bindings in scope at the element's parent in the
/// original document. `inclusive_prefixes` is the `PrefixList` of the
/// transform, where `#default` stands for the default namespace.
#[must_use]
pub fn canonicalize(element: &Element, inherited: &NsScope, inclusive_prefixes: &[String]) -> String {
    let inclusive: Vec<&str> = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { "" } else { p.as_str() })
        .collect();
    let mut writer = Writer {
        out: String::new(),
        scope: inherited.clone(),
        rendered: Vec::new(),
        inclusive,
    };
    writer.element(element);
    writer.out
}

/// Splits a `PrefixList` attribute value.
#[must_use]
pub fn parse_prefix_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

struct Writer<'a> {
    out: String,
    scope: NsScope,
    /// Declarations rendered by each open output ancestor.
    rendered: Vec<Vec<(String, String)>>,
    inclusive: Vec<&'a str>,
}

impl Writer<'_> {
    fn element(&mut self, element: &Element) {
        self.scope.push(element);

        let mut prefixes: BTreeSet<&str> = BTreeSet::new();
        prefixes.insert(element.prefix().unwrap_or(""));
        for attr in &element.attributes {
            if is_namespace_decl(&attr.name) {
                continue;
            }
            if let (Some(prefix), _) = split_qname(&attr.name) {
                if prefix != "xml" {
                    prefixes.insert(prefix);
                }
            }
        }
        prefixes.extend(self.inclusive.iter().copied());

        let mut frame = Vec::new();
        for prefix in prefixes {
            let Some(uri) = self.scope.lookup(prefix).map(str::to_string).or_else(|| {
                // an undeclared default namespace is the empty namespace
                prefix.is_empty().then(String::new)
            }) else {
                continue;
            };
            if prefix == "xml" {
                continue;
            }
            let ancestor = self.rendered_value(prefix).unwrap_or("");
            if prefix.is_empty() {
                if uri != ancestor {
                    frame.push((String::new(), uri));
                }
            } else if self.rendered_value(prefix) != Some(uri.as_str()) {
                frame.push((prefix.to_string(), uri));
            }
        }

        let mut attributes: Vec<(&str, &str, &str, &str)> = element
            .attributes
            .iter()
            .filter(|a| !is_namespace_decl(&a.name))
            .map(|a| {
                let (prefix, local) = split_qname(&a.name);
                let ns = prefix.and_then(|p| self.scope.lookup(p)).unwrap_or("");
                (ns, local, a.name.as_str(), a.value.as_str())
            })
            .collect();
        attributes.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        self.out.push('<');
        self.out.push_str(&element.name);
        for (prefix, uri) in &frame {
            if prefix.is_empty() {
                self.out.push_str(" xmlns=\"");
            } else {
                self.out.push_str(" xmlns:");
                self.out.push_str(prefix);
                self.out.push_str("=\"");
            }
            escape_attr_into(&mut self.out, uri);
            self.out.push('"');
        }
        for (_, _, name, value) in attributes {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            escape_attr_into(&mut self.out, value);
            self.out.push('"');
        }
        self.out.push('>');

        self.rendered.push(frame);
        for child in &element.children {
            match child {
                Node::Element(e) => self.element(e),
                Node::Text(t) => escape_text_into(&mut self.out, t),
            }
        }
        self.rendered.pop();

        self.out.push_str("</");
        self.out.push_str(&element.name);
        self.out.push('>');

        self.scope.pop();
    }

    fn rendered_value(&self, prefix: &str) -> Option<&str> {
        self.rendered
            .iter()
            .rev()
            .flat_map(|frame| frame.iter())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

fn is_namespace_decl(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

fn escape_text_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
