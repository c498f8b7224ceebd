//! XML codec for the element tree.
//!
//! Parsing keeps elements, attributes and character data. Comments and
//! processing instructions are dropped. A document type declaration is
//! rejected outright, so no entity other than the predefined ones and
//! character references can ever be expanded.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::TransportError;

use super::element::{Attribute, Element, Node};

/// Parses a UTF-8 XML document into its root element.
///
/// # Errors
///
/// Returns [`TransportError::MalformedPayload`] for anything that is not a
/// single well-formed root element.
pub fn parse(bytes: &[u8]) -> Result<Element, TransportError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| malformed(format!("payload is not UTF-8: {e}")))?;
    parse_str(text)
}

/// Parses an XML document held in a string.
///
/// # Errors
///
/// See [`parse`].
pub fn parse_str(text: &str) -> Result<Element, TransportError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let normalized = normalize_line_endings(text);

    let mut reader = Reader::from_str(&normalized);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                ensure_single_root(&root)?;
                stack.push(start_element(&start)?);
            }
            Ok(Event::Empty(start)) => {
                ensure_single_root(&root)?;
                let element = start_element(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| malformed(format!("invalid character data: {e}")))?;
                push_text(&mut stack, value)?;
            }
            Ok(Event::CData(cdata)) => {
                let raw = cdata.into_inner();
                let value = std::str::from_utf8(&raw)
                    .map_err(|e| malformed(format!("invalid CDATA section: {e}")))?
                    .to_string();
                push_text(&mut stack, Cow::Owned(value))?;
            }
            Ok(Event::DocType(_)) => {
                return Err(malformed("document type declarations are not accepted".to_string()));
            }
            Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(malformed(format!(
                    "at position {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }

    if !stack.is_empty() {
        return Err(malformed("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| malformed("document has no root element".to_string()))
}

/// Serializes an element as XML.
#[must_use]
pub fn to_xml(element: &Element) -> String {
    let mut out = String::new();
    write_element(&mut out, element);
    out
}

/// Serializes an element with indentation, for human inspection only.
#[must_use]
pub fn to_pretty_xml(element: &Element) -> String {
    let mut out = String::new();
    write_pretty(&mut out, element, 0);
    out
}

fn malformed(reason: String) -> TransportError {
    TransportError::MalformedPayload(reason)
}

fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

fn ensure_single_root(root: &Option<Element>) -> Result<(), TransportError> {
    if root.is_some() {
        return Err(malformed("document has more than one root element".to_string()));
    }
    Ok(())
}

fn start_element(start: &BytesStart<'_>) -> Result<Element, TransportError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| malformed(format!("invalid element name: {e}")))?
        .to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(format!("invalid attribute in <{name}>: {e}")))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| malformed(format!("invalid attribute name: {e}")))?
            .to_string();
        let raw = std::str::from_utf8(&attr.value)
            .map_err(|e| malformed(format!("invalid attribute value: {e}")))?;
        // literal whitespace is normalized before references are expanded
        let spaced = raw.replace(['\t', '\n', '\r'], " ");
        let value = quick_xml::escape::unescape(&spaced)
            .map_err(|e| malformed(format!("invalid attribute value for '{key}': {e}")))?
            .into_owned();
        attributes.push(Attribute { name: key, value });
    }

    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn push_text(stack: &mut [Element], text: Cow<'_, str>) -> Result<(), TransportError> {
    let Some(parent) = stack.last_mut() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(malformed("character data outside the root element".to_string()));
    };
    if text.is_empty() {
        return Ok(());
    }
    if let Some(Node::Text(previous)) = parent.children.last_mut() {
        previous.push_str(&text);
    } else {
        parent.children.push(Node::Text(text.into_owned()));
    }
    Ok(())
}

fn write_element(out: &mut String, element: &Element) {
    write_start(out, element);
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(out, e),
            Node::Text(t) => escape_text_into(out, t),
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn write_pretty(out: &mut String, element: &Element, depth: usize) {
    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    write_start(out, element);

    let has_elements = element.child_elements().next().is_some();
    if element.children.is_empty() {
        out.push_str("/>\n");
    } else if has_elements {
        out.push_str(">\n");
        for child in &element.children {
            match child {
                Node::Element(e) => write_pretty(out, e, depth + 1),
                Node::Text(t) if t.trim().is_empty() => {}
                Node::Text(t) => {
                    out.push_str(&indent);
                    out.push_str("  ");
                    escape_text_into(out, t.trim());
                    out.push('\n');
                }
            }
        }
        out.push_str(&indent);
        out.push_str("</");
        out.push_str(&element.name);
        out.push_str(">\n");
    } else {
        out.push('>');
        escape_text_into(out, &element.text());
        out.push_str("</");
        out.push_str(&element.name);
        out.push_str(">\n");
    }
}

fn write_start(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.name);
    for attr in &element.attributes {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        escape_attr_into(out, &attr.value);
        out.push('"');
    }
}

fn escape_text_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
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
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}
