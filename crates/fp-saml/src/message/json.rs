//! JSON codec for the element tree.
//!
//! An element is an object: `__t` holds the tag name, `__v` the text,
//! `_name` keys hold attributes and namespace declarations, and every other
//! key holds one child element (object) or several (array). Keys starting
//! with `__` other than those two are metadata and are ignored on input.

use serde_json::{Map, Value};

use crate::error::TransportError;

use super::element::{Attribute, Element, Node};
use super::ordering::NodeKey;

/// Decodes a JSON message into its root element.
///
/// # Errors
///
/// Returns [`TransportError::MalformedPayload`] if the input is not an object
/// with a `__t` tag name.
pub fn parse(bytes: &[u8]) -> Result<Element, TransportError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| TransportError::MalformedPayload(format!("invalid JSON message: {e}")))?;
    match value {
        Value::Object(map) => element_from_object(None, &map),
        _ => Err(TransportError::MalformedPayload(
            "JSON message must be an object".to_string(),
        )),
    }
}

/// Encodes an element as a JSON value.
#[must_use]
pub fn to_value(element: &Element) -> Value {
    let mut map = Map::new();
    map.insert("__t".to_string(), Value::String(element.name.clone()));
    for attr in &element.attributes {
        map.insert(format!("_{}", attr.name), Value::String(attr.value.clone()));
    }

    let has_elements = element.child_elements().next().is_some();
    let text = element.text();
    if !text.is_empty() && !(has_elements && text.trim().is_empty()) {
        map.insert("__v".to_string(), Value::String(text));
    }

    let mut groups: Vec<(&str, Vec<Value>)> = Vec::new();
    for child in element.child_elements() {
        let value = to_value(child);
        match groups.iter_mut().find(|(name, _)| *name == child.name) {
            Some((_, values)) => values.push(value),
            None => groups.push((&child.name, vec![value])),
        }
    }
    for (name, mut values) in groups {
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        map.insert(name.to_string(), value);
    }

    Value::Object(map)
}

/// Encodes an element as a JSON string.
#[must_use]
pub fn to_json(element: &Element) -> String {
    to_value(element).to_string()
}

fn element_from_object(name: Option<&str>, map: &Map<String, Value>) -> Result<Element, TransportError> {
    let name = match map.get("__t") {
        Some(Value::String(tag)) => tag.as_str(),
        Some(_) => {
            return Err(TransportError::MalformedPayload(
                "'__t' must be a string".to_string(),
            ))
        }
        None => name.ok_or_else(|| {
            TransportError::MalformedPayload("JSON message has no '__t' tag name".to_string())
        })?,
    };
    let mut element = Element::new(name);

    for (key, value) in map {
        match NodeKey::classify(key) {
            NodeKey::Private(_) | NodeKey::TagName => {}
            NodeKey::Text => {
                if let Some(text) = scalar(value) {
                    element.children.push(Node::Text(text));
                }
            }
            NodeKey::NamespaceDecl(attr) | NodeKey::Attribute(attr) => {
                let value = scalar(value).ok_or_else(|| {
                    TransportError::MalformedPayload(format!("attribute '{attr}' must be a scalar"))
                })?;
                element.attributes.push(Attribute {
                    name: attr.to_string(),
                    value,
                });
            }
            NodeKey::Element(child) => match value {
                Value::Array(items) => {
                    for item in items {
                        element.children.push(Node::Element(child_from_value(child, item)?));
                    }
                }
                Value::Null => {}
                other => element.children.push(Node::Element(child_from_value(child, other)?)),
            },
        }
    }

    Ok(element)
}

fn child_from_value(name: &str, value: &Value) -> Result<Element, TransportError> {
    match value {
        Value::Object(map) => element_from_object(Some(name), map),
        other => {
            let text = scalar(other).ok_or_else(|| {
                TransportError::MalformedPayload(format!("unexpected value for '{name}'"))
            })?;
            Ok(Element::new(name).with_text(text))
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
