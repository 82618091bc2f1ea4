//! Response parsers
//!
//! A parser turns the raw SOAP response envelope into the JSON value the
//! response template renders. Routes compiled from a WSDL get a
//! [`SchemaResponseParser`]; every other route falls back to the
//! [`GenericResponseParser`], which mirrors the XML structure and uses
//! live type hints when a WSDL location is known.

use crate::hints::{TypeHintSource, TypeHints};
use async_trait::async_trait;
use roxmltree::{Document, Node};
use serde_json::{Map, Value};
use soapgw_schema::{CompiledOperation, convert_scalar, exported_name};
use std::sync::Arc;
use tracing::warn;

/// Decodes a successful SOAP response into JSON
#[async_trait]
pub trait ResponseParser: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    async fn parse(&self, body: &str) -> Result<Value, String>;
}

/// Typed decoding driven by a compiled operation
pub struct SchemaResponseParser {
    compiled: Arc<CompiledOperation>,
}

impl SchemaResponseParser {
    pub fn new(compiled: Arc<CompiledOperation>) -> Self {
        Self { compiled }
    }

    pub fn operation(&self) -> &CompiledOperation {
        &self.compiled
    }
}

#[async_trait]
impl ResponseParser for SchemaResponseParser {
    fn name(&self) -> &str {
        &self.compiled.operation
    }

    async fn parse(&self, body: &str) -> Result<Value, String> {
        self.compiled.decode_response(body).map_err(|e| e.to_string())
    }
}

/// Structural decoding of any envelope.
///
/// The payload element's children become object fields under their
/// exported names. Repeated siblings become arrays, leaves become text
/// unless a type hint says otherwise, and attributes are kept as fields.
#[derive(Default)]
pub struct GenericResponseParser {
    hints: Option<(Arc<dyn TypeHintSource>, String)>,
}

impl GenericResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `source` to type leaf values from the WSDL at `wsdl_url`
    pub fn with_hints(source: Arc<dyn TypeHintSource>, wsdl_url: impl Into<String>) -> Self {
        Self {
            hints: Some((source, wsdl_url.into())),
        }
    }

    async fn load_hints(&self) -> Option<Arc<TypeHints>> {
        let (source, url) = self.hints.as_ref()?;
        match source.type_hints(url).await {
            Ok(hints) => Some(hints),
            Err(e) => {
                warn!(wsdl_url = %url, error = %e, "failed to get WSDL type info");
                None
            }
        }
    }
}

#[async_trait]
impl ResponseParser for GenericResponseParser {
    fn name(&self) -> &str {
        "generic"
    }

    async fn parse(&self, body: &str) -> Result<Value, String> {
        let hints = self.load_hints().await;
        decode_generic(body, hints.as_deref())
    }
}

fn decode_generic(body: &str, hints: Option<&TypeHints>) -> Result<Value, String> {
    let doc = Document::parse(body).map_err(|e| format!("invalid XML: {e}"))?;
    let root = doc.root_element();

    let payload = if root.tag_name().name() == "Envelope" {
        let body = elements(root)
            .find(|n| n.tag_name().name() == "Body")
            .ok_or("envelope has no Body")?;
        if elements(body).any(|n| n.tag_name().name() == "Fault") {
            return Err("response carries a SOAP fault".to_string());
        }
        match elements(body).next() {
            Some(payload) => payload,
            None => return Ok(Value::Object(Map::new())),
        }
    } else {
        root
    };

    Ok(match element_value(payload, hints)? {
        Value::Object(map) => Value::Object(map),
        leaf => {
            let mut map = Map::new();
            map.insert(exported_name(payload.tag_name().name()), leaf);
            Value::Object(map)
        }
    })
}

fn elements<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(Node::is_element)
}

fn element_value(node: Node<'_, '_>, hints: Option<&TypeHints>) -> Result<Value, String> {
    let has_children = elements(node).next().is_some();
    let has_attributes = node
        .attributes()
        .any(|a| a.namespace() != Some("http://www.w3.org/2001/XMLSchema-instance"));

    if !has_children && !has_attributes {
        return leaf_value(node, hints);
    }

    let mut map = Map::new();
    for attribute in node.attributes() {
        if attribute.namespace() == Some("http://www.w3.org/2001/XMLSchema-instance") {
            continue;
        }
        let key = exported_name(attribute.name());
        let value = typed(&key, attribute.value(), hints)?;
        map.insert(key, value);
    }

    for child in elements(node) {
        let key = exported_name(child.tag_name().name());
        let value = element_value(child, hints)?;
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }

    if !has_children {
        let text: String = node.children().filter_map(|n| n.text()).collect();
        if !text.trim().is_empty() {
            map.insert("Value".to_string(), Value::String(text));
        }
    }
    Ok(Value::Object(map))
}

fn leaf_value(node: Node<'_, '_>, hints: Option<&TypeHints>) -> Result<Value, String> {
    let nil = node
        .attribute(("http://www.w3.org/2001/XMLSchema-instance", "nil"))
        .is_some_and(|v| v == "true" || v == "1");
    if nil {
        return Ok(Value::Null);
    }
    let text: String = node.children().filter_map(|n| n.text()).collect();
    typed(&exported_name(node.tag_name().name()), &text, hints)
}

fn typed(key: &str, text: &str, hints: Option<&TypeHints>) -> Result<Value, String> {
    match hints.and_then(|h| h.get(key)) {
        Some(scalar) => convert_scalar(text, *scalar).map_err(|e| format!("field {key}: {e}")),
        None => Ok(Value::String(text.to_string())),
    }
}
