//! SOAP fault classification

use roxmltree::{Document, Node};
use serde::Serialize;
use std::fmt;

/// A fault returned by the upstream SOAP service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoapFault {
    pub code: String,
    pub string: String,
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string)
    }
}

/// Extract `Envelope/Body/Fault` from a response body.
///
/// Understands SOAP 1.1 (`faultcode`/`faultstring`) and SOAP 1.2
/// (`Code/Value`/`Reason/Text`). Returns `None` when the body is not XML or
/// carries no fault.
pub fn parse_fault(body: &str) -> Option<SoapFault> {
    let doc = Document::parse(body).ok()?;
    let envelope = doc.root_element();
    if envelope.tag_name().name() != "Envelope" {
        return None;
    }
    let body = child(envelope, "Body")?;
    let fault = child(body, "Fault")?;

    let code = child(fault, "faultcode")
        .map(text_of)
        .or_else(|| child(fault, "Code").and_then(|c| child(c, "Value")).map(text_of))
        .unwrap_or_default();
    let string = child(fault, "faultstring")
        .map(text_of)
        .or_else(|| child(fault, "Reason").and_then(|r| child(r, "Text")).map(text_of))
        .unwrap_or_default();

    Some(SoapFault { code, string })
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn text_of(node: Node<'_, '_>) -> String {
    node.text().unwrap_or_default().trim().to_string()
}
