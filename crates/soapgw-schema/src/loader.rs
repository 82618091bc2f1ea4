//! WSDL loader
//!
//! Reads a WSDL 1.1 document from an `http(s)` URL or a local path and parses
//! it into a [`WsdlDocument`].

use crate::model::{
    Attribute, BindingOperation, ComplexType, Element, Import, Message, Operation, Part,
    SchemaDoc, ServiceEndpoint, SimpleContent, SimpleType, WsdlDocument,
};
use crate::{Error, Result, local_name};
use roxmltree::{Document, Node};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace};

/// Default timeout for fetching a remote WSDL
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Loads WSDL documents from URLs or files
#[derive(Debug, Clone)]
pub struct WsdlLoader {
    client: reqwest::Client,
    timeout: Duration,
}

impl WsdlLoader {
    /// Create a loader with the default fetch timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a loader with a custom fetch timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Load and parse a WSDL from a URL or local path
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on fetch failure or non-success status,
    /// [`Error::Io`] when a local file cannot be read, and [`Error::Parse`]
    /// when the document is malformed.
    pub async fn load(&self, location: &str) -> Result<WsdlDocument> {
        let xml = self.fetch(location).await?;
        Self::parse_str(&xml)
    }

    /// Read the raw WSDL text
    pub async fn fetch(&self, location: &str) -> Result<String> {
        if location.starts_with("http://") || location.starts_with("https://") {
            debug!(location, "fetching WSDL");
            let response = self
                .client
                .get(location)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| Error::Transport(format!("failed to fetch {location}: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::Transport(format!(
                    "failed to fetch {location}: status {}",
                    status.as_u16()
                )));
            }

            response
                .text()
                .await
                .map_err(|e| Error::Transport(format!("failed to read {location}: {e}")))
        } else {
            let path = location.strip_prefix("file://").unwrap_or(location);
            trace!(path, "reading WSDL from file");
            Ok(tokio::fs::read_to_string(Path::new(path)).await?)
        }
    }

    /// Load and parse a WSDL from a local file
    pub fn load_file(path: &Path) -> Result<WsdlDocument> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Parse WSDL text
    pub fn parse_str(xml: &str) -> Result<WsdlDocument> {
        let doc = Document::parse(xml).map_err(|e| Error::Parse(e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "definitions" {
            return Err(Error::Parse(format!(
                "expected <definitions> root, found <{}>",
                root.tag_name().name()
            )));
        }

        let mut wsdl = WsdlDocument {
            target_namespace: root.attribute("targetNamespace").map(str::to_string),
            ..WsdlDocument::default()
        };

        for child in root.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "types" => {
                    for schema in child
                        .children()
                        .filter(|n| n.is_element() && n.tag_name().name() == "schema")
                    {
                        wsdl.schemas.push(parse_schema(schema));
                    }
                }
                "message" => {
                    let message = parse_message(child);
                    wsdl.messages.insert(message.name.clone(), message);
                }
                "portType" => {
                    for op in elements_named(child, "operation") {
                        let operation = parse_operation(op);
                        wsdl.operations.insert(operation.name.clone(), operation);
                    }
                }
                "binding" => {
                    for op in elements_named(child, "operation") {
                        let binding = parse_binding_operation(op);
                        // SOAP 1.1 and 1.2 bindings usually repeat the same action
                        let existing = wsdl.bindings.get(&binding.name);
                        if existing.is_none_or(|b| b.soap_action.is_none()) {
                            wsdl.bindings.insert(binding.name.clone(), binding);
                        }
                    }
                }
                "service" => {
                    let service = attr(child, "name");
                    for port in elements_named(child, "port") {
                        if let Some(address) = elements_named(port, "address")
                            .find_map(|a| a.attribute("location"))
                        {
                            wsdl.endpoints.push(ServiceEndpoint {
                                service: service.clone(),
                                port: attr(port, "name"),
                                address: address.to_string(),
                            });
                        }
                    }
                }
                other => trace!(tag = other, "skipping WSDL section"),
            }
        }

        debug!(
            operations = wsdl.operations.len(),
            messages = wsdl.messages.len(),
            schemas = wsdl.schemas.len(),
            "parsed WSDL"
        );
        Ok(wsdl)
    }
}

impl Default for WsdlLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn elements_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn attr(node: Node<'_, '_>, name: &str) -> String {
    node.attribute(name).unwrap_or_default().to_string()
}

fn local_attr(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name).map(|v| local_name(v).to_string())
}

fn parse_message(node: Node<'_, '_>) -> Message {
    Message {
        name: attr(node, "name"),
        parts: elements_named(node, "part")
            .map(|p| Part {
                name: attr(p, "name"),
                element: local_attr(p, "element"),
                type_ref: local_attr(p, "type"),
            })
            .collect(),
    }
}

fn parse_operation(node: Node<'_, '_>) -> Operation {
    Operation {
        name: attr(node, "name"),
        input: elements_named(node, "input").find_map(|n| local_attr(n, "message")),
        output: elements_named(node, "output").find_map(|n| local_attr(n, "message")),
    }
}

fn parse_binding_operation(node: Node<'_, '_>) -> BindingOperation {
    BindingOperation {
        name: attr(node, "name"),
        soap_action: elements_named(node, "operation")
            .find_map(|n| n.attribute("soapAction"))
            .filter(|a| !a.is_empty())
            .map(str::to_string),
    }
}

fn parse_schema(node: Node<'_, '_>) -> SchemaDoc {
    let mut schema = SchemaDoc {
        target_namespace: node.attribute("targetNamespace").map(str::to_string),
        ..SchemaDoc::default()
    };

    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "complexType" => schema
                .complex_types
                .push(parse_complex_type(child, attr(child, "name"))),
            "simpleType" => schema.simple_types.push(parse_simple_type(child)),
            "element" => schema.elements.push(parse_element(child, false)),
            "import" | "include" => schema.imports.push(Import {
                namespace: child.attribute("namespace").map(str::to_string),
                schema_location: child.attribute("schemaLocation").map(str::to_string),
            }),
            _ => {}
        }
    }
    schema
}

fn parse_complex_type(node: Node<'_, '_>, name: String) -> ComplexType {
    let mut ct = ComplexType {
        name,
        ..ComplexType::default()
    };
    collect_content(node, &mut ct);
    ct
}

/// Gather particles and attributes of a complex type body.
fn collect_content(node: Node<'_, '_>, ct: &mut ComplexType) {
    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "sequence" | "all" | "choice" => collect_particles(child, &mut ct.elements, false, false),
            "attribute" => ct.attributes.extend(parse_attribute(child)),
            "simpleContent" => {
                if let Some(ext) = child
                    .children()
                    .find(|n| n.is_element() && matches!(n.tag_name().name(), "extension" | "restriction"))
                {
                    ct.simple_content = Some(SimpleContent {
                        base: local_attr(ext, "base").unwrap_or_else(|| "string".to_string()),
                        attributes: elements_named(ext, "attribute")
                            .filter_map(parse_attribute)
                            .collect(),
                    });
                }
            }
            "complexContent" => {
                if let Some(ext) = elements_named(child, "extension").next() {
                    ct.base = local_attr(ext, "base");
                    collect_content(ext, ct);
                } else if let Some(restriction) = elements_named(child, "restriction").next() {
                    collect_content(restriction, ct);
                }
            }
            _ => {}
        }
    }
}

fn collect_particles(
    node: Node<'_, '_>,
    out: &mut Vec<Element>,
    optional: bool,
    repeated: bool,
) {
    let compositor_optional = optional || node.tag_name().name() == "choice";
    let compositor_repeated = repeated
        || matches!(node.attribute("maxOccurs"), Some(max) if max != "1");

    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "element" => {
                let mut el = parse_element(child, compositor_optional);
                if compositor_repeated && !el.is_repeated() {
                    el.max_occurs = Some("unbounded".to_string());
                }
                out.push(el);
            }
            "sequence" | "all" | "choice" => {
                collect_particles(child, out, compositor_optional, compositor_repeated);
            }
            _ => {}
        }
    }
}

fn parse_element(node: Node<'_, '_>, optional: bool) -> Element {
    let reference = local_attr(node, "ref");
    let name = node
        .attribute("name")
        .map(str::to_string)
        .or_else(|| reference.clone())
        .unwrap_or_default();

    let mut type_ref = local_attr(node, "type");
    let mut inline = None;
    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "complexType" => inline = Some(Box::new(parse_complex_type(child, name.clone()))),
            "simpleType" => {
                if type_ref.is_none() {
                    type_ref = parse_simple_type(child).base;
                }
            }
            _ => {}
        }
    }

    let min_occurs = node
        .attribute("minOccurs")
        .map(str::to_string)
        .or_else(|| optional.then(|| "0".to_string()));

    Element {
        name,
        type_ref,
        reference,
        inline,
        min_occurs,
        max_occurs: node.attribute("maxOccurs").map(str::to_string),
    }
}

fn parse_attribute(node: Node<'_, '_>) -> Option<Attribute> {
    let name = node
        .attribute("name")
        .map(str::to_string)
        .or_else(|| local_attr(node, "ref"))?;
    Some(Attribute {
        name,
        type_ref: local_attr(node, "type"),
    })
}

fn parse_simple_type(node: Node<'_, '_>) -> SimpleType {
    let restriction = elements_named(node, "restriction").next();
    SimpleType {
        name: attr(node, "name"),
        base: restriction.and_then(|r| local_attr(r, "base")),
        enumerations: restriction
            .map(|r| {
                elements_named(r, "enumeration")
                    .filter_map(|e| e.attribute("value").map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0"?>
<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/"
    xmlns:s="http://www.w3.org/2001/XMLSchema"
    xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
    xmlns:tns="urn:test" targetNamespace="urn:test">
  <wsdl:types>
    <s:schema targetNamespace="urn:test">
      <s:element name="Lookup">
        <s:complexType><s:sequence>
          <s:element name="code" type="s:string" minOccurs="0"/>
        </s:sequence></s:complexType>
      </s:element>
      <s:element name="LookupResponse">
        <s:complexType><s:sequence>
          <s:element name="Item" type="tns:Item" maxOccurs="unbounded"/>
        </s:sequence></s:complexType>
      </s:element>
      <s:complexType name="Item">
        <s:choice>
          <s:element name="label" type="s:string"/>
          <s:element name="count" type="s:int"/>
        </s:choice>
        <s:attribute name="id" type="s:int"/>
      </s:complexType>
      <s:simpleType name="Colour">
        <s:restriction base="s:string">
          <s:enumeration value="red"/>
          <s:enumeration value="blue"/>
        </s:restriction>
      </s:simpleType>
    </s:schema>
  </wsdl:types>
  <wsdl:message name="LookupIn"><wsdl:part name="parameters" element="tns:Lookup"/></wsdl:message>
  <wsdl:message name="LookupOut"><wsdl:part name="parameters" element="tns:LookupResponse"/></wsdl:message>
  <wsdl:portType name="TestPort">
    <wsdl:operation name="Lookup">
      <wsdl:input message="tns:LookupIn"/>
      <wsdl:output message="tns:LookupOut"/>
    </wsdl:operation>
  </wsdl:portType>
  <wsdl:binding name="TestBinding" type="tns:TestPort">
    <wsdl:operation name="Lookup">
      <soap:operation soapAction="urn:test/Lookup"/>
    </wsdl:operation>
  </wsdl:binding>
  <wsdl:service name="TestService">
    <wsdl:port name="TestPort" binding="tns:TestBinding">
      <soap:address location="http://localhost/test"/>
    </wsdl:port>
  </wsdl:service>
</wsdl:definitions>"#;

    #[test]
    fn test_parse_sections() {
        let doc = WsdlLoader::parse_str(MINIMAL).unwrap();
        assert_eq!(doc.target_namespace.as_deref(), Some("urn:test"));
        assert_eq!(doc.schemas.len(), 1);
        assert_eq!(doc.messages.len(), 2);
        let op = &doc.operations["Lookup"];
        assert_eq!(op.input.as_deref(), Some("LookupIn"));
        assert_eq!(op.output.as_deref(), Some("LookupOut"));
        assert_eq!(doc.soap_action("Lookup"), Some("urn:test/Lookup"));
        assert_eq!(doc.endpoints[0].address, "http://localhost/test");
    }

    #[test]
    fn test_parse_schema_particles_and_attributes() {
        let doc = WsdlLoader::parse_str(MINIMAL).unwrap();
        let schema = &doc.schemas[0];
        let item = schema
            .complex_types
            .iter()
            .find(|c| c.name == "Item")
            .unwrap();
        assert_eq!(item.elements.len(), 2);
        assert_eq!(item.elements[0].min_occurs.as_deref(), Some("0"));
        assert_eq!(item.attributes[0].name, "id");
        assert_eq!(item.attributes[0].type_ref.as_deref(), Some("int"));

        let response = schema
            .elements
            .iter()
            .find(|e| e.name == "LookupResponse")
            .unwrap();
        let inline = response.inline.as_ref().unwrap();
        assert_eq!(inline.elements[0].type_ref.as_deref(), Some("Item"));
        assert!(inline.elements[0].is_repeated());

        let colour = &schema.simple_types[0];
        assert_eq!(colour.base.as_deref(), Some("string"));
        assert_eq!(colour.enumerations, vec!["red", "blue"]);
    }

    #[test]
    fn test_parse_rejects_non_wsdl() {
        let err = WsdlLoader::parse_str("<html/>").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_malformed_xml() {
        let err = WsdlLoader::parse_str("<definitions>").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_simple_and_complex_content() {
        let xml = r#"<definitions xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <types><xs:schema>
    <xs:complexType name="Price">
      <xs:simpleContent>
        <xs:extension base="xs:decimal">
          <xs:attribute name="currency" type="xs:string"/>
        </xs:extension>
      </xs:simpleContent>
    </xs:complexType>
    <xs:complexType name="Derived">
      <xs:complexContent>
        <xs:extension base="Base">
          <xs:sequence><xs:element name="extra" type="xs:string"/></xs:sequence>
        </xs:extension>
      </xs:complexContent>
    </xs:complexType>
  </xs:schema></types>
</definitions>"#;
        let doc = WsdlLoader::parse_str(xml).unwrap();
        let types = &doc.schemas[0].complex_types;
        let price = types.iter().find(|c| c.name == "Price").unwrap();
        let content = price.simple_content.as_ref().unwrap();
        assert_eq!(content.base, "decimal");
        assert_eq!(content.attributes[0].name, "currency");

        let derived = types.iter().find(|c| c.name == "Derived").unwrap();
        assert_eq!(derived.base.as_deref(), Some("Base"));
        assert_eq!(derived.elements[0].name, "extra");
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let loader = WsdlLoader::new();
        let err = loader.fetch("/definitely/not/here.wsdl").await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
