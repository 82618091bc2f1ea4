//! Typed decoding of SOAP responses
//!
//! Converts the payload element of a SOAP envelope into a JSON value shaped
//! by the records of a [`TypeGraph`]. Keys are exported field names. Fields
//! missing from the XML get zero values, so templates can always address
//! every known path.

use crate::record::{FieldBinding, FieldType, GeneratedRecord, RecordKind, ScalarType};
use crate::resolver::TypeGraph;
use crate::{Error, Result};
use roxmltree::{Document, Node};
use serde_json::{Map, Value};

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Decodes XML into JSON using generated records
pub struct RecordDecoder<'g> {
    graph: &'g TypeGraph,
}

impl<'g> RecordDecoder<'g> {
    pub fn new(graph: &'g TypeGraph) -> Self {
        Self { graph }
    }

    /// Decode a SOAP envelope (or a bare payload document).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for malformed XML, a missing or faulted
    /// `Body`, or scalar text that does not fit its declared type.
    pub fn decode_envelope(&self, xml: &str) -> Result<Value> {
        let doc = Document::parse(xml).map_err(|e| Error::Decode(e.to_string()))?;
        let root = doc.root_element();

        let payload = if root.tag_name().name() == "Envelope" {
            let body = child_element(root, "Body")
                .ok_or_else(|| Error::Decode("envelope has no Body".to_string()))?;
            if child_element(body, "Fault").is_some() {
                return Err(Error::Decode("response body is a SOAP fault".to_string()));
            }
            child_element(body, &self.graph.root)
                .or_else(|| body.children().find(Node::is_element))
                .ok_or_else(|| Error::Decode("envelope Body is empty".to_string()))?
        } else {
            root
        };

        self.decode_payload(payload)
    }

    /// Decode the element standing for the graph root
    pub fn decode_payload(&self, node: Node<'_, '_>) -> Result<Value> {
        let record = self.graph.data_record().ok_or_else(|| {
            Error::Decode(format!("no record generated for {}", self.graph.root))
        })?;

        // A scalar alias is the element itself, not a wrapper around it
        if record.kind == RecordKind::ElementAlias {
            let mut map = Map::new();
            for field in &record.fields {
                map.insert(field.name.clone(), self.decode_value(node, &field.field_type)?);
            }
            return Ok(Value::Object(map));
        }

        self.decode_record(node, record)
    }

    fn decode_record(&self, node: Node<'_, '_>, record: &GeneratedRecord) -> Result<Value> {
        let mut map = Map::new();
        for field in &record.fields {
            let value = match field.binding {
                FieldBinding::Attribute => match attribute_value(node, &field.xml_name) {
                    Some(raw) => self.decode_text(raw, &field.field_type)?,
                    None => zero_value(self.graph, &field.field_type, &mut Vec::new()),
                },
                FieldBinding::Text => self.decode_text(&text_of(node), &field.field_type)?,
                FieldBinding::Element => {
                    let mut matches = node
                        .children()
                        .filter(|n| n.is_element() && n.tag_name().name() == field.xml_name);
                    match &field.field_type {
                        FieldType::List(inner) => Value::Array(
                            matches
                                .map(|n| self.decode_value(n, inner))
                                .collect::<Result<Vec<_>>>()?,
                        ),
                        single => match matches.next() {
                            Some(n) => self.decode_value(n, single)?,
                            None => zero_value(self.graph, single, &mut Vec::new()),
                        },
                    }
                }
            };
            map.insert(field.name.clone(), value);
        }
        Ok(Value::Object(map))
    }

    fn decode_value(&self, node: Node<'_, '_>, field_type: &FieldType) -> Result<Value> {
        if is_nil(node) {
            return Ok(Value::Null);
        }
        match field_type {
            FieldType::Scalar(_) => self.decode_text(&text_of(node), field_type),
            FieldType::Record(name) => {
                let record = self
                    .graph
                    .record(name)
                    .ok_or_else(|| Error::Decode(format!("no record named {name}")))?;
                self.decode_record(node, record)
            }
            FieldType::List(inner) => Ok(Value::Array(vec![self.decode_value(node, inner)?])),
        }
    }

    fn decode_text(&self, text: &str, field_type: &FieldType) -> Result<Value> {
        match field_type {
            FieldType::Scalar(scalar) => convert_scalar(text, *scalar),
            other => Ok(zero_value(self.graph, other, &mut Vec::new())),
        }
    }
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Unqualified attribute first, then any namespace-qualified one with
/// the same local name
fn attribute_value<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name).or_else(|| {
        node.attributes()
            .find(|a| a.namespace().is_some() && a.name() == name)
            .map(|a| a.value())
    })
}

fn is_nil(node: Node<'_, '_>) -> bool {
    matches!(node.attribute((XSI_NS, "nil")).map(str::trim), Some("true" | "1"))
}

fn text_of(node: Node<'_, '_>) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect()
}

/// Convert element text to the JSON value of a scalar type.
///
/// Empty numeric text becomes zero; timestamps and binary stay text.
/// Integers above `i64::MAX` are kept as unsigned.
pub fn convert_scalar(text: &str, scalar: ScalarType) -> Result<Value> {
    let trimmed = text.trim();
    match scalar {
        ScalarType::String | ScalarType::Timestamp | ScalarType::Binary => {
            Ok(Value::String(text.to_string()))
        }
        ScalarType::Integer if trimmed.is_empty() => Ok(Value::from(0)),
        ScalarType::Integer => trimmed
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| trimmed.parse::<u64>().map(Value::from))
            .map_err(|_| Error::Decode(format!("invalid integer {trimmed:?}"))),
        ScalarType::Float if trimmed.is_empty() => Ok(Value::from(0.0)),
        ScalarType::Float => trimmed
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| Error::Decode(format!("invalid number {trimmed:?}"))),
        ScalarType::Boolean => match trimmed {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" | "" => Ok(Value::Bool(false)),
            other => Err(Error::Decode(format!("invalid boolean {other:?}"))),
        },
    }
}

/// Zero value for a field absent from the XML.
///
/// Records already being zeroed further up become `null`.
fn zero_value(graph: &TypeGraph, field_type: &FieldType, stack: &mut Vec<String>) -> Value {
    match field_type {
        FieldType::Scalar(ScalarType::Integer) => Value::from(0),
        FieldType::Scalar(ScalarType::Float) => Value::from(0.0),
        FieldType::Scalar(ScalarType::Boolean) => Value::Bool(false),
        FieldType::Scalar(_) => Value::String(String::new()),
        FieldType::List(_) => Value::Array(Vec::new()),
        FieldType::Record(name) => {
            if stack.iter().any(|s| s == name) {
                return Value::Null;
            }
            let Some(record) = graph.record(name) else {
                return Value::Null;
            };
            stack.push(name.clone());
            let map = record
                .fields
                .iter()
                .map(|f| (f.name.clone(), zero_value(graph, &f.field_type, stack)))
                .collect();
            stack.pop();
            Value::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordField;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn graph(root: &str, records: Vec<GeneratedRecord>) -> TypeGraph {
        TypeGraph {
            root: root.to_string(),
            records: records
                .into_iter()
                .map(|r| (r.name.clone(), r))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn complex(name: &str, fields: Vec<RecordField>) -> GeneratedRecord {
        GeneratedRecord {
            name: name.to_string(),
            kind: RecordKind::Complex,
            fields,
        }
    }

    fn country_graph() -> TypeGraph {
        graph(
            "ListResponse",
            vec![
                complex("ListResponse", vec![
                    RecordField::element("Total", FieldType::Scalar(ScalarType::Integer)),
                    RecordField::element(
                        "Country",
                        FieldType::list(FieldType::Record("Country".to_string())),
                    ),
                ]),
                complex("Country", vec![
                    RecordField::element("Name", FieldType::Scalar(ScalarType::String)),
                    RecordField::element("Active", FieldType::Scalar(ScalarType::Boolean)),
                    RecordField::attribute("code", ScalarType::String),
                ]),
            ],
        )
    }

    #[test]
    fn test_decode_envelope_with_lists_and_attributes() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <ListResponse xmlns="urn:test">
      <Total>2</Total>
      <Country code="NL"><Name>Netherlands</Name><Active>true</Active></Country>
      <Country code="BE"><Name>Belgium</Name></Country>
    </ListResponse>
  </soap:Body>
</soap:Envelope>"#;
        let g = country_graph();
        let value = RecordDecoder::new(&g).decode_envelope(xml).unwrap();
        assert_eq!(
            value,
            json!({
                "Total": 2,
                "Country": [
                    {"Name": "Netherlands", "Active": true, "Code": "NL"},
                    {"Name": "Belgium", "Active": false, "Code": "BE"},
                ]
            })
        );
    }

    #[test]
    fn test_missing_fields_get_zero_values() {
        let g = country_graph();
        let value = RecordDecoder::new(&g)
            .decode_envelope("<ListResponse/>")
            .unwrap();
        assert_eq!(value, json!({"Total": 0, "Country": []}));
    }

    #[test]
    fn test_recursive_zero_value_is_cut() {
        let g = graph(
            "Node",
            vec![complex("Node", vec![
                RecordField::element("Label", FieldType::Scalar(ScalarType::String)),
                RecordField::element("Next", FieldType::Record("Node".to_string())),
            ])],
        );
        let value = RecordDecoder::new(&g).decode_envelope("<Node/>").unwrap();
        assert_eq!(value, json!({"Label": "", "Next": {"Label": "", "Next": null}}));
    }

    #[test]
    fn test_invalid_integer_is_a_decode_error() {
        let g = country_graph();
        let err = RecordDecoder::new(&g)
            .decode_envelope("<ListResponse><Total>many</Total></ListResponse>")
            .unwrap_err();
        assert!(err.to_string().contains("invalid integer"));
    }

    #[test]
    fn test_fault_body_is_rejected() {
        let xml = r#"<Envelope><Body><Fault><faultcode>Server</faultcode></Fault></Body></Envelope>"#;
        let g = country_graph();
        let err = RecordDecoder::new(&g).decode_envelope(xml).unwrap_err();
        assert!(err.to_string().contains("SOAP fault"));
    }

    #[test]
    fn test_scalar_alias_root() {
        let g = graph(
            "GetNameResult",
            vec![GeneratedRecord {
                name: "GetNameResult".to_string(),
                kind: RecordKind::ElementAlias,
                fields: vec![RecordField::element(
                    "GetNameResult",
                    FieldType::Scalar(ScalarType::String),
                )],
            }],
        );
        let value = RecordDecoder::new(&g)
            .decode_envelope("<Envelope><Body><GetNameResult>Ada</GetNameResult></Body></Envelope>")
            .unwrap();
        assert_eq!(value, json!({"GetNameResult": "Ada"}));
    }

    #[test]
    fn test_text_content_and_nil() {
        let g = graph(
            "Quote",
            vec![
                complex("Quote", vec![
                    RecordField::element("Price", FieldType::Record("Price".to_string())),
                    RecordField::element("Note", FieldType::Scalar(ScalarType::String)),
                ]),
                complex("Price", vec![
                    RecordField::text(ScalarType::Float),
                    RecordField::attribute("currency", ScalarType::String),
                ]),
            ],
        );
        let xml = r#"<Quote xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <Price currency="EUR">12.5</Price>
  <Note xsi:nil="true"/>
</Quote>"#;
        let value = RecordDecoder::new(&g).decode_envelope(xml).unwrap();
        assert_eq!(
            value,
            json!({"Price": {"Value": 12.5, "Currency": "EUR"}, "Note": null})
        );
    }

    #[test]
    fn test_nil_written_as_one() {
        let g = country_graph();
        let xml = r#"<ListResponse xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <Country xsi:nil="1"/>
</ListResponse>"#;
        let value = RecordDecoder::new(&g).decode_envelope(xml).unwrap();
        assert_eq!(value, json!({"Total": 0, "Country": [null]}));
    }

    #[test]
    fn test_namespace_qualified_attribute() {
        let g = country_graph();
        let xml = r#"<ListResponse xmlns:c="urn:codes">
  <Country c:code="NL"><Name>Netherlands</Name></Country>
</ListResponse>"#;
        let value = RecordDecoder::new(&g).decode_envelope(xml).unwrap();
        assert_eq!(value["Country"][0]["Code"], "NL");
    }

    #[test]
    fn test_unsigned_long_above_signed_range() {
        assert_eq!(
            convert_scalar("18446744073709551615", ScalarType::Integer).unwrap(),
            json!(u64::MAX)
        );
        assert_eq!(convert_scalar(" -42 ", ScalarType::Integer).unwrap(), json!(-42));
        assert!(convert_scalar("18446744073709551616", ScalarType::Integer).is_err());
    }
}
