//! Generated record declarations

use serde::Serialize;

/// Semantic scalar types that XSD primitives map to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Binary,
}

impl ScalarType {
    /// Map a built-in XSD type (local name) to its scalar, if it is one.
    pub fn from_builtin(xsd: &str) -> Option<Self> {
        let scalar = match xsd {
            "string" | "normalizedString" | "token" | "anyURI" | "QName" | "NCName" | "Name"
            | "language" | "ID" | "IDREF" | "NMTOKEN" | "duration" | "gYear" | "gYearMonth"
            | "gMonth" | "gMonthDay" | "gDay" | "anyType" | "anySimpleType" => Self::String,
            "int" | "integer" | "long" | "short" | "byte" | "unsignedInt" | "unsignedLong"
            | "unsignedShort" | "unsignedByte" | "positiveInteger" | "negativeInteger"
            | "nonNegativeInteger" | "nonPositiveInteger" => Self::Integer,
            "decimal" | "float" | "double" => Self::Float,
            "boolean" => Self::Boolean,
            "date" | "dateTime" | "time" => Self::Timestamp,
            "base64Binary" | "hexBinary" => Self::Binary,
            _ => return None,
        };
        Some(scalar)
    }
}

/// Type of a record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Scalar(ScalarType),
    /// Reference to another generated record by name
    Record(String),
    List(Box<FieldType>),
}

impl FieldType {
    pub fn list(inner: FieldType) -> Self {
        Self::List(Box::new(inner))
    }

    /// The record this type ultimately refers to, looking through lists
    pub fn record_name(&self) -> Option<&str> {
        match self {
            Self::Scalar(_) => None,
            Self::Record(name) => Some(name),
            Self::List(inner) => inner.record_name(),
        }
    }
}

/// Where a field's value lives in the XML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldBinding {
    Element,
    Attribute,
    /// Character data of the enclosing element
    Text,
}

/// A field of a generated record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordField {
    /// Exported name, as addressed by templates
    pub name: String,
    /// Original XML tag or attribute name
    pub xml_name: String,
    pub field_type: FieldType,
    pub binding: FieldBinding,
}

impl RecordField {
    pub fn element(xml_name: &str, field_type: FieldType) -> Self {
        Self {
            name: crate::exported_name(xml_name),
            xml_name: xml_name.to_string(),
            field_type,
            binding: FieldBinding::Element,
        }
    }

    pub fn attribute(xml_name: &str, scalar: ScalarType) -> Self {
        Self {
            name: crate::exported_name(xml_name),
            xml_name: xml_name.to_string(),
            field_type: FieldType::Scalar(scalar),
            binding: FieldBinding::Attribute,
        }
    }

    /// The `Value` field carrying simple content
    pub fn text(scalar: ScalarType) -> Self {
        Self {
            name: "Value".to_string(),
            xml_name: String::new(),
            field_type: FieldType::Scalar(scalar),
            binding: FieldBinding::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Complex,
    /// Single-field record standing for a top-level element with a named type
    ElementAlias,
}

/// A record declaration generated from the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedRecord {
    pub name: String,
    pub kind: RecordKind,
    pub fields: Vec<RecordField>,
}

impl GeneratedRecord {
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }
}
