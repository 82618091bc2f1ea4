//! WSDL and XML-schema model definitions
//!
//! All names held here are local names; prefixes are stripped at parse time.

use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A parsed WSDL 1.1 document
#[derive(Debug, Clone, Default)]
pub struct WsdlDocument {
    pub target_namespace: Option<String>,
    pub schemas: Vec<SchemaDoc>,
    pub messages: BTreeMap<String, Message>,
    /// Operations declared by the port types
    pub operations: BTreeMap<String, Operation>,
    /// Binding operations keyed by operation name
    pub bindings: BTreeMap<String, BindingOperation>,
    pub endpoints: Vec<ServiceEndpoint>,
}

/// A port-type operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    /// Input message name
    pub input: Option<String>,
    /// Output message name
    pub output: Option<String>,
}

/// A WSDL message with its ordered parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub name: String,
    pub parts: Vec<Part>,
}

/// A message part. Document/literal parts carry `element`, rpc parts carry `type_ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub element: Option<String>,
    pub type_ref: Option<String>,
}

/// A SOAP binding operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingOperation {
    pub name: String,
    pub soap_action: Option<String>,
}

/// A `service/port` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub service: String,
    pub port: String,
    pub address: String,
}

/// One `xs:schema` block
#[derive(Debug, Clone, Default)]
pub struct SchemaDoc {
    pub target_namespace: Option<String>,
    pub complex_types: Vec<ComplexType>,
    pub simple_types: Vec<SimpleType>,
    pub elements: Vec<Element>,
    pub imports: Vec<Import>,
}

/// An `xs:import` / `xs:include`. Recorded, never followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub namespace: Option<String>,
    pub schema_location: Option<String>,
}

/// A complex type declaration, named or inline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplexType {
    pub name: String,
    /// Child elements from `sequence`, `all` and `choice`, in declared order
    pub elements: Vec<Element>,
    pub attributes: Vec<Attribute>,
    pub simple_content: Option<SimpleContent>,
    /// `complexContent/extension` base type
    pub base: Option<String>,
}

/// `simpleContent/extension`: text content of a primitive base plus attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleContent {
    pub base: String,
    pub attributes: Vec<Attribute>,
}

/// An element declaration.
///
/// Exactly one of `type_ref`, `reference` and `inline` is expected to be set;
/// an element with none of them is treated as `xs:anyType`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub type_ref: Option<String>,
    pub reference: Option<String>,
    pub inline: Option<Box<ComplexType>>,
    pub min_occurs: Option<String>,
    pub max_occurs: Option<String>,
}

impl Element {
    /// Create an element bound to a named type
    pub fn typed(name: impl Into<String>, type_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_ref: Some(type_ref.into()),
            ..Self::default()
        }
    }

    /// Set `maxOccurs`
    pub fn with_max_occurs(mut self, max: impl Into<String>) -> Self {
        self.max_occurs = Some(max.into());
        self
    }

    /// `maxOccurs` present and not `"1"`
    pub fn is_repeated(&self) -> bool {
        matches!(self.max_occurs.as_deref(), Some(max) if !max.is_empty() && max != "1")
    }
}

/// An attribute declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub type_ref: Option<String>,
}

/// A simple type restriction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleType {
    pub name: String,
    pub base: Option<String>,
    pub enumerations: Vec<String>,
}

/// Every schema block of a document merged into one local-name lookup space
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    complex_types: HashMap<String, ComplexType>,
    simple_types: HashMap<String, SimpleType>,
    elements: HashMap<String, Element>,
}

impl SchemaSet {
    /// Merge schema blocks.
    ///
    /// Top-level elements with an inline complex type are also entered as
    /// complex types under the element name, replacing a same-named type.
    pub fn from_docs(docs: &[SchemaDoc]) -> Self {
        let mut set = Self::default();
        for doc in docs {
            for ct in &doc.complex_types {
                if set.complex_types.insert(ct.name.clone(), ct.clone()).is_some() {
                    debug!(name = %ct.name, "complex type redeclared, last declaration wins");
                }
            }
            for st in &doc.simple_types {
                set.simple_types.insert(st.name.clone(), st.clone());
            }
        }
        for doc in docs {
            for el in &doc.elements {
                if let Some(inline) = &el.inline {
                    let mut hoisted = (**inline).clone();
                    hoisted.name = el.name.clone();
                    set.complex_types.insert(el.name.clone(), hoisted);
                }
                set.elements.insert(el.name.clone(), el.clone());
            }
        }
        set
    }

    pub fn complex_type(&self, name: &str) -> Option<&ComplexType> {
        self.complex_types.get(name)
    }

    pub fn simple_type(&self, name: &str) -> Option<&SimpleType> {
        self.simple_types.get(name)
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.get(name)
    }

    /// Complex type names in sorted order
    pub fn complex_type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.complex_types.keys().cloned().collect();
        names.sort();
        names
    }
}

/// What one operation needs for resolution
#[derive(Debug, Clone)]
pub struct ExtractedOperation {
    pub operation: String,
    pub input_element: Option<String>,
    pub output_element: String,
    pub soap_action: Option<String>,
    pub schema: SchemaSet,
}

impl WsdlDocument {
    /// Locate an operation, its output message and the output element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the operation, its output message, or
    /// an element-bearing part of that message is missing.
    pub fn extract(&self, operation: &str) -> Result<ExtractedOperation> {
        let op = self
            .operations
            .get(operation)
            .ok_or_else(|| Error::NotFound(format!("operation {operation} not found")))?;

        let output_name = op
            .output
            .as_deref()
            .ok_or_else(|| Error::NotFound(format!("operation {operation} has no output")))?;
        let output_element = self
            .message_element(output_name)?
            .ok_or_else(|| {
                Error::NotFound(format!("no element part in output message {output_name}"))
            })?;

        let input_element = match op.input.as_deref() {
            Some(input) => self.message_element(input)?,
            None => None,
        };

        Ok(ExtractedOperation {
            operation: operation.to_string(),
            input_element,
            output_element,
            soap_action: self
                .bindings
                .get(operation)
                .and_then(|b| b.soap_action.clone()),
            schema: SchemaSet::from_docs(&self.schemas),
        })
    }

    fn message_element(&self, message: &str) -> Result<Option<String>> {
        let msg = self
            .messages
            .get(message)
            .ok_or_else(|| Error::NotFound(format!("message {message} not found")))?;
        Ok(msg.parts.iter().find_map(|p| p.element.clone()))
    }

    /// SOAP action declared by the binding for an operation
    pub fn soap_action(&self, operation: &str) -> Option<&str> {
        self.bindings
            .get(operation)
            .and_then(|b| b.soap_action.as_deref())
    }
}
