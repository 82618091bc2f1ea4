#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # soapgw-schema
//!
//! WSDL/XSD extraction, type graph resolution, and typed SOAP envelope decoding.
//!
//! A WSDL document is parsed into its operations, messages and schema blocks.
//! The output message of one operation is then resolved into a flat set of
//! [`GeneratedRecord`]s which drive both the known-path set used for template
//! validation and the [`RecordDecoder`] that turns a SOAP response into JSON.
//!
//! Names are matched by local name only: namespace prefixes are stripped
//! everywhere, so two same-named types from different namespaces collide.

pub mod decode;
pub mod loader;
pub mod model;
pub mod paths;
pub mod record;
pub mod registry;
pub mod resolver;

pub use decode::{RecordDecoder, convert_scalar};
pub use loader::WsdlLoader;
pub use model::{
    Attribute, BindingOperation, ComplexType, Element, ExtractedOperation, Message, Operation,
    Part, SchemaDoc, SchemaSet, ServiceEndpoint, SimpleContent, SimpleType, WsdlDocument,
};
pub use paths::known_paths;
pub use record::{FieldBinding, FieldType, GeneratedRecord, RecordField, RecordKind, ScalarType};
pub use registry::{CompiledOperation, OperationCache, compile_operation};
pub use resolver::{TypeGraph, TypeGraphResolver};

use thiserror::Error;

/// Errors that can occur while loading, resolving or decoding schemas
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("WSDL parse error: {0}")]
    Parse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("type {0} not found")]
    UnresolvedType(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Strip a namespace prefix (`tns:Foo` -> `Foo`).
pub fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

/// Exported field name for an XML tag: first letter upper-cased.
///
/// Templates address decoded data by these names.
pub fn exported_name(xml_name: &str) -> String {
    let mut chars = xml_name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name_strips_prefix() {
        assert_eq!(local_name("tns:GetCountry"), "GetCountry");
        assert_eq!(local_name("s:string"), "string");
        assert_eq!(local_name("plain"), "plain");
    }

    #[test]
    fn test_exported_name() {
        assert_eq!(exported_name("celsius"), "Celsius");
        assert_eq!(exported_name("Result"), "Result");
        assert_eq!(exported_name("sISOCode"), "SISOCode");
        assert_eq!(exported_name(""), "");
    }

    #[test]
    fn test_unresolved_type_message() {
        let err = Error::UnresolvedType("Missing".to_string());
        assert_eq!(err.to_string(), "type Missing not found");
    }
}
