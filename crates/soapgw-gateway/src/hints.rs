//! Live WSDL type hints
//!
//! Routes without a compiled schema parser still benefit from knowing which
//! fields are numeric or boolean. Hints map an exported field name to its
//! scalar type across the whole WSDL, so same-named fields of different
//! types collide and the first declaration wins.

use async_trait::async_trait;
use dashmap::DashMap;
use soapgw_schema::{ComplexType, ScalarType, SchemaSet, WsdlDocument, WsdlLoader, exported_name};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Exported field name to scalar type
pub type TypeHints = BTreeMap<String, ScalarType>;

/// Source of type hints for a WSDL location
#[async_trait]
pub trait TypeHintSource: Send + Sync {
    async fn type_hints(&self, wsdl_url: &str) -> soapgw_schema::Result<Arc<TypeHints>>;
}

/// Hints read from the WSDL itself, cached per URL
pub struct WsdlTypeHints {
    loader: WsdlLoader,
    cache: DashMap<String, Arc<TypeHints>>,
}

impl WsdlTypeHints {
    pub fn new(loader: WsdlLoader) -> Self {
        Self {
            loader,
            cache: DashMap::new(),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl Default for WsdlTypeHints {
    fn default() -> Self {
        Self::new(WsdlLoader::new())
    }
}

#[async_trait]
impl TypeHintSource for WsdlTypeHints {
    async fn type_hints(&self, wsdl_url: &str) -> soapgw_schema::Result<Arc<TypeHints>> {
        if let Some(hints) = self.cache.get(wsdl_url) {
            return Ok(hints.clone());
        }

        let doc = self.loader.load(wsdl_url).await?;
        let hints = Arc::new(hints_from_document(&doc));
        debug!(wsdl_url, fields = hints.len(), "collected type hints");
        self.cache.insert(wsdl_url.to_string(), hints.clone());
        Ok(hints)
    }
}

/// Collect scalar hints from every element and attribute of a document
pub fn hints_from_document(doc: &WsdlDocument) -> TypeHints {
    let set = SchemaSet::from_docs(&doc.schemas);
    let mut hints = TypeHints::new();
    for name in set.complex_type_names() {
        if let Some(ct) = set.complex_type(&name) {
            collect(&set, ct, &mut hints);
        }
    }
    for schema in &doc.schemas {
        for element in &schema.elements {
            if let Some(scalar) = element.type_ref.as_deref().and_then(|t| scalar_of(&set, t)) {
                hints.entry(exported_name(&element.name)).or_insert(scalar);
            }
        }
    }
    hints
}

fn collect(set: &SchemaSet, ct: &ComplexType, hints: &mut TypeHints) {
    for element in &ct.elements {
        if let Some(inline) = &element.inline {
            collect(set, inline, hints);
        } else if let Some(scalar) = element.type_ref.as_deref().and_then(|t| scalar_of(set, t)) {
            hints.entry(exported_name(&element.name)).or_insert(scalar);
        }
    }
    let attributes = ct
        .attributes
        .iter()
        .chain(ct.simple_content.iter().flat_map(|sc| sc.attributes.iter()));
    for attribute in attributes {
        if let Some(scalar) = attribute.type_ref.as_deref().and_then(|t| scalar_of(set, t)) {
            hints.entry(exported_name(&attribute.name)).or_insert(scalar);
        }
    }
}

fn scalar_of(set: &SchemaSet, type_ref: &str) -> Option<ScalarType> {
    let mut name = soapgw_schema::local_name(type_ref);
    for _ in 0..16 {
        if let Some(scalar) = ScalarType::from_builtin(name) {
            return Some(scalar);
        }
        name = soapgw_schema::local_name(set.simple_type(name)?.base.as_deref()?);
    }
    None
}
