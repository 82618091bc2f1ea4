//! Compiled operations and their cache
//!
//! Extraction and resolution run once per (WSDL location, operation) pair;
//! the result is shared by every route bound to that operation.

use crate::decode::RecordDecoder;
use crate::loader::WsdlLoader;
use crate::model::WsdlDocument;
use crate::resolver::{TypeGraph, TypeGraphResolver};
use crate::Result;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Everything resolved for one WSDL operation
#[derive(Debug, Clone, Serialize)]
pub struct CompiledOperation {
    pub location: String,
    pub operation: String,
    pub soap_action: Option<String>,
    /// Output message records
    pub output: TypeGraph,
    /// Input message records, when the input element resolved
    pub input: Option<TypeGraph>,
}

impl CompiledOperation {
    /// `location#operation`, unique across WSDL documents
    pub fn key(&self) -> String {
        OperationCache::key(&self.location, &self.operation)
    }

    /// Known paths of the decoded response
    pub fn output_paths(&self) -> BTreeSet<String> {
        self.output.known_paths()
    }

    /// Known paths of the request payload
    pub fn input_paths(&self) -> BTreeSet<String> {
        self.input
            .as_ref()
            .map(TypeGraph::known_paths)
            .unwrap_or_default()
    }

    /// Decode a SOAP response envelope for this operation
    pub fn decode_response(&self, xml: &str) -> Result<Value> {
        RecordDecoder::new(&self.output).decode_envelope(xml)
    }
}

/// Extract and resolve one operation of a parsed document.
///
/// # Errors
///
/// Fails when the operation cannot be extracted or its output element does
/// not resolve. An unresolvable input element is only logged.
pub fn compile_operation(
    doc: &WsdlDocument,
    location: &str,
    operation: &str,
) -> Result<CompiledOperation> {
    let extracted = doc.extract(operation)?;
    let output = TypeGraphResolver::new(&extracted.schema).resolve(&extracted.output_element)?;

    let input = match &extracted.input_element {
        Some(element) => match TypeGraphResolver::new(&extracted.schema).resolve(element) {
            Ok(graph) => Some(graph),
            Err(e) => {
                warn!(operation, element = %element, error = %e, "input element did not resolve");
                None
            }
        },
        None => None,
    };

    info!(
        location,
        operation,
        records = output.records.len(),
        "compiled operation"
    );

    Ok(CompiledOperation {
        location: location.to_string(),
        operation: operation.to_string(),
        soap_action: extracted.soap_action,
        output,
        input,
    })
}

/// Concurrent cache of parsed documents and compiled operations
pub struct OperationCache {
    loader: WsdlLoader,
    documents: DashMap<String, Arc<WsdlDocument>>,
    operations: DashMap<String, Arc<CompiledOperation>>,
}

impl OperationCache {
    pub fn new(loader: WsdlLoader) -> Self {
        Self {
            loader,
            documents: DashMap::new(),
            operations: DashMap::new(),
        }
    }

    fn key(location: &str, operation: &str) -> String {
        format!("{location}#{operation}")
    }

    /// Parsed document for a location, fetched at most once
    pub async fn document(&self, location: &str) -> Result<Arc<WsdlDocument>> {
        if let Some(doc) = self.documents.get(location) {
            trace!(location, "document cache hit");
            return Ok(doc.clone());
        }

        let doc = Arc::new(self.loader.load(location).await?);
        self.documents.insert(location.to_string(), doc.clone());
        Ok(doc)
    }

    /// Compiled operation, compiling on first request
    pub async fn get_or_compile(
        &self,
        location: &str,
        operation: &str,
    ) -> Result<Arc<CompiledOperation>> {
        let key = Self::key(location, operation);
        if let Some(compiled) = self.operations.get(&key) {
            debug!(key = %key, "operation cache hit");
            return Ok(compiled.clone());
        }

        let doc = self.document(location).await?;
        let compiled = Arc::new(compile_operation(&doc, location, operation)?);
        self.operations.insert(key, compiled.clone());
        Ok(compiled)
    }

    pub fn get(&self, location: &str, operation: &str) -> Option<Arc<CompiledOperation>> {
        self.operations
            .get(&Self::key(location, operation))
            .map(|c| c.clone())
    }

    /// Number of compiled operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Drop every cached document and operation
    pub fn clear(&self) {
        self.documents.clear();
        self.operations.clear();
    }
}

impl Default for OperationCache {
    fn default() -> Self {
        Self::new(WsdlLoader::new())
    }
}
