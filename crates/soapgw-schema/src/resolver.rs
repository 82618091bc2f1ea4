//! Type graph resolution
//!
//! Walks the schema from a root element or type and emits one
//! [`GeneratedRecord`] per complex type reached. Names are marked visited
//! before their fields are walked, so self-referential and mutually
//! recursive types terminate.

use crate::model::{Attribute, ComplexType, Element, SchemaSet};
use crate::record::{FieldType, GeneratedRecord, RecordField, RecordKind, ScalarType};
use crate::{Error, Result, exported_name};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, trace, warn};

/// Reference chains longer than this are treated as strings
const MAX_REFERENCE_DEPTH: usize = 32;

/// The resolved record set for one root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeGraph {
    pub root: String,
    pub records: BTreeMap<String, GeneratedRecord>,
}

impl TypeGraph {
    pub fn record(&self, name: &str) -> Option<&GeneratedRecord> {
        self.records.get(name)
    }

    /// The record that decoded data for the root element is shaped by.
    ///
    /// An element alias whose single field is a record stands in for that
    /// record; every other root is used as is.
    pub fn data_record(&self) -> Option<&GeneratedRecord> {
        let root = self.records.get(&self.root)?;
        if root.kind == RecordKind::ElementAlias {
            if let [field] = root.fields.as_slice() {
                if let FieldType::Record(target) = &field.field_type {
                    return self.records.get(target).or(Some(root));
                }
            }
        }
        Some(root)
    }

    /// Dotted field paths reachable from the data record
    pub fn known_paths(&self) -> BTreeSet<String> {
        crate::paths::known_paths(self)
    }
}

/// Depth-first resolver over a merged [`SchemaSet`]
pub struct TypeGraphResolver<'a> {
    schema: &'a SchemaSet,
    visited: HashSet<String>,
    /// Inline complex types lifted out of their parent
    hoisted: HashMap<String, ComplexType>,
    records: BTreeMap<String, GeneratedRecord>,
}

impl<'a> TypeGraphResolver<'a> {
    pub fn new(schema: &'a SchemaSet) -> Self {
        Self {
            schema,
            visited: HashSet::new(),
            hoisted: HashMap::new(),
            records: BTreeMap::new(),
        }
    }

    /// Resolve `root`, then every complex type not yet reached from it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedType`] when the root, or a type reachable
    /// from it, is not declared anywhere in the schema set.
    pub fn resolve(mut self, root: &str) -> Result<TypeGraph> {
        self.resolve_name(root)?;

        for name in self.schema.complex_type_names() {
            if let Err(e) = self.resolve_name(&name) {
                warn!(type_name = %name, error = %e, "skipping unreachable type");
            }
        }

        debug!(root, records = self.records.len(), "resolved type graph");
        Ok(TypeGraph {
            root: root.to_string(),
            records: self.records,
        })
    }

    fn resolve_name(&mut self, name: &str) -> Result<()> {
        if ScalarType::from_builtin(name).is_some() || self.visited.contains(name) {
            return Ok(());
        }

        if let Some(ct) = self.complex(name) {
            return self.resolve_complex(name, &ct);
        }

        if self.schema.simple_type(name).is_some() {
            return Ok(());
        }

        if let Some(el) = self.schema.element(name).cloned() {
            return self.resolve_element(name, &el);
        }

        Err(Error::UnresolvedType(name.to_string()))
    }

    fn complex(&self, name: &str) -> Option<ComplexType> {
        self.hoisted
            .get(name)
            .or_else(|| self.schema.complex_type(name))
            .cloned()
    }

    fn resolve_complex(&mut self, name: &str, ct: &ComplexType) -> Result<()> {
        trace!(type_name = name, "resolving complex type");
        self.visited.insert(name.to_string());

        let mut fields = Vec::new();

        if let Some(base) = &ct.base {
            self.resolve_name(base)?;
            match self.records.get(base) {
                Some(base_record) => fields.extend(base_record.fields.iter().cloned()),
                None => debug!(type_name = name, base = %base, "base still in progress, inherited fields omitted"),
            }
        }

        for el in &ct.elements {
            let field_type = self.element_field_type(name, el)?;
            let field_type = if el.is_repeated() {
                FieldType::list(field_type)
            } else {
                field_type
            };
            fields.push(RecordField::element(&el.name, field_type));
        }

        for attr in &ct.attributes {
            fields.push(self.attribute_field(attr));
        }

        if let Some(content) = &ct.simple_content {
            fields.push(RecordField::text(self.scalar_of(&content.base)));
            for attr in &content.attributes {
                fields.push(self.attribute_field(attr));
            }
        }

        self.records.insert(
            name.to_string(),
            GeneratedRecord {
                name: name.to_string(),
                kind: RecordKind::Complex,
                fields,
            },
        );
        Ok(())
    }

    fn element_field_type(&mut self, parent: &str, el: &Element) -> Result<FieldType> {
        if let Some(inline) = &el.inline {
            let hoisted_name = self.hoisted_name(parent, &el.name);
            let mut hoisted = (**inline).clone();
            hoisted.name = hoisted_name.clone();
            self.hoisted.insert(hoisted_name.clone(), hoisted);
            self.resolve_name(&hoisted_name)?;
            return Ok(FieldType::Record(hoisted_name));
        }

        match el.type_ref.as_deref().or(el.reference.as_deref()) {
            Some(type_name) => {
                self.resolve_name(type_name)?;
                Ok(self.field_type_for(type_name))
            }
            None => Ok(FieldType::Scalar(ScalarType::String)),
        }
    }

    /// `{Parent}_{Field}`, numbered when that name is already taken by a
    /// declared type or element or by another hoisted type
    fn hoisted_name(&self, parent: &str, field: &str) -> String {
        let base = format!("{parent}_{}", exported_name(field));
        let taken = |name: &str| {
            self.hoisted.contains_key(name)
                || self.schema.complex_type(name).is_some()
                || self.schema.simple_type(name).is_some()
                || self.schema.element(name).is_some()
        };
        if !taken(&base) {
            return base;
        }
        let name = (2..)
            .map(|n| format!("{base}{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.clone());
        warn!(parent, field, declared = %base, hoisted = %name, "inline type name collides, renamed");
        name
    }

    fn resolve_element(&mut self, name: &str, el: &Element) -> Result<()> {
        trace!(element = name, "resolving element");
        self.visited.insert(name.to_string());

        if let Some(reference) = &el.reference {
            return self.resolve_name(reference);
        }

        let fields = match &el.type_ref {
            Some(type_name) => {
                self.resolve_name(type_name)?;
                vec![RecordField::element(&el.name, self.field_type_for(type_name))]
            }
            None => Vec::new(),
        };

        self.records.insert(
            name.to_string(),
            GeneratedRecord {
                name: name.to_string(),
                kind: RecordKind::ElementAlias,
                fields,
            },
        );
        Ok(())
    }

    fn attribute_field(&self, attr: &Attribute) -> RecordField {
        let scalar = attr
            .type_ref
            .as_deref()
            .map_or(ScalarType::String, |t| self.scalar_of(t));
        RecordField::attribute(&attr.name, scalar)
    }

    /// Field type for a named type or element, following element references
    fn field_type_for(&self, name: &str) -> FieldType {
        let mut current = name.to_string();
        for _ in 0..MAX_REFERENCE_DEPTH {
            if let Some(scalar) = ScalarType::from_builtin(&current) {
                return FieldType::Scalar(scalar);
            }
            if self.hoisted.contains_key(&current) || self.schema.complex_type(&current).is_some() {
                return FieldType::Record(current);
            }
            if self.schema.simple_type(&current).is_some() {
                return FieldType::Scalar(self.scalar_of(&current));
            }
            match self.schema.element(&current) {
                Some(el) => match el.type_ref.as_ref().or(el.reference.as_ref()) {
                    Some(next) => current = next.clone(),
                    None => return FieldType::Record(current),
                },
                None => return FieldType::Scalar(ScalarType::String),
            }
        }
        FieldType::Scalar(ScalarType::String)
    }

    /// Scalar for a built-in or simple type, following restriction bases
    fn scalar_of(&self, name: &str) -> ScalarType {
        let mut current = name;
        for _ in 0..MAX_REFERENCE_DEPTH {
            if let Some(scalar) = ScalarType::from_builtin(current) {
                return scalar;
            }
            match self.schema.simple_type(current).and_then(|s| s.base.as_deref()) {
                Some(base) => current = base,
                None => break,
            }
        }
        ScalarType::String
    }
}
