//! Path validation engine

use crate::{Error, Result};
use dashmap::DashMap;
use serde::Serialize;
use soapgw_template::TemplateInfo;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Direction of a path mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// The template reads a path the schema does not provide
    NotInSchema,
    /// The schema provides a path the template never reads
    MissingFromTemplate,
}

/// A single template/schema path mismatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub template_name: String,
    pub path: String,
    pub message: String,
    pub kind: ValidationErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
}

impl ValidationError {
    fn not_in_schema(template_name: &str, path: &str) -> Self {
        Self {
            template_name: template_name.to_string(),
            path: path.to_string(),
            message: "path not found in schema".to_string(),
            kind: ValidationErrorKind::NotInSchema,
            expected: None,
            found: Some(path.to_string()),
        }
    }

    fn missing_from_template(template_name: &str, path: &str) -> Self {
        Self {
            template_name: template_name.to_string(),
            path: path.to_string(),
            message: "required path missing from template".to_string(),
            kind: ValidationErrorKind::MissingFromTemplate,
            expected: Some(path.to_string()),
            found: None,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.template_name, self.path, self.message)
    }
}

/// Known-path sets per operation, checked against templates
#[derive(Default)]
pub struct PathValidator {
    known: DashMap<String, BTreeSet<String>>,
}

impl PathValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add paths to the known set of `operation`, creating it if needed
    pub fn add_known_paths<I, S>(&self, operation: &str, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entry = self.known.entry(operation.to_string()).or_default();
        entry.extend(paths.into_iter().map(Into::into));
        debug!(operation, known = entry.len(), "registered known paths");
    }

    /// Replace the known set of `operation` with `paths`
    pub fn set_known_paths<I, S>(&self, operation: &str, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
        debug!(operation, known = paths.len(), "replaced known paths");
        self.known.insert(operation.to_string(), paths);
    }

    /// Known paths of `operation`, if any were registered
    pub fn known_paths(&self, operation: &str) -> Option<BTreeSet<String>> {
        self.known.get(operation).map(|paths| paths.clone())
    }

    /// Compare a template's paths with the known paths of `operation`.
    ///
    /// Returns every mismatch: template paths unknown to the schema first,
    /// then schema paths the template does not read. An empty list means
    /// the template and schema agree exactly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownOperation`] when no paths were registered
    /// for `operation`.
    pub fn validate(&self, operation: &str, template: &TemplateInfo) -> Result<Vec<ValidationError>> {
        let known = self
            .known
            .get(operation)
            .ok_or_else(|| Error::UnknownOperation(operation.to_string()))?;

        let mut errors: Vec<ValidationError> = template
            .paths
            .difference(&known)
            .map(|path| ValidationError::not_in_schema(&template.name, path))
            .collect();

        errors.extend(
            known
                .difference(&template.paths)
                .map(|path| ValidationError::missing_from_template(&template.name, path)),
        );

        debug!(
            operation,
            template = %template.name,
            errors = errors.len(),
            "validated template paths"
        );
        Ok(errors)
    }

    /// Check that a single path is known for `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownOperation`] for an unregistered operation and
    /// [`Error::PathNotFound`] when the path is not in its known set.
    pub fn validate_path(&self, operation: &str, path: &str) -> Result<()> {
        let known = self
            .known
            .get(operation)
            .ok_or_else(|| Error::UnknownOperation(operation.to_string()))?;

        if known.contains(path) {
            Ok(())
        } else {
            Err(Error::PathNotFound {
                operation: operation.to_string(),
                path: path.to_string(),
            })
        }
    }

    /// Drop the known paths of `operation`
    pub fn remove(&self, operation: &str) -> bool {
        self.known.remove(operation).is_some()
    }
}
