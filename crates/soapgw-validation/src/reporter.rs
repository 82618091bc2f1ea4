//! Validation reporting

use crate::engine::{ValidationError, ValidationErrorKind};
use serde::Serialize;
use std::fmt::Write;

/// Outcome of validating one template against one operation
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub operation: String,
    pub template_name: String,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn new(
        operation: impl Into<String>,
        template_name: impl Into<String>,
        errors: Vec<ValidationError>,
    ) -> Self {
        Self {
            operation: operation.into(),
            template_name: template_name.into(),
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Template paths the schema does not provide
    pub fn not_in_schema(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.kind == ValidationErrorKind::NotInSchema)
    }

    /// Schema paths the template does not read
    pub fn missing_from_template(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.kind == ValidationErrorKind::MissingFromTemplate)
    }
}

/// Render validation errors as a human-readable report, grouped by template
pub fn format_validation_errors(errors: &[ValidationError]) -> String {
    if errors.is_empty() {
        return "no validation errors\n".to_string();
    }

    let mut out = String::new();
    let mut current: Option<&str> = None;
    for error in errors {
        if current != Some(error.template_name.as_str()) {
            let _ = writeln!(out, "template {}:", error.template_name);
            current = Some(&error.template_name);
        }
        let _ = write!(out, "  - {}: {}", error.path, error.message);
        match (&error.expected, &error.found) {
            (Some(expected), Some(found)) => {
                let _ = write!(out, " (expected {expected}, found {found})");
            }
            (Some(expected), None) => {
                let _ = write!(out, " (expected {expected})");
            }
            _ => {}
        }
        out.push('\n');
    }
    let _ = writeln!(out, "{} validation error(s)", errors.len());
    out
}
