#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # soapgw-template
//!
//! Request and response templates for the gateway.
//!
//! Templates use a subset of Go's `text/template` syntax: field access,
//! variables, pipelines, `if`/`range`/`with` blocks and a fixed set of
//! built-in functions. Every parsed template also carries the set of data
//! paths it dereferences, found by static analysis of the source text, so
//! the gateway can check it against the schema before serving traffic.
//!
//! ## Example Usage
//!
//! ```rust
//! use soapgw_template::parse_template;
//! use serde_json::json;
//!
//! let info = parse_template("greet", "Hello {{.Name}}!").unwrap();
//! assert!(info.paths.contains("Name"));
//! assert_eq!(info.execute(&json!({"Name": "World"})).unwrap(), "Hello World!");
//! ```

pub mod exec;
mod funcs;
mod lexer;
pub mod parser;
pub mod paths;
pub mod registry;

pub use parser::Template;
pub use paths::extract_paths;
pub use registry::TemplateRegistry;

use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that can occur while loading, parsing or executing templates
#[derive(Error, Debug)]
pub enum Error {
    #[error("template: {name}:{line}: {message}")]
    Syntax {
        name: String,
        line: usize,
        message: String,
    },

    #[error("template: {name}:{line}: {message}")]
    Execution {
        name: String,
        line: usize,
        message: String,
    },

    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn syntax(name: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            name: name.to_string(),
            line,
            message: message.into(),
        }
    }

    pub(crate) fn execution(name: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Execution {
            name: name.to_string(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A parsed template together with its source and referenced paths
#[derive(Debug, Clone)]
pub struct TemplateInfo {
    pub name: String,
    pub source: String,
    pub compiled: Template,
    pub paths: BTreeSet<String>,
}

impl TemplateInfo {
    /// Render this template against `data`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] when rendering fails.
    pub fn execute(&self, data: &Value) -> Result<String> {
        exec::execute(&self.compiled, data)
    }
}

/// Parse a template and extract the data paths it references.
///
/// # Errors
///
/// Returns [`Error::Syntax`] when the template does not parse.
pub fn parse_template(name: &str, content: &str) -> Result<TemplateInfo> {
    let compiled = parser::parse(name, content)?;
    Ok(TemplateInfo {
        name: name.to_string(),
        source: content.to_string(),
        compiled,
        paths: extract_paths(content),
    })
}

/// Render a parsed template against `data`.
///
/// # Errors
///
/// Returns [`Error::Execution`] when rendering fails.
pub fn execute(template: &TemplateInfo, data: &Value) -> Result<String> {
    template.execute(data)
}
