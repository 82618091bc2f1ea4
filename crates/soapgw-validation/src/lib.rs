#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # soapgw-validation
//!
//! Template-to-schema path validation.
//!
//! Each operation registers the set of data paths its schema makes
//! available. A template is then checked in both directions: paths it reads
//! that the schema does not provide, and schema paths the template never
//! reads. Both passes always run so a single report lists every drift.
//!
//! ## Example Usage
//!
//! ```rust
//! use soapgw_validation::PathValidator;
//! use soapgw_template::parse_template;
//!
//! let validator = PathValidator::new();
//! validator.add_known_paths("Echo", ["EchoResult"]);
//!
//! let template = parse_template("echo", "{{.EchoResult}}").unwrap();
//! assert!(validator.validate("Echo", &template).unwrap().is_empty());
//! ```

pub mod engine;
pub mod reporter;

pub use engine::{PathValidator, ValidationError, ValidationErrorKind};
pub use reporter::{ValidationReport, format_validation_errors};

use thiserror::Error;

/// Errors that can occur during validation
#[derive(Error, Debug)]
pub enum Error {
    #[error("no known paths registered for operation {0}")]
    UnknownOperation(String),

    #[error("path {path} not found in schema of operation {operation}")]
    PathNotFound { operation: String, path: String },
}

pub type Result<T> = std::result::Result<T, Error>;
