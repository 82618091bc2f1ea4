#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # soapgw-gateway
//!
//! Route registry, request dispatch and the HTTP surface of the gateway.
//!
//! Each configured route binds a public path to a SOAP endpoint, a request
//! template, a response template and a response parser. Inbound JSON is
//! rendered into a SOAP envelope, posted upstream under a global
//! concurrency bound, and the reply is decoded and rendered back to JSON.

pub mod bound;
pub mod compile;
pub mod config;
pub mod dispatcher;
pub mod fault;
pub mod hints;
pub mod parser;
pub mod policies;
pub mod registry;
pub mod server;
pub mod transport;

pub use bound::{BoundError, BoundStats, ConcurrencyBound, RequestContext};
pub use compile::{CompileReport, RouteCompiler};
pub use config::{GatewayConfig, LogConfig, RouteConfig, ServerConfig};
pub use dispatcher::{DispatchError, Dispatcher};
pub use fault::{SoapFault, parse_fault};
pub use hints::{TypeHintSource, TypeHints, WsdlTypeHints};
pub use parser::{GenericResponseParser, ResponseParser, SchemaResponseParser};
pub use policies::ValidationPolicy;
pub use registry::{RouteHandler, RouteRegistry};
pub use server::{Gateway, build_gateway, router, serve, shutdown_signal};
pub use transport::{HttpTransport, SoapRequest, SoapResponse, Transport, TransportError};

use soapgw_validation::ValidationReport;
use std::fmt::Display;
use std::path::Path;
use thiserror::Error;

/// Errors raised while configuring and compiling routes
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to load template {path}: {message}")]
    TemplateLoad { path: String, message: String },

    #[error("Schema error: {0}")]
    Schema(#[from] soapgw_schema::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("route {route}: response template does not match schema ({} errors)", .report.errors.len())]
    Validation {
        route: String,
        report: Box<ValidationReport>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn template_load(path: &Path, e: impl Display) -> Self {
        Self::TemplateLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }
}

/// Result type for gateway setup
pub type Result<T> = std::result::Result<T, Error>;
