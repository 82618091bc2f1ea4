//! Route compilation
//!
//! Turns configured routes into registered handlers. Routes with a WSDL
//! location get their operation compiled, a schema-driven parser bound and
//! their response template checked against the operation's known paths.
//! A failing route is reported and skipped; the others still register.

use crate::config::RouteConfig;
use crate::parser::SchemaResponseParser;
use crate::policies::ValidationPolicy;
use crate::registry::RouteRegistry;
use crate::{Error, Result};
use serde::Serialize;
use soapgw_schema::OperationCache;
use soapgw_validation::{PathValidator, ValidationReport};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of compiling a set of routes
#[derive(Debug, Default, Serialize)]
pub struct CompileReport {
    /// Paths registered successfully
    pub registered: Vec<String>,
    /// Paths that failed, with the reason
    pub failed: Vec<(String, String)>,
    /// Response template checks that found drift
    pub reports: Vec<ValidationReport>,
}

impl CompileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.reports.is_empty()
    }
}

pub struct RouteCompiler {
    cache: Arc<OperationCache>,
    validator: Arc<PathValidator>,
    policy: ValidationPolicy,
}

impl RouteCompiler {
    pub fn new(cache: Arc<OperationCache>, validator: Arc<PathValidator>, policy: ValidationPolicy) -> Self {
        Self {
            cache,
            validator,
            policy,
        }
    }

    pub fn validator(&self) -> &Arc<PathValidator> {
        &self.validator
    }

    pub fn cache(&self) -> &Arc<OperationCache> {
        &self.cache
    }

    /// Compile one route and register it.
    ///
    /// Returns the drift report of the response template, if any was found
    /// and the policy let the route through.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a WSDL route names no operation,
    /// [`Error::Schema`] when the operation cannot be compiled,
    /// [`Error::TemplateLoad`] for unreadable templates and
    /// [`Error::Validation`] when the policy is `enforce` and the response
    /// template drifts from the schema. The registry is unchanged on error.
    pub async fn compile_route(
        &self,
        registry: &RouteRegistry,
        config: RouteConfig,
    ) -> Result<Option<ValidationReport>> {
        let Some(wsdl_url) = config.wsdl_url.clone() else {
            registry.register(config, None)?;
            return Ok(None);
        };

        let operation = config.operation_name().ok_or_else(|| {
            Error::Config(format!(
                "route {} has a WSDL but no operation or SOAPAction header",
                config.path
            ))
        })?;

        let compiled = self.cache.get_or_compile(&wsdl_url, operation).await?;
        let known_key = compiled.key();
        self.validator.set_known_paths(&known_key, compiled.output_paths());

        let path = config.path.clone();
        let parser = Arc::new(SchemaResponseParser::new(compiled.clone()));
        let handler = registry.build_handler(config, Some(parser))?;

        let mut drift = None;
        if self.policy.validates() {
            let errors = self
                .validator
                .validate(&known_key, &handler.response)
                .map_err(|e| Error::Config(e.to_string()))?;
            if !errors.is_empty() {
                let report = ValidationReport::new(
                    compiled.operation.clone(),
                    handler.response.name.clone(),
                    errors,
                );
                if self.policy.blocks_registration() {
                    return Err(Error::Validation {
                        route: path,
                        report: Box::new(report),
                    });
                }
                for error in &report.errors {
                    warn!(route = %path, template = %error.template_name, path = %error.path, "{}", error.message);
                }
                drift = Some(report);
            }

            let inputs = compiled.input_paths();
            if !inputs.is_empty() {
                for unknown in handler.request.paths.difference(&inputs) {
                    warn!(route = %path, path = %unknown, "request template path not in operation input");
                }
            }
        }

        registry.insert(handler);
        Ok(drift)
    }

    /// Compile every route, isolating failures to the failing route
    pub async fn compile_all(&self, registry: &RouteRegistry, routes: &[RouteConfig]) -> CompileReport {
        let mut report = CompileReport::default();
        for config in routes {
            let path = config.path.clone();
            match self.compile_route(registry, config.clone()).await {
                Ok(drift) => {
                    report.registered.push(path);
                    report.reports.extend(drift);
                }
                Err(e) => {
                    warn!(route = %path, error = %e, "route not registered");
                    if let Error::Validation { report: drift, .. } = &e {
                        report.reports.push((**drift).clone());
                    }
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            "compiled routes"
        );
        report
    }
}

impl Default for RouteCompiler {
    fn default() -> Self {
        Self::new(
            Arc::new(OperationCache::default()),
            Arc::new(PathValidator::new()),
            ValidationPolicy::default(),
        )
    }
}
