//! Route registry
//!
//! Maps public paths to compiled route handlers. Registration is
//! last-write-wins per path, except that a registration without a parser
//! keeps the parser already bound to that path.

use crate::config::RouteConfig;
use crate::hints::TypeHintSource;
use crate::parser::{GenericResponseParser, ResponseParser};
use crate::{Error, Result};
use dashmap::DashMap;
use soapgw_template::{TemplateInfo, parse_template};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything needed to serve one route
pub struct RouteHandler {
    pub config: RouteConfig,
    pub request: Arc<TemplateInfo>,
    pub response: Arc<TemplateInfo>,
    pub parser: Arc<dyn ResponseParser>,
}

impl std::fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteHandler")
            .field("path", &self.config.path)
            .field("request", &self.request.name)
            .field("response", &self.response.name)
            .field("parser", &self.parser.name())
            .finish()
    }
}

/// Concurrent path to handler map
#[derive(Default)]
pub struct RouteRegistry {
    routes: DashMap<String, Arc<RouteHandler>>,
    hint_source: Option<Arc<dyn TypeHintSource>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fallback parsers of routes with a WSDL location use `source` for hints
    pub fn with_hint_source(source: Arc<dyn TypeHintSource>) -> Self {
        Self {
            routes: DashMap::new(),
            hint_source: Some(source),
        }
    }

    /// Load and parse both templates of a route without registering it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateLoad`] when either template is missing or
    /// does not parse.
    pub fn load_templates(config: &RouteConfig) -> Result<(Arc<TemplateInfo>, Arc<TemplateInfo>)> {
        let request = load_template(&config.request_template)?;
        let response = load_template(&config.response_template)?;
        Ok((Arc::new(request), Arc::new(response)))
    }

    /// Build a handler for `config`.
    ///
    /// The parser is `parser` if given, else the one bound to the same path,
    /// else a generic parser.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateLoad`] when either template cannot be loaded.
    pub fn build_handler(
        &self,
        config: RouteConfig,
        parser: Option<Arc<dyn ResponseParser>>,
    ) -> Result<RouteHandler> {
        let (request, response) = Self::load_templates(&config)?;
        let parser = match parser {
            Some(parser) => parser,
            None => match self.routes.get(&config.path) {
                Some(existing) => existing.parser.clone(),
                None => self.fallback_parser(&config),
            },
        };
        Ok(RouteHandler {
            config,
            request,
            response,
            parser,
        })
    }

    /// Store a built handler, replacing any handler of the same path
    pub fn insert(&self, handler: RouteHandler) -> Arc<RouteHandler> {
        let handler = Arc::new(handler);
        let replaced = self
            .routes
            .insert(handler.config.path.clone(), handler.clone())
            .is_some();
        info!(
            path = %handler.config.path,
            endpoint = %handler.config.soap_endpoint,
            parser = handler.parser.name(),
            replaced,
            "registered route"
        );
        handler
    }

    /// Compile the templates of `config` and register the route.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateLoad`] when a template cannot be loaded; the
    /// registry is left unchanged.
    pub fn register(
        &self,
        config: RouteConfig,
        parser: Option<Arc<dyn ResponseParser>>,
    ) -> Result<Arc<RouteHandler>> {
        let handler = self.build_handler(config, parser)?;
        Ok(self.insert(handler))
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<RouteHandler>> {
        self.routes.get(path).map(|h| h.clone())
    }

    /// Rebind the parser of a registered route. Returns false if unknown.
    pub fn set_parser(&self, path: &str, parser: Arc<dyn ResponseParser>) -> bool {
        let Some(current) = self.lookup(path) else {
            return false;
        };
        let handler = RouteHandler {
            config: current.config.clone(),
            request: current.request.clone(),
            response: current.response.clone(),
            parser,
        };
        debug!(path, parser = handler.parser.name(), "rebound route parser");
        self.routes.insert(path.to_string(), Arc::new(handler));
        true
    }

    pub fn remove(&self, path: &str) -> Option<Arc<RouteHandler>> {
        self.routes.remove(path).map(|(_, h)| h)
    }

    /// Registered paths in sorted order
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn fallback_parser(&self, config: &RouteConfig) -> Arc<dyn ResponseParser> {
        match (&self.hint_source, &config.wsdl_url) {
            (Some(source), Some(url)) => {
                Arc::new(GenericResponseParser::with_hints(source.clone(), url.clone()))
            }
            _ => Arc::new(GenericResponseParser::new()),
        }
    }
}

fn load_template(path: &Path) -> Result<TemplateInfo> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::template_load(path, e))?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("template");
    parse_template(name, &content).map_err(|e| Error::template_load(path, e))
}
