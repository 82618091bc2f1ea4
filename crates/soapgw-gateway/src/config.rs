//! Gateway configuration
//!
//! Loaded from JSON or YAML, chosen by file extension. Durations are
//! written as human strings such as `"30s"` or `"250ms"`. Relative template
//! paths are resolved against the directory of the configuration file.

use crate::policies::ValidationPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Header carrying the SOAP action of a route
pub const SOAP_ACTION_HEADER: &str = "SOAPAction";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub logging: LogConfig,
    pub validation: ValidationPolicy,
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on concurrently dispatched requests
    pub max_concurrency: usize,
    /// Connect timeout of the upstream HTTP client
    #[serde(with = "duration_str")]
    pub connect_timeout: Duration,
    /// Deadline applied to every inbound request, queueing included
    #[serde(with = "duration_str::option")]
    pub request_deadline: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_concurrency: 64,
            connect_timeout: Duration::from_secs(10),
            request_deadline: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// One public path forwarded to one SOAP operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub soap_endpoint: String,
    pub request_template: PathBuf,
    pub response_template: PathBuf,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wsdl_url: Option<String>,
    /// Operation name, defaulting to the last segment of the SOAP action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl RouteConfig {
    /// Value of the SOAP action header, matched case-insensitively
    pub fn soap_action(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(SOAP_ACTION_HEADER))
            .map(|(_, v)| v.trim_matches('"'))
            .filter(|v| !v.is_empty())
    }

    /// Operation this route calls
    pub fn operation_name(&self) -> Option<&str> {
        if let Some(op) = self.operation.as_deref() {
            return Some(op);
        }
        self.soap_action()
            .and_then(|action| action.trim_end_matches('/').rsplit(['/', '#']).next())
            .filter(|op| !op.is_empty())
    }

    fn resolve_relative(&mut self, base: &Path) {
        for path in [&mut self.request_template, &mut self.response_template] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        if let Some(url) = &mut self.wsdl_url {
            if !url.contains("://") && Path::new(url.as_str()).is_relative() {
                *url = base.join(url.as_str()).to_string_lossy().into_owned();
            }
        }
    }
}

impl GatewayConfig {
    /// Load a configuration file.
    ///
    /// `.yaml` and `.yml` files are read as YAML, anything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read and
    /// [`Error::Config`] when it does not deserialize or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&content)?,
            _ => Self::from_json_str(&content)?,
        };

        if let Some(base) = path.parent() {
            for route in &mut config.routes {
                route.resolve_relative(base);
            }
        }

        debug!(path = %path.display(), routes = config.routes.len(), "loaded gateway config");
        Ok(config)
    }

    /// Parse JSON configuration text
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("invalid JSON config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML configuration text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid YAML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check structural constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for duplicate or malformed route paths, an
    /// empty upstream endpoint, or a zero concurrency bound.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_concurrency == 0 {
            return Err(Error::Config("server.max_concurrency must be at least 1".to_string()));
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(Error::Config(format!(
                    "route path {:?} must start with '/'",
                    route.path
                )));
            }
            if !seen.insert(route.path.as_str()) {
                return Err(Error::Config(format!("duplicate route path {}", route.path)));
            }
            if route.soap_endpoint.trim().is_empty() {
                return Err(Error::Config(format!(
                    "route {} has an empty soap_endpoint",
                    route.path
                )));
            }
        }
        Ok(())
    }
}

/// Serde adapter for human-readable durations
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => super::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| humantime::parse_duration(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "server": {"port": 9000, "connect_timeout": "2s"},
        "validation": "enforce",
        "routes": [{
            "path": "/api/convert",
            "soap_endpoint": "http://localhost/soap",
            "request_template": "req.tmpl",
            "response_template": "resp.tmpl",
            "headers": {"SOAPAction": "https://www.w3schools.com/xml/CelsiusToFahrenheit"},
            "timeout": "1500ms"
        }]
    }"#;

    #[test]
    fn test_json_with_defaults() {
        let config = GatewayConfig::from_json_str(JSON).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.validation, ValidationPolicy::Enforce);
        assert_eq!(config.logging.level, "info");

        let route = &config.routes[0];
        assert_eq!(route.method, "POST");
        assert_eq!(route.timeout, Duration::from_millis(1500));
        assert_eq!(route.operation_name(), Some("CelsiusToFahrenheit"));
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
logging:
  level: debug
  format: json
routes:
  - path: /api/countries
    method: GET
    soap_endpoint: http://localhost/countries
    request_template: a.tmpl
    response_template: b.tmpl
    operation: ListOfCountryNamesByCode
"#;
        let config = GatewayConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.routes[0].timeout, Duration::from_secs(30));
        assert_eq!(config.routes[0].operation_name(), Some("ListOfCountryNamesByCode"));
        assert_eq!(config.routes[0].soap_action(), None);
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let route = r#"{"path": "/a", "soap_endpoint": "http://x", "request_template": "r", "response_template": "s"}"#;
        let json = format!(r#"{{"routes": [{route}, {route}]}}"#);
        let err = GatewayConfig::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("duplicate route path /a"));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let json = r#"{"server": {"connect_timeout": "soon"}}"#;
        assert!(matches!(GatewayConfig::from_json_str(json), Err(Error::Config(_))));
    }

    #[test]
    fn test_operation_from_action_variants() {
        let mut route: RouteConfig = serde_json::from_str(
            r#"{"path": "/a", "soap_endpoint": "http://x", "request_template": "r", "response_template": "s",
                "headers": {"soapaction": "\"urn:svc#DoThing\""}}"#,
        )
        .unwrap();
        assert_eq!(route.soap_action(), Some("urn:svc#DoThing"));
        assert_eq!(route.operation_name(), Some("DoThing"));

        route.headers.clear();
        assert_eq!(route.operation_name(), None);
    }

    #[test]
    fn test_load_resolves_relative_templates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        std::fs::write(&path, JSON).unwrap();

        let config = GatewayConfig::load(&path).unwrap();
        assert_eq!(config.routes[0].request_template, dir.path().join("req.tmpl"));
    }

    #[test]
    fn test_load_resolves_local_wsdl_but_not_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(
            &path,
            r#"
routes:
  - path: /local
    soap_endpoint: http://x
    request_template: r.tmpl
    response_template: s.tmpl
    wsdl_url: service.wsdl
  - path: /remote
    soap_endpoint: http://x
    request_template: r.tmpl
    response_template: s.tmpl
    wsdl_url: http://example.com/service?wsdl
"#,
        )
        .unwrap();

        let config = GatewayConfig::load(&path).unwrap();
        let local = dir.path().join("service.wsdl").to_string_lossy().into_owned();
        assert_eq!(config.routes[0].wsdl_url.as_deref(), Some(local.as_str()));
        assert_eq!(
            config.routes[1].wsdl_url.as_deref(),
            Some("http://example.com/service?wsdl")
        );
    }
}
