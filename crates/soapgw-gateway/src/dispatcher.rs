//! Request dispatch
//!
//! One inbound request flows through route lookup, request rendering, the
//! upstream call, outcome classification and response rendering. The
//! upstream exchange runs inside the [`ConcurrencyBound`].

use crate::bound::{BoundError, ConcurrencyBound, RequestContext};
use crate::fault::{SoapFault, parse_fault};
use crate::registry::{RouteHandler, RouteRegistry};
use crate::transport::{SoapRequest, Transport, TransportError};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Longest upstream body excerpt written to logs
const LOG_BODY_LIMIT: usize = 2048;

/// Request-time failures. Display text is what callers see.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no route for {0}")]
    NotFound(String),

    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("upstream request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    SoapFault(SoapFault),

    #[error("SOAP service returned error (status {status})")]
    Upstream { status: u16, body: String },

    #[error("failed to convert SOAP response: {0}")]
    ResponseConversion(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// HTTP status returned to the caller
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::BadRequest(_) => 400,
            Self::Transport(_) => 502,
            Self::SoapFault(_) => 500,
            Self::Upstream { .. } => 502,
            Self::ResponseConversion(_) => 500,
            Self::Cancelled => 503,
            Self::DeadlineExceeded => 504,
            Self::Internal(_) => 500,
        }
    }

    /// `{"error": "<message>"}`
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("error".to_string(), Value::String(self.to_string()));
        Value::Object(map)
    }
}

impl From<BoundError> for DispatchError {
    fn from(e: BoundError) -> Self {
        match e {
            BoundError::Cancelled => Self::Cancelled,
            BoundError::DeadlineExceeded => Self::DeadlineExceeded,
            BoundError::TaskFailed(msg) => Self::Internal(msg),
        }
    }
}

/// Routes inbound requests to their SOAP upstreams
pub struct Dispatcher {
    registry: Arc<RouteRegistry>,
    transport: Arc<dyn Transport>,
    bound: ConcurrencyBound,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<RouteRegistry>,
        transport: Arc<dyn Transport>,
        bound: ConcurrencyBound,
    ) -> Self {
        Self {
            registry,
            transport,
            bound,
        }
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }

    pub fn bound(&self) -> &ConcurrencyBound {
        &self.bound
    }

    /// Serve one request and return the rendered JSON body.
    ///
    /// # Errors
    ///
    /// Returns the [`DispatchError`] of the first failing stage.
    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> Result<String, DispatchError> {
        let start = Instant::now();
        let result = self.dispatch_inner(ctx, method, path, body).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(route = path, method, elapsed_ms, "request served"),
            Err(e) => match e {
                DispatchError::Upstream { status, body } => error!(
                    route = path,
                    status,
                    body = %excerpt(body),
                    elapsed_ms,
                    "upstream returned error"
                ),
                DispatchError::SoapFault(fault) => warn!(
                    route = path,
                    fault_code = %fault.code,
                    fault_string = %fault.string,
                    elapsed_ms,
                    "upstream returned SOAP fault"
                ),
                other => warn!(
                    route = path,
                    status = other.status(),
                    error = %other,
                    elapsed_ms,
                    "request failed"
                ),
            },
        }
        result
    }

    async fn dispatch_inner(
        &self,
        ctx: &RequestContext,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> Result<String, DispatchError> {
        let handler = self
            .registry
            .lookup(path)
            .ok_or_else(|| DispatchError::NotFound(path.to_string()))?;

        if !handler.config.method.eq_ignore_ascii_case(method) {
            return Err(DispatchError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            });
        }

        let input = decode_body(body)?;
        let envelope = handler
            .request
            .execute(&input)
            .map_err(|e| DispatchError::BadRequest(format!("failed to render request: {e}")))?;

        let transport = self.transport.clone();
        let work = exchange(transport, handler, envelope);
        self.bound.run(ctx, work).await?
    }
}

fn decode_body(body: &[u8]) -> Result<Value, DispatchError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body)
        .map_err(|e| DispatchError::BadRequest(format!("invalid request body: {e}")))
}

/// Send the envelope, classify the reply and render the response
async fn exchange(
    transport: Arc<dyn Transport>,
    handler: Arc<RouteHandler>,
    envelope: String,
) -> Result<String, DispatchError> {
    let config = &handler.config;
    let mut headers: Vec<(String, String)> = config
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    headers.sort();

    debug!(
        route = %config.path,
        endpoint = %config.soap_endpoint,
        action = config.soap_action().unwrap_or_default(),
        "sending SOAP request"
    );

    let response = transport
        .send(SoapRequest {
            endpoint: config.soap_endpoint.clone(),
            headers,
            body: envelope,
            timeout: config.timeout,
        })
        .await?;

    if !response.is_success() {
        return Err(match parse_fault(&response.body) {
            Some(fault) => DispatchError::SoapFault(fault),
            None => DispatchError::Upstream {
                status: response.status,
                body: response.body,
            },
        });
    }

    let data = handler
        .parser
        .parse(&response.body)
        .await
        .map_err(DispatchError::ResponseConversion)?;

    handler
        .response
        .execute(&data)
        .map_err(|e| DispatchError::ResponseConversion(e.to_string()))
}

fn excerpt(body: &str) -> &str {
    if body.len() <= LOG_BODY_LIMIT {
        return body;
    }
    let mut end = LOG_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records requests and answers with a fixed reply
    struct Recording {
        reply: Result<(u16, String), ()>,
        seen: Mutex<Vec<SoapRequest>>,
    }

    impl Recording {
        fn replying(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok((status, body.to_string())),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn refusing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for Recording {
        async fn send(
            &self,
            request: crate::transport::SoapRequest,
        ) -> Result<crate::transport::SoapResponse, TransportError> {
            let endpoint = request.endpoint.clone();
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok((status, body)) => Ok(crate::transport::SoapResponse {
                    status: *status,
                    body: body.clone(),
                }),
                Err(()) => Err(TransportError::Connect {
                    endpoint,
                    message: "connection refused".to_string(),
                }),
            }
        }
    }

    const OK_ENVELOPE: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body><EchoResponse><EchoResult>hi</EchoResult></EchoResponse></soap:Body>
</soap:Envelope>"#;

    fn setup(transport: Arc<Recording>) -> (tempfile::TempDir, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("req.tmpl"), "<Echo>{{.Text}}</Echo>").unwrap();
        std::fs::write(dir.path().join("resp.tmpl"), r#"{"echo": {{json .EchoResult}}}"#).unwrap();

        let mut headers = std::collections::BTreeMap::new();
        headers.insert("SOAPAction".to_string(), "urn:Echo".to_string());
        let registry = Arc::new(RouteRegistry::new());
        registry
            .register(
                RouteConfig {
                    path: "/echo".to_string(),
                    method: "POST".to_string(),
                    soap_endpoint: "http://upstream/soap".to_string(),
                    request_template: dir.path().join("req.tmpl"),
                    response_template: dir.path().join("resp.tmpl"),
                    headers,
                    wsdl_url: None,
                    operation: None,
                    timeout: Duration::from_secs(3),
                },
                None,
            )
            .unwrap();

        let dispatcher = Dispatcher::new(registry, transport, ConcurrencyBound::new(4));
        (dir, dispatcher)
    }

    async fn dispatch(d: &Dispatcher, method: &str, path: &str, body: &str) -> Result<String, DispatchError> {
        d.dispatch(&RequestContext::default(), method, path, body.as_bytes()).await
    }

    #[tokio::test]
    async fn test_success_renders_response() {
        let transport = Recording::replying(200, OK_ENVELOPE);
        let (_dir, d) = setup(transport.clone());

        let out = dispatch(&d, "POST", "/echo", r#"{"Text": "hi"}"#).await.unwrap();
        assert_eq!(out, r#"{"echo": "hi"}"#);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].body, "<Echo>hi</Echo>");
        assert_eq!(seen[0].timeout, Duration::from_secs(3));
        assert!(seen[0].headers.contains(&("SOAPAction".to_string(), "urn:Echo".to_string())));
    }

    #[tokio::test]
    async fn test_lookup_and_method_errors() {
        let (_dir, d) = setup(Recording::replying(200, OK_ENVELOPE));
        let err = dispatch(&d, "POST", "/nope", "{}").await.unwrap_err();
        assert_eq!(err.status(), 404);
        let err = dispatch(&d, "GET", "/echo", "{}").await.unwrap_err();
        assert_eq!(err.status(), 405);
    }

    #[tokio::test]
    async fn test_bad_body_and_render_failure() {
        let transport = Recording::replying(200, OK_ENVELOPE);
        let (_dir, d) = setup(transport.clone());

        let err = dispatch(&d, "POST", "/echo", "{not json").await.unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(err.to_string().starts_with("invalid request body"));

        // empty body decodes to {} and the template needs .Text
        let err = dispatch(&d, "POST", "/echo", "").await.unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(err.to_string().starts_with("failed to render request"));

        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fault_classification() {
        let fault = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body><soap:Fault><faultcode>Server</faultcode><faultstring>Boom</faultstring></soap:Fault></soap:Body>
</soap:Envelope>"#;
        let (_dir, d) = setup(Recording::replying(500, fault));
        let err = dispatch(&d, "POST", "/echo", r#"{"Text": "x"}"#).await.unwrap_err();

        match &err {
            DispatchError::SoapFault(f) => {
                assert_eq!(f.code, "Server");
                assert_eq!(f.string, "Boom");
            }
            other => panic!("expected fault, got {other:?}"),
        }
        assert_eq!(err.status(), 500);
        assert_eq!(err.to_json(), serde_json::json!({"error": "Boom"}));
    }

    #[tokio::test]
    async fn test_non_fault_error_hides_body() {
        let (_dir, d) = setup(Recording::replying(503, "secret upstream detail"));
        let err = dispatch(&d, "POST", "/echo", r#"{"Text": "x"}"#).await.unwrap_err();

        assert!(matches!(err, DispatchError::Upstream { status: 503, .. }));
        assert_eq!(err.status(), 502);
        assert!(!err.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let (_dir, d) = setup(Recording::refusing());
        let err = dispatch(&d, "POST", "/echo", r#"{"Text": "x"}"#).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert_eq!(err.status(), 502);
    }

    #[tokio::test]
    async fn test_unparsable_success_is_conversion_error() {
        let (_dir, d) = setup(Recording::replying(200, "not xml at all"));
        let err = dispatch(&d, "POST", "/echo", r#"{"Text": "x"}"#).await.unwrap_err();
        assert!(matches!(err, DispatchError::ResponseConversion(_)));
        assert_eq!(err.status(), 500);
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let (_dir, d) = setup(Recording::replying(200, OK_ENVELOPE));
        let ctx = RequestContext::default();
        ctx.cancel.cancel();
        let err = d.dispatch(&ctx, "POST", "/echo", br#"{"Text": "x"}"#).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
        assert_eq!(err.status(), 503);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let body = "é".repeat(LOG_BODY_LIMIT);
        let cut = excerpt(&body);
        assert!(cut.len() <= LOG_BODY_LIMIT);
        assert!(body.starts_with(cut));
    }
}
