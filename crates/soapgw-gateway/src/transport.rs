//! Upstream SOAP transport

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Content type of every SOAP request, applied after route headers
pub const SOAP_CONTENT_TYPE: &str = "text/xml;charset=UTF-8";

/// A rendered envelope ready to send
#[derive(Debug, Clone)]
pub struct SoapRequest {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub timeout: Duration,
}

/// Raw upstream reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    pub status: u16,
    pub body: String,
}

impl SoapResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("connection to {endpoint} failed: {message}")]
    Connect { endpoint: String, message: String },

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("upstream exchange failed: {0}")]
    Io(String),
}

/// Sends a SOAP envelope and returns the raw reply
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: SoapRequest) -> Result<SoapResponse, TransportError>;
}

/// [`Transport`] over HTTP(S). Never retries.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose client gives up connecting after `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Fails when the TLS backend cannot be initialised.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        map.insert(name, value);
    }
    map.insert(CONTENT_TYPE, HeaderValue::from_static(SOAP_CONTENT_TYPE));
    Ok(map)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: SoapRequest) -> Result<SoapResponse, TransportError> {
        let headers = header_map(&request.headers)?;
        let start = Instant::now();

        let result = self
            .client
            .post(&request.endpoint)
            .headers(headers)
            .timeout(request.timeout)
            .body(request.body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(endpoint = %request.endpoint, error = %e, "SOAP request failed");
                return Err(if e.is_timeout() {
                    TransportError::Timeout(request.timeout)
                } else if e.is_connect() {
                    TransportError::Connect {
                        endpoint: request.endpoint,
                        message: e.to_string(),
                    }
                } else {
                    TransportError::Io(e.to_string())
                });
            }
        };

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(request.timeout)
            } else {
                TransportError::Io(e.to_string())
            }
        })?;

        debug!(
            endpoint = %request.endpoint,
            status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "SOAP request completed"
        );
        Ok(SoapResponse { status, body })
    }
}
