//! HTTP surface
//!
//! `GET /health` reports route and bound state. Every other request goes
//! to the fallback handler, which resolves the route from the registry.

use crate::bound::{ConcurrencyBound, RequestContext};
use crate::compile::{CompileReport, RouteCompiler};
use crate::config::GatewayConfig;
use crate::dispatcher::Dispatcher;
use crate::hints::WsdlTypeHints;
use crate::registry::RouteRegistry;
use crate::transport::HttpTransport;
use crate::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use soapgw_schema::OperationCache;
use soapgw_validation::PathValidator;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared state of the HTTP surface
#[derive(Clone)]
pub struct Gateway {
    dispatcher: Arc<Dispatcher>,
    request_deadline: Option<Duration>,
}

impl Gateway {
    pub fn new(dispatcher: Arc<Dispatcher>, request_deadline: Option<Duration>) -> Self {
        Self {
            dispatcher,
            request_deadline,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    fn context(&self, cancel: CancellationToken) -> RequestContext {
        let ctx = RequestContext::new(cancel);
        match self.request_deadline {
            Some(deadline) => ctx.with_deadline(tokio::time::Instant::now() + deadline),
            None => ctx,
        }
    }
}

pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(handle)
        .with_state(gateway)
}

async fn health(State(gateway): State<Gateway>) -> impl IntoResponse {
    let dispatcher = gateway.dispatcher();
    Json(json!({
        "status": "ok",
        "routes": dispatcher.registry().paths(),
        "bound": dispatcher.bound().stats(),
    }))
}

async fn handle(State(gateway): State<Gateway>, method: Method, uri: Uri, body: Bytes) -> Response {
    // dropped with this future when the client goes away
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let ctx = gateway.context(cancel);

    match gateway
        .dispatcher
        .dispatch(&ctx, method.as_str(), uri.path(), &body)
        .await
    {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Err(e) => {
            let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(e.to_json())).into_response()
        }
    }
}

/// Compile every configured route and assemble the gateway.
///
/// Routes that fail to compile are listed in the report and not served.
///
/// # Errors
///
/// Fails when the configuration is invalid or the HTTP client cannot be
/// built.
pub async fn build_gateway(config: &GatewayConfig) -> Result<(Gateway, CompileReport)> {
    config.validate()?;

    let registry = Arc::new(RouteRegistry::with_hint_source(Arc::new(WsdlTypeHints::default())));
    let compiler = RouteCompiler::new(
        Arc::new(OperationCache::default()),
        Arc::new(PathValidator::new()),
        config.validation,
    );
    let report = compiler.compile_all(&registry, &config.routes).await;

    let transport = Arc::new(HttpTransport::new(config.server.connect_timeout)?);
    let bound = ConcurrencyBound::new(config.server.max_concurrency);
    let dispatcher = Arc::new(Dispatcher::new(registry, transport, bound));

    Ok((Gateway::new(dispatcher, config.server.request_deadline), report))
}

/// Serve the gateway until `shutdown` resolves.
///
/// # Errors
///
/// Fails when setup fails or the listener cannot be bound.
pub async fn serve<F>(config: GatewayConfig, shutdown: F) -> Result<CompileReport>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (gateway, report) = build_gateway(&config).await?;
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        routes = report.registered.len(),
        max_concurrency = config.server.max_concurrency,
        "gateway listening"
    );

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("gateway stopped");
    Ok(report)
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
