//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the decision and health handlers
//! - Wire up middleware (timeout, tracing, request ID, hardening headers)
//! - Bind server to listener and stop on the shutdown signal

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    response::Response,
    routing::{any, get},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ListenerConfig;
use crate::decision::DecisionPipeline;
use crate::health;
use crate::http::request::{request_id, MakeRequestUuid};
use crate::http::response::{decision_response, health_response, internal_error};
use crate::observability::metrics;

const HSTS: &str = "max-age=31536000; includeSubDomains";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DecisionPipeline>,
}

/// HTTP server for authorization decisions.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(pipeline: Arc<DecisionPipeline>, listener: &ListenerConfig) -> Self {
        let state = AppState { pipeline };
        let router = Self::build_router(state, Duration::from_secs(listener.request_timeout_secs));
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/", any(decision_handler))
            .route("/{*path}", any(decision_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("SAMEORIGIN"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static(HSTS),
            ))
    }

    /// The router, for serving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Decision endpoint consumed by the ingress auth subrequest.
async fn decision_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, _body) = request.into_parts();

    match state
        .pipeline
        .decide(&parts.method, &parts.uri, &parts.headers, peer)
        .await
    {
        Ok(decision) => decision_response(&decision),
        Err(e) => {
            tracing::error!(
                request_id = %request_id(&parts.headers),
                path = %parts.uri.path(),
                error = %e,
                "Failed to process decision request"
            );
            metrics::record_auth_request("unknown", 500);
            internal_error()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    health_response(health::check(state.pipeline.authenticator()).await)
}
