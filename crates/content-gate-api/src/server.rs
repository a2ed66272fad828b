//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. Request deadline, answered with a `request_timeout` error body
//! 4. Body size limit (webhook route only)
//! 5. Handler execution
//!
//! # Graceful Shutdown
//!
//! On SIGTERM or CTRL+C the server stops accepting connections and waits
//! for in-flight requests before returning.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use content_gate_core::{
    CacheInvalidator, Clock, NoOpInvalidator, ReplayGuard, SignatureVerifier, WebhookGate,
};
use content_gate_invalidator::HttpInvalidator;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{config::Config, error, handlers};

/// Path the content source posts change notifications to.
pub const WEBHOOK_PATH: &str = "/webhooks/content-change";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The intake gate
    pub gate: Arc<WebhookGate>,
    /// Clock used for response timestamps
    pub clock: Arc<dyn Clock>,
    /// Per-request deadline enforced by the HTTP layer
    pub request_timeout: Duration,
}

impl AppState {
    /// Creates state around an already wired gate.
    pub fn new(gate: Arc<WebhookGate>, clock: Arc<dyn Clock>) -> Self {
        Self { gate, clock, request_timeout: Duration::from_secs(30) }
    }

    /// Sets the HTTP request deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Wires the gate and its collaborators from configuration.
    ///
    /// Uses the HTTP invalidator when `INVALIDATION_URL` is set and a
    /// no-op invalidator otherwise.
    ///
    /// # Errors
    ///
    /// Fails if the secret is missing or any component rejects its
    /// configuration.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let verifier = SignatureVerifier::new(config.webhook_secret()?, &config.signature_header)
            .context("Failed to create signature verifier")?;

        let invalidator: Arc<dyn CacheInvalidator> = match config.to_invalidator_config() {
            Some(invalidator_config) => {
                let invalidator = HttpInvalidator::new(invalidator_config)
                    .context("Failed to create cache invalidator")?;
                info!(url = %invalidator.url(), "HTTP cache invalidation enabled");
                Arc::new(invalidator)
            },
            None => {
                warn!("INVALIDATION_URL not set, changes will be acknowledged without invalidation");
                Arc::new(NoOpInvalidator::new())
            },
        };

        let replay = Arc::new(ReplayGuard::new(config.to_replay_config(), clock.clone()));
        let gate =
            WebhookGate::new(verifier, replay, invalidator, clock.clone(), config.to_gate_config())
                .context("Failed to create webhook gate")?;

        Ok(Self::new(Arc::new(gate), clock).with_request_timeout(config.request_timeout()))
    }
}

/// Creates the Axum router with all routes and middleware.
///
/// Only the webhook and probe routes exist; anything else, including the
/// storefront's old debug endpoints, falls through to 404.
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check));

    let webhook_routes = Router::new()
        .route(WEBHOOK_PATH, post(handlers::content_change_webhook))
        .layer(DefaultBodyLimit::max(state.gate.config().max_payload_bytes));

    Router::new()
        .merge(health_routes)
        .merge(webhook_routes)
        .layer(middleware::from_fn_with_state(state.clone(), enforce_request_deadline))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware bounding each request by `AppState::request_timeout`.
///
/// Identical deliveries queue behind a stalled holder one after another,
/// so a waiter can outlive a single emit timeout. Dropping the handler
/// future releases any reservation it holds.
async fn enforce_request_deadline(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    match tokio::time::timeout(state.request_timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(
                %method,
                %path,
                timeout = ?state.request_timeout,
                "Request exceeded deadline"
            );
            error::deadline_exceeded()
        },
    }
}

/// Middleware to inject request ID into all responses.
///
/// Adds X-Request-Id header for tracing requests across services.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let span = info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Starts the HTTP server with graceful shutdown support.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound or serving
/// fails.
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let app = create_router(state);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("HTTP server listening on {}", actual_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
