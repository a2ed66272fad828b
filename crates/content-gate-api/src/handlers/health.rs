//! Health check handlers for service monitoring.
//!
//! The gate has no external dependency it must reach to accept traffic,
//! so health reports on the replay guard only.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use content_gate_core::{Clock, ReplayGuard};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::server::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Individual component health checks
    pub checks: HealthChecks,
    /// Service version information
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Replay guard is at capacity; old entries are being evicted early
    Degraded,
}

/// Individual component health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Replay guard occupancy
    pub replay_guard: ReplayGuardHealth,
}

/// Replay guard occupancy.
#[derive(Debug, Serialize)]
pub struct ReplayGuardHealth {
    /// Remembered deliveries
    pub entries: usize,
    /// Configured maximum
    pub capacity: usize,
    /// Retention window in seconds
    pub retention_secs: u64,
}

/// Health service that encapsulates the clock for testable health checks.
pub struct HealthService {
    clock: Arc<dyn Clock>,
}

impl HealthService {
    /// Creates a new health service with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Reports the replay guard's occupancy.
    pub fn health_check(&self, replay: &ReplayGuard) -> HealthResponse {
        let config = replay.config();
        let entries = replay.len();

        let status =
            if entries >= config.max_entries { HealthStatus::Degraded } else { HealthStatus::Healthy };

        HealthResponse {
            status,
            timestamp: self.clock.now_utc(),
            checks: HealthChecks {
                replay_guard: ReplayGuardHealth {
                    entries,
                    capacity: config.max_entries,
                    retention_secs: config.retention.as_secs(),
                },
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check endpoint handler.
///
/// Cheap enough for load balancers to poll frequently.
#[instrument(name = "health_check", skip(app_state))]
pub async fn health_check(State(app_state): State<AppState>) -> Response {
    let response =
        HealthService::new(app_state.clock.clone()).health_check(app_state.gate.replay_guard());

    debug!(
        status = ?response.status,
        replay_entries = response.checks.replay_guard.entries,
        "Health check completed"
    );

    (StatusCode::OK, Json(response)).into_response()
}

/// Readiness check endpoint for Kubernetes probes.
///
/// The gate is ready as soon as it is serving; a full replay guard still
/// accepts traffic.
#[instrument(name = "readiness_check", skip(app_state))]
pub async fn readiness_check(State(app_state): State<AppState>) -> Response {
    health_check(State(app_state)).await
}

/// Liveness check endpoint for Kubernetes probes.
#[instrument(name = "liveness_check", skip(app_state))]
pub async fn liveness_check(State(app_state): State<AppState>) -> Response {
    let response = serde_json::json!({
        "status": "alive",
        "timestamp": app_state.clock.now_utc(),
        "service": "content-gate"
    });

    (StatusCode::OK, Json(response)).into_response()
}
