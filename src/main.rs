//! Content gate service.
//!
//! Main entry point. Loads configuration, refuses to start without a
//! webhook secret, wires the gate and serves until shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use content_gate_api::{start_server, AppState, Config};
use content_gate_core::{Clock, RealClock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Refusing to start")?;
    init_tracing(&config.rust_log)?;

    info!("Starting content gate");
    info!(
        webhook_secret = config.secret_status(),
        signature_header = %config.signature_header,
        max_payload_bytes = config.max_payload_bytes,
        replay_retention_seconds = config.replay_retention_seconds,
        replay_max_entries = config.replay_max_entries,
        emit_timeout_ms = config.emit_timeout_ms,
        invalidation_url = config.invalidation_url.as_deref().unwrap_or("none"),
        invalidation_token = config.token_status(),
        "Configuration loaded"
    );

    let addr = config.parse_server_addr()?;
    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let state = AppState::from_config(&config, clock)?;

    let shutdown = CancellationToken::new();
    let sweeper = Arc::clone(state.gate.replay_guard())
        .spawn_sweeper(config.sweep_interval(), shutdown.clone());

    info!(%addr, "Content gate is ready to receive webhooks");
    let served = start_server(state, addr).await.context("HTTP server failed");

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Replay guard sweeper did not stop cleanly");
    }

    served?;
    info!("Content gate shutdown complete");
    Ok(())
}

/// Initializes tracing, preferring `RUST_LOG` from the environment over
/// the configured level.
fn init_tracing(configured: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true).with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}
