//! HTTP surface for the content-change webhook gate.
//!
//! Exposes `POST /webhooks/content-change` plus health probes, and loads
//! the service configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use error::{ApiError, ErrorResponse};
pub use server::{create_router, start_server, AppState, WEBHOOK_PATH};
