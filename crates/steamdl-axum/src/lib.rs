//! Axum web server adapter for steamdl.
//!
//! Exposes the download scheduler over HTTP: submission, lookup,
//! cancellation, buffered and live logs, job events and system status.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Dev-dependencies used only by integration tests
#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tower as _;

// Used by main.rs binary
use dotenvy as _;
use tracing_appender as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod sse;
pub mod state;

// Re-export primary types
pub use bootstrap::{
    AxumContext, CorsConfig, ServerArgs, ServerConfig, bootstrap, serve, start_server,
};
pub use error::HttpError;
pub use routes::create_router;
pub use state::AppState;
