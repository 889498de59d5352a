//! HTTP request handlers for the Axum web server.
//!
//! Handlers are thin wrappers that delegate to the scheduler and reporter.

pub mod downloads;
pub mod events;
pub mod system;
