//! Data Transfer Objects (DTOs) for the HTTP API contract.
//!
//! Responses reuse the serializable domain types (`Job`, `LogPage`,
//! `SystemSnapshot`); only request shapes live here.

pub mod job;

pub use job::{AppIdInput, LogsQuery, SubmitDownloadRequest};
