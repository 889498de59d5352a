//! Download target parsing.
//!
//! A target is a Steam application id. Users may type the id directly or
//! paste a store page URL, so both forms are accepted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use super::errors::JobError;

/// Hosts whose `/app/<id>` paths identify an application.
const STORE_HOSTS: &[&str] = &["store.steampowered.com", "steamcommunity.com"];

/// A validated Steam application id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppTarget(u32);

impl AppTarget {
    /// Create a target from a known application id.
    ///
    /// Returns `None` for `0`, which Steam never assigns.
    pub const fn new(app_id: u32) -> Option<Self> {
        if app_id == 0 { None } else { Some(Self(app_id)) }
    }

    /// The numeric application id.
    pub const fn app_id(self) -> u32 {
        self.0
    }

    /// Parse user input: a bare id (`"740"`) or a store URL.
    pub fn parse(input: &str) -> Result<Self, JobError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(JobError::invalid_spec("target identifier is empty"));
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Self::from_digits(trimmed);
        }

        Self::from_store_url(trimmed)
    }

    fn from_digits(digits: &str) -> Result<Self, JobError> {
        let id: u32 = digits
            .parse()
            .map_err(|_| JobError::invalid_spec(format!("app id out of range: {digits}")))?;
        Self::new(id).ok_or_else(|| JobError::invalid_spec("app id must be positive"))
    }

    fn from_store_url(raw: &str) -> Result<Self, JobError> {
        let url = Url::parse(raw)
            .map_err(|_| JobError::invalid_spec(format!("not an app id or store URL: {raw}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(JobError::invalid_spec(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        let host = url.host_str().unwrap_or_default();
        if !STORE_HOSTS.contains(&host) {
            return Err(JobError::invalid_spec(format!("not a Steam store URL: {host}")));
        }

        let mut segments = url.path_segments().into_iter().flatten();
        match (segments.next(), segments.next()) {
            (Some("app"), Some(id)) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => {
                Self::from_digits(id)
            }
            _ => Err(JobError::invalid_spec(format!(
                "store URL has no /app/<id> path: {raw}"
            ))),
        }
    }
}

impl fmt::Display for AppTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AppTarget {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
