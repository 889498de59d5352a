//! Download request and query DTOs.

use serde::Deserialize;
use steamdl_core::JobSpec;

/// An app id given as a JSON number or string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AppIdInput {
    Number(u64),
    Text(String),
}

/// Body of `POST /api/downloads`.
///
/// Either `app_id` or `target` (a bare id or store URL) names the app;
/// `app_id` wins when both are present.
#[derive(Default, Deserialize)]
pub struct SubmitDownloadRequest {
    #[serde(default)]
    pub app_id: Option<AppIdInput>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub anonymous: Option<bool>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub steam_guard_code: Option<String>,
    #[serde(default)]
    pub validate: bool,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub beta: Option<String>,
}

impl From<SubmitDownloadRequest> for JobSpec {
    fn from(req: SubmitDownloadRequest) -> Self {
        let target = match req.app_id {
            Some(AppIdInput::Number(n)) => n.to_string(),
            Some(AppIdInput::Text(s)) => s,
            None => req.target.unwrap_or_default(),
        };
        Self {
            target,
            anonymous: req.anonymous,
            username: req.username,
            password: req.password,
            steam_guard_code: req.steam_guard_code,
            validate: req.validate,
            platform: req.platform,
            beta: req.beta,
        }
    }
}

/// Query for `GET /api/downloads/{id}/logs` and its stream.
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    /// First sequence number to return.
    #[serde(default)]
    pub since: u64,
}
