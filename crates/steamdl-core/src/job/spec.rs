//! Submission input and its validated form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::JobError;
use super::target::AppTarget;

/// Raw submission as received from an adapter.
///
/// Nothing here is trusted; [`JobSpec::validate`] turns it into a
/// [`ValidatedSpec`] or rejects it without side effects.
#[derive(Clone, Default, Deserialize)]
pub struct JobSpec {
    /// Bare app id or store URL.
    pub target: String,
    /// Explicit login mode. `None` infers from `username`.
    #[serde(default)]
    pub anonymous: Option<bool>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub steam_guard_code: Option<String>,
    /// Verify installed files after download.
    #[serde(default)]
    pub validate: bool,
    /// Platform to force (`windows`, `macos`, `linux`).
    #[serde(default)]
    pub platform: Option<String>,
    /// Beta branch name.
    #[serde(default)]
    pub beta: Option<String>,
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("target", &self.target)
            .field("anonymous", &self.anonymous)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "steam_guard_code",
                &self.steam_guard_code.as_ref().map(|_| "<redacted>"),
            )
            .field("validate", &self.validate)
            .field("platform", &self.platform)
            .field("beta", &self.beta)
            .finish()
    }
}

impl JobSpec {
    /// Submission for an anonymous download of `target`.
    pub fn anonymous(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            anonymous: Some(true),
            ..Self::default()
        }
    }

    /// Validate every field, returning the typed spec.
    pub fn validate(self) -> Result<ValidatedSpec, JobError> {
        let target = AppTarget::parse(&self.target)?;

        let blank = |value: &Option<String>| value.as_deref().is_none_or(|v| v.trim().is_empty());
        let anonymous = self.anonymous.unwrap_or_else(|| blank(&self.username));

        let (credential, credentials) = if anonymous {
            if !blank(&self.username) || !blank(&self.password) || !blank(&self.steam_guard_code) {
                return Err(JobError::invalid_spec(
                    "anonymous login does not accept credentials",
                ));
            }
            (CredentialMode::Anonymous, None)
        } else {
            let username = self
                .username
                .ok_or_else(|| JobError::invalid_spec("username is required"))?;
            check_token("username", &username)?;
            let password = self
                .password
                .filter(|p| !p.is_empty())
                .ok_or_else(|| JobError::invalid_spec("password is required"))?;
            check_secret("password", &password)?;
            let guard_code = match self.steam_guard_code {
                Some(code) if code.trim().is_empty() => None,
                Some(code) => {
                    let code = code.trim().to_string();
                    if !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
                        return Err(JobError::invalid_spec(
                            "steam_guard_code must be alphanumeric",
                        ));
                    }
                    Some(code)
                }
                None => None,
            };
            (
                CredentialMode::Account {
                    username: username.clone(),
                },
                Some(Credentials {
                    username,
                    password,
                    guard_code,
                }),
            )
        };

        let platform = match self.platform.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<Platform>()?),
        };

        let beta = match self.beta {
            Some(branch) if branch.is_empty() => None,
            Some(branch) => {
                check_token("beta", &branch)?;
                Some(branch)
            }
            None => None,
        };

        Ok(ValidatedSpec {
            target,
            requested_target: self.target,
            credential,
            credentials,
            options: JobOptions {
                validate: self.validate,
                platform,
                beta,
            },
        })
    }
}

/// A single steamcmd argument: non-empty, no whitespace, not a `+command`.
fn check_token(field: &str, value: &str) -> Result<(), JobError> {
    if value.is_empty() {
        return Err(JobError::invalid_spec(format!("{field} must not be empty")));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(JobError::invalid_spec(format!(
            "{field} must not contain whitespace"
        )));
    }
    if value.starts_with('+') {
        return Err(JobError::invalid_spec(format!(
            "{field} must not start with '+'"
        )));
    }
    Ok(())
}

fn check_secret(field: &str, value: &str) -> Result<(), JobError> {
    if value.starts_with('+') {
        return Err(JobError::invalid_spec(format!(
            "{field} must not start with '+'"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(JobError::invalid_spec(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

/// A submission that passed validation.
#[derive(Clone, Debug)]
pub struct ValidatedSpec {
    pub target: AppTarget,
    /// The identifier as submitted (number or store URL).
    pub requested_target: String,
    pub credential: CredentialMode,
    /// Secrets for account logins. Held next to the record, never serialized.
    pub credentials: Option<Credentials>,
    pub options: JobOptions,
}

/// Login mode recorded on the job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CredentialMode {
    Anonymous,
    Account { username: String },
}

/// Account secrets for a non-anonymous login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub guard_code: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("guard_code", &self.guard_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Download options passed through to steamcmd.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default)]
    pub validate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<String>,
}

/// Platform type steamcmd can be forced to download for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
}

impl Platform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Macos => "macos",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "macos" | "osx" => Ok(Self::Macos),
            "linux" => Ok(Self::Linux),
            other => Err(JobError::invalid_spec(format!("unknown platform: {other}"))),
        }
    }
}
