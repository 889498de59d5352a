//! steamcmd integration.
//!
//! [`SteamCmd`] implements [`JobCommandPort`]: it knows where the executable
//! lives and how to turn a job into a steamcmd command line. First-time
//! installation lives in [`install`].

pub mod install;

use std::path::{Path, PathBuf};

use steamdl_core::{CommandPlan, CredentialMode, JobCommandPort, LaunchRequest, PlanError};

pub use install::{InstallError, STEAMCMD_ARCHIVE_URL, ensure_installed};

#[cfg(windows)]
const EXECUTABLE: &str = "steamcmd.exe";
#[cfg(not(windows))]
const EXECUTABLE: &str = "steamcmd.sh";

/// A steamcmd installation directory.
#[derive(Debug, Clone)]
pub struct SteamCmd {
    dir: PathBuf,
    executable: PathBuf,
}

impl SteamCmd {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let executable = dir.join(EXECUTABLE);
        Self { dir, executable }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn is_installed(&self) -> bool {
        self.executable.is_file()
    }
}

impl JobCommandPort for SteamCmd {
    fn plan(&self, request: &LaunchRequest<'_>) -> Result<CommandPlan, PlanError> {
        let job = request.job;
        let mut plan = CommandPlan::new(&self.executable).current_dir(&self.dir);

        if let Some(platform) = job.options.platform {
            plan = plan
                .arg("+@sSteamCmdForcePlatformType")
                .arg(platform.as_str());
        }

        plan = plan
            .arg("+force_install_dir")
            .arg(job.destination.display().to_string())
            .arg("+login");

        plan = match &job.credential {
            CredentialMode::Anonymous => plan.arg("anonymous"),
            CredentialMode::Account { username } => {
                let creds = request
                    .credentials
                    .filter(|c| &c.username == username)
                    .ok_or_else(|| PlanError::MissingCredentials {
                        username: username.clone(),
                    })?;
                let plan = plan.arg(&creds.username).secret_arg(&creds.password);
                match &creds.guard_code {
                    Some(code) => plan.secret_arg(code),
                    None => plan,
                }
            }
        };

        plan = plan.arg("+app_update").arg(job.target.to_string());
        if let Some(beta) = &job.options.beta {
            plan = plan.arg("-beta").arg(beta);
        }
        if job.options.validate {
            plan = plan.arg("validate");
        }

        Ok(plan.arg("+quit"))
    }
}
