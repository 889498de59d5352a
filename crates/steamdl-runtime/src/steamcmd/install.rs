//! First-time steamcmd installation.
//!
//! Valve publishes steamcmd as a small bootstrap archive; once unpacked the
//! script updates itself on first run.

use flate2::read::GzDecoder;
use futures_util::StreamExt;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::SteamCmd;

/// Linux bootstrap archive on the Valve CDN.
pub const STEAMCMD_ARCHIVE_URL: &str =
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz";

const ARCHIVE_NAME: &str = "steamcmd_linux.tar.gz";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download failed: HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive unpacked but {0} is missing")]
    MissingExecutable(PathBuf),

    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> InstallError + '_ {
    move |source| InstallError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Install steamcmd into `steamcmd.dir()` unless it is already there.
///
/// Returns `true` when an installation was performed.
pub async fn ensure_installed(steamcmd: &SteamCmd, url: &str) -> Result<bool, InstallError> {
    if steamcmd.is_installed() {
        debug!(path = %steamcmd.executable().display(), "steamcmd already installed");
        return Ok(false);
    }

    let dir = steamcmd.dir().to_path_buf();
    fs::create_dir_all(&dir).map_err(io_err(&dir))?;
    let archive = dir.join(ARCHIVE_NAME);

    info!(url, dest = %dir.display(), "downloading steamcmd");
    download(url, &archive).await?;

    let extract_dir = dir.clone();
    let extract_archive = archive.clone();
    tokio::task::spawn_blocking(move || unpack(&extract_archive, &extract_dir)).await??;

    if let Err(e) = fs::remove_file(&archive) {
        debug!(error = %e, "could not remove steamcmd archive");
    }

    if !steamcmd.is_installed() {
        return Err(InstallError::MissingExecutable(
            steamcmd.executable().to_path_buf(),
        ));
    }
    info!(path = %steamcmd.executable().display(), "steamcmd installed");
    Ok(true)
}

async fn download(url: &str, dest: &Path) -> Result<(), InstallError> {
    let response = reqwest::Client::new()
        .get(url)
        .header("User-Agent", "steamdl")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(InstallError::Status(response.status()));
    }

    let mut file = File::create(dest).map_err(io_err(dest))?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).map_err(io_err(dest))?;
    }
    file.flush().map_err(io_err(dest))?;
    Ok(())
}

/// Unpack a `.tar.gz` into `dir`, keeping file modes.
pub fn unpack(archive: &Path, dir: &Path) -> Result<(), InstallError> {
    let file = File::open(archive).map_err(io_err(archive))?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.set_preserve_permissions(true);
    tar.unpack(dir).map_err(io_err(dir))
}
