//! JSON-file job persistence.
//!
//! Each record lives at `<storage_root>/<job_id>/job.json`, next to the
//! job's content and log. Writes go through a temp file and a rename.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use steamdl_core::{Job, JobId, JobStateRepositoryPort, RepositoryError};
use tokio::fs;
use tracing::warn;

const RECORD_FILE: &str = "job.json";

#[derive(Debug, Clone)]
pub struct JsonStateFileRepository {
    root: PathBuf,
}

impl JsonStateFileRepository {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            root: storage_root.into(),
        }
    }

    fn record_path(&self, id: &JobId) -> PathBuf {
        self.root.join(id.to_string()).join(RECORD_FILE)
    }
}

fn storage(path: &Path, e: &io::Error) -> RepositoryError {
    RepositoryError::Storage(format!("{}: {e}", path.display()))
}

#[async_trait]
impl JobStateRepositoryPort for JsonStateFileRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        let path = self.record_path(&job.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage(parent, &e))?;
        }

        let mut record = job.clone();
        record.progress = None;
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(|e| storage(&tmp, &e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage(&path, &e))
    }

    async fn remove(&self, id: &JobId) -> Result<(), RepositoryError> {
        let path = self.record_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage(&path, &e)),
        }
    }

    async fn load_all(&self) -> Result<Vec<Job>, RepositoryError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage(&self.root, &e)),
        };

        let mut jobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage(&self.root, &e))?
        {
            let path = entry.path().join(RECORD_FILE);
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(storage(&path, &e)),
            };
            match serde_json::from_slice::<Job>(&bytes) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable job record"),
            }
        }

        jobs.sort_by_key(|job| job.submitted_at);
        Ok(jobs)
    }
}
