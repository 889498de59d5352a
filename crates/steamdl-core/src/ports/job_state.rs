//! Job state repository port definition.
//!
//! # Persistence Scope
//!
//! **Persisted:** the serializable [`Job`] record (status, timestamps,
//! outcome). **In-memory only:** captured log ring, live progress and
//! account secrets.

use async_trait::async_trait;

use super::RepositoryError;
use crate::job::{Job, JobId};

/// Port for persisting job records across restarts.
#[async_trait]
pub trait JobStateRepositoryPort: Send + Sync {
    /// Insert or overwrite the record for `job.id`.
    async fn save(&self, job: &Job) -> Result<(), RepositoryError>;

    /// Forget a deleted or pruned job.
    async fn remove(&self, id: &JobId) -> Result<(), RepositoryError>;

    /// All persisted records in submission order.
    async fn load_all(&self) -> Result<Vec<Job>, RepositoryError>;
}

/// Repository used when persistence is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopJobStateRepository;

#[async_trait]
impl JobStateRepositoryPort for NoopJobStateRepository {
    async fn save(&self, _job: &Job) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn remove(&self, _id: &JobId) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Job>, RepositoryError> {
        Ok(Vec::new())
    }
}
