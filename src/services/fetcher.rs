use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::models::job::{Artifact, JobId, JobKind, OutputFormat};
use crate::services::job_store::JobStore;

/// Input handed to a fetcher for one job.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub job_id: JobId,
    pub source_url: String,
    pub kind: JobKind,
    pub format: OutputFormat,
    /// Job-private directory the artifact must be written into.
    pub workdir: PathBuf,
}

/// Write-only progress channel from a fetcher back into the job store.
///
/// Values are clamped to 0..=99; only the Finished transition reports 100.
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<JobStore>,
    job_id: JobId,
}

impl ProgressReporter {
    pub fn new(store: Arc<JobStore>, job_id: JobId) -> Self {
        Self { store, job_id }
    }

    pub fn report(&self, percent: f64) {
        if !percent.is_finite() {
            return;
        }
        let percent = percent.clamp(0.0, 99.0) as u8;
        // An evicted job has nobody left to observe it.
        let _ = self.store.update(self.job_id, |job| job.advance(percent));
    }
}

/// The pluggable download/transcode capability.
///
/// Implementations may be dropped mid-flight (cancellation, watchdog), so they
/// must not leave detached work behind: child processes are spawned with
/// `kill_on_drop`.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &ProgressReporter,
    ) -> Result<Artifact, FetchError>;

    /// Short description of the backing tool, for health checks.
    async fn health_check(&self) -> Result<String, FetchError> {
        Ok("ok".to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to launch downloader: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Exited { code: Option<i32>, message: String },

    #[error("download produced no {0} file")]
    NoOutput(String),

    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("{0}")]
    Cancelled(String),
}
