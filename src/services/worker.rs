use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::models::job::{JobId, JobSpec, JobStatus};
use crate::services::fetcher::{FetchError, FetchRequest, MediaFetcher, ProgressReporter};
use crate::services::job_store::{JobStore, StoreError};

/// Worker pool tuning.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Root under which each job gets its own work directory.
    pub artifact_root: PathBuf,
    /// Maximum number of Running jobs; `None` starts every job immediately.
    pub max_concurrent: Option<usize>,
    /// Watchdog bound on a single execution.
    pub job_timeout: Option<Duration>,
}

/// Runs one fetch per job, off the request path, reporting back through the
/// job store.
pub struct WorkerPool {
    store: Arc<JobStore>,
    fetcher: Arc<dyn MediaFetcher>,
    permits: Option<Arc<Semaphore>>,
    settings: WorkerSettings,
    cancellations: Mutex<HashMap<JobId, CancellationToken>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        store: Arc<JobStore>,
        fetcher: Arc<dyn MediaFetcher>,
        settings: WorkerSettings,
    ) -> Self {
        let permits = settings
            .max_concurrent
            .map(|n| Arc::new(Semaphore::new(n.clamp(1, Semaphore::MAX_PERMITS))));
        Self {
            store,
            fetcher,
            permits,
            settings,
            cancellations: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn MediaFetcher> {
        &self.fetcher
    }

    /// Spawn the execution for a freshly created Queued job. Returns at once.
    pub fn start(self: &Arc<Self>, job_id: JobId, spec: JobSpec) {
        let cancel = self.shutdown.child_token();
        self.cancellations.lock().insert(job_id, cancel.clone());

        let pool = Arc::clone(self);
        let span = tracing::info_span!("job", job_id = %job_id);
        tokio::spawn(
            async move {
                pool.run(job_id, spec, cancel).await;
                pool.cancellations.lock().remove(&job_id);
            }
            .instrument(span),
        );
    }

    /// Fail a job that has not reached a terminal state and stop its worker.
    ///
    /// Returns the status the job was in when cancelled.
    pub fn cancel(&self, job_id: JobId, reason: &str) -> Result<Option<JobStatus>, StoreError> {
        let previous = self.store.update(job_id, |job| {
            let status = job.status;
            job.fail(reason).then_some(status)
        })?;
        if previous.is_some() {
            if let Some(token) = self.cancellations.lock().get(&job_id) {
                token.cancel();
            }
            tracing::info!(job_id = %job_id, reason, "Job cancelled");
            metrics::counter!("media_jobs_failed_total").increment(1);
        }
        Ok(previous)
    }

    /// Cancel every in-flight execution and fail the jobs still open.
    pub fn shutdown(&self) {
        let active = self.store.list_active();
        tracing::info!(in_flight = active.len(), "Stopping download workers");
        self.shutdown.cancel();
        for job_id in active {
            let _ = self.cancel(job_id, SHUTDOWN_REASON);
        }
    }

    async fn run(&self, job_id: JobId, spec: JobSpec, cancel: CancellationToken) {
        // Held for the lifetime of the execution; the job stays Queued until
        // one is available.
        let _permit = match &self.permits {
            Some(permits) => {
                tokio::select! {
                    permit = Arc::clone(permits).acquire_owned() => permit.ok(),
                    _ = cancel.cancelled() => {
                        self.fail(job_id, cancel_reason(&self.shutdown));
                        return;
                    }
                }
            }
            None => None,
        };

        match self.store.update(job_id, |job| job.start()) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Job already terminal before start, skipping");
                return;
            }
            Err(_) => {
                tracing::warn!("Job evicted before start");
                return;
            }
        }

        tracing::info!(url = %spec.source_url, kind = ?spec.kind, format = %spec.format, "Download started");
        metrics::gauge!("media_jobs_running").increment(1.0);
        let started = Instant::now();

        let workdir = self.settings.artifact_root.join(job_id.to_string());
        let outcome = self.execute(job_id, spec, &workdir, &cancel).await;

        metrics::gauge!("media_jobs_running").decrement(1.0);
        metrics::histogram!("media_job_duration_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(artifact) => {
                let filename = artifact.filename.clone();
                let size_bytes = artifact.size_bytes;
                match self.store.update(job_id, |job| job.finish(artifact)) {
                    Ok(true) => {
                        metrics::counter!("media_jobs_finished_total").increment(1);
                        tracing::info!(
                            filename = %filename,
                            size_bytes,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Download finished"
                        );
                    }
                    // Cancelled while the fetch was completing.
                    _ => remove_workdir(&workdir).await,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Download failed");
                self.fail(job_id, e.to_string());
                remove_workdir(&workdir).await;
            }
        }
    }

    async fn execute(
        &self,
        job_id: JobId,
        spec: JobSpec,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<crate::models::job::Artifact, FetchError> {
        tokio::fs::create_dir_all(workdir).await?;

        let request = FetchRequest {
            job_id,
            source_url: spec.source_url,
            kind: spec.kind,
            format: spec.format,
            workdir: workdir.to_path_buf(),
        };
        let reporter = ProgressReporter::new(Arc::clone(&self.store), job_id);
        let fetch = self.fetcher.fetch(&request, &reporter);

        let bounded = async {
            match self.settings.job_timeout {
                Some(limit) => tokio::time::timeout(limit, fetch)
                    .await
                    .unwrap_or(Err(FetchError::TimedOut(limit))),
                None => fetch.await,
            }
        };

        tokio::select! {
            outcome = bounded => outcome,
            _ = cancel.cancelled() => Err(FetchError::Cancelled(cancel_reason(&self.shutdown).to_string())),
        }
    }

    fn fail(&self, job_id: JobId, reason: impl Into<String>) {
        if let Ok(true) = self.store.update(job_id, |job| job.fail(reason)) {
            metrics::counter!("media_jobs_failed_total").increment(1);
        }
    }
}

const SHUTDOWN_REASON: &str = "server shutting down";

fn cancel_reason(shutdown: &CancellationToken) -> &'static str {
    if shutdown.is_cancelled() {
        SHUTDOWN_REASON
    } else {
        "cancelled by client"
    }
}

pub(crate) async fn remove_workdir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove work directory"),
    }
}
