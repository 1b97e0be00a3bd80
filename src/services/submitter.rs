use std::sync::Arc;

use crate::error::AppError;
use crate::models::job::{JobId, JobKind, JobSpec, OutputFormat};
use crate::services::job_store::JobStore;
use crate::services::playlist::validate_source_url;
use crate::services::worker::WorkerPool;

/// Creates job records and hands them to the worker pool.
pub struct BatchSubmitter {
    store: Arc<JobStore>,
    workers: Arc<WorkerPool>,
    max_batch_size: usize,
}

impl BatchSubmitter {
    pub fn new(store: Arc<JobStore>, workers: Arc<WorkerPool>, max_batch_size: usize) -> Self {
        Self {
            store,
            workers,
            max_batch_size,
        }
    }

    /// One job per selected playlist member, ids in input order.
    ///
    /// Entries are admitted independently: a malformed URL yields a job that
    /// is Failed from the start and does not affect its siblings.
    pub fn submit(&self, urls: &[String], format: OutputFormat) -> Result<Vec<JobId>, AppError> {
        if urls.is_empty() {
            return Err(AppError::Validation("no videos selected".to_string()));
        }
        if urls.len() > self.max_batch_size {
            return Err(AppError::Validation(format!(
                "too many videos selected ({}, maximum is {})",
                urls.len(),
                self.max_batch_size
            )));
        }

        let ids: Vec<JobId> = urls
            .iter()
            .map(|url| {
                self.admit(JobSpec {
                    kind: JobKind::PlaylistMember,
                    format,
                    source_url: url.trim().to_string(),
                })
            })
            .collect();

        tracing::info!(count = ids.len(), format = %format, "Batch submitted");
        Ok(ids)
    }

    /// A single job from a direct submission.
    pub fn submit_one(&self, spec: JobSpec) -> JobId {
        self.admit(JobSpec {
            source_url: spec.source_url.trim().to_string(),
            ..spec
        })
    }

    fn admit(&self, spec: JobSpec) -> JobId {
        metrics::counter!("media_jobs_submitted_total").increment(1);
        match validate_source_url(&spec.source_url) {
            Ok(_) => {
                let id = self.store.create(spec.clone());
                tracing::debug!(job_id = %id, url = %spec.source_url, "Job queued");
                self.workers.start(id, spec);
                id
            }
            Err(reason) => {
                let id = self.store.create_rejected(spec, reason.clone());
                metrics::counter!("media_jobs_failed_total").increment(1);
                tracing::info!(job_id = %id, reason = %reason, "Job rejected");
                id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{DownloadMode, JobStatus};
    use crate::services::fetcher::stub::StubFetcher;
    use crate::services::worker::WorkerSettings;
    use std::time::Duration;

    fn submitter(root: &std::path::Path) -> (Arc<JobStore>, BatchSubmitter) {
        let store = Arc::new(JobStore::new());
        let workers = Arc::new(WorkerPool::new(
            store.clone(),
            Arc::new(StubFetcher::instant()),
            WorkerSettings {
                artifact_root: root.to_path_buf(),
                max_concurrent: None,
                job_timeout: None,
            },
        ));
        (store.clone(), BatchSubmitter::new(store, workers, 3))
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_isolates_bad_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (store, submitter) = submitter(dir.path());
        let urls = vec![
            "https://example.com/watch?v=1".to_string(),
            "definitely not a url".to_string(),
            "https://example.com/watch?v=3".to_string(),
        ];

        let ids = submitter.submit(&urls, OutputFormat::AudioOnly).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(store.get(ids[0]).unwrap().source_url, urls[0]);
        assert_eq!(store.get(ids[2]).unwrap().source_url, urls[2]);

        let rejected = store.get(ids[1]).unwrap();
        assert_eq!(rejected.status, JobStatus::Failed);
        assert!(rejected.error.unwrap().contains("invalid URL"));

        for id in [ids[0], ids[2]] {
            for _ in 0..200 {
                if store.get(id).unwrap().status == JobStatus::Finished {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let job = store.get(id).unwrap();
            assert_eq!(job.status, JobStatus::Finished);
            assert_eq!(job.kind, JobKind::PlaylistMember);
            assert_eq!(job.format, OutputFormat::AudioOnly);
        }
    }

    #[tokio::test]
    async fn test_empty_and_oversized_batches_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (store, submitter) = submitter(dir.path());

        assert!(matches!(
            submitter.submit(&[], OutputFormat::Video),
            Err(AppError::Validation(_))
        ));
        let too_many: Vec<String> = (0..4).map(|i| format!("https://example.com/{i}")).collect();
        assert!(matches!(
            submitter.submit(&too_many, OutputFormat::Video),
            Err(AppError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_single_submission_trims_url() {
        let dir = tempfile::tempdir().unwrap();
        let (store, submitter) = submitter(dir.path());

        let id = submitter.submit_one(DownloadMode::Mp4.job_spec("  https://example.com/v  "));
        let job = store.get(id).unwrap();
        assert_eq!(job.source_url, "https://example.com/v");
        assert_eq!(job.kind, JobKind::SingleVideo);
        assert_ne!(job.status, JobStatus::Failed);
    }
}
