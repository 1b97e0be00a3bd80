use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::services::job_store::{JobStore, RetentionPolicy};
use crate::services::worker::remove_workdir;

/// Evict expired jobs and delete their work directories.
pub async fn sweep_once(
    store: &JobStore,
    policy: &RetentionPolicy,
    artifact_root: &Path,
    now: DateTime<Utc>,
) -> usize {
    let evicted = store.evict_expired(policy, now);
    for job in &evicted {
        remove_workdir(&artifact_root.join(job.id.to_string())).await;
        tracing::debug!(job_id = %job.id, status = %job.status, delivered = job.delivered, "Job evicted");
    }
    if !evicted.is_empty() {
        metrics::counter!("media_jobs_evicted_total").increment(evicted.len() as u64);
        tracing::info!(count = evicted.len(), remaining = store.len(), "Expired jobs evicted");
    }
    evicted.len()
}

/// Run [`sweep_once`] every `interval` until `shutdown` fires.
pub fn spawn_sweeper(
    store: Arc<JobStore>,
    policy: RetentionPolicy,
    artifact_root: PathBuf,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_once(&store, &policy, &artifact_root, Utc::now()).await;
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("Job sweeper stopped");
                    break;
                }
            }
        }
    })
}
