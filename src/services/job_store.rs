use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::job::{JobId, JobRecord, JobSpec, JobStatus};

/// In-memory table of job records.
///
/// Readers take a shared lock and receive cloned snapshots; every mutation is
/// a read-modify-write under the exclusive lock, so a progress update can never
/// be lost to a concurrent terminal transition.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

/// Per-status counts, used by the health endpoint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
}

/// When terminal jobs become eligible for eviction.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Maximum lifetime after reaching a terminal state.
    pub max_retention: Duration,
    /// Lifetime after the first successful delivery.
    pub delivered_retention: Duration,
}

impl RetentionPolicy {
    pub fn is_expired(&self, job: &JobRecord, now: DateTime<Utc>) -> bool {
        if !job.status.is_terminal() {
            return false;
        }
        if let Some(delivered_at) = job.delivered_at {
            if now - delivered_at >= to_chrono(self.delivered_retention) {
                return true;
            }
        }
        let terminal_at = job.finished_at.unwrap_or(job.updated_at);
        now - terminal_at >= to_chrono(self.max_retention)
    }
}

fn unused_id(jobs: &HashMap<JobId, JobRecord>) -> JobId {
    let mut id = JobId::new();
    while jobs.contains_key(&id) {
        id = JobId::new();
    }
    id
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new Queued record and return its id.
    pub fn create(&self, spec: JobSpec) -> JobId {
        let mut jobs = self.jobs.write();
        let id = unused_id(&jobs);
        jobs.insert(id, JobRecord::new(id, spec));
        id
    }

    /// Insert a record that is Failed from the start, for submissions that
    /// could never run.
    pub fn create_rejected(&self, spec: JobSpec, reason: impl Into<String>) -> JobId {
        let mut jobs = self.jobs.write();
        let id = unused_id(&jobs);
        let mut record = JobRecord::new(id, spec);
        record.fail(reason);
        jobs.insert(id, record);
        id
    }

    /// Snapshot of one record.
    pub fn get(&self, id: JobId) -> Result<JobRecord, StoreError> {
        self.jobs
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Apply `mutate` to the record atomically.
    pub fn update<R>(
        &self,
        id: JobId,
        mutate: impl FnOnce(&mut JobRecord) -> R,
    ) -> Result<R, StoreError> {
        let mut jobs = self.jobs.write();
        let record = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        Ok(mutate(record))
    }

    /// Ids of all non-terminal jobs.
    pub fn list_active(&self) -> Vec<JobId> {
        self.jobs
            .read()
            .values()
            .filter(|job| !job.status.is_terminal())
            .map(|job| job.id)
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let jobs = self.jobs.read();
        let mut stats = StoreStats::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Finished => stats.finished += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Remove and return every record the policy considers expired.
    pub fn evict_expired(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Vec<JobRecord> {
        let mut jobs = self.jobs.write();
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| policy.is_expired(job, now))
            .map(|job| job.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| jobs.remove(&id))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),
}
