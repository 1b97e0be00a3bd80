use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    delivery::DeliveryHandler,
    fetcher::MediaFetcher,
    job_store::JobStore,
    playlist::PlaylistResolver,
    submitter::BatchSubmitter,
    worker::WorkerPool,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub app_name: Arc<str>,
    pub jobs: Arc<JobStore>,
    pub workers: Arc<WorkerPool>,
    pub submitter: Arc<BatchSubmitter>,
    pub delivery: Arc<DeliveryHandler>,
    pub resolver: Arc<dyn PlaylistResolver>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        fetcher: Arc<dyn MediaFetcher>,
        resolver: Arc<dyn PlaylistResolver>,
    ) -> Self {
        let jobs = Arc::new(JobStore::new());
        let workers = Arc::new(WorkerPool::new(
            jobs.clone(),
            fetcher,
            config.worker_settings(),
        ));
        let submitter = Arc::new(BatchSubmitter::new(
            jobs.clone(),
            workers.clone(),
            config.max_batch_size,
        ));
        let delivery = Arc::new(DeliveryHandler::new(jobs.clone()));

        Self {
            app_name: Arc::from(config.app_name.as_str()),
            jobs,
            workers,
            submitter,
            delivery,
            resolver,
        }
    }
}
