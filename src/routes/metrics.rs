use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for every metric the service emits.
pub fn describe() {
    metrics::describe_counter!("media_jobs_submitted_total", "Jobs accepted by the submitter");
    metrics::describe_counter!("media_jobs_finished_total", "Jobs that produced an artifact");
    metrics::describe_counter!("media_jobs_failed_total", "Jobs that ended in the error state");
    metrics::describe_counter!("media_jobs_delivered_total", "Artifacts delivered for the first time");
    metrics::describe_counter!("media_jobs_evicted_total", "Jobs removed by the retention sweeper");
    metrics::describe_counter!("playlist_resolutions_total", "Playlist listing requests by outcome");
    metrics::describe_gauge!("media_jobs_running", "Downloads currently executing");
    metrics::describe_histogram!(
        "media_job_duration_seconds",
        "Wall time of one download execution"
    );
}

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
