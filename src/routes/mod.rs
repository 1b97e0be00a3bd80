use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::predicate::{And, DefaultPredicate, NotForContentType, Predicate};
use tower_http::compression::CompressionLayer;

use crate::app_state::AppState;

pub mod extract;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod playlist;

/// API routes. The metrics endpoint and middleware are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/playlist/resolve", post(playlist::resolve_playlist))
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs/batch", post(jobs::submit_batch))
        .route("/jobs/{id}", get(jobs::get_job_status))
        .route("/jobs/{id}/artifact", get(jobs::download_artifact))
        .route("/jobs/{id}/cancel", post(jobs::cancel_job))
        .with_state(state)
}

type MediaAwarePredicate =
    And<And<And<DefaultPredicate, NotForContentType>, NotForContentType>, NotForContentType>;

/// Response compression that leaves artifacts alone: media and archives are
/// already compressed, and streaming them as-is keeps their `Content-Length`.
pub fn compression_layer() -> CompressionLayer<MediaAwarePredicate> {
    CompressionLayer::new().compress_when(media_aware_predicate())
}

fn media_aware_predicate() -> MediaAwarePredicate {
    DefaultPredicate::new()
        .and(NotForContentType::new("audio/"))
        .and(NotForContentType::new("video/"))
        .and(NotForContentType::const_new("application/zip"))
}
