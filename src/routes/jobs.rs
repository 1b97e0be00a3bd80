use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::routes::extract::ApiJson;
use crate::models::api::{
    BatchSubmitRequest, BatchSubmitResponse, JobStatusResponse, SubmitJobRequest,
    SubmitJobResponse,
};
use crate::models::job::{DownloadMode, JobId, OutputFormat};

/// Ids that were never issued (including ones that are not even UUIDs) are
/// simply unknown.
fn parse_job_id(raw: &str) -> Result<JobId, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("job {raw} not found")))
}

/// POST /jobs: start a single download.
pub async fn submit_job(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), AppError> {
    req.validate()?;
    let mode: DownloadMode = req.mode.parse().map_err(|_| {
        AppError::Validation(format!(
            "unsupported mode '{}', expected one of: mp3, mp4, playlist",
            req.mode
        ))
    })?;

    let job_id = state.submitter.submit_one(mode.job_spec(req.url));
    Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id })))
}

/// POST /jobs/batch: one job per selected video.
pub async fn submit_batch(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BatchSubmitRequest>,
) -> Result<Json<BatchSubmitResponse>, AppError> {
    if req.urls.is_empty() {
        return Err(AppError::Validation("no videos selected".to_string()));
    }
    req.validate()?;
    let format: OutputFormat = req.format.parse().map_err(|_| {
        AppError::Validation(format!(
            "unsupported format '{}', expected audio-only or video",
            req.format
        ))
    })?;

    let job_ids = state.submitter.submit(&req.urls, format)?;
    Ok(Json(BatchSubmitResponse { job_ids }))
}

/// GET /jobs/{id}: current status of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let job_id = parse_job_id(&raw_id)?;
    let job = state.jobs.get(job_id)?;
    Ok(Json(JobStatusResponse::from(&job)))
}

/// GET /jobs/{id}/artifact: stream the finished file.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job_id = parse_job_id(&raw_id)?;
    let delivery = state.delivery.deliver(job_id).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        header_safe_filename(&delivery.artifact.filename)
    );
    let headers = [
        (
            CONTENT_TYPE,
            HeaderValue::from_static(delivery.artifact.content_type()),
        ),
        (
            CONTENT_DISPOSITION,
            HeaderValue::from_str(&disposition)
                .map_err(|e| AppError::Internal(format!("invalid header value: {e}")))?,
        ),
        (CONTENT_LENGTH, HeaderValue::from(delivery.size_bytes)),
    ];

    let body = Body::from_stream(delivery.into_stream());
    Ok((headers, body))
}

/// POST /jobs/{id}/cancel: stop a queued or running job.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let job_id = parse_job_id(&raw_id)?;
    if state.workers.cancel(job_id, "cancelled by client")?.is_none() {
        return Err(AppError::Conflict(format!("job {job_id} has already completed")));
    }
    let job = state.jobs.get(job_id)?;
    Ok(Json(JobStatusResponse::from(&job)))
}

/// Keep the quoted `filename` parameter to printable ASCII without quotes.
fn header_safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || " .-_()[]".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}
