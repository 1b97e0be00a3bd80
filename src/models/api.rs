use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::{JobId, JobRecord, JobStatus};
use crate::models::video::VideoDescriptor;

/// POST /playlist/resolve body.
#[derive(Debug, Deserialize, Validate)]
pub struct ResolvePlaylistRequest {
    #[serde(default)]
    #[garde(length(min = 1, max = 2048))]
    pub playlist_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolvePlaylistResponse {
    pub videos: Vec<VideoDescriptor>,
}

/// POST /jobs body.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[serde(default)]
    #[garde(length(min = 1, max = 2048))]
    pub url: String,

    /// One of `mp3`, `mp4`, `playlist`.
    #[serde(default)]
    #[garde(length(min = 1, max = 32))]
    pub mode: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

/// POST /jobs/batch body.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchSubmitRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub urls: Vec<String>,

    /// `audio-only` or `video`.
    #[serde(default)]
    #[garde(length(min = 1, max = 32))]
    pub format: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchSubmitResponse {
    pub job_ids: Vec<JobId>,
}

/// GET /jobs/{id} body: a projection of the job record.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl From<&JobRecord> for JobStatusResponse {
    fn from(job: &JobRecord) -> Self {
        Self {
            status: job.status,
            progress: job.reported_progress(),
            error: match job.status {
                JobStatus::Failed => job.error.clone(),
                _ => None,
            },
            filename: job.result.as_ref().map(|a| a.filename.clone()),
        }
    }
}
