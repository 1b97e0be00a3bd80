use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::job_store::RetentionPolicy;
use crate::services::worker::WorkerSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Name reported by the health endpoint.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Server bind address (e.g., "0.0.0.0:5000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory holding one work directory per job.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// yt-dlp executable name or path
    #[serde(default = "default_ytdlp_bin")]
    pub ytdlp_bin: String,

    /// ffmpeg location passed through to yt-dlp
    #[serde(default)]
    pub ffmpeg_location: Option<String>,

    /// Maximum number of concurrently running downloads (0 = unbounded)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Watchdog limit for a single download in seconds (0 = none)
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// How long a terminal job is kept, in seconds
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// How long a job is kept after its first delivery, in seconds
    #[serde(default = "default_delivered_retention_secs")]
    pub delivered_retention_secs: u64,

    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,

    /// Largest accepted batch selection
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_app_name() -> String {
    "MyDownloader".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_artifact_dir() -> String {
    std::env::temp_dir()
        .join("media-jobs")
        .to_string_lossy()
        .into_owned()
}

fn default_ytdlp_bin() -> String {
    "yt-dlp".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_job_timeout_secs() -> u64 {
    3600
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_delivered_retention_secs() -> u64 {
    600
}

fn default_gc_interval_secs() -> u64 {
    60
}

fn default_max_batch_size() -> usize {
    50
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            bind_addr: default_bind_addr(),
            artifact_dir: default_artifact_dir(),
            ytdlp_bin: default_ytdlp_bin(),
            ffmpeg_location: None,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_timeout_secs: default_job_timeout_secs(),
            retention_secs: default_retention_secs(),
            delivered_retention_secs: default_delivered_retention_secs(),
            gc_interval_secs: default_gc_interval_secs(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn artifact_root(&self) -> PathBuf {
        PathBuf::from(&self.artifact_dir)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            artifact_root: self.artifact_root(),
            max_concurrent: (self.max_concurrent_jobs > 0).then_some(self.max_concurrent_jobs),
            job_timeout: (self.job_timeout_secs > 0)
                .then(|| Duration::from_secs(self.job_timeout_secs)),
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_retention: Duration::from_secs(self.retention_secs),
            delivered_retention: Duration::from_secs(self.delivered_retention_secs),
        }
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs.max(1))
    }
}
