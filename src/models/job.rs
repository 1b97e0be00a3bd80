use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Opaque job identifier, generated at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a download job.
///
/// The wire vocabulary is fixed: `queued`, `running`, `finished`, `error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    #[serde(rename = "error")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "error",
        }
    }

    /// Finished and Failed admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job downloads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// One video submitted directly.
    SingleVideo,
    /// One video selected out of a resolved playlist.
    PlaylistMember,
    /// A whole playlist, bundled into a single archive.
    Playlist,
}

/// Requested output encoding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    #[strum(to_string = "audio-only", serialize = "mp3", serialize = "audio")]
    AudioOnly,
    #[strum(to_string = "video", serialize = "mp4")]
    Video,
}

impl OutputFormat {
    /// File extension the extractor produces for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::AudioOnly => "mp3",
            Self::Video => "mp4",
        }
    }
}

/// Mode selector accepted by single-job submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum DownloadMode {
    #[strum(to_string = "mp3", serialize = "audio-only")]
    Mp3,
    #[strum(to_string = "mp4", serialize = "video")]
    Mp4,
    #[strum(to_string = "playlist")]
    Playlist,
}

impl DownloadMode {
    pub fn job_spec(self, source_url: impl Into<String>) -> JobSpec {
        let (kind, format) = match self {
            Self::Mp3 => (JobKind::SingleVideo, OutputFormat::AudioOnly),
            Self::Mp4 => (JobKind::SingleVideo, OutputFormat::Video),
            Self::Playlist => (JobKind::Playlist, OutputFormat::Video),
        };
        JobSpec {
            kind,
            format,
            source_url: source_url.into(),
        }
    }
}

/// Everything needed to create a job record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub kind: JobKind,
    pub format: OutputFormat,
    pub source_url: String,
}

/// Handle to a produced media file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Name offered to the client when the file is delivered.
    pub filename: String,
    pub size_bytes: u64,
}

impl Artifact {
    pub fn content_type(&self) -> &'static str {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("mp4") => "video/mp4",
            Some("webm") => "video/webm",
            Some("mkv") => "video/x-matroska",
            Some("zip") => "application/zip",
            _ => "application/octet-stream",
        }
    }
}

/// A tracked download job.
///
/// Mutation goes through the transition methods below, each of which returns
/// `true` when the record changed. Calls that would leave a terminal state are
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub kind: JobKind,
    pub format: OutputFormat,
    pub source_url: String,
    pub result: Option<Artifact>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(id: JobId, spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            kind: spec.kind,
            format: spec.format,
            source_url: spec.source_url,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
            delivered: false,
            delivered_at: None,
        }
    }

    /// Queued -> Running.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Running;
        self.touch();
        true
    }

    /// Running -> Running with a higher percentage. Lower values are dropped.
    pub fn advance(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if self.status != JobStatus::Running || percent <= self.progress {
            return false;
        }
        self.progress = percent;
        self.touch();
        true
    }

    /// Running -> Finished.
    pub fn finish(&mut self, artifact: Artifact) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.status = JobStatus::Finished;
        self.progress = 100;
        self.result = Some(artifact);
        self.error = None;
        self.mark_terminal();
        true
    }

    /// Queued or Running -> Failed. Queued jobs fail when rejected or
    /// cancelled before a worker picked them up.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let reason = reason.into();
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(if reason.trim().is_empty() {
            "download failed".to_string()
        } else {
            reason
        });
        self.mark_terminal();
        true
    }

    /// Records a successful delivery. Returns `true` only the first time.
    pub fn mark_delivered(&mut self) -> bool {
        if self.status != JobStatus::Finished || self.delivered {
            return false;
        }
        let now = Utc::now();
        self.delivered = true;
        self.delivered_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Progress as reported to clients: meaningful only while Running or Finished.
    pub fn reported_progress(&self) -> Option<u8> {
        match self.status {
            JobStatus::Running => Some(self.progress),
            JobStatus::Finished => Some(100),
            JobStatus::Queued | JobStatus::Failed => None,
        }
    }

    fn mark_terminal(&mut self) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(
            JobId::new(),
            DownloadMode::Mp3.job_spec("https://www.youtube.com/watch?v=abc"),
        )
    }

    fn artifact() -> Artifact {
        Artifact {
            path: PathBuf::from("/tmp/job/song.mp3"),
            filename: "song.mp3".to_string(),
            size_bytes: 42,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = record();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.reported_progress(), None);

        assert!(job.start());
        assert!(job.advance(40));
        assert_eq!(job.reported_progress(), Some(40));

        assert!(job.finish(artifact()));
        assert_eq!(job.status, JobStatus::Finished);
        assert_eq!(job.reported_progress(), Some(100));
        assert!(job.result.is_some());
        assert!(job.error.is_none());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_start_only_once() {
        let mut job = record();
        assert!(job.start());
        assert!(!job.start());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut job = record();
        job.start();
        assert!(job.advance(50));
        assert!(!job.advance(30));
        assert!(!job.advance(50));
        assert_eq!(job.progress, 50);
        assert!(job.advance(250));
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_progress_ignored_outside_running() {
        let mut job = record();
        assert!(!job.advance(10));
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_second_finish_is_noop() {
        let mut job = record();
        job.start();
        job.finish(artifact());
        let before = job.clone();

        let other = Artifact {
            filename: "other.mp3".to_string(),
            ..artifact()
        };
        assert!(!job.finish(other));
        assert!(!job.fail("late failure"));
        assert!(!job.advance(5));
        assert_eq!(job.result, before.result);
        assert_eq!(job.updated_at, before.updated_at);
    }

    #[test]
    fn test_fail_never_carries_result() {
        let mut job = record();
        job.start();
        job.advance(70);
        assert!(job.fail("network unreachable"));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result.is_none());
        assert_eq!(job.error.as_deref(), Some("network unreachable"));
        assert_eq!(job.reported_progress(), None);
        assert!(!job.finish(artifact()));
    }

    #[test]
    fn test_queued_job_can_be_rejected() {
        let mut job = record();
        assert!(job.fail(""));
        assert_eq!(job.error.as_deref(), Some("download failed"));
        assert!(!job.start());
    }

    #[test]
    fn test_delivery_flag_requires_finished() {
        let mut job = record();
        assert!(!job.mark_delivered());
        job.start();
        job.finish(artifact());
        assert!(job.mark_delivered());
        assert!(!job.mark_delivered());
        assert!(job.delivered_at.is_some());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&JobStatus::Failed).unwrap(), "\"error\"");
        assert_eq!(serde_json::to_string(&JobStatus::Queued).unwrap(), "\"queued\"");
        assert_eq!(JobStatus::Finished.as_str(), "finished");
    }

    #[test]
    fn test_format_and_mode_parsing() {
        assert_eq!("audio-only".parse::<OutputFormat>().unwrap(), OutputFormat::AudioOnly);
        assert_eq!("MP3".parse::<OutputFormat>().unwrap(), OutputFormat::AudioOnly);
        assert_eq!("mp4".parse::<OutputFormat>().unwrap(), OutputFormat::Video);
        assert!("flac".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::AudioOnly.to_string(), "audio-only");

        let spec = "playlist".parse::<DownloadMode>().unwrap().job_spec("u");
        assert_eq!(spec.kind, JobKind::Playlist);
        assert_eq!(spec.format, OutputFormat::Video);
    }

    #[test]
    fn test_artifact_content_type() {
        assert_eq!(artifact().content_type(), "audio/mpeg");
        let zip = Artifact {
            path: PathBuf::from("/tmp/job/playlist_x.zip"),
            filename: "playlist_x.zip".to_string(),
            size_bytes: 1,
        };
        assert_eq!(zip.content_type(), "application/zip");
    }
}
