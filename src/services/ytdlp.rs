//! yt-dlp backed media fetcher and playlist resolver.
//!
//! Downloads run as a child process per job. Progress is read from the
//! `--newline` output on stdout; the last `ERROR:` line on stderr becomes the
//! job's failure message.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::models::job::{Artifact, JobKind, OutputFormat};
use crate::models::video::VideoDescriptor;
use crate::services::fetcher::{FetchError, FetchRequest, MediaFetcher, ProgressReporter};
use crate::services::playlist::{validate_source_url, PlaylistResolver, ResolutionError};

const STDERR_TAIL_LINES: usize = 50;

/// Client for the yt-dlp executable.
pub struct YtDlp {
    binary: String,
    ffmpeg_location: Option<String>,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, ffmpeg_location: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            ffmpeg_location,
        }
    }

    fn download_args(&self, request: &FetchRequest) -> Vec<String> {
        let mut args: Vec<String> = ["--newline", "--no-colors", "--restrict-filenames"]
            .into_iter()
            .map(String::from)
            .collect();

        match request.format {
            OutputFormat::AudioOnly => args.extend(
                [
                    "-f",
                    "bestaudio/best",
                    "--extract-audio",
                    "--audio-format",
                    "mp3",
                    "--audio-quality",
                    "192K",
                ]
                .map(String::from),
            ),
            OutputFormat::Video => args.extend(
                ["-f", "bestvideo+bestaudio/best", "--merge-output-format", "mp4"]
                    .map(String::from),
            ),
        }

        let template = match request.kind {
            JobKind::Playlist => {
                args.push("--yes-playlist".to_string());
                "%(playlist_index)s - %(title)s.%(ext)s"
            }
            JobKind::SingleVideo | JobKind::PlaylistMember => {
                args.push("--no-playlist".to_string());
                "%(title)s.%(ext)s"
            }
        };

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.clone());
        }

        args.push("-o".to_string());
        args.push(request.workdir.join(template).to_string_lossy().into_owned());
        args.push("--".to_string());
        args.push(request.source_url.clone());
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &ProgressReporter,
    ) -> Result<Artifact, FetchError> {
        let mut child = Command::new(&self.binary)
            .args(self.download_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(FetchError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("yt-dlp stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("yt-dlp stderr was not captured"))?;
        let stderr_tail = tokio::spawn(read_tail(stderr));

        let mut tracker = ProgressTracker::default();
        let mut segments = BufReader::new(stdout).split(b'\n');
        while let Some(segment) = segments.next_segment().await? {
            let line = decode_line(&segment);
            match tracker.observe(&line) {
                Some(percent) => progress.report(percent),
                None => tracing::trace!(line = %line, "yt-dlp output"),
            }
        }

        let status = child.wait().await?;
        let tail = stderr_tail.await.unwrap_or_default();
        if !status.success() {
            return Err(FetchError::Exited {
                code: status.code(),
                message: summarize_stderr(&tail)
                    .unwrap_or_else(|| format!("yt-dlp exited with {status}")),
            });
        }

        match request.kind {
            JobKind::Playlist => {
                let dir = request.workdir.clone();
                let archive_name = format!("playlist_{}.zip", request.job_id);
                tokio::task::spawn_blocking(move || bundle_playlist(&dir, &archive_name))
                    .await
                    .map_err(|e| FetchError::Io(std::io::Error::other(e)))?
            }
            JobKind::SingleVideo | JobKind::PlaylistMember => {
                let path = locate_output(&request.workdir, request.format.extension()).await?;
                artifact_for(path).await
            }
        }
    }

    async fn health_check(&self) -> Result<String, FetchError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(FetchError::Spawn)?;
        if !output.status.success() {
            return Err(FetchError::Exited {
                code: output.status.code(),
                message: "yt-dlp --version failed".to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl PlaylistResolver for YtDlp {
    async fn resolve(&self, playlist_url: &str) -> Result<Vec<VideoDescriptor>, ResolutionError> {
        let url = validate_source_url(playlist_url).map_err(ResolutionError::Malformed)?;

        let output = Command::new(&self.binary)
            .args(["--flat-playlist", "--dump-single-json", "--no-warnings", "--"])
            .arg(url.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolutionError::Unreachable(format!("failed to launch yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<String> = stderr.lines().map(String::from).collect();
            return Err(ResolutionError::Unreachable(
                summarize_stderr(&lines).unwrap_or_else(|| format!("yt-dlp exited with {}", output.status)),
            ));
        }

        let videos = parse_playlist_listing(&output.stdout)?;
        tracing::info!(url = %url, count = videos.len(), "Playlist resolved");
        Ok(videos)
    }
}

/// Tracks `[download]` lines and turns them into an overall percentage.
#[derive(Debug, Default)]
struct ProgressTracker {
    /// Current playlist item and total, when downloading a whole playlist.
    item: Option<(u32, u32)>,
}

impl ProgressTracker {
    fn observe(&mut self, line: &str) -> Option<f64> {
        let rest = line.trim().strip_prefix("[download]")?.trim_start();

        let position = rest
            .strip_prefix("Downloading item ")
            .or_else(|| rest.strip_prefix("Downloading video "));
        if let Some(position) = position {
            let (index, total) = position.split_once(" of ")?;
            let index: u32 = index.trim().parse().ok()?;
            let total: u32 = total.trim().parse().ok()?;
            if index == 0 || total == 0 || index > total {
                return None;
            }
            self.item = Some((index, total));
            return Some(self.overall(0.0));
        }

        let (number, _) = rest.split_once('%')?;
        let percent: f64 = number.trim().parse().ok()?;
        Some(self.overall(percent.clamp(0.0, 100.0)))
    }

    fn overall(&self, percent: f64) -> f64 {
        match self.item {
            Some((index, total)) => ((index - 1) as f64 + percent / 100.0) / total as f64 * 100.0,
            None => percent,
        }
    }
}

async fn read_tail<R: AsyncRead + Unpin>(reader: R) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut segments = BufReader::new(reader).split(b'\n');
    while let Ok(Some(segment)) = segments.next_segment().await {
        let line = decode_line(&segment);
        tracing::debug!(line = %line, "yt-dlp stderr");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

/// yt-dlp echoes titles and paths verbatim, which are not always UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Pick the most useful line out of yt-dlp's stderr.
fn summarize_stderr(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .rev()
        .find_map(|l| l.trim().strip_prefix("ERROR:").map(|m| m.trim().to_string()))
        .filter(|m| !m.is_empty())
        .or_else(|| {
            lines
                .iter()
                .rev()
                .map(|l| l.trim())
                .find(|l| !l.is_empty())
                .map(String::from)
        })
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    entries: Option<Vec<Option<ListingEntry>>>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl ListingEntry {
    fn into_descriptor(self) -> Option<VideoDescriptor> {
        let url = self
            .webpage_url
            .filter(|u| u.starts_with("http"))
            .or(self.url.filter(|u| u.starts_with("http")))
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={id}"))
            })?;
        let thumbnail = self
            .thumbnails
            .into_iter()
            .last()
            .map(|t| t.url)
            .or(self.thumbnail)
            .unwrap_or_default();
        let title = self
            .title
            .or(self.id)
            .unwrap_or_else(|| "Untitled".to_string());
        Some(VideoDescriptor {
            url,
            title,
            thumbnail,
        })
    }
}

/// Parse the JSON document printed by `--flat-playlist --dump-single-json`.
fn parse_playlist_listing(raw: &[u8]) -> Result<Vec<VideoDescriptor>, ResolutionError> {
    let listing: Listing = serde_json::from_slice(raw)?;
    let entries = listing
        .entries
        .ok_or_else(|| ResolutionError::Malformed("URL does not point to a playlist".to_string()))?;
    let videos: Vec<VideoDescriptor> = entries
        .into_iter()
        .flatten()
        .filter_map(ListingEntry::into_descriptor)
        .collect();
    if videos.is_empty() {
        return Err(ResolutionError::Empty);
    }
    Ok(videos)
}

fn is_partial(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("part" | "ytdl" | "temp")
    )
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Find the produced file, preferring the requested extension.
async fn locate_output(dir: &Path, extension: &str) -> Result<PathBuf, FetchError> {
    let mut candidates = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && !is_partial(&path) {
            candidates.push(path);
        }
    }
    candidates.sort();

    let chosen = candidates
        .iter()
        .find(|p| has_extension(p, extension))
        .or_else(|| candidates.first())
        .cloned();
    chosen.ok_or_else(|| FetchError::NoOutput(extension.to_string()))
}

async fn artifact_for(path: PathBuf) -> Result<Artifact, FetchError> {
    let size_bytes = tokio::fs::metadata(&path).await?.len();
    let filename = file_name(&path);
    Ok(Artifact {
        path,
        filename,
        size_bytes,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Zip every downloaded file in `dir` into `archive_name`, removing the
/// originals once the archive is complete.
fn bundle_playlist(dir: &Path, archive_name: &str) -> Result<Artifact, FetchError> {
    let archive_path = dir.join(archive_name);
    let mut members: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && *p != archive_path && !is_partial(p))
        .collect();
    members.sort();
    if members.is_empty() {
        return Err(FetchError::NoOutput("playlist".to_string()));
    }

    let mut zip = ZipWriter::new(std::fs::File::create(&archive_path)?);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .large_file(true);
    for path in &members {
        zip.start_file(file_name(path), options)?;
        let mut source = std::fs::File::open(path)?;
        std::io::copy(&mut source, &mut zip)?;
    }
    zip.finish()?;

    for path in &members {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove archived file");
        }
    }

    let size_bytes = std::fs::metadata(&archive_path)?.len();
    Ok(Artifact {
        path: archive_path,
        filename: archive_name.to_string(),
        size_bytes,
    })
}
