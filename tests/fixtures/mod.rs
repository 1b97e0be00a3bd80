//! Scripted fetcher and resolver used by the in-process integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

use media_jobs::models::job::Artifact;
use media_jobs::models::video::VideoDescriptor;
use media_jobs::services::fetcher::{FetchError, FetchRequest, MediaFetcher, ProgressReporter};
use media_jobs::services::playlist::{validate_source_url, PlaylistResolver, ResolutionError};

pub const PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=PLtest";
pub const EMPTY_PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=PLempty";

/// Contents written into every artifact produced by [`ScriptedFetcher`].
pub const ARTIFACT_BYTES: &[u8] = b"scripted media payload";

pub fn sample_playlist() -> Vec<VideoDescriptor> {
    (1..=3)
        .map(|i| VideoDescriptor {
            url: format!("https://www.youtube.com/watch?v=vid{i}"),
            title: format!("Video {i}"),
            thumbnail: format!("https://i.ytimg.com/vi/vid{i}/hqdefault.jpg"),
        })
        .collect()
}

/// Fetcher whose jobs block until the test releases permits on the gate.
///
/// Progress climbs in steps before and after the gate. URLs containing
/// `unavailable` fail after the gate opens.
pub struct ScriptedFetcher {
    gate: Arc<Semaphore>,
}

impl ScriptedFetcher {
    pub fn new() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Self { gate: gate.clone() }, gate)
    }
}

#[async_trait]
impl MediaFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &ProgressReporter,
    ) -> Result<Artifact, FetchError> {
        progress.report(5.0);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| FetchError::Cancelled("gate closed".to_string()))?;
        permit.forget();

        if request.source_url.contains("unavailable") {
            return Err(FetchError::Exited {
                code: Some(1),
                message: "[youtube] Video unavailable".to_string(),
            });
        }

        for step in [25.0, 50.0, 75.0] {
            progress.report(step);
            tokio::task::yield_now().await;
        }

        let filename = format!("{}.{}", request.job_id, request.format.extension());
        let path = request.workdir.join(&filename);
        tokio::fs::write(&path, ARTIFACT_BYTES).await?;
        Ok(Artifact {
            path,
            filename,
            size_bytes: ARTIFACT_BYTES.len() as u64,
        })
    }

    async fn health_check(&self) -> Result<String, FetchError> {
        Ok("scripted".to_string())
    }
}

/// Resolver answering from a fixed table of playlists.
pub struct ScriptedResolver {
    playlists: HashMap<String, Vec<VideoDescriptor>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        let mut playlists = HashMap::new();
        playlists.insert(PLAYLIST_URL.to_string(), sample_playlist());
        playlists.insert(EMPTY_PLAYLIST_URL.to_string(), Vec::new());
        Self { playlists }
    }
}

#[async_trait]
impl PlaylistResolver for ScriptedResolver {
    async fn resolve(&self, playlist_url: &str) -> Result<Vec<VideoDescriptor>, ResolutionError> {
        validate_source_url(playlist_url).map_err(ResolutionError::Malformed)?;
        match self.playlists.get(playlist_url) {
            Some(videos) if videos.is_empty() => Err(ResolutionError::Empty),
            Some(videos) => Ok(videos.clone()),
            None => Err(ResolutionError::Unreachable("HTTP Error 404: Not Found".to_string())),
        }
    }
}
