use async_trait::async_trait;

use crate::models::video::VideoDescriptor;

/// Lists the members of a playlist without downloading any media.
#[async_trait]
pub trait PlaylistResolver: Send + Sync {
    async fn resolve(&self, playlist_url: &str) -> Result<Vec<VideoDescriptor>, ResolutionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("invalid playlist URL: {0}")]
    Malformed(String),

    #[error("playlist could not be fetched: {0}")]
    Unreachable(String),

    #[error("playlist contains no videos")]
    Empty,

    #[error("unexpected playlist listing: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Check that `raw` is an absolute http(s) URL with a host.
pub fn validate_source_url(raw: &str) -> Result<url::Url, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("URL is empty".to_string());
    }
    let parsed = url::Url::parse(trimmed).map_err(|e| format!("invalid URL '{trimmed}': {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!(
            "invalid URL '{trimmed}': unsupported scheme '{}'",
            parsed.scheme()
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(format!("invalid URL '{trimmed}': missing host"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_urls() {
        assert!(validate_source_url("https://www.youtube.com/playlist?list=PL1").is_ok());
        assert!(validate_source_url("  http://example.com/v  ").is_ok());
    }

    #[test]
    fn test_rejects_malformed_urls() {
        assert!(validate_source_url("").is_err());
        assert!(validate_source_url("not a url").is_err());
        assert!(validate_source_url("ftp://example.com/file").is_err());
        assert!(validate_source_url("file:///etc/passwd").is_err());
    }
}
