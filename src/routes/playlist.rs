use axum::extract::State;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::routes::extract::ApiJson;
use crate::models::api::{ResolvePlaylistRequest, ResolvePlaylistResponse};

/// POST /playlist/resolve: list a playlist's videos without downloading them.
pub async fn resolve_playlist(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResolvePlaylistRequest>,
) -> Result<Json<ResolvePlaylistResponse>, AppError> {
    req.validate()?;

    let videos = match state.resolver.resolve(req.playlist_url.trim()).await {
        Ok(videos) => videos,
        Err(e) => {
            tracing::warn!(url = %req.playlist_url, error = %e, "Playlist resolution failed");
            metrics::counter!("playlist_resolutions_total", "outcome" => "error").increment(1);
            return Err(e.into());
        }
    };

    metrics::counter!("playlist_resolutions_total", "outcome" => "ok").increment(1);
    Ok(Json(ResolvePlaylistResponse { videos }))
}
