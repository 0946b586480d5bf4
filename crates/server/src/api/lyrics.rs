use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::external::fetch_lyrics;
use crate::state::{AppState, LyricsQuery};
use crate::utils::json_error_response;

/// Stateless passthrough to the lyrics provider. Upstream failures of
/// any kind read as "not found" so a flaky provider never turns into a
/// server error.
pub async fn get_lyrics(
    State(state): State<AppState>,
    Query(params): Query<LyricsQuery>,
) -> Response {
    match fetch_lyrics(&state.external_client, &params).await {
        Ok(Some(payload)) => Json(payload).into_response(),
        Ok(None) => json_error_response(StatusCode::NOT_FOUND, "lyrics not found"),
        Err(err) => {
            warn!("Lyrics fetch failed: {}", err);
            json_error_response(StatusCode::NOT_FOUND, "lyrics unavailable")
        }
    }
}
