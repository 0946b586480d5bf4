pub mod browse;
pub mod library;
pub mod lyrics;
pub mod settings;
pub mod user_data;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};

use ::library::Library;

use crate::state::{AppState, HealthResponse, LibraryStatus};
use crate::streaming;
use crate::utils::{json_error, json_error_response};

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/library/status", get(library::get_status))
        .route("/library/scan", post(library::scan_library))
        .route("/library/search", get(library::search))
        .route("/stream/:track_id", get(streaming::stream_track))
        .route("/browse/artists", get(browse::list_artists))
        .route("/browse/artists/:artist_id", get(browse::get_artist))
        .route(
            "/browse/artists/:artist_id/albums",
            get(browse::list_artist_albums),
        )
        .route("/browse/albums", get(browse::list_albums))
        .route("/browse/albums/:album_id", get(browse::get_album))
        .route(
            "/browse/albums/:album_id/tracks",
            get(browse::list_album_tracks),
        )
        .route("/browse/tracks", get(browse::list_tracks))
        .route("/browse/tracks/:track_id", get(browse::get_track))
        .route(
            "/library/albums/:album_id/cover",
            get(library::get_album_cover),
        )
        .route(
            "/library/tracks/:track_id/cover",
            get(library::get_track_cover),
        )
        .route("/library/favorites", get(user_data::list_favorites))
        .route("/library/favorites/:track_id", post(user_data::add_favorite))
        .route(
            "/library/favorites/:track_id",
            delete(user_data::remove_favorite),
        )
        .route("/library/playlists", get(user_data::list_playlists))
        .route("/library/playlists", post(user_data::create_playlist))
        .route(
            "/library/playlists/:playlist_id",
            get(user_data::get_playlist),
        )
        .route(
            "/library/playlists/:playlist_id",
            delete(user_data::delete_playlist),
        )
        .route(
            "/library/playlists/:playlist_id/tracks/:track_id",
            post(user_data::add_playlist_track),
        )
        .route(
            "/library/playlists/:playlist_id/tracks/:track_id",
            delete(user_data::remove_playlist_track),
        )
        .route("/lyrics", get(lyrics::get_lyrics))
        .route("/settings", get(settings::get_settings))
        .route("/settings", post(settings::update_settings))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

pub(crate) fn library_or_json_error(
    state: &AppState,
) -> Result<Library, (StatusCode, Json<crate::state::ErrorResponse>)> {
    let guard = state.library_state.read();
    if let Some(library) = guard.library.clone() {
        Ok(library)
    } else {
        Err(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            library_status_message(&guard.status),
        ))
    }
}

pub(crate) fn library_or_response(state: &AppState) -> Result<Library, Response> {
    let guard = state.library_state.read();
    if let Some(library) = guard.library.clone() {
        Ok(library)
    } else {
        Err(json_error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            library_status_message(&guard.status),
        ))
    }
}

fn library_status_message(status: &LibraryStatus) -> String {
    match status {
        LibraryStatus::Unconfigured => "music directory must be set".to_string(),
        LibraryStatus::Missing(path) => {
            format!("music directory not found: {}", path.display())
        }
        LibraryStatus::Scanning { .. } => "library indexing in progress".to_string(),
        LibraryStatus::Ready(_) => "library ready".to_string(),
        LibraryStatus::Error(message) => format!("library error: {}", message),
    }
}
