use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::state::{AppState, CreatePlaylistRequest, JsonResult, TrackView};
use crate::user_data::{Playlist, PlaylistEntry, UserDataError};
use crate::utils::json_error;

use super::browse::{build_track_view, favorite_set};
use super::library_or_json_error;

#[derive(Serialize)]
pub struct FavoriteView {
    pub added_at: u64,
    pub track: TrackView,
}

#[derive(Serialize)]
pub struct PlaylistView {
    pub id: String,
    pub name: String,
    pub created_at: u64,
    pub track_count: usize,
}

#[derive(Serialize)]
pub struct PlaylistDetail {
    pub id: String,
    pub name: String,
    pub created_at: u64,
    pub tracks: Vec<PlaylistTrackView>,
}

#[derive(Serialize)]
pub struct PlaylistTrackView {
    pub position: u32,
    pub track: TrackView,
}

fn user_data_error(err: UserDataError) -> (StatusCode, Json<crate::state::ErrorResponse>) {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("user data error: {}", err),
    )
}

/// Newest first. Favorites whose track has since left the index are
/// skipped rather than surfaced as errors.
pub async fn list_favorites(State(state): State<AppState>) -> JsonResult<Vec<FavoriteView>> {
    let library = library_or_json_error(&state)?;
    let favorites = state.user_data.list_favorites().map_err(user_data_error)?;
    let favorite_ids = favorite_set(&state)?;

    let mut items = Vec::with_capacity(favorites.len());
    for favorite in favorites {
        if let Ok(Some(track)) = library.get_track(&favorite.track_id) {
            items.push(FavoriteView {
                added_at: favorite.added_at,
                track: build_track_view(&library, &track, &favorite_ids),
            });
        }
    }
    Ok(Json(items))
}

pub async fn add_favorite(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
) -> JsonResult<FavoriteView> {
    let library = library_or_json_error(&state)?;
    let track = match library.get_track(&track_id) {
        Ok(Some(track)) => track,
        Ok(None) => return Err(json_error(StatusCode::NOT_FOUND, "track not found")),
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            ))
        }
    };

    let favorite = state
        .user_data
        .add_favorite(&track_id)
        .map_err(user_data_error)?;
    let favorite_ids = favorite_set(&state)?;
    Ok(Json(FavoriteView {
        added_at: favorite.added_at,
        track: build_track_view(&library, &track, &favorite_ids),
    }))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
) -> JsonResult<()> {
    let removed = state
        .user_data
        .remove_favorite(&track_id)
        .map_err(user_data_error)?;
    if removed {
        Ok(Json(()))
    } else {
        Err(json_error(StatusCode::NOT_FOUND, "not a favorite"))
    }
}

pub async fn list_playlists(State(state): State<AppState>) -> JsonResult<Vec<PlaylistView>> {
    let playlists = state.user_data.list_playlists().map_err(user_data_error)?;
    let mut items = Vec::with_capacity(playlists.len());
    for playlist in playlists {
        let track_count = state
            .user_data
            .playlist_entries(&playlist.id)
            .map_err(user_data_error)?
            .len();
        items.push(PlaylistView {
            id: playlist.id,
            name: playlist.name,
            created_at: playlist.created_at,
            track_count,
        });
    }
    Ok(Json(items))
}

pub async fn create_playlist(
    State(state): State<AppState>,
    Json(payload): Json<CreatePlaylistRequest>,
) -> JsonResult<Playlist> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "name is required"));
    }
    let playlist = state
        .user_data
        .create_playlist(name.to_string())
        .map_err(user_data_error)?;
    Ok(Json(playlist))
}

pub async fn get_playlist(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
) -> JsonResult<PlaylistDetail> {
    let playlist = state
        .user_data
        .get_playlist(&playlist_id)
        .map_err(user_data_error)?;
    let playlist = match playlist {
        Some(playlist) => playlist,
        None => return Err(json_error(StatusCode::NOT_FOUND, "playlist not found")),
    };

    let library = library_or_json_error(&state)?;
    let favorite_ids = favorite_set(&state)?;
    let entries = state
        .user_data
        .playlist_entries(&playlist_id)
        .map_err(user_data_error)?;

    let mut tracks = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Ok(Some(track)) = library.get_track(&entry.track_id) {
            tracks.push(PlaylistTrackView {
                position: entry.position,
                track: build_track_view(&library, &track, &favorite_ids),
            });
        }
    }

    Ok(Json(PlaylistDetail {
        id: playlist.id,
        name: playlist.name,
        created_at: playlist.created_at,
        tracks,
    }))
}

pub async fn delete_playlist(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
) -> JsonResult<()> {
    let deleted = state
        .user_data
        .delete_playlist(&playlist_id)
        .map_err(user_data_error)?;
    if deleted {
        Ok(Json(()))
    } else {
        Err(json_error(StatusCode::NOT_FOUND, "playlist not found"))
    }
}

pub async fn add_playlist_track(
    State(state): State<AppState>,
    AxumPath((playlist_id, track_id)): AxumPath<(String, String)>,
) -> JsonResult<PlaylistEntry> {
    let library = library_or_json_error(&state)?;
    match library.get_track(&track_id) {
        Ok(Some(_)) => {}
        Ok(None) => return Err(json_error(StatusCode::NOT_FOUND, "track not found")),
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            ))
        }
    }

    let entry = state
        .user_data
        .add_playlist_entry(&playlist_id, &track_id)
        .map_err(user_data_error)?;
    match entry {
        Some(entry) => Ok(Json(entry)),
        None => Err(json_error(StatusCode::NOT_FOUND, "playlist not found")),
    }
}

pub async fn remove_playlist_track(
    State(state): State<AppState>,
    AxumPath((playlist_id, track_id)): AxumPath<(String, String)>,
) -> JsonResult<()> {
    let removed = state
        .user_data
        .remove_playlist_entry(&playlist_id, &track_id)
        .map_err(user_data_error)?;
    if removed {
        Ok(Json(()))
    } else {
        Err(json_error(StatusCode::NOT_FOUND, "track not in playlist"))
    }
}
