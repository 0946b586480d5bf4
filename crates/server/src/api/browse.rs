use std::collections::HashSet;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    Json,
};
use common::{Artist, Track};
use serde::Serialize;

use crate::state::{AppState, BrowseQuery, JsonResult, ListResponse, TrackView};
use crate::utils::json_error;

use super::library_or_json_error;

const DEFAULT_PAGE_LIMIT: usize = 200;

#[derive(Serialize)]
pub struct BrowseArtist {
    pub id: String,
    pub name: String,
    pub album_count: usize,
}

#[derive(Serialize)]
pub struct BrowseAlbum {
    pub id: String,
    pub artist_id: String,
    pub artist_name: String,
    pub title: String,
    pub year: Option<String>,
    pub has_cover: bool,
    pub track_count: usize,
}

pub async fn list_artists(
    State(state): State<AppState>,
    Query(params): Query<BrowseQuery>,
) -> JsonResult<ListResponse<BrowseArtist>> {
    let library = library_or_json_error(&state)?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
    let offset = params.offset.unwrap_or(0);
    let search = params.search.as_deref();

    let (artists, total) = match library.list_artists(search, limit, offset) {
        Ok(value) => value,
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            ))
        }
    };

    let mut items = Vec::with_capacity(artists.len());
    for artist in artists {
        let album_count = match library.list_artist_albums(&artist.id) {
            Ok(albums) => albums.len(),
            Err(_) => 0,
        };
        items.push(BrowseArtist {
            id: artist.id,
            name: artist.name,
            album_count,
        });
    }

    Ok(Json(ListResponse { items, total }))
}

pub async fn get_artist(
    State(state): State<AppState>,
    AxumPath(artist_id): AxumPath<String>,
) -> JsonResult<Artist> {
    let library = library_or_json_error(&state)?;
    match library.get_artist(&artist_id) {
        Ok(Some(artist)) => Ok(Json(artist)),
        Ok(None) => Err(json_error(StatusCode::NOT_FOUND, "artist not found")),
        Err(err) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("library error: {}", err),
        )),
    }
}

pub async fn list_artist_albums(
    State(state): State<AppState>,
    AxumPath(artist_id): AxumPath<String>,
) -> JsonResult<Vec<BrowseAlbum>> {
    let library = library_or_json_error(&state)?;
    let artist = match library.get_artist(&artist_id) {
        Ok(Some(artist)) => artist,
        Ok(None) => return Err(json_error(StatusCode::NOT_FOUND, "artist not found")),
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            ))
        }
    };
    let albums = match library.list_artist_albums(&artist_id) {
        Ok(albums) => albums,
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            ))
        }
    };

    let mut items = Vec::with_capacity(albums.len());
    for album in albums {
        let track_count = match library.list_album_tracks(&album.id) {
            Ok(tracks) => tracks.len(),
            Err(_) => 0,
        };
        items.push(BrowseAlbum {
            id: album.id,
            artist_id: album.artist_id,
            artist_name: artist.name.clone(),
            title: album.title,
            year: album.year,
            has_cover: album.cover_relpath.is_some(),
            track_count,
        });
    }
    Ok(Json(items))
}

pub async fn list_albums(
    State(state): State<AppState>,
    Query(params): Query<BrowseQuery>,
) -> JsonResult<ListResponse<BrowseAlbum>> {
    let library = library_or_json_error(&state)?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
    let offset = params.offset.unwrap_or(0);
    let search = params.search.as_deref();

    let (albums, total) = match library.list_albums(search, limit, offset) {
        Ok(value) => value,
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            ))
        }
    };

    let mut items = Vec::with_capacity(albums.len());
    for album in albums {
        let artist_name = library
            .get_artist(&album.artist_id)
            .ok()
            .flatten()
            .map(|artist| artist.name)
            .unwrap_or_else(|| "Unknown Artist".to_string());
        let track_count = match library.list_album_tracks(&album.id) {
            Ok(tracks) => tracks.len(),
            Err(_) => 0,
        };
        items.push(BrowseAlbum {
            id: album.id,
            artist_id: album.artist_id,
            artist_name,
            title: album.title,
            year: album.year,
            has_cover: album.cover_relpath.is_some(),
            track_count,
        });
    }

    Ok(Json(ListResponse { items, total }))
}

pub async fn get_album(
    State(state): State<AppState>,
    AxumPath(album_id): AxumPath<String>,
) -> JsonResult<BrowseAlbum> {
    let library = library_or_json_error(&state)?;
    let album = match library.get_album(&album_id) {
        Ok(Some(album)) => album,
        Ok(None) => return Err(json_error(StatusCode::NOT_FOUND, "album not found")),
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            ))
        }
    };
    let artist_name = library
        .get_artist(&album.artist_id)
        .ok()
        .flatten()
        .map(|artist| artist.name)
        .unwrap_or_else(|| "Unknown Artist".to_string());
    let track_count = match library.list_album_tracks(&album.id) {
        Ok(tracks) => tracks.len(),
        Err(_) => 0,
    };
    Ok(Json(BrowseAlbum {
        id: album.id,
        artist_id: album.artist_id,
        artist_name,
        title: album.title,
        year: album.year,
        has_cover: album.cover_relpath.is_some(),
        track_count,
    }))
}

pub async fn list_album_tracks(
    State(state): State<AppState>,
    AxumPath(album_id): AxumPath<String>,
) -> JsonResult<Vec<TrackView>> {
    let library = library_or_json_error(&state)?;
    if library
        .get_album(&album_id)
        .map_err(|err| {
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            )
        })?
        .is_none()
    {
        return Err(json_error(StatusCode::NOT_FOUND, "album not found"));
    }
    let tracks = match library.list_album_tracks(&album_id) {
        Ok(tracks) => tracks,
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            ))
        }
    };

    let favorites = favorite_set(&state)?;
    let items = tracks
        .iter()
        .map(|track| build_track_view(&library, track, &favorites))
        .collect();
    Ok(Json(items))
}

pub async fn list_tracks(
    State(state): State<AppState>,
    Query(params): Query<BrowseQuery>,
) -> JsonResult<ListResponse<TrackView>> {
    let library = library_or_json_error(&state)?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
    let offset = params.offset.unwrap_or(0);
    let search = params.search.as_deref();

    let (tracks, total) = match library.list_tracks(search, limit, offset) {
        Ok(value) => value,
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            ))
        }
    };

    let favorites = favorite_set(&state)?;
    let items = tracks
        .iter()
        .map(|track| build_track_view(&library, track, &favorites))
        .collect();
    Ok(Json(ListResponse { items, total }))
}

pub async fn get_track(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
) -> JsonResult<TrackView> {
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
    let favorites = favorite_set(&state)?;
    Ok(Json(build_track_view(&library, &track, &favorites)))
}

pub(crate) fn favorite_set(
    state: &AppState,
) -> Result<HashSet<String>, (StatusCode, Json<crate::state::ErrorResponse>)> {
    state.user_data.favorite_set().map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("user data error: {}", err),
        )
    })
}

pub(crate) fn build_track_view(
    library: &::library::Library,
    track: &Track,
    favorites: &HashSet<String>,
) -> TrackView {
    let artist_name = library
        .get_artist(&track.artist_id)
        .ok()
        .flatten()
        .map(|artist| artist.name)
        .unwrap_or_else(|| "Unknown Artist".to_string());
    let album_title = library
        .get_album(&track.album_id)
        .ok()
        .flatten()
        .map(|album| album.title)
        .unwrap_or_else(|| "Unknown Album".to_string());
    TrackView {
        id: track.id.clone(),
        title: track.title.clone(),
        artist: artist_name,
        album: album_title,
        artist_id: track.artist_id.clone(),
        album_id: track.album_id.clone(),
        duration_secs: track.duration_secs,
        track_no: track.track_no,
        disc_no: track.disc_no,
        genre: track.genre.clone(),
        favorite: favorites.contains(&track.id),
    }
}
