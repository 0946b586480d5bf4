use std::time::SystemTime;

use axum::{
    body::Body,
    extract::{Path as AxumPath, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use common::join_relpath;
use tracing::warn;

use crate::search;
use crate::state::{
    AppState, JsonResult, LibraryStatus, LibraryStatusResponse, ScanQuery, ScanResponse,
    SearchQuery, TrackView,
};
use crate::utils::{json_error, json_error_response};

use super::browse::{build_track_view, favorite_set};
use super::{library_or_json_error, library_or_response};

pub async fn get_status(State(state): State<AppState>) -> Json<LibraryStatusResponse> {
    let guard = state.library_state.read();
    let response = match &guard.status {
        LibraryStatus::Unconfigured => LibraryStatusResponse {
            status: "unconfigured".to_string(),
            message: Some("music directory must be set".to_string()),
            artists: None,
            albums: None,
            tracks: None,
        },
        LibraryStatus::Missing(path) => LibraryStatusResponse {
            status: "missing".to_string(),
            message: Some(format!("music directory not found: {}", path.display())),
            artists: None,
            albums: None,
            tracks: None,
        },
        LibraryStatus::Scanning { .. } => LibraryStatusResponse {
            status: "scanning".to_string(),
            message: None,
            artists: None,
            albums: None,
            tracks: None,
        },
        LibraryStatus::Ready(stats) => LibraryStatusResponse {
            status: "ready".to_string(),
            message: None,
            artists: Some(stats.artists),
            albums: Some(stats.albums),
            tracks: Some(stats.tracks),
        },
        LibraryStatus::Error(message) => LibraryStatusResponse {
            status: "error".to_string(),
            message: Some(message.clone()),
            artists: None,
            albums: None,
            tracks: None,
        },
    };
    Json(response)
}

/// Walk the tree now and report what changed. `full=true` rebuilds the
/// index from scratch instead of converging it.
pub async fn scan_library(
    State(state): State<AppState>,
    Query(params): Query<ScanQuery>,
) -> JsonResult<ScanResponse> {
    let library = library_or_json_error(&state)?;
    {
        let mut guard = state.library_state.write();
        guard.status = LibraryStatus::Scanning {
            started: SystemTime::now(),
        };
    }

    let full = params.full;
    let scan_library = library.clone();
    let result =
        tokio::task::spawn_blocking(
            move || {
                if full {
                    scan_library.rescan()
                } else {
                    scan_library.scan_tree()
                }
            },
        )
        .await;

    match result {
        Ok(Ok(summary)) => {
            match library.stats() {
                Ok(stats) => {
                    let mut guard = state.library_state.write();
                    guard.status = LibraryStatus::Ready(stats);
                }
                Err(err) => warn!("Failed to read stats after scan: {}", err),
            }
            Ok(Json(ScanResponse {
                added: summary.added,
                failed: summary.failures.len(),
            }))
        }
        Ok(Err(err)) => {
            let message = err.to_string();
            {
                let mut guard = state.library_state.write();
                guard.status = LibraryStatus::Error(message.clone());
            }
            let status = match err {
                ::library::LibraryError::MissingRoot(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err(json_error(status, message))
        }
        Err(err) => {
            let message = err.to_string();
            {
                let mut guard = state.library_state.write();
                guard.status = LibraryStatus::Error(message.clone());
            }
            Err(json_error(StatusCode::INTERNAL_SERVER_ERROR, message))
        }
    }
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> JsonResult<Vec<TrackView>> {
    let library = library_or_json_error(&state)?;
    let limit = params
        .limit
        .unwrap_or(search::DEFAULT_SEARCH_LIMIT)
        .clamp(1, search::MAX_SEARCH_LIMIT);

    let tracks = search::resolve(&library, &params.query, limit).map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("library error: {}", err),
        )
    })?;

    let favorites = favorite_set(&state)?;
    let items = tracks
        .iter()
        .map(|track| build_track_view(&library, track, &favorites))
        .collect();
    Ok(Json(items))
}

/// Folder cover if the album has one, embedded front cover from the
/// album's tracks otherwise.
pub async fn get_album_cover(
    State(state): State<AppState>,
    AxumPath(album_id): AxumPath<String>,
) -> Response {
    let library = match library_or_response(&state) {
        Ok(library) => library,
        Err(response) => return response,
    };
    let album = match library.get_album(&album_id) {
        Ok(Some(album)) => album,
        Ok(None) => return json_error_response(StatusCode::NOT_FOUND, "album not found"),
        Err(err) => {
            return json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            )
        }
    };

    if let Some(cover_rel) = &album.cover_relpath {
        let path = join_relpath(library.root(), cover_rel);
        if let Ok(data) = tokio::fs::read(&path).await {
            let mime = mime_guess::from_path(&path)
                .first_or_octet_stream()
                .to_string();
            return cover_response(data, &mime);
        }
    }

    let tracks = match library.list_album_tracks(&album_id) {
        Ok(tracks) => tracks,
        Err(err) => {
            return json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            )
        }
    };
    for track in tracks {
        let path = join_relpath(library.root(), &track.file_relpath);
        match read_embedded_cover(path).await {
            Some(art) => {
                let mime = art
                    .mime
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                return cover_response(art.data, &mime);
            }
            None => continue,
        }
    }

    json_error_response(StatusCode::NOT_FOUND, "cover not found")
}

pub async fn get_track_cover(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
) -> Response {
    let library = match library_or_response(&state) {
        Ok(library) => library,
        Err(response) => return response,
    };
    let track = match library.get_track(&track_id) {
        Ok(Some(track)) => track,
        Ok(None) => return json_error_response(StatusCode::NOT_FOUND, "track not found"),
        Err(err) => {
            return json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            )
        }
    };

    let path = join_relpath(library.root(), &track.file_relpath);
    match read_embedded_cover(path).await {
        Some(art) => {
            let mime = art
                .mime
                .unwrap_or_else(|| "application/octet-stream".to_string());
            cover_response(art.data, &mime)
        }
        None => json_error_response(StatusCode::NOT_FOUND, "no embedded cover art"),
    }
}

async fn read_embedded_cover(path: std::path::PathBuf) -> Option<metadata::CoverArt> {
    let result = tokio::task::spawn_blocking(move || metadata::read_cover(&path)).await;
    match result {
        Ok(Ok(art)) => art,
        Ok(Err(_)) => None,
        Err(err) => {
            warn!("Cover read join error: {}", err);
            None
        }
    }
}

fn cover_response(data: Vec<u8>, mime: &str) -> Response {
    let mut response = Response::new(Body::from(data));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=604800"),
    );
    response
}
