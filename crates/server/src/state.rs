use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use axum::http::StatusCode;
use axum::Json;
use parking_lot::RwLock;
use redb::Database;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::user_data::UserDataStore;
use crate::watch::LibraryWatcher;
use library::{Library, LibraryStats};

#[derive(Clone)]
pub struct AppState {
    pub library_state: Arc<RwLock<LibraryState>>,
    pub config_path: PathBuf,
    pub config: Arc<RwLock<ServerConfig>>,
    pub db: Arc<Database>,
    pub user_data: UserDataStore,
    pub watcher: Arc<RwLock<Option<LibraryWatcher>>>,
    pub external_client: Client,
}

#[derive(Clone)]
pub struct LibraryState {
    pub library: Option<Library>,
    pub status: LibraryStatus,
}

#[derive(Clone, Debug)]
pub enum LibraryStatus {
    Unconfigured,
    Missing(PathBuf),
    Scanning { started: SystemTime },
    Ready(LibraryStats),
    Error(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct LibraryStatusResponse {
    pub status: String,
    pub message: Option<String>,
    pub artists: Option<usize>,
    pub albums: Option<usize>,
    pub tracks: Option<usize>,
}

#[derive(Serialize)]
pub struct ScanResponse {
    pub added: usize,
    pub failed: usize,
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    /// `full=true` drops the index and rebuilds it from the tree.
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Serialize, Clone)]
pub struct TrackView {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artist_id: String,
    pub album_id: String,
    pub duration_secs: u64,
    pub track_no: u16,
    pub disc_no: Option<u16>,
    pub genre: Option<String>,
    pub favorite: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LyricsQuery {
    pub artist_name: String,
    pub track_name: String,
    pub album_name: Option<String>,
    pub duration: Option<f64>,
}

#[derive(Serialize)]
pub struct SettingsResponse {
    pub music_root: String,
    pub port: u16,
    pub watch_music: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub music_root: Option<String>,
    pub watch_music: Option<bool>,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
