use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bincode;
use common::{relpath_from, stable_id, Album, Artist, Track};
use metadata::{read_tags, MetadataError, TagInfo};
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

const INDEX_VERSION: u32 = 1;
const KEY_SEP: char = '\x1f';

/// Extensions the scanner and watcher accept, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg"];

/// Folder cover candidates, checked by exact file name in this order.
pub const COVER_CANDIDATES: &[&str] = &["cover.jpg", "album.jpg"];

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const ARTISTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("artists");
const ARTISTS_BY_NAME_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("artists_by_name");
const ALBUMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("albums");
const ARTIST_ALBUMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("artist_albums");
const TRACKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks");
const TRACKS_BY_PATH_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks_by_path");
const TRACKS_BY_NAME_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks_by_name");

const META_VERSION_KEY: &str = "version";
const META_STATS_KEY: &str = "stats";

const UNKNOWN_ARTIST: &str = "Unknown Artist";
const UNKNOWN_ALBUM: &str = "Unknown Album";

/// The persisted library index. Cloning shares the underlying database;
/// redb serializes write transactions, which is what makes the
/// lookup-or-create sequence in `ingest_tags` atomic across concurrent
/// ingests of the same artist or album.
#[derive(Clone)]
pub struct Library {
    root: PathBuf,
    db: Arc<Database>,
}

impl Library {
    pub fn open(root: PathBuf, db_path: PathBuf) -> Result<Self, LibraryError> {
        let db = open_or_create_db(&db_path)?;
        Self::open_with_db(root, Arc::new(db))
    }

    pub fn open_with_db(root: PathBuf, db: Arc<Database>) -> Result<Self, LibraryError> {
        let library = Self { root, db };
        library.init_tables()?;
        Ok(library)
    }

    pub fn open_db(path: &Path) -> Result<Arc<Database>, LibraryError> {
        let db = open_or_create_db(path)?;
        Ok(Arc::new(db))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn init_tables(&self) -> Result<(), LibraryError> {
        let version = self.read_version()?;
        let write_txn = self.db.begin_write()?;

        // A format change invalidates every stored row; drop them all and
        // let the next scan repopulate.
        if let Some(version) = version {
            if version != INDEX_VERSION {
                warn!("Index version mismatch ({}); dropping stale index", version);
                clear_table(&write_txn, META_TABLE)?;
                clear_table(&write_txn, ARTISTS_TABLE)?;
                clear_table(&write_txn, ARTISTS_BY_NAME_TABLE)?;
                clear_table(&write_txn, ALBUMS_TABLE)?;
                clear_table(&write_txn, ARTIST_ALBUMS_TABLE)?;
                clear_table(&write_txn, TRACKS_TABLE)?;
                clear_table(&write_txn, TRACKS_BY_PATH_TABLE)?;
                clear_table(&write_txn, TRACKS_BY_NAME_TABLE)?;
            }
        }

        {
            let mut meta_table = write_txn.open_table(META_TABLE)?;
            let _ = write_txn.open_table(ARTISTS_TABLE)?;
            let _ = write_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
            let _ = write_txn.open_table(ALBUMS_TABLE)?;
            let _ = write_txn.open_table(ARTIST_ALBUMS_TABLE)?;
            let _ = write_txn.open_table(TRACKS_TABLE)?;
            let _ = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            let _ = write_txn.open_table(TRACKS_BY_NAME_TABLE)?;

            if version != Some(INDEX_VERSION) {
                let version_bytes = encode_value(&INDEX_VERSION)?;
                meta_table.insert(META_VERSION_KEY, version_bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn read_version(&self) -> Result<Option<u32>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(META_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let version = match table.get(META_VERSION_KEY)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(version)
    }

    /// Walk the whole tree and ingest every supported file not yet in the
    /// index. Idempotent: already-indexed paths are skipped before any tag
    /// reading happens, so an unchanged tree adds nothing. One bad file
    /// never aborts the walk; it lands in `ScanSummary::failures`.
    pub fn scan_tree(&self) -> Result<ScanSummary, LibraryError> {
        if !self.root.is_dir() {
            return Err(LibraryError::MissingRoot(self.root.clone()));
        }

        let mut summary = ScanSummary::default();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_dir() {
                continue;
            }
            let dir = entry.path();
            let folder_cover = find_folder_cover(dir);

            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("Failed to read {:?}: {}", dir, err);
                    continue;
                }
            };
            let mut files: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && is_supported_path(path))
                .collect();
            files.sort();

            for file in files {
                if self.track_by_path(&file)?.is_some() {
                    continue;
                }
                match self.ingest_file(&file, folder_cover.as_deref()) {
                    Ok(track) => {
                        summary.added += 1;
                        info!("Indexed {}", track.file_relpath);
                    }
                    Err(err) => {
                        warn!("Failed to ingest {:?}: {}", file, err);
                        summary.failures.push(ScanFailure {
                            path: file.display().to_string(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            "Scan finished: {} added, {} failed",
            summary.added,
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Drop the whole index and walk the tree from scratch. The fallback
    /// for changes the watcher could not observe.
    pub fn rescan(&self) -> Result<ScanSummary, LibraryError> {
        if !self.root.is_dir() {
            return Err(LibraryError::MissingRoot(self.root.clone()));
        }

        let write_txn = self.db.begin_write()?;
        clear_table(&write_txn, META_TABLE)?;
        clear_table(&write_txn, ARTISTS_TABLE)?;
        clear_table(&write_txn, ARTISTS_BY_NAME_TABLE)?;
        clear_table(&write_txn, ALBUMS_TABLE)?;
        clear_table(&write_txn, ARTIST_ALBUMS_TABLE)?;
        clear_table(&write_txn, TRACKS_TABLE)?;
        clear_table(&write_txn, TRACKS_BY_PATH_TABLE)?;
        clear_table(&write_txn, TRACKS_BY_NAME_TABLE)?;
        write_txn.commit()?;

        self.init_tables()?;
        self.scan_tree()
    }

    /// Read the file's tags and ingest it. Extraction failures propagate
    /// without touching the store.
    pub fn ingest_file(
        &self,
        path: &Path,
        folder_cover: Option<&Path>,
    ) -> Result<Track, LibraryError> {
        let tag = read_tags(path)?;
        self.ingest_tags(path, &tag, folder_cover)
    }

    /// The store half of ingestion: artist lookup-or-create, album
    /// lookup-or-create with cover backfill, track insert. Runs as one
    /// write transaction. Re-ingesting an already-indexed path returns the
    /// existing row untouched.
    pub fn ingest_tags(
        &self,
        path: &Path,
        tag: &TagInfo,
        folder_cover: Option<&Path>,
    ) -> Result<Track, LibraryError> {
        let relpath = relpath_from(&self.root, path)
            .ok_or_else(|| LibraryError::OutsideRoot(path.to_path_buf()))?;
        let cover_relpath = folder_cover.and_then(|cover| relpath_from(&self.root, cover));

        let write_txn = self.db.begin_write()?;
        let track = {
            let mut meta_table = write_txn.open_table(META_TABLE)?;
            let mut artists_table = write_txn.open_table(ARTISTS_TABLE)?;
            let mut artists_by_name_table = write_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
            let mut albums_table = write_txn.open_table(ALBUMS_TABLE)?;
            let mut artist_albums_table = write_txn.open_table(ARTIST_ALBUMS_TABLE)?;
            let mut tracks_table = write_txn.open_table(TRACKS_TABLE)?;
            let mut tracks_by_path_table = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            let mut tracks_by_name_table = write_txn.open_table(TRACKS_BY_NAME_TABLE)?;

            let existing_id = tracks_by_path_table
                .get(relpath.as_str())?
                .map(|value| String::from_utf8_lossy(value.value()).to_string());
            if let Some(track_id) = existing_id {
                let existing: Option<Track> = tracks_table
                    .get(track_id.as_str())?
                    .map(|value| decode_value(value.value()))
                    .transpose()?;
                if let Some(track) = existing {
                    return Ok(track);
                }
            }

            let mut stats: LibraryStats = meta_table
                .get(META_STATS_KEY)?
                .map(|value| decode_value(value.value()))
                .transpose()?
                .unwrap_or_default();

            let artist_name = tag
                .artist
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(UNKNOWN_ARTIST);
            let artist_key = artist_name.to_lowercase();
            let existing_artist_id = artists_by_name_table
                .get(artist_key.as_str())?
                .map(|value| String::from_utf8_lossy(value.value()).to_string());
            let artist_id = match existing_artist_id {
                Some(id) => id,
                None => {
                    let artist = Artist {
                        id: stable_id(&artist_key),
                        name: artist_name.to_string(),
                    };
                    let artist_bytes = encode_value(&artist)?;
                    artists_table.insert(artist.id.as_str(), artist_bytes.as_slice())?;
                    artists_by_name_table.insert(artist_key.as_str(), artist.id.as_bytes())?;
                    stats.artists += 1;
                    artist.id
                }
            };

            let album_title = tag
                .album
                .as_deref()
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .unwrap_or(UNKNOWN_ALBUM);
            let album_title_key = album_title.to_lowercase();
            // Album identity is (title, artist): two artists may each have
            // an album of the same title and get distinct rows.
            let album_id = stable_id(&format!("{}{}{}", artist_id, KEY_SEP, album_title_key));
            let existing_album: Option<Album> = albums_table
                .get(album_id.as_str())?
                .map(|value| decode_value(value.value()))
                .transpose()?;
            match existing_album {
                Some(mut album) => {
                    // First cover wins; later folder covers never replace it.
                    if album.cover_relpath.is_none() && cover_relpath.is_some() {
                        album.cover_relpath = cover_relpath.clone();
                        let album_bytes = encode_value(&album)?;
                        albums_table.insert(album_id.as_str(), album_bytes.as_slice())?;
                    }
                }
                None => {
                    let album = Album {
                        id: album_id.clone(),
                        artist_id: artist_id.clone(),
                        title: album_title.to_string(),
                        year: tag
                            .date
                            .as_deref()
                            .map(str::trim)
                            .filter(|date| !date.is_empty())
                            .map(str::to_string),
                        cover_relpath: cover_relpath.clone(),
                    };
                    let album_bytes = encode_value(&album)?;
                    albums_table.insert(album_id.as_str(), album_bytes.as_slice())?;
                    let index_key = album_index_key(&artist_id, &album_title_key, &album_id);
                    artist_albums_table.insert(index_key.as_str(), album_id.as_bytes())?;
                    stats.albums += 1;
                }
            }

            let title = tag
                .title
                .as_deref()
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| file_stem(path));
            let track = Track {
                id: stable_id(&relpath),
                album_id: album_id.clone(),
                artist_id: artist_id.clone(),
                title,
                file_relpath: relpath.clone(),
                duration_secs: tag.duration_secs.unwrap_or(0),
                track_no: tag.track_no.unwrap_or(0),
                disc_no: tag.disc_no,
                genre: tag.genre.clone(),
            };

            let track_bytes = encode_value(&track)?;
            tracks_table.insert(track.id.as_str(), track_bytes.as_slice())?;
            tracks_by_path_table.insert(relpath.as_str(), track.id.as_bytes())?;
            let name_key = track_name_key(artist_name, album_title, &track);
            tracks_by_name_table.insert(name_key.as_str(), track.id.as_bytes())?;

            stats.tracks += 1;
            let stats_bytes = encode_value(&stats)?;
            meta_table.insert(META_STATS_KEY, stats_bytes.as_slice())?;

            track
        };

        write_txn.commit()?;
        Ok(track)
    }

    /// Delete the track indexed at `path`, if any. Artist and album rows
    /// are kept even when this was their last track.
    pub fn remove_file(&self, path: &Path) -> Result<bool, LibraryError> {
        let relpath = match relpath_from(&self.root, path) {
            Some(rel) => rel,
            None => return Ok(false),
        };

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut meta_table = write_txn.open_table(META_TABLE)?;
            let artists_table = write_txn.open_table(ARTISTS_TABLE)?;
            let albums_table = write_txn.open_table(ALBUMS_TABLE)?;
            let mut tracks_table = write_txn.open_table(TRACKS_TABLE)?;
            let mut tracks_by_path_table = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            let mut tracks_by_name_table = write_txn.open_table(TRACKS_BY_NAME_TABLE)?;

            let track_id = tracks_by_path_table
                .remove(relpath.as_str())?
                .map(|value| String::from_utf8_lossy(value.value()).to_string());
            match track_id {
                None => false,
                Some(track_id) => {
                    let track: Option<Track> = tracks_table
                        .remove(track_id.as_str())?
                        .map(|value| decode_value(value.value()))
                        .transpose()?;
                    if let Some(track) = track {
                        let artist_name = artists_table
                            .get(track.artist_id.as_str())?
                            .map(|value| decode_value::<Artist>(value.value()))
                            .transpose()?
                            .map(|artist| artist.name)
                            .unwrap_or_default();
                        let album_title = albums_table
                            .get(track.album_id.as_str())?
                            .map(|value| decode_value::<Album>(value.value()))
                            .transpose()?
                            .map(|album| album.title)
                            .unwrap_or_default();
                        let name_key = track_name_key(&artist_name, &album_title, &track);
                        tracks_by_name_table.remove(name_key.as_str())?;

                        let mut stats: LibraryStats = meta_table
                            .get(META_STATS_KEY)?
                            .map(|value| decode_value(value.value()))
                            .transpose()?
                            .unwrap_or_default();
                        stats.tracks = stats.tracks.saturating_sub(1);
                        let stats_bytes = encode_value(&stats)?;
                        meta_table.insert(META_STATS_KEY, stats_bytes.as_slice())?;
                    }
                    true
                }
            }
        };

        write_txn.commit()?;
        if removed {
            info!("Removed {}", relpath);
        }
        Ok(removed)
    }

    pub fn track_by_path(&self, path: &Path) -> Result<Option<Track>, LibraryError> {
        let relpath = match relpath_from(&self.root, path) {
            Some(rel) => rel,
            None => return Ok(None),
        };
        let read_txn = self.db.begin_read()?;
        let path_table = read_txn.open_table(TRACKS_BY_PATH_TABLE)?;
        let track_id = match path_table.get(relpath.as_str())? {
            Some(value) => String::from_utf8_lossy(value.value()).to_string(),
            None => return Ok(None),
        };
        let track_table = read_txn.open_table(TRACKS_TABLE)?;
        let track = match track_table.get(track_id.as_str())? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(track)
    }

    pub fn get_artist(&self, artist_id: &str) -> Result<Option<Artist>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let artist_table = read_txn.open_table(ARTISTS_TABLE)?;
        let artist = match artist_table.get(artist_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(artist)
    }

    pub fn get_album(&self, album_id: &str) -> Result<Option<Album>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let album_table = read_txn.open_table(ALBUMS_TABLE)?;
        let album = match album_table.get(album_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(album)
    }

    pub fn get_track(&self, track_id: &str) -> Result<Option<Track>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let track_table = read_txn.open_table(TRACKS_TABLE)?;
        let track = match track_table.get(track_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(track)
    }

    pub fn list_artists(
        &self,
        search: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Artist>, usize), LibraryError> {
        let search = normalize_filter(search);

        let read_txn = self.db.begin_read()?;
        let name_table = read_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
        let artist_table = read_txn.open_table(ARTISTS_TABLE)?;

        let mut total = 0usize;
        let mut items = Vec::new();

        for entry in name_table.iter()? {
            let entry = entry?;
            let name_lower = entry.0.value();
            if let Some(search) = &search {
                if !name_lower.contains(search.as_str()) {
                    continue;
                }
            }

            total += 1;
            if total <= offset || items.len() >= limit {
                continue;
            }

            let artist_id = String::from_utf8_lossy(entry.1.value()).to_string();
            if let Some(value) = artist_table.get(artist_id.as_str())? {
                let artist: Artist = decode_value(value.value())?;
                items.push(artist);
            }
        }

        Ok((items, total))
    }

    pub fn list_albums(
        &self,
        search: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Album>, usize), LibraryError> {
        let search = normalize_filter(search);

        let read_txn = self.db.begin_read()?;
        let index_table = read_txn.open_table(ARTIST_ALBUMS_TABLE)?;
        let album_table = read_txn.open_table(ALBUMS_TABLE)?;

        let mut total = 0usize;
        let mut items = Vec::new();

        for entry in index_table.iter()? {
            let entry = entry?;
            let key = entry.0.value();
            let mut parts = key.split(KEY_SEP);
            let _artist_id = parts.next().unwrap_or("");
            let title_lower = parts.next().unwrap_or("");
            if let Some(search) = &search {
                if !title_lower.contains(search.as_str()) {
                    continue;
                }
            }

            total += 1;
            if total <= offset || items.len() >= limit {
                continue;
            }

            let album_id = String::from_utf8_lossy(entry.1.value()).to_string();
            if let Some(value) = album_table.get(album_id.as_str())? {
                let album: Album = decode_value(value.value())?;
                items.push(album);
            }
        }

        Ok((items, total))
    }

    /// Tracks in natural index order (artist, album, disc, track, title),
    /// optionally filtered by a case-insensitive substring match against
    /// title, artist name, or album title.
    pub fn list_tracks(
        &self,
        search: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Track>, usize), LibraryError> {
        let search = normalize_filter(search);

        let read_txn = self.db.begin_read()?;
        let name_table = read_txn.open_table(TRACKS_BY_NAME_TABLE)?;
        let track_table = read_txn.open_table(TRACKS_TABLE)?;

        let mut total = 0usize;
        let mut items = Vec::new();

        for entry in name_table.iter()? {
            let entry = entry?;
            let key = entry.0.value();
            if let Some(search) = &search {
                if !track_key_matches(key, search) {
                    continue;
                }
            }

            total += 1;
            if total <= offset || items.len() >= limit {
                continue;
            }

            let track_id = String::from_utf8_lossy(entry.1.value()).to_string();
            if let Some(value) = track_table.get(track_id.as_str())? {
                let track: Track = decode_value(value.value())?;
                items.push(track);
            }
        }

        Ok((items, total))
    }

    /// Exact phase of search: every track whose title, artist name, or
    /// album title contains the query, in store order.
    pub fn find_tracks_matching(&self, query: &str) -> Result<Vec<Track>, LibraryError> {
        Ok(self.list_tracks(Some(query), usize::MAX, 0)?.0)
    }

    pub fn all_tracks(&self) -> Result<Vec<Track>, LibraryError> {
        Ok(self.list_tracks(None, usize::MAX, 0)?.0)
    }

    pub fn list_artist_albums(&self, artist_id: &str) -> Result<Vec<Album>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let index_table = read_txn.open_table(ARTIST_ALBUMS_TABLE)?;
        let album_table = read_txn.open_table(ALBUMS_TABLE)?;

        let prefix = prefix_key(artist_id);
        let mut end = prefix.clone();
        end.push('\u{10ffff}');
        let mut albums = Vec::new();

        for entry in index_table.range(prefix.as_str()..end.as_str())? {
            let entry = entry?;
            let album_id = String::from_utf8_lossy(entry.1.value()).to_string();
            if let Some(value) = album_table.get(album_id.as_str())? {
                let album: Album = decode_value(value.value())?;
                albums.push(album);
            }
        }

        Ok(albums)
    }

    /// Album tracks in (disc, track, title) order, straight off the name
    /// index.
    pub fn list_album_tracks(&self, album_id: &str) -> Result<Vec<Track>, LibraryError> {
        let album = match self.get_album(album_id)? {
            Some(album) => album,
            None => return Ok(Vec::new()),
        };
        let artist_name = self
            .get_artist(&album.artist_id)?
            .map(|artist| artist.name)
            .unwrap_or_default();

        let read_txn = self.db.begin_read()?;
        let name_table = read_txn.open_table(TRACKS_BY_NAME_TABLE)?;
        let track_table = read_txn.open_table(TRACKS_TABLE)?;

        let mut prefix = String::new();
        prefix.push_str(&artist_name.trim().to_lowercase());
        prefix.push(KEY_SEP);
        prefix.push_str(&album.title.to_lowercase());
        prefix.push(KEY_SEP);
        let mut end = prefix.clone();
        end.push('\u{10ffff}');

        let mut tracks = Vec::new();
        for entry in name_table.range(prefix.as_str()..end.as_str())? {
            let entry = entry?;
            let track_id = String::from_utf8_lossy(entry.1.value()).to_string();
            if let Some(value) = track_table.get(track_id.as_str())? {
                let track: Track = decode_value(value.value())?;
                tracks.push(track);
            }
        }

        Ok(tracks)
    }

    pub fn stats(&self) -> Result<LibraryStats, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(META_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(LibraryStats::default()),
            Err(err) => return Err(err.into()),
        };
        let stats = match table.get(META_STATS_KEY)? {
            Some(value) => decode_value(value.value())?,
            None => LibraryStats::default(),
        };
        Ok(stats)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LibraryStats {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanSummary {
    pub added: usize,
    pub failures: Vec<ScanFailure>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScanFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Metadata(MetadataError),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    MissingRoot(PathBuf),
    OutsideRoot(PathBuf),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Metadata(err) => write!(f, "metadata error: {}", err),
            LibraryError::Redb(err) => write!(f, "db error: {}", err),
            LibraryError::Bincode(err) => write!(f, "bincode error: {}", err),
            LibraryError::MissingRoot(path) => {
                write!(f, "music directory not found: {}", path.display())
            }
            LibraryError::OutsideRoot(path) => {
                write!(f, "path outside library root: {}", path.display())
            }
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<MetadataError> for LibraryError {
    fn from(err: MetadataError) -> Self {
        LibraryError::Metadata(err)
    }
}

impl From<redb::Error> for LibraryError {
    fn from(err: redb::Error) -> Self {
        LibraryError::Redb(err)
    }
}

impl From<DatabaseError> for LibraryError {
    fn from(err: DatabaseError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TableError> for LibraryError {
    fn from(err: TableError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TransactionError> for LibraryError {
    fn from(err: TransactionError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<StorageError> for LibraryError {
    fn from(err: StorageError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<CommitError> for LibraryError {
    fn from(err: CommitError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for LibraryError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LibraryError::Bincode(err)
    }
}

pub fn is_supported_path(path: &Path) -> bool {
    let ext = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_ascii_lowercase(),
        None => return false,
    };
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

fn find_folder_cover(dir: &Path) -> Option<PathBuf> {
    for name in COVER_CANDIDATES {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown Track".to_string())
}

fn open_or_create_db(path: &Path) -> Result<Database, LibraryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn clear_table(
    txn: &WriteTransaction,
    table: TableDefinition<&str, &[u8]>,
) -> Result<(), LibraryError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, LibraryError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, LibraryError> {
    Ok(bincode::deserialize(bytes)?)
}

fn normalize_filter(search: Option<&str>) -> Option<String> {
    search
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_lowercase())
}

fn album_index_key(artist_id: &str, title_lower: &str, album_id: &str) -> String {
    let mut out = String::new();
    out.push_str(artist_id);
    out.push(KEY_SEP);
    out.push_str(title_lower);
    out.push(KEY_SEP);
    out.push_str(album_id);
    out
}

fn track_name_key(artist_name: &str, album_title: &str, track: &Track) -> String {
    let disc = track.disc_no.unwrap_or(u16::MAX);
    let mut out = String::new();
    out.push_str(artist_name.trim().to_lowercase().as_str());
    out.push(KEY_SEP);
    out.push_str(&album_title.to_lowercase());
    out.push(KEY_SEP);
    out.push_str(&format!("{:05}", disc));
    out.push(KEY_SEP);
    out.push_str(&format!("{:05}", track.track_no));
    out.push(KEY_SEP);
    out.push_str(&track.title.to_lowercase());
    out.push(KEY_SEP);
    out.push_str(&track.id);
    out
}

/// Substring match against the human segments of a name-index key:
/// artist, album, and title. The numeric and ID segments never match.
fn track_key_matches(key: &str, query_lower: &str) -> bool {
    let parts: Vec<&str> = key.split(KEY_SEP).collect();
    if parts.len() != 6 {
        return false;
    }
    parts[0].contains(query_lower)
        || parts[1].contains(query_lower)
        || parts[4].contains(query_lower)
}

fn prefix_key(prefix: &str) -> String {
    let mut out = String::new();
    out.push_str(prefix);
    out.push(KEY_SEP);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_library() -> (TempDir, Library) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("music");
        fs::create_dir_all(&root).unwrap();
        let library = Library::open(root, tmp.path().join("index.redb")).unwrap();
        (tmp, library)
    }

    fn tag(artist: &str, album: &str, title: &str) -> TagInfo {
        TagInfo {
            artist: Some(artist.to_string()),
            album: Some(album.to_string()),
            title: Some(title.to_string()),
            ..TagInfo::default()
        }
    }

    #[test]
    fn lookup_or_create_shares_artist_and_album() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();

        let first = library
            .ingest_tags(&root.join("a/one.mp3"), &tag("Nadir", "Lowlands", "One"), None)
            .unwrap();
        let second = library
            .ingest_tags(&root.join("a/two.mp3"), &tag("Nadir", "Lowlands", "Two"), None)
            .unwrap();

        assert_eq!(first.artist_id, second.artist_id);
        assert_eq!(first.album_id, second.album_id);

        let stats = library.stats().unwrap();
        assert_eq!(stats.artists, 1);
        assert_eq!(stats.albums, 1);
        assert_eq!(stats.tracks, 2);
    }

    #[test]
    fn artist_lookup_is_case_insensitive() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();

        let first = library
            .ingest_tags(&root.join("one.mp3"), &tag("ABBA", "Arrival", "One"), None)
            .unwrap();
        let second = library
            .ingest_tags(&root.join("two.mp3"), &tag("abba", "Arrival", "Two"), None)
            .unwrap();

        assert_eq!(first.artist_id, second.artist_id);
        let artist = library.get_artist(&first.artist_id).unwrap().unwrap();
        assert_eq!(artist.name, "ABBA");
        assert_eq!(library.stats().unwrap().artists, 1);
    }

    #[test]
    fn same_album_title_under_different_artists_is_two_albums() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();

        let first = library
            .ingest_tags(&root.join("one.mp3"), &tag("Ada", "Greatest Hits", "One"), None)
            .unwrap();
        let second = library
            .ingest_tags(&root.join("two.mp3"), &tag("Ben", "Greatest Hits", "Two"), None)
            .unwrap();

        assert_ne!(first.album_id, second.album_id);
        assert_eq!(library.stats().unwrap().albums, 2);
    }

    #[test]
    fn reingesting_a_path_returns_the_existing_row() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();
        let path = root.join("a/one.mp3");

        let first = library
            .ingest_tags(&path, &tag("Nadir", "Lowlands", "One"), None)
            .unwrap();
        let second = library
            .ingest_tags(&path, &tag("Someone Else", "Other", "Renamed"), None)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "One");
        assert_eq!(library.stats().unwrap().tracks, 1);
    }

    #[test]
    fn missing_tags_fall_back_to_sentinels() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();

        let track = library
            .ingest_tags(&root.join("a/04 Untitled.flac"), &TagInfo::default(), None)
            .unwrap();

        assert_eq!(track.title, "04 Untitled");
        assert_eq!(track.track_no, 0);
        assert_eq!(track.duration_secs, 0);
        let artist = library.get_artist(&track.artist_id).unwrap().unwrap();
        assert_eq!(artist.name, "Unknown Artist");
        let album = library.get_album(&track.album_id).unwrap().unwrap();
        assert_eq!(album.title, "Unknown Album");
    }

    #[test]
    fn album_cover_backfills_once() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();
        let cover = root.join("a/cover.jpg");
        let other_cover = root.join("b/cover.jpg");

        let first = library
            .ingest_tags(&root.join("a/one.mp3"), &tag("Nadir", "Lowlands", "One"), None)
            .unwrap();
        let album = library.get_album(&first.album_id).unwrap().unwrap();
        assert_eq!(album.cover_relpath, None);

        library
            .ingest_tags(
                &root.join("a/two.mp3"),
                &tag("Nadir", "Lowlands", "Two"),
                Some(&cover),
            )
            .unwrap();
        let album = library.get_album(&first.album_id).unwrap().unwrap();
        assert_eq!(album.cover_relpath.as_deref(), Some("a/cover.jpg"));

        library
            .ingest_tags(
                &root.join("a/three.mp3"),
                &tag("Nadir", "Lowlands", "Three"),
                Some(&other_cover),
            )
            .unwrap();
        let album = library.get_album(&first.album_id).unwrap().unwrap();
        assert_eq!(album.cover_relpath.as_deref(), Some("a/cover.jpg"));
    }

    #[test]
    fn remove_file_deletes_only_the_track() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();
        let path = root.join("a/one.mp3");

        let track = library
            .ingest_tags(&path, &tag("Nadir", "Lowlands", "One"), None)
            .unwrap();

        assert!(library.remove_file(&path).unwrap());
        assert!(!library.remove_file(&path).unwrap());

        assert!(library.track_by_path(&path).unwrap().is_none());
        assert!(library.get_track(&track.id).unwrap().is_none());
        // Orphan cleanup is intentionally not performed.
        assert!(library.get_artist(&track.artist_id).unwrap().is_some());
        assert!(library.get_album(&track.album_id).unwrap().is_some());
        assert_eq!(library.stats().unwrap().tracks, 0);
    }

    #[test]
    fn move_is_remove_then_ingest() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();
        let old_path = root.join("a/one.mp3");
        let new_path = root.join("b/one.mp3");
        let info = tag("Nadir", "Lowlands", "One");

        library.ingest_tags(&old_path, &info, None).unwrap();
        assert!(library.remove_file(&old_path).unwrap());
        library.ingest_tags(&new_path, &info, None).unwrap();

        assert!(library.track_by_path(&old_path).unwrap().is_none());
        let moved = library.track_by_path(&new_path).unwrap().unwrap();
        assert_eq!(moved.file_relpath, "b/one.mp3");
        assert_eq!(library.stats().unwrap().tracks, 1);
    }

    #[test]
    fn create_then_delete_converges_to_absent() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();
        let path = root.join("a/one.mp3");

        // Create processed first, delete second.
        library
            .ingest_tags(&path, &tag("Nadir", "Lowlands", "One"), None)
            .unwrap();
        library.remove_file(&path).unwrap();
        assert!(library.track_by_path(&path).unwrap().is_none());

        // Delete processed first: the later ingest reads the (now gone)
        // file and fails, so nothing is added either way.
        library.remove_file(&path).unwrap();
        assert!(library.ingest_file(&path, None).is_err());
        assert!(library.track_by_path(&path).unwrap().is_none());
    }

    #[test]
    fn scan_tree_requires_the_root() {
        let tmp = TempDir::new().unwrap();
        let library = Library::open(
            tmp.path().join("does-not-exist"),
            tmp.path().join("index.redb"),
        )
        .unwrap();
        match library.scan_tree() {
            Err(LibraryError::MissingRoot(_)) => {}
            other => panic!("expected MissingRoot, got {:?}", other.map(|s| s.added)),
        }
    }

    #[test]
    fn scan_tree_skips_indexed_files_and_ignores_foreign_ones() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();
        let album_dir = root.join("Nadir").join("Lowlands");
        fs::create_dir_all(&album_dir).unwrap();
        let audio = album_dir.join("one.mp3");
        fs::write(&audio, b"not really audio").unwrap();
        fs::write(album_dir.join("notes.txt"), b"ignored").unwrap();

        // Pre-index the file; the walk must skip it before tag reading.
        library
            .ingest_tags(&audio, &tag("Nadir", "Lowlands", "One"), None)
            .unwrap();

        let summary = library.scan_tree().unwrap();
        assert_eq!(summary.added, 0);
        assert!(summary.failures.is_empty());
        assert_eq!(library.stats().unwrap().tracks, 1);

        let again = library.scan_tree().unwrap();
        assert_eq!(again.added, 0);
    }

    #[test]
    fn scan_tree_records_bad_files_and_continues() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();
        let album_dir = root.join("Broken");
        fs::create_dir_all(&album_dir).unwrap();
        fs::write(album_dir.join("corrupt.mp3"), b"garbage").unwrap();

        let summary = library.scan_tree().unwrap();
        assert_eq!(summary.added, 0);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].path.ends_with("corrupt.mp3"));
        assert_eq!(library.stats().unwrap().tracks, 0);
    }

    #[test]
    fn find_tracks_matching_checks_title_artist_and_album() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();

        library
            .ingest_tags(&root.join("1.mp3"), &tag("Nadir", "Lowlands", "Riverbed"), None)
            .unwrap();
        library
            .ingest_tags(&root.join("2.mp3"), &tag("Other", "Elsewhere", "Skyline"), None)
            .unwrap();

        let by_title = library.find_tracks_matching("river").unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].title, "Riverbed");

        let by_artist = library.find_tracks_matching("nadir").unwrap();
        assert_eq!(by_artist.len(), 1);

        let by_album = library.find_tracks_matching("LOWLANDS").unwrap();
        assert_eq!(by_album.len(), 1);

        assert!(library.find_tracks_matching("zzz").unwrap().is_empty());
    }

    #[test]
    fn album_tracks_come_back_in_disc_and_track_order() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();

        let mut second = tag("Nadir", "Lowlands", "Second");
        second.track_no = Some(2);
        second.disc_no = Some(1);
        let mut first = tag("Nadir", "Lowlands", "First");
        first.track_no = Some(1);
        first.disc_no = Some(1);
        let mut disc_two = tag("Nadir", "Lowlands", "Late");
        disc_two.track_no = Some(1);
        disc_two.disc_no = Some(2);

        library.ingest_tags(&root.join("b.mp3"), &second, None).unwrap();
        let track = library.ingest_tags(&root.join("c.mp3"), &disc_two, None).unwrap();
        library.ingest_tags(&root.join("a.mp3"), &first, None).unwrap();

        let tracks = library.list_album_tracks(&track.album_id).unwrap();
        let titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second", "Late"]);
    }

    #[test]
    fn rescan_rebuilds_from_the_tree() {
        let (_tmp, library) = test_library();
        let root = library.root().to_path_buf();

        library
            .ingest_tags(&root.join("stale.mp3"), &tag("Gone", "Gone", "Gone"), None)
            .unwrap();
        assert_eq!(library.stats().unwrap().tracks, 1);

        // The indexed file does not exist on disk, so a rescan drops it.
        let summary = library.rescan().unwrap();
        assert_eq!(summary.added, 0);
        assert_eq!(library.stats().unwrap().tracks, 0);
        assert!(library.track_by_path(&root.join("stale.mp3")).unwrap().is_none());
    }

    #[test]
    fn supported_path_filter_is_case_insensitive() {
        assert!(is_supported_path(Path::new("x/y/song.mp3")));
        assert!(is_supported_path(Path::new("x/y/SONG.FLAC")));
        assert!(is_supported_path(Path::new("a.ogg")));
        assert!(!is_supported_path(Path::new("x/y/cover.jpg")));
        assert!(!is_supported_path(Path::new("noext")));
    }
}
