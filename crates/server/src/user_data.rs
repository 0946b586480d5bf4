use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const FAVORITES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("favorites");
const PLAYLISTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("playlists");
const PLAYLIST_ENTRIES_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("playlist_entries");

const KEY_SEP: char = '\x1f';

/// At most one per track; the table key is the track ID.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Favorite {
    pub track_id: String,
    pub added_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub created_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub track_id: String,
    pub position: u32,
    pub added_at: u64,
}

/// Favorites and playlists, kept in their own database next to the
/// index.
#[derive(Clone)]
pub struct UserDataStore {
    db: Arc<Database>,
}

impl UserDataStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn init_tables(&self) -> Result<(), UserDataError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(FAVORITES_TABLE)?;
            let _ = write_txn.open_table(PLAYLISTS_TABLE)?;
            let _ = write_txn.open_table(PLAYLIST_ENTRIES_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn list_favorites(&self) -> Result<Vec<Favorite>, UserDataError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FAVORITES_TABLE)?;
        let mut items = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let favorite: Favorite = decode_value(entry.1.value())?;
            items.push(favorite);
        }
        items.sort_by(|a, b| b.added_at.cmp(&a.added_at).then_with(|| a.track_id.cmp(&b.track_id)));
        Ok(items)
    }

    pub fn favorite_set(&self) -> Result<HashSet<String>, UserDataError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FAVORITES_TABLE)?;
        let mut ids = HashSet::new();
        for entry in table.iter()? {
            let entry = entry?;
            ids.insert(entry.0.value().to_string());
        }
        Ok(ids)
    }

    /// Idempotent: favoriting twice keeps the original timestamp.
    pub fn add_favorite(&self, track_id: &str) -> Result<Favorite, UserDataError> {
        let write_txn = self.db.begin_write()?;
        let favorite = {
            let mut table = write_txn.open_table(FAVORITES_TABLE)?;
            let existing: Option<Favorite> = table
                .get(track_id)?
                .map(|value| decode_value(value.value()))
                .transpose()?;
            match existing {
                Some(favorite) => favorite,
                None => {
                    let favorite = Favorite {
                        track_id: track_id.to_string(),
                        added_at: now_secs(),
                    };
                    let bytes = encode_value(&favorite)?;
                    table.insert(track_id, bytes.as_slice())?;
                    favorite
                }
            }
        };
        write_txn.commit()?;
        Ok(favorite)
    }

    pub fn remove_favorite(&self, track_id: &str) -> Result<bool, UserDataError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(FAVORITES_TABLE)?;
            let existed = table.remove(track_id)?.is_some();
            existed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn list_playlists(&self) -> Result<Vec<Playlist>, UserDataError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PLAYLISTS_TABLE)?;
        let mut items = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let playlist: Playlist = decode_value(entry.1.value())?;
            items.push(playlist);
        }
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    pub fn get_playlist(&self, playlist_id: &str) -> Result<Option<Playlist>, UserDataError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PLAYLISTS_TABLE)?;
        let playlist = match table.get(playlist_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(playlist)
    }

    pub fn create_playlist(&self, name: String) -> Result<Playlist, UserDataError> {
        let playlist = Playlist {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: now_secs(),
        };
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PLAYLISTS_TABLE)?;
            let bytes = encode_value(&playlist)?;
            table.insert(playlist.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(playlist)
    }

    pub fn delete_playlist(&self, playlist_id: &str) -> Result<bool, UserDataError> {
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut playlist_table = write_txn.open_table(PLAYLISTS_TABLE)?;
            let mut entry_table = write_txn.open_table(PLAYLIST_ENTRIES_TABLE)?;
            let removed = playlist_table.remove(playlist_id)?.is_some();
            if removed {
                let keys = entry_keys(&entry_table, playlist_id)?;
                for key in keys {
                    entry_table.remove(key.as_str())?;
                }
            }
            removed
        };
        write_txn.commit()?;
        Ok(deleted)
    }

    /// Entries in position order; positions may have gaps after removals.
    pub fn playlist_entries(&self, playlist_id: &str) -> Result<Vec<PlaylistEntry>, UserDataError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PLAYLIST_ENTRIES_TABLE)?;

        let prefix = prefix_key(playlist_id);
        let mut end = prefix.clone();
        end.push('\u{10ffff}');

        let mut entries = Vec::new();
        for entry in table.range(prefix.as_str()..end.as_str())? {
            let entry = entry?;
            let value: PlaylistEntry = decode_value(entry.1.value())?;
            entries.push(value);
        }
        Ok(entries)
    }

    /// Append with position max-existing+1. Removals never renumber, so
    /// the next append continues past any gap. Re-adding a track that is
    /// already present returns its existing entry unchanged. `None`
    /// means the playlist does not exist.
    pub fn add_playlist_entry(
        &self,
        playlist_id: &str,
        track_id: &str,
    ) -> Result<Option<PlaylistEntry>, UserDataError> {
        let write_txn = self.db.begin_write()?;
        let entry = {
            let playlist_table = write_txn.open_table(PLAYLISTS_TABLE)?;
            if playlist_table.get(playlist_id)?.is_none() {
                return Ok(None);
            }

            let mut entry_table = write_txn.open_table(PLAYLIST_ENTRIES_TABLE)?;
            let mut next_position = 0u32;
            let mut existing: Option<PlaylistEntry> = None;
            {
                let prefix = prefix_key(playlist_id);
                let mut end = prefix.clone();
                end.push('\u{10ffff}');
                for item in entry_table.range(prefix.as_str()..end.as_str())? {
                    let item = item?;
                    let value: PlaylistEntry = decode_value(item.1.value())?;
                    if value.track_id == track_id {
                        existing = Some(value.clone());
                    }
                    next_position = next_position.max(value.position + 1);
                }
            }
            if let Some(existing) = existing {
                existing
            } else {
                let entry = PlaylistEntry {
                    track_id: track_id.to_string(),
                    position: next_position,
                    added_at: now_secs(),
                };
                let key = entry_key(playlist_id, entry.position, track_id);
                let bytes = encode_value(&entry)?;
                entry_table.insert(key.as_str(), bytes.as_slice())?;
                entry
            }
        };
        write_txn.commit()?;
        Ok(Some(entry))
    }

    pub fn remove_playlist_entry(
        &self,
        playlist_id: &str,
        track_id: &str,
    ) -> Result<bool, UserDataError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut entry_table = write_txn.open_table(PLAYLIST_ENTRIES_TABLE)?;
            let keys = entry_keys(&entry_table, playlist_id)?;
            let mut removed = false;
            for key in keys {
                if key.ends_with(&format!("{}{}", KEY_SEP, track_id)) {
                    entry_table.remove(key.as_str())?;
                    removed = true;
                }
            }
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }
}

#[derive(Debug)]
pub enum UserDataError {
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    Io(std::io::Error),
}

impl std::fmt::Display for UserDataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserDataError::Redb(err) => write!(f, "db error: {}", err),
            UserDataError::Bincode(err) => write!(f, "bincode error: {}", err),
            UserDataError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for UserDataError {}

impl From<redb::Error> for UserDataError {
    fn from(err: redb::Error) -> Self {
        UserDataError::Redb(err)
    }
}

impl From<DatabaseError> for UserDataError {
    fn from(err: DatabaseError) -> Self {
        UserDataError::Redb(err.into())
    }
}

impl From<TableError> for UserDataError {
    fn from(err: TableError) -> Self {
        UserDataError::Redb(err.into())
    }
}

impl From<TransactionError> for UserDataError {
    fn from(err: TransactionError) -> Self {
        UserDataError::Redb(err.into())
    }
}

impl From<StorageError> for UserDataError {
    fn from(err: StorageError) -> Self {
        UserDataError::Redb(err.into())
    }
}

impl From<CommitError> for UserDataError {
    fn from(err: CommitError) -> Self {
        UserDataError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for UserDataError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        UserDataError::Bincode(err)
    }
}

impl From<std::io::Error> for UserDataError {
    fn from(err: std::io::Error) -> Self {
        UserDataError::Io(err)
    }
}

pub fn open_or_create_db(path: &Path) -> Result<Database, UserDataError> {
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

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, UserDataError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, UserDataError> {
    Ok(bincode::deserialize(bytes)?)
}

fn entry_keys(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    playlist_id: &str,
) -> Result<Vec<String>, UserDataError> {
    let prefix = prefix_key(playlist_id);
    let mut end = prefix.clone();
    end.push('\u{10ffff}');
    let mut keys = Vec::new();
    for entry in table.range(prefix.as_str()..end.as_str())? {
        let entry = entry?;
        keys.push(entry.0.value().to_string());
    }
    Ok(keys)
}

fn entry_key(playlist_id: &str, position: u32, track_id: &str) -> String {
    let mut out = String::new();
    out.push_str(playlist_id);
    out.push(KEY_SEP);
    out.push_str(&format!("{:08}", position));
    out.push(KEY_SEP);
    out.push_str(track_id);
    out
}

fn prefix_key(prefix: &str) -> String {
    let mut out = String::new();
    out.push_str(prefix);
    out.push(KEY_SEP);
    out
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, UserDataStore) {
        let tmp = TempDir::new().unwrap();
        let db = open_or_create_db(&tmp.path().join("user_data.redb")).unwrap();
        let store = UserDataStore::new(Arc::new(db));
        store.init_tables().unwrap();
        (tmp, store)
    }

    #[test]
    fn favorites_are_unique_per_track() {
        let (_tmp, store) = test_store();

        let first = store.add_favorite("track-a").unwrap();
        let second = store.add_favorite("track-a").unwrap();
        assert_eq!(first.added_at, second.added_at);
        assert_eq!(store.list_favorites().unwrap().len(), 1);

        assert!(store.remove_favorite("track-a").unwrap());
        assert!(!store.remove_favorite("track-a").unwrap());
        assert!(store.favorite_set().unwrap().is_empty());
    }

    #[test]
    fn playlist_positions_grow_past_gaps() {
        let (_tmp, store) = test_store();
        let playlist = store.create_playlist("road trip".to_string()).unwrap();

        let a = store.add_playlist_entry(&playlist.id, "a").unwrap().unwrap();
        let b = store.add_playlist_entry(&playlist.id, "b").unwrap().unwrap();
        let c = store.add_playlist_entry(&playlist.id, "c").unwrap().unwrap();
        assert_eq!((a.position, b.position, c.position), (0, 1, 2));

        // Removal leaves a gap; the next append continues after the max.
        assert!(store.remove_playlist_entry(&playlist.id, "b").unwrap());
        let d = store.add_playlist_entry(&playlist.id, "d").unwrap().unwrap();
        assert_eq!(d.position, 3);

        let positions: Vec<u32> = store
            .playlist_entries(&playlist.id)
            .unwrap()
            .iter()
            .map(|entry| entry.position)
            .collect();
        assert_eq!(positions, vec![0, 2, 3]);
    }

    #[test]
    fn readding_a_track_is_a_no_op() {
        let (_tmp, store) = test_store();
        let playlist = store.create_playlist("mix".to_string()).unwrap();

        let first = store.add_playlist_entry(&playlist.id, "a").unwrap().unwrap();
        let again = store.add_playlist_entry(&playlist.id, "a").unwrap().unwrap();
        assert_eq!(first.position, again.position);
        assert_eq!(store.playlist_entries(&playlist.id).unwrap().len(), 1);
    }

    #[test]
    fn missing_playlists_are_reported_as_none() {
        let (_tmp, store) = test_store();
        assert!(store.add_playlist_entry("nope", "a").unwrap().is_none());
        assert!(store.get_playlist("nope").unwrap().is_none());
        assert!(!store.delete_playlist("nope").unwrap());
    }

    #[test]
    fn deleting_a_playlist_drops_its_entries() {
        let (_tmp, store) = test_store();
        let playlist = store.create_playlist("gone".to_string()).unwrap();
        store.add_playlist_entry(&playlist.id, "a").unwrap();
        store.add_playlist_entry(&playlist.id, "b").unwrap();

        assert!(store.delete_playlist(&playlist.id).unwrap());
        assert!(store.get_playlist(&playlist.id).unwrap().is_none());
        assert!(store.playlist_entries(&playlist.id).unwrap().is_empty());
    }
}
