use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub artist_id: String,
    pub title: String,
    /// Raw release-date string from the tags; not parsed into a number.
    #[serde(default)]
    pub year: Option<String>,
    /// Folder cover image, relative to the library root. Set once by the
    /// first scan that sees one; never replaced afterwards.
    #[serde(default)]
    pub cover_relpath: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub album_id: String,
    pub artist_id: String,
    pub title: String,
    /// Unique across the whole store; ingestion dedupes on it. Immutable
    /// for the row's lifetime; a moved file is delete-then-recreate.
    pub file_relpath: String,
    pub duration_secs: u64,
    pub track_no: u16,
    #[serde(default)]
    pub disc_no: Option<u16>,
    #[serde(default)]
    pub genre: Option<String>,
}

pub fn stable_id(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

pub fn join_relpath(root: &Path, relpath: &str) -> PathBuf {
    let mut out = PathBuf::from(root);
    for part in relpath.split('/') {
        if part.is_empty() {
            continue;
        }
        out.push(part);
    }
    out
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::{join_relpath, relpath_from, stable_id};
    use std::path::Path;

    #[test]
    fn stable_id_is_deterministic() {
        let first = stable_id("Artist/Album/Track.mp3");
        let second = stable_id("Artist/Album/Track.mp3");
        assert_eq!(first, second);
        assert_ne!(first, stable_id("Artist/Album/Track2.mp3"));
    }

    #[test]
    fn relpath_round_trips_through_join() {
        let root = Path::new("/music");
        let path = root.join("Artist").join("Album").join("01 Track.flac");
        let rel = relpath_from(root, &path).unwrap();
        assert_eq!(rel, "Artist/Album/01 Track.flac");
        assert_eq!(join_relpath(root, &rel), path);
    }

    #[test]
    fn relpath_outside_root_is_none() {
        assert!(relpath_from(Path::new("/music"), Path::new("/other/x.mp3")).is_none());
    }
}
