use std::path::Path;

use lofty::error::LoftyError;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};

/// Best-effort tag record for one audio file. Every field is optional;
/// ingestion applies the default sentinels ("Unknown Artist",
/// "Unknown Album", file stem, zero).
#[derive(Debug, Default, Clone)]
pub struct TagInfo {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    /// Release date exactly as tagged ("2009", "2009-04-17", ...).
    pub date: Option<String>,
    pub genre: Option<String>,
    pub track_no: Option<u16>,
    pub disc_no: Option<u16>,
    pub duration_secs: Option<u64>,
    pub has_embedded_cover: bool,
}

#[derive(Debug, Clone)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut info = TagInfo::default();

    let duration = properties.duration().as_secs();
    if duration > 0 {
        info.duration_secs = Some(duration);
    }

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = tag.get_string(&ItemKey::TrackTitle).map(|v| v.to_string());
        info.album = tag.get_string(&ItemKey::AlbumTitle).map(|v| v.to_string());
        info.artist = tag.get_string(&ItemKey::TrackArtist).map(|v| v.to_string());
        info.date = tag
            .get_string(&ItemKey::RecordingDate)
            .or_else(|| tag.get_string(&ItemKey::Year))
            .map(|v| v.to_string());
        info.genre = tag
            .get_string(&ItemKey::Genre)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        info.track_no = tag.get_string(&ItemKey::TrackNumber).and_then(parse_u16);
        info.disc_no = tag.get_string(&ItemKey::DiscNumber).and_then(parse_u16);
        info.has_embedded_cover = !tag.pictures().is_empty();
    }

    Ok(info)
}

pub fn read_cover(path: &Path) -> Result<Option<CoverArt>, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(tag) => tag,
        None => return Ok(None),
    };

    let picture = match pick_picture(tag.pictures()) {
        Some(picture) => picture,
        None => return Ok(None),
    };

    let data = picture.data().to_vec();
    let mime = guess_mime(&data);
    Ok(Some(CoverArt { data, mime }))
}

/// Track/disc numbers are often tagged as "3/12"; only the part before
/// the separator counts.
fn parse_u16(text: &str) -> Option<u16> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    for picture in pictures {
        if picture.pic_type() == PictureType::CoverFront {
            return Some(picture);
        }
    }
    pictures.first()
}

fn guess_mime(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg".to_string())
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{guess_mime, parse_u16};

    #[test]
    fn parses_plain_and_slashed_numbers() {
        assert_eq!(parse_u16("7"), Some(7));
        assert_eq!(parse_u16("3/12"), Some(3));
        assert_eq!(parse_u16(" 10 / 11"), Some(10));
    }

    #[test]
    fn rejects_non_numeric_numbers() {
        assert_eq!(parse_u16("A"), None);
        assert_eq!(parse_u16(""), None);
        assert_eq!(parse_u16("/5"), None);
    }

    #[test]
    fn sniffs_common_image_headers() {
        assert_eq!(
            guess_mime(&[0xFF, 0xD8, 0xFF, 0xE0]).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(
            guess_mime(&[0x89, 0x50, 0x4E, 0x47, 0x0D]).as_deref(),
            Some("image/png")
        );
        assert_eq!(guess_mime(b"GIF89a"), None);
    }
}
