use std::collections::HashSet;

use common::Track;
use library::{Library, LibraryError};

pub const DEFAULT_SEARCH_LIMIT: usize = 50;
pub const MAX_SEARCH_LIMIT: usize = 200;

/// Fuzzy candidates must score strictly above this (0-100 scale).
pub const FUZZY_THRESHOLD: u32 = 60;

/// Hybrid track search. Phase one takes every track whose title, artist,
/// or album contains the query, in store order. Phase two only runs when
/// slots remain: the rest of the catalog is ranked by token-set
/// similarity against "{artist} {title} {album}", scores above the
/// threshold fill the remaining slots best-first, ties broken by
/// ascending track ID.
pub fn resolve(library: &Library, query: &str, limit: usize) -> Result<Vec<Track>, LibraryError> {
    let query = query.trim();
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let mut results = library.find_tracks_matching(query)?;
    results.truncate(limit);

    if results.len() < limit {
        let matched: HashSet<&str> = results.iter().map(|track| track.id.as_str()).collect();
        let mut scored: Vec<(u32, Track)> = Vec::new();
        for track in library.all_tracks()? {
            if matched.contains(track.id.as_str()) {
                continue;
            }
            let artist_name = library
                .get_artist(&track.artist_id)?
                .map(|artist| artist.name)
                .unwrap_or_else(|| "Unknown Artist".to_string());
            let album_title = library
                .get_album(&track.album_id)?
                .map(|album| album.title)
                .unwrap_or_else(|| "Unknown Album".to_string());
            let composite = format!("{} {} {}", artist_name, track.title, album_title);
            let score = token_set_ratio(query, &composite);
            if score > FUZZY_THRESHOLD {
                scored.push((score, track));
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));

        let remaining = limit - results.len();
        results.extend(scored.into_iter().take(remaining).map(|(_, track)| track));
    }

    results.truncate(limit);
    Ok(results)
}

/// Token-set similarity on a 0-100 scale: 100 when either side's tokens
/// are contained in the other's, otherwise the token overlap ratio
/// (Sorensen-Dice). Word order never matters.
pub fn token_set_ratio(a: &str, b: &str) -> u32 {
    let a_tokens = token_set(a);
    let b_tokens = token_set(b);
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0;
    }

    let shared = a_tokens.intersection(&b_tokens).count();
    if shared == a_tokens.len() || shared == b_tokens.len() {
        return 100;
    }

    (200 * shared / (a_tokens.len() + b_tokens.len())) as u32
}

fn token_set(value: &str) -> HashSet<String> {
    normalize(value)
        .split_whitespace()
        .map(|token| token.to_string())
        .collect()
}

fn normalize(value: &str) -> String {
    let mut out = String::new();
    let mut last_space = false;
    for ch in value.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            out.push(lower);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadata::TagInfo;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(token_set_ratio("blue monday", "blue monday"), 100);
    }

    #[test]
    fn word_order_does_not_matter() {
        assert_eq!(token_set_ratio("monday blue", "blue monday"), 100);
    }

    #[test]
    fn a_contained_token_set_scores_100() {
        assert_eq!(
            token_set_ratio("blue monday", "new order blue monday substance"),
            100
        );
    }

    #[test]
    fn partial_overlap_uses_the_dice_ratio() {
        // 2 shared of 3 + 3 tokens: 200 * 2 / 6 = 66.
        assert_eq!(token_set_ratio("one two three", "one two four"), 66);
        // 3 shared of 4 + 6 tokens: exactly the threshold.
        assert_eq!(
            token_set_ratio("a b c d", "a b c x y z"),
            FUZZY_THRESHOLD
        );
    }

    #[test]
    fn disjoint_or_empty_inputs_score_0() {
        assert_eq!(token_set_ratio("one", "two"), 0);
        assert_eq!(token_set_ratio("", "two"), 0);
        assert_eq!(token_set_ratio("one", "   "), 0);
    }

    #[test]
    fn punctuation_and_case_are_normalized_away() {
        assert_eq!(token_set_ratio("Blue-Monday!!", "blue MONDAY"), 100);
    }

    fn seeded_library() -> (TempDir, Library) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("music");
        fs::create_dir_all(&root).unwrap();
        let library = Library::open(root, tmp.path().join("index.redb")).unwrap();
        (tmp, library)
    }

    fn seed(library: &Library, file: &str, artist: &str, album: &str, title: &str) -> Track {
        let path = library.root().join(file);
        let tag = TagInfo {
            artist: Some(artist.to_string()),
            album: Some(album.to_string()),
            title: Some(title.to_string()),
            ..TagInfo::default()
        };
        library.ingest_tags(&path, &tag, None).unwrap()
    }

    #[test]
    fn empty_queries_return_nothing() {
        let (_tmp, library) = seeded_library();
        seed(&library, "a.mp3", "New Order", "Substance", "Blue Monday");
        assert!(resolve(&library, "", 10).unwrap().is_empty());
        assert!(resolve(&library, "   ", 10).unwrap().is_empty());
    }

    #[test]
    fn exact_matches_rank_before_fuzzy_ones() {
        let (_tmp, library) = seeded_library();
        let exact = seed(&library, "a.mp3", "New Order", "Substance", "Blue Monday");
        let fuzzy = seed(&library, "b.mp3", "Orchestra", "Singles", "Monday Blue");

        let results = resolve(&library, "Blue Monday", 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, exact.id);
        assert_eq!(results[1].id, fuzzy.id);
    }

    #[test]
    fn fuzzy_phase_is_skipped_once_exact_fills_the_limit() {
        let (_tmp, library) = seeded_library();
        let exact = seed(&library, "a.mp3", "New Order", "Substance", "Blue Monday");
        seed(&library, "b.mp3", "Orchestra", "Singles", "Monday Blue");

        let results = resolve(&library, "Blue Monday", 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, exact.id);
    }

    #[test]
    fn weak_candidates_stay_below_the_threshold() {
        let (_tmp, library) = seeded_library();
        seed(&library, "a.mp3", "New Order", "Substance", "Blue Monday");
        seed(&library, "b.mp3", "Someone", "Anything", "Unrelated Song");

        let results = resolve(&library, "Blue Monday", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Blue Monday");
    }

    #[test]
    fn a_score_exactly_at_the_threshold_is_excluded() {
        let (_tmp, library) = seeded_library();
        // Composite "echo fox gamma hotel india joy" shares 3 of the
        // query's 4 tokens: 200 * 3 / 10 = 60, not above the threshold.
        seed(&library, "a.mp3", "Echo Fox", "India Joy", "Gamma Hotel");

        let results = resolve(&library, "echo fox gamma zulu", 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn fuzzy_ties_break_by_ascending_track_id() {
        let (_tmp, library) = seeded_library();
        let first = seed(&library, "a.mp3", "Alpha Beta", "Gamma", "One");
        let second = seed(&library, "b.mp3", "Alpha Beta", "Delta", "Two");

        // Neither contains the query as a substring in one field, but both
        // token sets contain it, so both score 100.
        let results = resolve(&library, "beta alpha", 10).unwrap();
        assert_eq!(results.len(), 2);
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(results[0].id, expected[0]);
        assert_eq!(results[1].id, expected[1]);
    }
}
