/// An inclusive byte window within a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn full(size: u64) -> Self {
        Self {
            start: 0,
            end: size.saturating_sub(1),
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_full(&self, size: u64) -> bool {
        *self == Self::full(size)
    }
}

/// Turn a client `Range` header into a byte window. Anything that does
/// not parse as a single satisfiable `bytes=start-end?` range (garbage,
/// multiple ranges, start past the end of the file) falls back to the
/// whole file instead of erroring.
pub fn resolve_requested(header: Option<&str>, size: u64) -> ByteRange {
    header
        .and_then(|value| parse_range_header(value, size))
        .unwrap_or_else(|| ByteRange::full(size))
}

fn parse_range_header(value: &str, size: u64) -> Option<ByteRange> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') || size == 0 {
        return None;
    }

    // Suffix form: the last N bytes.
    if let Some(suffix) = spec.strip_prefix('-') {
        let suffix: u64 = suffix.trim().parse().ok()?;
        if suffix == 0 {
            return None;
        }
        return Some(ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        });
    }

    let (start_str, end_str) = spec.split_once('-')?;
    let start: u64 = start_str.trim().parse().ok()?;
    if start >= size {
        return None;
    }

    let end = if end_str.trim().is_empty() {
        size - 1
    } else {
        let end: u64 = end_str.trim().parse().ok()?;
        if end < start {
            return None;
        }
        end.min(size - 1)
    };

    Some(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::{resolve_requested, ByteRange};

    #[test]
    fn resolves_closed_range() {
        let range = resolve_requested(Some("bytes=0-99"), 1000);
        assert_eq!(range, ByteRange { start: 0, end: 99 });
        assert_eq!(range.len(), 100);
    }

    #[test]
    fn open_end_runs_to_the_last_byte() {
        let range = resolve_requested(Some("bytes=10-"), 100);
        assert_eq!(range, ByteRange { start: 10, end: 99 });
    }

    #[test]
    fn suffix_counts_from_the_end() {
        let range = resolve_requested(Some("bytes=-10"), 100);
        assert_eq!(range, ByteRange { start: 90, end: 99 });
        // A suffix longer than the file covers all of it.
        let range = resolve_requested(Some("bytes=-500"), 100);
        assert_eq!(range, ByteRange { start: 0, end: 99 });
    }

    #[test]
    fn end_past_the_file_is_clamped() {
        let range = resolve_requested(Some("bytes=90-200"), 100);
        assert_eq!(range, ByteRange { start: 90, end: 99 });
    }

    #[test]
    fn absent_header_means_the_whole_file() {
        assert_eq!(resolve_requested(None, 100), ByteRange::full(100));
    }

    #[test]
    fn malformed_headers_fall_back_to_the_whole_file() {
        let full = ByteRange::full(1000);
        assert_eq!(resolve_requested(Some("bytes=abc"), 1000), full);
        assert_eq!(resolve_requested(Some("bytes=abc-def"), 1000), full);
        assert_eq!(resolve_requested(Some("octets=0-1"), 1000), full);
        assert_eq!(resolve_requested(Some("bytes=-"), 1000), full);
        assert_eq!(resolve_requested(Some("bytes=-0"), 1000), full);
    }

    #[test]
    fn multiple_ranges_fall_back_to_the_whole_file() {
        assert_eq!(
            resolve_requested(Some("bytes=0-1,5-9"), 1000),
            ByteRange::full(1000)
        );
    }

    #[test]
    fn reversed_or_unsatisfiable_ranges_fall_back() {
        let full = ByteRange::full(100);
        assert_eq!(resolve_requested(Some("bytes=10-5"), 100), full);
        assert_eq!(resolve_requested(Some("bytes=100-"), 100), full);
        assert_eq!(resolve_requested(Some("bytes=500-600"), 100), full);
    }
}
