use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{MediaError, MediaResult};

/// Inclusive byte window of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeWindow {
    pub start: u64,
    pub end: u64,
    pub total_length: u64,
}

impl RangeWindow {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_length)
    }

    pub fn is_full_content(&self) -> bool {
        self.start == 0 && self.end + 1 == self.total_length
    }
}

/// Outcome of resolving a `Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeResolution {
    /// Serve `[0, total_length)` with status 200
    FullContent,
    /// Serve exactly the window with status 206
    Partial(RangeWindow),
}

/// Resolve an optional `Range` header value against an object length.
///
/// Only a single `bytes=` range is honoured. Headers in another unit,
/// multi-range requests and syntactically invalid values are ignored and
/// yield [`RangeResolution::FullContent`]. A start at or past the end of
/// the object, `start > end`, or a zero-length suffix is
/// [`MediaError::RangeNotSatisfiable`].
pub fn resolve_range(header: Option<&str>, total_length: u64) -> MediaResult<RangeResolution> {
    let Some(raw) = header.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(RangeResolution::FullContent);
    };

    let Some(ranges) = strip_bytes_unit(raw) else {
        debug!(range = raw, "Ignoring range in unsupported unit");
        return Ok(RangeResolution::FullContent);
    };

    if ranges.contains(',') {
        debug!(range = raw, "Multi-range requests are served as full content");
        return Ok(RangeResolution::FullContent);
    }

    let Some((start, end)) = ranges.split_once('-') else {
        return Ok(RangeResolution::FullContent);
    };
    let (start, end) = (start.trim(), end.trim());

    let unsatisfiable = || MediaError::RangeNotSatisfiable { total_length };

    let window = match (start.is_empty(), end.is_empty()) {
        (true, true) => return Ok(RangeResolution::FullContent),
        // bytes=-N: the last N bytes
        (true, false) => {
            let Ok(suffix) = end.parse::<u64>() else {
                return Ok(RangeResolution::FullContent);
            };
            if suffix == 0 || total_length == 0 {
                return Err(unsatisfiable());
            }
            let suffix = suffix.min(total_length);
            RangeWindow {
                start: total_length - suffix,
                end: total_length - 1,
                total_length,
            }
        }
        (false, open_ended) => {
            let Ok(start) = start.parse::<u64>() else {
                return Ok(RangeResolution::FullContent);
            };
            let end = if open_ended {
                None
            } else {
                match end.parse::<u64>() {
                    Ok(end) => Some(end),
                    Err(_) => return Ok(RangeResolution::FullContent),
                }
            };

            if start >= total_length {
                return Err(unsatisfiable());
            }
            if let Some(end) = end {
                if start > end {
                    return Err(unsatisfiable());
                }
            }

            RangeWindow {
                start,
                end: end.map_or(total_length - 1, |end| end.min(total_length - 1)),
                total_length,
            }
        }
    };

    Ok(RangeResolution::Partial(window))
}

fn strip_bytes_unit(raw: &str) -> Option<&str> {
    let (unit, ranges) = raw.split_once('=')?;
    unit.trim().eq_ignore_ascii_case("bytes").then_some(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(header: &str, total: u64) -> RangeWindow {
        match resolve_range(Some(header), total).unwrap() {
            RangeResolution::Partial(window) => window,
            RangeResolution::FullContent => panic!("expected a window for {header}"),
        }
    }

    fn is_unsatisfiable(header: &str, total: u64) -> bool {
        matches!(
            resolve_range(Some(header), total),
            Err(MediaError::RangeNotSatisfiable { total_length }) if total_length == total
        )
    }

    #[test]
    fn no_header_is_full_content() {
        assert_eq!(resolve_range(None, 1000).unwrap(), RangeResolution::FullContent);
        assert_eq!(resolve_range(Some("  "), 1000).unwrap(), RangeResolution::FullContent);
    }

    #[test]
    fn closed_range() {
        let w = window("bytes=200-499", 1000);
        assert_eq!((w.start, w.end, w.len()), (200, 499, 300));
        assert_eq!(w.content_range(), "bytes 200-499/1000");
    }

    #[test]
    fn open_ended_range_runs_to_last_byte() {
        let w = window("bytes=900-", 1000);
        assert_eq!((w.start, w.end, w.len()), (900, 999, 100));
    }

    #[test]
    fn end_is_clamped_to_length() {
        let w = window("bytes=990-5000", 1000);
        assert_eq!((w.start, w.end), (990, 999));
    }

    #[test]
    fn suffix_range() {
        let w = window("bytes=-100", 1000);
        assert_eq!((w.start, w.end), (900, 999));
        let w = window("bytes=-5000", 1000);
        assert_eq!((w.start, w.end), (0, 999));
        assert!(w.is_full_content());
    }

    #[test]
    fn unsatisfiable_ranges() {
        assert!(is_unsatisfiable("bytes=2000-3000", 1000));
        assert!(is_unsatisfiable("bytes=1000-", 1000));
        assert!(is_unsatisfiable("bytes=500-100", 1000));
        assert!(is_unsatisfiable("bytes=-0", 1000));
        assert!(is_unsatisfiable("bytes=0-", 0));
    }

    #[test]
    fn ignored_headers_fall_back_to_full_content() {
        for header in ["bytes=0-10,20-30", "items=0-5", "bytes=abc-", "bytes=5", "bytes=-"] {
            assert_eq!(
                resolve_range(Some(header), 1000).unwrap(),
                RangeResolution::FullContent,
                "{header}"
            );
        }
    }

    #[test]
    fn unit_and_whitespace_are_tolerated() {
        let w = window(" Bytes = 10 - 19 ", 100);
        assert_eq!((w.start, w.end), (10, 19));
    }
}
