//! Byte ranges of the upload (`Content-Range`) and download (`Range`) headers.
//!
//! Only the forms the store actually serves are accepted; everything else is an error
//! rather than a best-effort approximation.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The only supported range unit.
pub const UNIT: &str = "bytes";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("unsupported range unit")]
    UnsupportedUnit,

    #[error("malformed range")]
    Malformed,

    #[error("unsupported range form")]
    Unsupported,

    #[error("range bounds out of order")]
    OutOfOrder,
}

fn parse_position(s: &str) -> Result<u64, RangeError> {
    if s == "*" {
        return Err(RangeError::Unsupported);
    }
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed);
    }
    s.parse().map_err(|_| RangeError::Malformed)
}

/// `Content-Range: bytes <begin>-<end>/<total>` of one upload chunk. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub begin: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    pub fn parse(s: &str) -> Result<Self, RangeError> {
        let (unit, rest) = s.split_once(' ').ok_or(RangeError::Malformed)?;
        if unit != UNIT {
            return Err(RangeError::UnsupportedUnit);
        }
        let (span, total) = rest.split_once('/').ok_or(RangeError::Malformed)?;
        let (begin, end) = span.split_once('-').ok_or(RangeError::Malformed)?;

        let begin = parse_position(begin)?;
        let end = parse_position(end)?;
        let total = parse_position(total)?;

        if begin <= end && end < total {
            Ok(Self { begin, end, total })
        } else {
            Err(RangeError::OutOfOrder)
        }
    }

    /// True when this chunk carries the last byte of the upload.
    pub fn is_complete(&self) -> bool {
        self.total == self.end + 1
    }

    pub fn size(&self) -> u64 {
        self.end - self.begin + 1
    }
}

impl FromStr for ContentRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}/{}", UNIT, self.begin, self.end, self.total)
    }
}

/// `Range: bytes=<begin>-[<end>]` of a download. `end == None` reads to the end of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadRange {
    pub begin: u64,
    pub end: Option<u64>,
}

impl DownloadRange {
    pub fn parse(s: &str) -> Result<Self, RangeError> {
        let (unit, spec) = s.split_once('=').ok_or(RangeError::Malformed)?;
        if unit != UNIT {
            return Err(RangeError::UnsupportedUnit);
        }
        if spec.contains(',') {
            return Err(RangeError::Unsupported);
        }
        let (begin, end) = spec.split_once('-').ok_or(RangeError::Malformed)?;
        if begin.is_empty() {
            // suffix form "-N"
            return Err(RangeError::Unsupported);
        }

        let begin = parse_position(begin)?;
        let end = if end.is_empty() {
            None
        } else {
            Some(parse_position(end)?)
        };

        match end {
            Some(end) if end < begin => Err(RangeError::OutOfOrder),
            _ => Ok(Self { begin, end }),
        }
    }

    /// Clamp against the stored size: `(start, limit)` with `limit` exclusive.
    ///
    /// `None` if the range starts past the end of the data.
    pub fn resolve(&self, size: u64) -> Option<(u64, u64)> {
        let limit = match self.end {
            Some(end) => end.saturating_add(1).min(size),
            None => size,
        };
        if self.begin >= limit {
            return None;
        }
        Some((self.begin, limit))
    }
}

impl FromStr for DownloadRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_single_byte() {
        let range = ContentRange::parse("bytes 0-0/2").unwrap();
        assert_eq!(
            range,
            ContentRange {
                begin: 0,
                end: 0,
                total: 2
            }
        );
        assert_eq!(range.size(), 1);
        assert!(!range.is_complete());
    }

    #[test]
    fn test_content_range_complete() {
        let range = ContentRange::parse("bytes 0-1/2").unwrap();
        assert!(range.is_complete());
        assert_eq!(range.size(), 2);

        let tail = ContentRange::parse("bytes 10-19/20").unwrap();
        assert!(tail.is_complete());
        assert_eq!(tail.size(), 10);
        assert_eq!(tail.to_string(), "bytes 10-19/20");
    }

    #[test]
    fn test_content_range_rejections() {
        assert_eq!(
            ContentRange::parse("test 0-1/2"),
            Err(RangeError::UnsupportedUnit)
        );
        assert_eq!(ContentRange::parse("bytes 1-0/2"), Err(RangeError::OutOfOrder));
        assert_eq!(ContentRange::parse("bytes 0-2/2"), Err(RangeError::OutOfOrder));
        assert_eq!(ContentRange::parse("bytes 0-1/*"), Err(RangeError::Unsupported));
        assert_eq!(ContentRange::parse("bytes */2"), Err(RangeError::Malformed));
        assert_eq!(ContentRange::parse("bytes *-1/2"), Err(RangeError::Unsupported));
        assert_eq!(ContentRange::parse("bytes a-1/2"), Err(RangeError::Malformed));
        assert_eq!(ContentRange::parse("bytes -1-1/2"), Err(RangeError::Malformed));
        assert_eq!(ContentRange::parse("bytes 0-1"), Err(RangeError::Malformed));
        assert_eq!(ContentRange::parse(""), Err(RangeError::Malformed));
    }

    #[test]
    fn test_download_range_forms() {
        assert_eq!(
            DownloadRange::parse("bytes=0-99").unwrap(),
            DownloadRange {
                begin: 0,
                end: Some(99)
            }
        );
        assert_eq!(
            DownloadRange::parse("bytes=10-").unwrap(),
            DownloadRange {
                begin: 10,
                end: None
            }
        );
        assert_eq!(
            DownloadRange::parse("bytes=5-5").unwrap().end,
            Some(5)
        );
    }

    #[test]
    fn test_download_range_rejections() {
        assert_eq!(
            DownloadRange::parse("items=0-1"),
            Err(RangeError::UnsupportedUnit)
        );
        assert_eq!(DownloadRange::parse("bytes=-500"), Err(RangeError::Unsupported));
        assert_eq!(
            DownloadRange::parse("bytes=0-1,5-6"),
            Err(RangeError::Unsupported)
        );
        assert_eq!(DownloadRange::parse("bytes=5-1"), Err(RangeError::OutOfOrder));
        assert_eq!(DownloadRange::parse("bytes=x-1"), Err(RangeError::Malformed));
        assert_eq!(DownloadRange::parse("bytes 0-1"), Err(RangeError::Malformed));
    }

    #[test]
    fn test_download_range_resolve() {
        let open = DownloadRange::parse("bytes=5-").unwrap();
        assert_eq!(open.resolve(20), Some((5, 20)));

        let past_end = DownloadRange::parse("bytes=5-100").unwrap();
        assert_eq!(past_end.resolve(20), Some((5, 20)));

        let inner = DownloadRange::parse("bytes=2-3").unwrap();
        assert_eq!(inner.resolve(20), Some((2, 4)));

        let beyond = DownloadRange::parse("bytes=20-").unwrap();
        assert_eq!(beyond.resolve(20), None);
    }
}
