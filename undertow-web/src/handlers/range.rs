//! HTTP Range request handling for video streaming
//!
//! Serves a single `bytes=` range per request. Multi-range and malformed
//! headers fall back to the whole body.

use std::io::SeekFrom;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use undertow_core::engine::TransferReader;

/// Portion of a file a request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// Whole file, status 200.
    Full,
    /// Inclusive byte span, status 206.
    Partial { start: u64, end: u64 },
    /// Starts past the end of the file, status 416.
    Unsatisfiable,
}

impl ByteRange {
    /// Number of bytes the response body will carry.
    pub fn length(&self, total_size: u64) -> u64 {
        match *self {
            ByteRange::Full => total_size,
            ByteRange::Partial { start, end } => end - start + 1,
            ByteRange::Unsatisfiable => 0,
        }
    }
}

/// Parses a `Range` header value against a file of `total_size` bytes.
///
/// # Examples
/// ```
/// use undertow_web::handlers::range::{ByteRange, parse_range_header};
/// let range = parse_range_header("bytes=100-199", 1000);
/// assert_eq!(range, ByteRange::Partial { start: 100, end: 199 });
/// ```
pub fn parse_range_header(range: &str, total_size: u64) -> ByteRange {
    let Some(spec) = range.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if spec.contains(',') || total_size == 0 {
        return ByteRange::Full;
    }
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return ByteRange::Full;
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());
    let last = total_size - 1;

    if start_str.is_empty() {
        // Suffix form: the last N bytes.
        return match end_str.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(suffix) => ByteRange::Partial {
                start: total_size.saturating_sub(suffix),
                end: last,
            },
            Err(_) => ByteRange::Full,
        };
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return ByteRange::Full;
    };
    let end = if end_str.is_empty() {
        last
    } else {
        match end_str.parse::<u64>() {
            Ok(end) if end >= start => end.min(last),
            _ => return ByteRange::Full,
        }
    };

    if start > last {
        ByteRange::Unsatisfiable
    } else {
        ByteRange::Partial { start, end }
    }
}

/// Extracts the Range header value, if present and valid UTF-8.
pub fn extract_range_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::RANGE)
        .and_then(|range| range.to_str().ok())
}

/// Builds a streaming response for `range`, positioning `reader` first.
///
/// # Errors
/// Returns the underlying I/O error if seeking fails.
pub async fn build_range_response(
    mut reader: Box<dyn TransferReader>,
    range: ByteRange,
    content_type: &str,
    total_size: u64,
) -> std::io::Result<Response<Body>> {
    let builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "no-cache");

    let response = match range {
        ByteRange::Unsatisfiable => builder
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{total_size}"))
            .body(Body::empty()),
        ByteRange::Full => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, total_size)
            .body(Body::from_stream(ReaderStream::new(reader.take(total_size)))),
        ByteRange::Partial { start, end } => {
            reader.seek(SeekFrom::Start(start)).await?;
            let length = range.length(total_size);
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total_size}"))
                .header(header::CONTENT_LENGTH, length)
                .body(Body::from_stream(ReaderStream::new(reader.take(length))))
        }
    };

    response.map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_header_valid() {
        assert_eq!(
            parse_range_header("bytes=100-199", 1000),
            ByteRange::Partial { start: 100, end: 199 }
        );
    }

    #[test]
    fn test_parse_range_header_open_end() {
        assert_eq!(
            parse_range_header("bytes=500-", 1000),
            ByteRange::Partial { start: 500, end: 999 }
        );
    }

    #[test]
    fn test_parse_range_header_suffix() {
        assert_eq!(
            parse_range_header("bytes=-100", 1000),
            ByteRange::Partial { start: 900, end: 999 }
        );
        assert_eq!(
            parse_range_header("bytes=-5000", 1000),
            ByteRange::Partial { start: 0, end: 999 }
        );
    }

    #[test]
    fn test_parse_range_header_clamps_end() {
        assert_eq!(
            parse_range_header("bytes=100-5000", 500),
            ByteRange::Partial { start: 100, end: 499 }
        );
    }

    #[test]
    fn test_parse_range_header_past_end() {
        assert_eq!(parse_range_header("bytes=1000-", 1000), ByteRange::Unsatisfiable);
    }

    #[test]
    fn test_parse_range_header_fallbacks() {
        assert_eq!(parse_range_header("invalid", 1000), ByteRange::Full);
        assert_eq!(parse_range_header("bytes=0-1,5-6", 1000), ByteRange::Full);
        assert_eq!(parse_range_header("bytes=9-3", 1000), ByteRange::Full);
        assert_eq!(parse_range_header("bytes=abc-", 1000), ByteRange::Full);
        assert_eq!(parse_range_header("bytes=0-", 0), ByteRange::Full);
    }

    #[test]
    fn test_range_length() {
        assert_eq!(ByteRange::Partial { start: 10, end: 19 }.length(100), 10);
        assert_eq!(ByteRange::Full.length(100), 100);
    }
}
