//! Media and subtitle byte endpoints.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Response, StatusCode, header};
use tracing::debug;
use undertow_core::session::{SessionError, parse_session_id};

use super::error::ApiError;
use super::range::{ByteRange, build_range_response, extract_range_header, parse_range_header};
use crate::server::AppState;

/// Content type served for a media path.
///
/// Browsers are picky about a few container types, so those are pinned;
/// anything else is guessed from the extension.
pub fn content_type_for(path: &str) -> String {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("mp4" | "m4v") => "video/mp4".to_string(),
        Some("webm") => "video/webm".to_string(),
        Some("mkv") => "video/x-matroska".to_string(),
        Some("avi") => "video/x-msvideo".to_string(),
        Some("mov") => "video/quicktime".to_string(),
        _ => mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

/// `GET /stream/{id}`
pub async fn stream_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response<Body>, ApiError> {
    let info_hash = parse_session_id(&id)?;
    let stream = state.registry.stream_reader(info_hash).await?;

    let total_size = stream.file.length;
    let range = extract_range_header(&headers)
        .map_or(ByteRange::Full, |value| parse_range_header(value, total_size));
    debug!(%info_hash, path = %stream.file.path, ?range, "Streaming file");

    let content_type = content_type_for(&stream.file.path);
    build_range_response(stream.reader, range, &content_type, total_size)
        .await
        .map_err(|e| SessionError::Io(e).into())
}

/// `GET /subs/{id}/{index}`
pub async fn subtitle_file(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, String)>,
) -> Result<Response<Body>, ApiError> {
    let info_hash = parse_session_id(&id)?;
    let index: i64 = index
        .parse()
        .map_err(|_| ApiError::bad_request("invalid file index"))?;

    let content = state.registry.subtitle_content(info_hash, index).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/vtt; charset=utf-8")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Body::from(content))
        .map_err(|e| SessionError::Io(std::io::Error::other(e)).into())
}
