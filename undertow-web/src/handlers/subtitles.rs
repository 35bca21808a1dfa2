//! Subtitle upload and remote search handlers.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use undertow_core::session::parse_session_id;
use undertow_search::SubtitleSearchResult;

use super::api::{SubtitleLink, json_body, subtitle_url};
use super::error::{ApiError, ApiResponse};
use crate::server::AppState;

/// Multipart field carrying an uploaded subtitle.
pub const UPLOAD_FIELD: &str = "subtitle";

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub lang: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    #[serde(default)]
    pub file_id: u64,
}

fn too_large(limit: usize) -> ApiError {
    ApiError::PayloadTooLarge {
        reason: format!("file too large (max {}MB)", limit / (1024 * 1024)),
    }
}

fn multipart_error(error: MultipartError, limit: usize) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(limit)
    } else {
        ApiError::bad_request(format!("invalid upload: {}", error.body_text()))
    }
}

/// `POST /api/subtitle/{id}`
pub async fn upload_subtitle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<SubtitleLink>>, ApiError> {
    let info_hash = parse_session_id(&id)?;
    state.registry.lookup(info_hash)?;
    let limit = state.config.server.max_upload_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("subtitle.vtt")
            .to_string();
        let content = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        if content.len() > limit {
            return Err(too_large(limit));
        }

        let subtitle = state
            .registry
            .attach_subtitle(info_hash, &file_name, &content)
            .await?;
        return Ok(ApiResponse::success(SubtitleLink {
            url: subtitle_url(info_hash, subtitle.source),
            name: subtitle.name,
        }));
    }

    Err(ApiError::bad_request("subtitle file required"))
}

/// `GET /api/subtitles/search/{id}`
///
/// The query defaults to the selected file's stem (or the torrent name) and
/// the language to the configured default.
pub async fn search_subtitles(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<SubtitleSearchResult>>>, ApiError> {
    let info_hash = parse_session_id(&id)?;
    let session = state.registry.lookup(info_hash)?;

    let query = match params.query.filter(|query| !query.trim().is_empty()) {
        Some(query) => query,
        None => session.search_query().await,
    };
    let language = params
        .lang
        .filter(|lang| !lang.is_empty())
        .unwrap_or_else(|| state.config.subtitles.default_language.clone());

    let results = state.subtitles.search(&query, &language).await?;
    Ok(ApiResponse::success(results))
}

/// `POST /api/subtitles/download/{id}`
pub async fn download_subtitle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<SubtitleLink>>, ApiError> {
    let info_hash = parse_session_id(&id)?;
    state.registry.lookup(info_hash)?;
    let request = json_body(payload)?;
    if request.file_id == 0 {
        return Err(ApiError::bad_request("fileId is required"));
    }

    let downloaded = state.subtitles.download(request.file_id).await?;
    let subtitle = state
        .registry
        .attach_subtitle(info_hash, &downloaded.file_name, &downloaded.content)
        .await?;

    Ok(ApiResponse::success(SubtitleLink {
        url: subtitle_url(info_hash, subtitle.source),
        name: subtitle.name,
    }))
}
