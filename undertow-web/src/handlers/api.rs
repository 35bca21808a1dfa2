//! API handlers for session management

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::info;
use undertow_core::InfoHash;
use undertow_core::session::{FileEntry, SessionError, SessionSnapshot, parse_session_id};
use undertow_core::subtitle::SubtitleSource;

use super::error::{ApiError, ApiResponse};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct AddMagnetRequest {
    #[serde(default)]
    pub magnet: String,
}

#[derive(Debug, Serialize)]
pub struct AddMagnetResponse {
    pub id: InfoHash,
    pub name: String,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectFileRequest {
    pub file_index: i64,
}

/// Name and URL of one subtitle track.
#[derive(Debug, Serialize)]
pub struct SubtitleLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectFileResponse {
    pub stream_url: String,
    pub subtitles: Vec<SubtitleLink>,
}

pub(crate) fn subtitle_url(info_hash: InfoHash, source: SubtitleSource) -> String {
    format!("/subs/{info_hash}/{}", source.wire_index())
}

pub(crate) fn stream_url(info_hash: InfoHash) -> String {
    format!("/stream/{info_hash}")
}

/// Unwraps a JSON body, answering 400 with the envelope on malformed input.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|_| ApiError::bad_request("invalid request body"))
}

/// `POST /api/magnet`
pub async fn add_magnet(
    State(state): State<AppState>,
    payload: Result<Json<AddMagnetRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AddMagnetResponse>>, ApiError> {
    let request = json_body(payload)?;
    let magnet = request.magnet.trim();
    if magnet.is_empty() {
        return Err(ApiError::bad_request("magnet link is required"));
    }

    let session = state.registry.add_descriptor(magnet).await?;

    Ok(ApiResponse::success(AddMagnetResponse {
        id: session.info_hash(),
        name: session.name().to_string(),
        files: session.files().to_vec(),
    }))
}

/// `GET /api/torrents`
pub async fn list_torrents(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<SessionSnapshot>>> {
    let mut snapshots = Vec::new();
    for session in state.registry.sessions() {
        snapshots.push(session.snapshot().await);
    }
    ApiResponse::success(snapshots)
}

/// `POST /api/select/{id}`
pub async fn select_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<SelectFileRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<SelectFileResponse>>, ApiError> {
    let info_hash = parse_session_id(&id)?;
    let request = json_body(payload)?;

    let session = state
        .registry
        .select_file(info_hash, request.file_index)
        .await?;

    let subtitles = session
        .subtitles()
        .await
        .into_iter()
        .map(|subtitle| SubtitleLink {
            url: subtitle_url(info_hash, subtitle.source),
            name: subtitle.name,
        })
        .collect();

    Ok(ApiResponse::success(SelectFileResponse {
        stream_url: stream_url(info_hash),
        subtitles,
    }))
}

/// `DELETE /api/torrents/{id}`
pub async fn remove_torrent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<InfoHash>>, ApiError> {
    let info_hash = parse_session_id(&id)?;
    if !state.registry.remove(info_hash).await? {
        return Err(SessionError::NotFound { info_hash }.into());
    }
    Ok(ApiResponse::success(info_hash))
}

/// `POST /api/cleanup`
pub async fn cleanup(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    state.registry.remove_all().await?;
    info!("Removed all torrents on request");
    Ok(ApiResponse::success("all torrents and data removed"))
}
