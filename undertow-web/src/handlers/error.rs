//! JSON envelope and error mapping shared by all handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use undertow_core::engine::EngineError;
use undertow_core::session::SessionError;
use undertow_search::SubtitleSearchError;

/// Envelope wrapped around every JSON response: `{ ok, data?, error? }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            ok: true,
            data: Some(data),
            error: None,
        })
    }
}

/// Failures surfaced by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("{0}")]
    Search(#[from] SubtitleSearchError),

    #[error("{reason}")]
    BadRequest { reason: String },

    #[error("{reason}")]
    PayloadTooLarge { reason: String },
}

impl ApiError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Session(e) => match e {
                SessionError::MetadataTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                SessionError::NotFound { .. } | SessionError::SubtitleNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                SessionError::OutOfRange { .. }
                | SessionError::NoSelection { .. }
                | SessionError::InvalidIdentifier { .. }
                | SessionError::Engine(EngineError::InvalidDescriptor { .. }) => {
                    StatusCode::BAD_REQUEST
                }
                SessionError::Engine(_) | SessionError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Search(_) => StatusCode::BAD_GATEWAY,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Message returned to the client.
    pub fn message(&self) -> String {
        match self {
            ApiError::Session(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "Request failed");
        } else {
            tracing::debug!(error = %self, %status, "Request rejected");
        }

        let body = ApiResponse::<()> {
            ok: false,
            data: None,
            error: Some(self.message()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use undertow_core::InfoHash;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let info_hash = InfoHash::new([0; 20]);
        let cases = [
            (
                ApiError::from(SessionError::MetadataTimeout {
                    info_hash,
                    waited: Duration::from_secs(60),
                }),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ApiError::from(SessionError::NotFound { info_hash }),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(SessionError::OutOfRange {
                    index: 9,
                    file_count: 1,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(SessionError::Io(std::io::Error::other("disk"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(SubtitleSearchError::NotConfigured),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error:?}");
        }
    }

    #[test]
    fn test_timeout_message() {
        let error = ApiError::from(SessionError::MetadataTimeout {
            info_hash: InfoHash::new([0; 20]),
            waited: Duration::from_secs(60),
        });
        assert_eq!(error.message(), "metadata timeout — no peers found");
    }
}
