use axum::{
    Json,
    body::Body,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use serde::Serialize;

use crate::sync::SyncError;
use crate::sync::types::UnmatchedSong;

/// Errors surfaced by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("{0}")]
    BadRequest(String),
    #[error("missing or malformed bearer credential")]
    Unauthenticated,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unmatched: Option<Vec<UnmatchedSong>>,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Sync(err) => match err {
                SyncError::Auth => StatusCode::UNAUTHORIZED,
                SyncError::NotFoundLocal(_) => StatusCode::NOT_FOUND,
                SyncError::RemotePlaylistMissing
                | SyncError::UpdateNotPermitted
                | SyncError::UnresolvedConflict(_) => StatusCode::CONFLICT,
                SyncError::TransientFetch(_) | SyncError::TransientFailure(_) => StatusCode::BAD_GATEWAY,
                SyncError::RateLimitExhausted | SyncError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                SyncError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Sync(err) => err.kind(),
            Self::BadRequest(_) => "BadRequest",
            Self::Unauthenticated => "AuthError",
        }
    }
}

// Tell axum how to convert `ApiError` into a response.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response<Body> {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "{}", self);
        }

        let unmatched = match &self {
            Self::Sync(SyncError::UnresolvedConflict(songs)) => Some(songs.clone()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            unmatched,
        };

        (status, Json(body)).into_response()
    }
}
