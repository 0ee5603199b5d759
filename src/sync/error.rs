use crate::ports::provider::ProviderError;
use crate::sync::types::{PlaylistId, UnmatchedSong};

/// Reasons a sync pass ends without producing a [`SyncResult`](super::types::SyncResult).
///
/// Policy aborts (`RemotePlaylistMissing`, `UpdateNotPermitted`,
/// `UnresolvedConflict`) are raised before any mutation is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("caller has no valid credential for the provider")]
    Auth,
    #[error("playlist {0} not found in the local store")]
    NotFoundLocal(PlaylistId),
    #[error("remote playlist does not exist and creation is disabled")]
    RemotePlaylistMissing,
    #[error("remote playlist already exists and updating it is disabled")]
    UpdateNotPermitted,
    #[error("{} song(s) could not be matched to a remote track", .0.len())]
    UnresolvedConflict(Vec<UnmatchedSong>),
    #[error("failed to read remote playlist: {0}")]
    TransientFetch(ProviderError),
    #[error("remote call failed after retries: {0}")]
    TransientFailure(ProviderError),
    #[error("provider rate limit exhausted")]
    RateLimitExhausted,
    #[error("sync pass cancelled")]
    Cancelled,
    #[error("local store error: {0}")]
    Store(String),
}

impl SyncError {
    /// Stable identifier used in structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth => "AuthError",
            Self::NotFoundLocal(_) => "NotFoundLocal",
            Self::RemotePlaylistMissing => "RemotePlaylistMissing",
            Self::UpdateNotPermitted => "UpdateNotPermitted",
            Self::UnresolvedConflict(_) => "UnresolvedConflict",
            Self::TransientFetch(_) => "TransientFetchError",
            Self::TransientFailure(_) => "TransientFailure",
            Self::RateLimitExhausted => "RateLimitExhausted",
            Self::Cancelled => "Cancelled",
            Self::Store(_) => "StoreError",
        }
    }

    /// Escalates a provider failure that survived the retry budget.
    pub fn from_exhausted(err: ProviderError) -> Self {
        match err {
            ProviderError::Unauthorized => Self::Auth,
            ProviderError::RateLimited { .. } => Self::RateLimitExhausted,
            other => Self::TransientFailure(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
