use std::fmt;
use std::time::Duration;

/// Credential for one caller against one provider account.
///
/// Acquired and refreshed upstream; the sync engine only threads it through
/// to every provider call.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredential {
    pub user_id: String,
    pub access_token: String,
}

impl ProviderCredential {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Id prefix for playlist entries the provider lists but cannot address by
/// id (the item carries no track object at all). Such entries can only stay
/// where they are or be moved by position.
pub const UNADDRESSABLE_PREFIX: &str = "unavailable:";

pub fn is_unaddressable(track_id: &str) -> bool {
    track_id.starts_with(UNADDRESSABLE_PREFIX)
}

/// Decoupled representation of a track as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub isrc: Option<String>,
}

/// One page of a remote playlist listing.
#[derive(Debug, Clone)]
pub struct PlaylistTracksPage {
    pub items: Vec<ProviderTrack>,
    /// Offset of the next page, `None` once the listing is exhausted.
    pub next_offset: Option<u32>,
}

/// A track to remove together with the position it currently occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedTrack {
    pub track_id: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    Isrc(String),
    TitleArtist { title: String, artist: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider rejected the credential")]
    Unauthorized,
    #[error("resource not found")]
    NotFound,
    #[error("rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("provider returned server error {status}")]
    Server { status: u16 },
    #[error("provider rejected request with {status}: {message}")]
    Client { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Maps a non-success HTTP status onto the provider error taxonomy.
    pub fn from_status(status: u16, retry_after: Option<Duration>, message: String) -> Self {
        match status {
            401 => Self::Unauthorized,
            404 => Self::NotFound,
            429 => Self::RateLimited { retry_after },
            500..=599 => Self::Server { status },
            _ => Self::Client { status, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Network(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Port trait wrapping the playlist capabilities of a streaming provider.
///
/// Implementations live in `services::provider` (production) or test mocks.
/// Positions are zero-based indexes into the playlist as it exists when the
/// call is made.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PlaylistProvider: Send + Sync {
    async fn playlist_tracks_page(
        &self,
        credential: &ProviderCredential,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<PlaylistTracksPage, ProviderError>;

    /// Creates an empty playlist and returns its remote id.
    async fn create_playlist(
        &self,
        credential: &ProviderCredential,
        name: &str,
    ) -> Result<String, ProviderError>;

    /// Inserts `track_ids`, in order, starting at `position`.
    async fn add_tracks(
        &self,
        credential: &ProviderCredential,
        playlist_id: &str,
        track_ids: &[String],
        position: usize,
    ) -> Result<(), ProviderError>;

    /// Removes every listed occurrence in a single call. Positions refer to the
    /// playlist before the call.
    async fn remove_tracks(
        &self,
        credential: &ProviderCredential,
        playlist_id: &str,
        tracks: &[PositionedTrack],
    ) -> Result<(), ProviderError>;

    /// Moves the item at `from` so that it ends up at index `to`.
    async fn move_track(
        &self,
        credential: &ProviderCredential,
        playlist_id: &str,
        from: usize,
        to: usize,
    ) -> Result<(), ProviderError>;

    async fn search_tracks(
        &self,
        credential: &ProviderCredential,
        query: &SearchQuery,
    ) -> Result<Vec<ProviderTrack>, ProviderError>;

    async fn get_track(
        &self,
        credential: &ProviderCredential,
        track_id: &str,
    ) -> Result<Option<ProviderTrack>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert_eq!(
            ProviderError::from_status(401, None, String::new()),
            ProviderError::Unauthorized
        );
        assert_eq!(
            ProviderError::from_status(429, Some(Duration::from_secs(2)), String::new()),
            ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
        assert_eq!(
            ProviderError::from_status(503, None, String::new()),
            ProviderError::Server { status: 503 }
        );
        assert!(matches!(
            ProviderError::from_status(403, None, "region".into()),
            ProviderError::Client { status: 403, .. }
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(ProviderError::Server { status: 500 }.is_retryable());
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(!ProviderError::Unauthorized.is_retryable());
        assert!(
            !ProviderError::Client {
                status: 400,
                message: "bad".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = ProviderCredential::new("user-1", "secret-token");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("user-1"));
        assert!(!debug.contains("secret-token"));
    }
}
