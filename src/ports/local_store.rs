use color_eyre::eyre::Result;

use crate::sync::types::{LocalPlaylistSnapshot, PlaylistId};

/// Port trait over the canonical local playlist store.
///
/// Implementations live in `services::local_store` (production) or test mocks.
/// The sync engine itself only reads through this port; writing the remote
/// link back is left to the service layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LocalStore: Send + Sync {
    /// Captures the playlist with its songs in order, or `None` if it does not exist.
    async fn load_playlist(&self, playlist_id: PlaylistId) -> Result<Option<LocalPlaylistSnapshot>>;

    /// Remembers the remote playlist a local playlist was pushed to.
    async fn record_remote_playlist_id(
        &self,
        playlist_id: PlaylistId,
        provider: &str,
        remote_playlist_id: &str,
    ) -> Result<()>;
}
