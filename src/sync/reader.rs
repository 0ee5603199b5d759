use crate::ports::provider::ProviderError;
use crate::sync::error::{Result, SyncError};
use crate::sync::remote::{CallError, RemoteContext};
use crate::sync::types::{RemotePlaylistSnapshot, RemoteTrackRef};

/// Provider page size for playlist listings.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Reads the full, ordered contents of a remote playlist.
///
/// A playlist that was never linked, or that the provider reports as missing,
/// yields a snapshot with `exists == false`; that is what triggers the creation
/// path, so it is not an error.
pub async fn read_remote_playlist(
    ctx: &RemoteContext,
    remote_playlist_id: Option<&str>,
    page_size: u32,
) -> Result<RemotePlaylistSnapshot> {
    let Some(playlist_id) = remote_playlist_id else {
        tracing::debug!("No remote playlist linked yet");
        return Ok(RemotePlaylistSnapshot::missing(None));
    };

    let mut tracks: Vec<RemoteTrackRef> = Vec::new();
    let mut offset = Some(0u32);

    while let Some(current) = offset {
        let page = ctx
            .retrying("list playlist tracks", || {
                ctx.provider()
                    .playlist_tracks_page(ctx.credential(), playlist_id, current, page_size)
            })
            .await;

        let page = match page {
            Ok(page) => page.value,
            Err(CallError::Provider(ProviderError::NotFound)) if tracks.is_empty() => {
                tracing::info!(playlist_id, "Remote playlist no longer exists");
                return Ok(RemotePlaylistSnapshot::missing(Some(playlist_id.to_string())));
            }
            Err(CallError::Provider(ProviderError::Unauthorized)) => return Err(SyncError::Auth),
            Err(CallError::Provider(e)) => return Err(SyncError::TransientFetch(e)),
            Err(CallError::Cancelled) | Err(CallError::DeadlineElapsed) => {
                return Err(SyncError::Cancelled);
            }
        };

        for item in page.items {
            let position = tracks.len();
            tracks.push(RemoteTrackRef {
                track_id: item.id,
                title: item.title,
                artist: item.artist,
                position,
                isrc: item.isrc,
            });
        }

        offset = page.next_offset.filter(|next| *next > current);
    }

    tracing::debug!(playlist_id, tracks = tracks.len(), "Read remote playlist");

    Ok(RemotePlaylistSnapshot {
        remote_playlist_id: Some(playlist_id.to_string()),
        tracks,
        exists: true,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ports::provider::{MockPlaylistProvider, PlaylistTracksPage, ProviderTrack};
    use crate::test_utils::remote_context;

    fn track(id: &str) -> ProviderTrack {
        ProviderTrack {
            id: id.into(),
            title: format!("Title {}", id),
            artist: "Artist".into(),
            isrc: None,
        }
    }

    #[tokio::test]
    async fn test_unlinked_playlist_is_missing_without_calls() {
        let provider = MockPlaylistProvider::new();
        let ctx = remote_context(Arc::new(provider));

        let snapshot = read_remote_playlist(&ctx, None, 2).await.unwrap();

        assert!(!snapshot.exists);
        assert!(snapshot.tracks.is_empty());
    }

    #[tokio::test]
    async fn test_paginates_in_order() {
        let mut provider = MockPlaylistProvider::new();
        provider
            .expect_playlist_tracks_page()
            .withf(|_, id, offset, limit| id == "P1" && *offset == 0 && *limit == 2)
            .times(1)
            .returning(|_, _, _, _| {
                Ok(PlaylistTracksPage {
                    items: vec![track("R1"), track("R2")],
                    next_offset: Some(2),
                })
            });
        provider
            .expect_playlist_tracks_page()
            .withf(|_, _, offset, _| *offset == 2)
            .times(1)
            .returning(|_, _, _, _| {
                Ok(PlaylistTracksPage {
                    items: vec![track("R1")],
                    next_offset: None,
                })
            });
        let ctx = remote_context(Arc::new(provider));

        let snapshot = read_remote_playlist(&ctx, Some("P1"), 2).await.unwrap();

        assert!(snapshot.exists);
        assert_eq!(snapshot.track_ids(), vec!["R1", "R2", "R1"]);
        assert_eq!(
            snapshot.tracks.iter().map(|t| t.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_not_found_is_missing() {
        let mut provider = MockPlaylistProvider::new();
        provider
            .expect_playlist_tracks_page()
            .times(1)
            .returning(|_, _, _, _| Err(ProviderError::NotFound));
        let ctx = remote_context(Arc::new(provider));

        let snapshot = read_remote_playlist(&ctx, Some("gone"), 100).await.unwrap();

        assert!(!snapshot.exists);
        assert_eq!(snapshot.remote_playlist_id.as_deref(), Some("gone"));
    }

    #[tokio::test]
    async fn test_server_errors_surface_after_retries() {
        let mut provider = MockPlaylistProvider::new();
        provider
            .expect_playlist_tracks_page()
            .times(3)
            .returning(|_, _, _, _| Err(ProviderError::Server { status: 500 }));
        let ctx = remote_context(Arc::new(provider));

        let result = read_remote_playlist(&ctx, Some("P1"), 100).await;

        assert_eq!(
            result,
            Err(SyncError::TransientFetch(ProviderError::Server { status: 500 }))
        );
    }

    #[tokio::test]
    async fn test_transient_error_recovers() {
        let mut provider = MockPlaylistProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_playlist_tracks_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Err(ProviderError::Network("reset".into())));
        provider
            .expect_playlist_tracks_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| {
                Ok(PlaylistTracksPage {
                    items: vec![track("R1")],
                    next_offset: None,
                })
            });
        let ctx = remote_context(Arc::new(provider));

        let snapshot = read_remote_playlist(&ctx, Some("P1"), 100).await.unwrap();

        assert_eq!(snapshot.track_ids(), vec!["R1"]);
    }
}
