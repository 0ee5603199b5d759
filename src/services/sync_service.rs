use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ports::local_store::LocalStore;
use crate::sync::{PassOutcome, SyncEngine, SyncRequest, SyncResult, error::Result};

/// Runs sync passes and writes the remote link of newly created playlists
/// back to the local store, so the next pass updates instead of creating.
pub struct SyncService {
    engine: Arc<SyncEngine>,
    store: Arc<dyn LocalStore>,
}

impl SyncService {
    pub fn new(engine: Arc<SyncEngine>, store: Arc<dyn LocalStore>) -> Self {
        Self { engine, store }
    }

    pub async fn sync_playlist(&self, request: SyncRequest, cancel: CancellationToken) -> Result<SyncResult> {
        let playlist_id = request.playlist_id;
        let PassOutcome {
            result,
            created_remote_playlist_id,
        } = self.engine.run_pass(request, cancel).await;

        // Recorded even when the pass aborted after creating the playlist,
        // otherwise the next pass would create a second one. A failed write is
        // logged, not returned: the caller still needs the outcome of the pass.
        if let Some(remote_playlist_id) = created_remote_playlist_id.as_deref() {
            if let Err(e) = self
                .store
                .record_remote_playlist_id(playlist_id, self.engine.provider_name(), remote_playlist_id)
                .await
            {
                tracing::error!(playlist_id, remote_playlist_id, "Failed to record remote playlist link: {:#}", e);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use color_eyre::eyre::eyre;

    use super::*;
    use crate::ports::local_store::MockLocalStore;
    use crate::ports::provider::ProviderError;
    use crate::sync::SyncError;
    use crate::sync::lock::PlaylistLocks;
    use crate::sync::types::{LocalPlaylistSnapshot, LocalSong, SyncOptions};
    use crate::sync::EngineSettings;
    use crate::test_utils::{FakeProvider, TEST_PROVIDER, catalog_track, fast_retry, test_credential, unlimited_limiter};

    fn snapshot(remote_playlist_id: Option<&str>) -> LocalPlaylistSnapshot {
        LocalPlaylistSnapshot {
            id: 7,
            owner_id: "owner-1".into(),
            name: "Focus".into(),
            remote_playlist_id: remote_playlist_id.map(str::to_string),
            songs: vec![LocalSong {
                id: 1,
                title: "Title R1".into(),
                artist: "Artist".into(),
                album: None,
                external_ids: HashMap::from([(TEST_PROVIDER.to_string(), "R1".to_string())]),
                isrc: None,
            }],
        }
    }

    fn service(store: MockLocalStore, provider: Arc<FakeProvider>) -> SyncService {
        let store: Arc<dyn LocalStore> = Arc::new(store);
        let engine = SyncEngine::new(
            store.clone(),
            provider,
            TEST_PROVIDER,
            unlimited_limiter(),
            Arc::new(PlaylistLocks::new()),
            EngineSettings {
                retry: fast_retry(),
                ..EngineSettings::default()
            },
        );
        SyncService::new(Arc::new(engine), store)
    }

    fn request() -> SyncRequest {
        SyncRequest {
            playlist_id: 7,
            caller_user_id: "owner-1".into(),
            credential: test_credential(),
            options: SyncOptions {
                create_if_not_exists: true,
                update_existing: true,
                handle_conflicts: true,
            },
        }
    }

    fn provider() -> Arc<FakeProvider> {
        let provider = FakeProvider::new();
        provider.add_catalog_track(catalog_track("R1", "Title R1", "Artist", None));
        Arc::new(provider)
    }

    #[tokio::test]
    async fn test_records_created_playlist() {
        let mut store = MockLocalStore::new();
        store
            .expect_load_playlist()
            .returning(|_| Ok(Some(snapshot(None))));
        store
            .expect_record_remote_playlist_id()
            .withf(|id, provider, remote| *id == 7 && provider == TEST_PROVIDER && remote == "fake-playlist-1")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let result = service(store, provider())
            .sync_playlist(request(), CancellationToken::new())
            .await
            .unwrap();

        assert!(result.created);
        assert_eq!(result.songs_added, 1);
    }

    #[tokio::test]
    async fn test_existing_playlist_is_not_recorded() {
        let provider = provider();
        provider.insert_playlist("P1", &["R1"]);
        let mut store = MockLocalStore::new();
        store
            .expect_load_playlist()
            .returning(|_| Ok(Some(snapshot(Some("P1")))));
        store.expect_record_remote_playlist_id().never();

        let result = service(store, provider)
            .sync_playlist(request(), CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.created);
        assert!(result.per_operation_outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_keeps_result() {
        let mut store = MockLocalStore::new();
        store
            .expect_load_playlist()
            .returning(|_| Ok(Some(snapshot(None))));
        store
            .expect_record_remote_playlist_id()
            .returning(|_, _, _| Err(eyre!("disk full")));

        let result = service(store, provider())
            .sync_playlist(request(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.remote_playlist_id.as_deref(), Some("fake-playlist-1"));
    }

    #[tokio::test]
    async fn test_records_created_playlist_when_pass_aborts() {
        let provider = provider();
        provider.fail_adds(ProviderError::Unauthorized);
        let mut store = MockLocalStore::new();
        store
            .expect_load_playlist()
            .returning(|_| Ok(Some(snapshot(None))));
        store
            .expect_record_remote_playlist_id()
            .withf(|id, provider, remote| *id == 7 && provider == TEST_PROVIDER && remote == "fake-playlist-1")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let result = service(store, provider)
            .sync_playlist(request(), CancellationToken::new())
            .await;

        assert_eq!(result, Err(SyncError::Auth));
    }
}
