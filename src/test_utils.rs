use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::database::Database;
use crate::ports::provider::{
    PlaylistProvider, PlaylistTracksPage, PositionedTrack, ProviderCredential, ProviderError,
    ProviderTrack, SearchQuery, is_unaddressable,
};
use crate::sync::rate_limit::ProviderRateLimiter;
use crate::sync::remote::{RemoteContext, RetryPolicy};

pub const TEST_PROVIDER: &str = "spotify";

pub async fn test_db() -> Arc<Database> {
    let database = Database::connect("sqlite::memory:")
        .await
        .unwrap_or_else(|e| panic!("Failed to open test database: {:?}", e));
    Arc::new(database)
}

pub fn test_credential() -> ProviderCredential {
    ProviderCredential::new("provider-user-1", "test-token")
}

/// Retry policy with millisecond delays so exhaustion tests stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

pub fn unlimited_limiter() -> Arc<ProviderRateLimiter> {
    let plenty = NonZeroU32::new(10_000).unwrap();
    Arc::new(ProviderRateLimiter::new(plenty, plenty))
}

pub fn remote_context(provider: Arc<dyn PlaylistProvider>) -> RemoteContext {
    remote_context_with_cancel(provider, CancellationToken::new())
}

pub fn remote_context_with_cancel(
    provider: Arc<dyn PlaylistProvider>,
    cancel: CancellationToken,
) -> RemoteContext {
    RemoteContext::new(
        provider,
        TEST_PROVIDER,
        test_credential(),
        unlimited_limiter(),
        fast_retry(),
        Instant::now() + Duration::from_secs(30),
        cancel,
    )
}

pub fn catalog_track(id: &str, title: &str, artist: &str, isrc: Option<&str>) -> ProviderTrack {
    ProviderTrack {
        id: id.into(),
        title: title.into(),
        artist: artist.into(),
        isrc: isrc.map(str::to_string),
    }
}

#[derive(Default)]
struct FakeState {
    playlists: HashMap<String, Vec<String>>,
    catalog: HashMap<String, ProviderTrack>,
    created: usize,
    mutations: usize,
    searches: usize,
    fail_removals: Option<ProviderError>,
    fail_adds: Option<ProviderError>,
}

/// In-memory provider that really applies mutations, so plans can be checked
/// end to end against the resulting playlist order.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_playlist(playlist_id: &str, track_ids: &[&str]) -> Self {
        let provider = Self::new();
        provider.insert_playlist(playlist_id, track_ids);
        provider
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn insert_playlist(&self, playlist_id: &str, track_ids: &[&str]) {
        self.state().playlists.insert(
            playlist_id.to_string(),
            track_ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    pub fn add_catalog_track(&self, track: ProviderTrack) {
        self.state().catalog.insert(track.id.clone(), track);
    }

    /// Current order of a playlist; empty if it does not exist.
    pub fn playlist(&self, playlist_id: &str) -> Vec<String> {
        self.state().playlists.get(playlist_id).cloned().unwrap_or_default()
    }

    pub fn playlist_count(&self) -> usize {
        self.state().playlists.len()
    }

    /// Number of create / add / remove / move calls that reached the provider.
    pub fn mutations(&self) -> usize {
        self.state().mutations
    }

    pub fn searches(&self) -> usize {
        self.state().searches
    }

    pub fn fail_removals(&self, error: ProviderError) {
        self.state().fail_removals = Some(error);
    }

    pub fn fail_adds(&self, error: ProviderError) {
        self.state().fail_adds = Some(error);
    }

    fn track(state: &FakeState, id: &str) -> ProviderTrack {
        if is_unaddressable(id) {
            return catalog_track(id, "", "", None);
        }
        state
            .catalog
            .get(id)
            .cloned()
            .unwrap_or_else(|| catalog_track(id, id, "", None))
    }
}

fn bad_request(message: &str) -> ProviderError {
    ProviderError::Client {
        status: 400,
        message: message.to_string(),
    }
}

#[async_trait::async_trait]
impl PlaylistProvider for FakeProvider {
    async fn playlist_tracks_page(
        &self,
        _credential: &ProviderCredential,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<PlaylistTracksPage, ProviderError> {
        let state = self.state();
        let tracks = state.playlists.get(playlist_id).ok_or(ProviderError::NotFound)?;
        let start = (offset as usize).min(tracks.len());
        let end = (start + limit as usize).min(tracks.len());
        Ok(PlaylistTracksPage {
            items: tracks[start..end].iter().map(|id| Self::track(&state, id)).collect(),
            next_offset: (end < tracks.len()).then_some(end as u32),
        })
    }

    async fn create_playlist(
        &self,
        _credential: &ProviderCredential,
        _name: &str,
    ) -> Result<String, ProviderError> {
        let mut state = self.state();
        state.created += 1;
        state.mutations += 1;
        let id = format!("fake-playlist-{}", state.created);
        state.playlists.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn add_tracks(
        &self,
        _credential: &ProviderCredential,
        playlist_id: &str,
        track_ids: &[String],
        position: usize,
    ) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.mutations += 1;
        if let Some(error) = state.fail_adds.clone() {
            return Err(error);
        }
        let tracks = state.playlists.get_mut(playlist_id).ok_or(ProviderError::NotFound)?;
        if position > tracks.len() {
            return Err(bad_request("position out of range"));
        }
        for (offset, id) in track_ids.iter().enumerate() {
            tracks.insert(position + offset, id.clone());
        }
        Ok(())
    }

    async fn remove_tracks(
        &self,
        _credential: &ProviderCredential,
        playlist_id: &str,
        to_remove: &[PositionedTrack],
    ) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.mutations += 1;
        if let Some(error) = state.fail_removals.clone() {
            return Err(error);
        }
        let tracks = state.playlists.get_mut(playlist_id).ok_or(ProviderError::NotFound)?;
        if to_remove.iter().any(|t| is_unaddressable(&t.track_id)) {
            return Err(bad_request("invalid track uri"));
        }
        if to_remove
            .iter()
            .any(|t| tracks.get(t.position) != Some(&t.track_id))
        {
            return Err(bad_request("track not at position"));
        }
        let mut positions: Vec<usize> = to_remove.iter().map(|t| t.position).collect();
        positions.sort_unstable_by(|a, b| b.cmp(a));
        positions.dedup();
        for position in positions {
            tracks.remove(position);
        }
        Ok(())
    }

    async fn move_track(
        &self,
        _credential: &ProviderCredential,
        playlist_id: &str,
        from: usize,
        to: usize,
    ) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.mutations += 1;
        let tracks = state.playlists.get_mut(playlist_id).ok_or(ProviderError::NotFound)?;
        if from >= tracks.len() || to >= tracks.len() {
            return Err(bad_request("position out of range"));
        }
        let id = tracks.remove(from);
        tracks.insert(to, id);
        Ok(())
    }

    async fn search_tracks(
        &self,
        _credential: &ProviderCredential,
        query: &SearchQuery,
    ) -> Result<Vec<ProviderTrack>, ProviderError> {
        let mut state = self.state();
        state.searches += 1;
        let mut hits: Vec<ProviderTrack> = state
            .catalog
            .values()
            .filter(|track| match query {
                SearchQuery::Isrc(isrc) => track
                    .isrc
                    .as_deref()
                    .is_some_and(|other| other.eq_ignore_ascii_case(isrc)),
                SearchQuery::TitleArtist { title, .. } => {
                    track.title.to_lowercase().contains(&title.to_lowercase())
                }
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(hits)
    }

    async fn get_track(
        &self,
        _credential: &ProviderCredential,
        track_id: &str,
    ) -> Result<Option<ProviderTrack>, ProviderError> {
        Ok(self.state().catalog.get(track_id).cloned())
    }
}
