use std::time::Duration;

use url::Url;

use crate::ports::provider::{
    PlaylistProvider, PlaylistTracksPage, PositionedTrack, ProviderCredential, ProviderError,
    ProviderTrack, SearchQuery, UNADDRESSABLE_PREFIX, is_unaddressable,
};
use crate::provider_rs::WebApiClient;
use crate::provider_rs::types::{PlaylistItem, WebApiTrack};

/// Uri prefix of local files added through the desktop client.
const LOCAL_FILE_PREFIX: &str = "spotify:local:";

pub struct ProviderHttpAdapter {
    api: WebApiClient,
}

impl ProviderHttpAdapter {
    pub fn new(base_url: Url, request_timeout: Duration) -> Self {
        Self {
            api: WebApiClient::new(base_url, request_timeout),
        }
    }
}

fn to_provider_track(track: WebApiTrack) -> Option<ProviderTrack> {
    let artist = track.artist_credit();
    let isrc = track.isrc().map(str::to_string);
    Some(ProviderTrack {
        id: track.id?,
        title: track.name,
        artist,
        isrc,
    })
}

/// Playlist entries without a track id (local files, region-locked tracks)
/// keep their position and never match a local song. Their uri stays the id
/// when there is one, so removing them addresses the real entry; an item with
/// no track object at all gets a positional placeholder instead.
fn playlist_entry(item: PlaylistItem, position: u32) -> ProviderTrack {
    let Some(track) = item.track else {
        return unmatchable(format!("{}{}", UNADDRESSABLE_PREFIX, position));
    };
    match track.uri.clone() {
        Some(uri) if track.id.is_none() => unmatchable(uri),
        _ => to_provider_track(track)
            .unwrap_or_else(|| unmatchable(format!("{}{}", UNADDRESSABLE_PREFIX, position))),
    }
}

fn unmatchable(id: String) -> ProviderTrack {
    ProviderTrack {
        id,
        title: String::new(),
        artist: String::new(),
        isrc: None,
    }
}

/// Builds the provider search string. Quotes would end a field filter early.
pub fn search_query(query: &SearchQuery) -> String {
    let clean = |s: &str| s.replace('"', "");
    match query {
        SearchQuery::Isrc(isrc) => format!("isrc:{}", clean(isrc.trim())),
        SearchQuery::TitleArtist { title, artist } if artist.trim().is_empty() => {
            format!("track:\"{}\"", clean(title))
        }
        SearchQuery::TitleArtist { title, artist } => {
            format!("track:\"{}\" artist:\"{}\"", clean(title), clean(artist))
        }
    }
}

#[async_trait::async_trait]
impl PlaylistProvider for ProviderHttpAdapter {
    async fn playlist_tracks_page(
        &self,
        credential: &ProviderCredential,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<PlaylistTracksPage, ProviderError> {
        let page = self
            .api
            .get_playlist_items(&credential.access_token, playlist_id, offset, limit)
            .await?;

        let received = page.items.len() as u32;
        let items = page
            .items
            .into_iter()
            .zip(page.offset..)
            .map(|(item, position)| playlist_entry(item, position))
            .collect();
        let next_offset = page
            .next
            .is_some()
            .then_some(page.offset + received)
            .filter(|next| received > 0 && *next < page.total);

        Ok(PlaylistTracksPage { items, next_offset })
    }

    async fn create_playlist(
        &self,
        credential: &ProviderCredential,
        name: &str,
    ) -> Result<String, ProviderError> {
        self.api
            .create_playlist(&credential.access_token, &credential.user_id, name)
            .await
    }

    async fn add_tracks(
        &self,
        credential: &ProviderCredential,
        playlist_id: &str,
        track_ids: &[String],
        position: usize,
    ) -> Result<(), ProviderError> {
        self.api
            .add_tracks(&credential.access_token, playlist_id, track_ids, position)
            .await?;
        Ok(())
    }

    async fn remove_tracks(
        &self,
        credential: &ProviderCredential,
        playlist_id: &str,
        tracks: &[PositionedTrack],
    ) -> Result<(), ProviderError> {
        let tracks: Vec<(String, usize)> = tracks
            .iter()
            .map(|t| (t.track_id.clone(), t.position))
            .collect();
        self.api
            .remove_tracks(&credential.access_token, playlist_id, &tracks)
            .await?;
        Ok(())
    }

    async fn move_track(
        &self,
        credential: &ProviderCredential,
        playlist_id: &str,
        from: usize,
        to: usize,
    ) -> Result<(), ProviderError> {
        self.api
            .reorder(&credential.access_token, playlist_id, from, to)
            .await?;
        Ok(())
    }

    async fn search_tracks(
        &self,
        credential: &ProviderCredential,
        query: &SearchQuery,
    ) -> Result<Vec<ProviderTrack>, ProviderError> {
        let results = self
            .api
            .search_tracks(&credential.access_token, &search_query(query))
            .await?;
        Ok(results.into_iter().filter_map(to_provider_track).collect())
    }

    async fn get_track(
        &self,
        credential: &ProviderCredential,
        track_id: &str,
    ) -> Result<Option<ProviderTrack>, ProviderError> {
        if is_unaddressable(track_id) || track_id.starts_with(LOCAL_FILE_PREFIX) {
            return Ok(None);
        }
        let track = self.api.get_track(&credential.access_token, track_id).await?;
        Ok(track.and_then(to_provider_track))
    }
}
