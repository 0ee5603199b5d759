use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::ports::provider::ProviderError;
use crate::provider_rs::types::{
    AddTracksRequest, CreatePlaylistRequest, CreatedPlaylist, Paging, PlaylistItem,
    RemoveTracksRequest, ReorderRequest, SearchResponse, SnapshotResponse, TrackPositions,
    WebApiTrack,
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1/";

const TRACK_URI_PREFIX: &str = "spotify:track:";

/// Fields requested for playlist listings; keeps pages small.
const PLAYLIST_ITEM_FIELDS: &str =
    "items(track(id,uri,name,artists(name),external_ids(isrc))),offset,total,next";

/// Search results considered per query.
const SEARCH_LIMIT: u32 = 10;

pub fn track_uri(track_id: &str) -> String {
    if track_id.starts_with("spotify:") {
        track_id.to_string()
    } else {
        format!("{}{}", TRACK_URI_PREFIX, track_id)
    }
}

/// Reads `Retry-After` as either delay seconds or an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    (at.with_timezone(&chrono::Utc) - chrono::Utc::now())
        .to_std()
        .ok()
}

fn network(err: reqwest::Error) -> ProviderError {
    ProviderError::Network(err.to_string())
}

/// Thin HTTP client for the playlist endpoints. Every call takes the caller's
/// access token; the client itself holds no session.
pub struct WebApiClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl WebApiClient {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        let mut base_url = base_url;
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            client: Client::new(),
            base_url,
            timeout,
        }
    }

    fn url(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url.join(path).map_err(|e| ProviderError::Client {
            status: 400,
            message: format!("invalid request url {}: {}", path, e),
        })
    }

    async fn send(&self, request: RequestBuilder, access_token: &str) -> Result<Response, ProviderError> {
        let response = request
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let message = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), ?retry_after, %message, "Provider request failed");
        Err(ProviderError::from_status(status.as_u16(), retry_after, message))
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Network(format!("invalid response body: {}", e)))
    }

    /// One page of playlist items. Local files come back without a track id
    /// and unavailable tracks may lack the track object entirely; both stay in
    /// the page so positions line up with the provider's.
    pub async fn get_playlist_items(
        &self,
        access_token: &str,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Paging<PlaylistItem>, ProviderError> {
        let url = self.url(&format!("playlists/{}/tracks", playlist_id))?;
        let request = self.client.get(url).query(&[
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
            ("fields", PLAYLIST_ITEM_FIELDS.to_string()),
        ]);
        Self::json(self.send(request, access_token).await?).await
    }

    pub async fn create_playlist(
        &self,
        access_token: &str,
        user_id: &str,
        name: &str,
    ) -> Result<String, ProviderError> {
        let url = self.url(&format!("users/{}/playlists", user_id))?;
        let request = self.client.post(url).json(&CreatePlaylistRequest {
            name,
            public: false,
            description: "",
        });
        let created: CreatedPlaylist = Self::json(self.send(request, access_token).await?).await?;
        Ok(created.id)
    }

    pub async fn add_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        track_ids: &[String],
        position: usize,
    ) -> Result<String, ProviderError> {
        let url = self.url(&format!("playlists/{}/tracks", playlist_id))?;
        let uris: Vec<String> = track_ids.iter().map(|id| track_uri(id)).collect();
        let request = self.client.post(url).json(&AddTracksRequest {
            uris: &uris,
            position,
        });
        let snapshot: SnapshotResponse = Self::json(self.send(request, access_token).await?).await?;
        Ok(snapshot.snapshot_id)
    }

    /// Removes the listed occurrences. Positions refer to the playlist before
    /// the call; the same uri may appear with several positions.
    pub async fn remove_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        tracks: &[(String, usize)],
    ) -> Result<String, ProviderError> {
        let url = self.url(&format!("playlists/{}/tracks", playlist_id))?;

        let mut grouped: Vec<TrackPositions> = Vec::new();
        for (track_id, position) in tracks {
            let uri = track_uri(track_id);
            match grouped.iter_mut().find(|t| t.uri == uri) {
                Some(existing) => existing.positions.push(*position),
                None => grouped.push(TrackPositions {
                    uri,
                    positions: vec![*position],
                }),
            }
        }

        let request = self
            .client
            .delete(url)
            .json(&RemoveTracksRequest { tracks: grouped });
        let snapshot: SnapshotResponse = Self::json(self.send(request, access_token).await?).await?;
        Ok(snapshot.snapshot_id)
    }

    /// Moves one item. `insert_before` is an index in the playlist before the
    /// move, so a forward move has to point one past the final index.
    pub async fn reorder(
        &self,
        access_token: &str,
        playlist_id: &str,
        from: usize,
        to: usize,
    ) -> Result<String, ProviderError> {
        let url = self.url(&format!("playlists/{}/tracks", playlist_id))?;
        let insert_before = if to > from { to + 1 } else { to };
        let request = self.client.put(url).json(&ReorderRequest {
            range_start: from,
            insert_before,
            range_length: 1,
        });
        let snapshot: SnapshotResponse = Self::json(self.send(request, access_token).await?).await?;
        Ok(snapshot.snapshot_id)
    }

    pub async fn search_tracks(&self, access_token: &str, query: &str) -> Result<Vec<WebApiTrack>, ProviderError> {
        let url = self.url("search")?;
        let request = self.client.get(url).query(&[
            ("q", query.to_string()),
            ("type", "track".to_string()),
            ("limit", SEARCH_LIMIT.to_string()),
        ]);
        let response: SearchResponse = Self::json(self.send(request, access_token).await?).await?;
        Ok(response.tracks.items)
    }

    pub async fn get_track(&self, access_token: &str, track_id: &str) -> Result<Option<WebApiTrack>, ProviderError> {
        let url = self.url(&format!("tracks/{}", track_id))?;
        match self.send(self.client.get(url), access_token).await {
            Ok(response) => Ok(Some(Self::json(response).await?)),
            Err(ProviderError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
