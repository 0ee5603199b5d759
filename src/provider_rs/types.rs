use serde::{Deserialize, Serialize};

/// Track object as returned by the Web API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebApiTrack {
    /// Missing for local files and unavailable tracks.
    pub id: Option<String>,
    /// `spotify:local:…` for local files.
    pub uri: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<WebApiArtist>,
    pub external_ids: Option<WebApiExternalIds>,
}

impl WebApiTrack {
    /// Credited artists joined the way the provider displays them.
    pub fn artist_credit(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn isrc(&self) -> Option<&str> {
        self.external_ids.as_ref()?.isrc.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebApiArtist {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebApiExternalIds {
    pub isrc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    pub track: Option<WebApiTrack>,
}

/// Generic paging envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
    pub offset: u32,
    pub total: u32,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub tracks: Paging<WebApiTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPlaylist {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse {
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePlaylistRequest<'a> {
    pub name: &'a str,
    pub public: bool,
    pub description: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddTracksRequest<'a> {
    pub uris: &'a [String],
    pub position: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackPositions {
    pub uri: String,
    pub positions: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveTracksRequest {
    pub tracks: Vec<TrackPositions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReorderRequest {
    pub range_start: usize,
    pub insert_before: usize,
    pub range_length: usize,
}
