use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type PlaylistId = i64;
pub type SongId = i64;

/// A song from the local store, immutable for the duration of one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSong {
    pub id: SongId,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Remote track ids recorded by earlier syncs, keyed by provider name.
    pub external_ids: HashMap<String, String>,
    /// Content fingerprint (ISRC).
    pub isrc: Option<String>,
}

impl LocalSong {
    pub fn external_id(&self, provider: &str) -> Option<&str> {
        self.external_ids.get(provider).map(String::as_str)
    }
}

/// Point-in-time capture of a local playlist. Order is the intended remote order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalPlaylistSnapshot {
    pub id: PlaylistId,
    pub owner_id: String,
    pub name: String,
    /// Remote playlist linked by an earlier pass, if any.
    pub remote_playlist_id: Option<String>,
    pub songs: Vec<LocalSong>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTrackRef {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub position: usize,
    pub isrc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePlaylistSnapshot {
    pub remote_playlist_id: Option<String>,
    pub tracks: Vec<RemoteTrackRef>,
    pub exists: bool,
}

impl RemotePlaylistSnapshot {
    pub fn missing(remote_playlist_id: Option<String>) -> Self {
        Self {
            remote_playlist_id,
            tracks: Vec::new(),
            exists: false,
        }
    }

    pub fn track_ids(&self) -> Vec<&str> {
        self.tracks.iter().map(|t| t.track_id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "tier", content = "score", rename_all = "camelCase")]
pub enum MatchTier {
    ExactProviderId,
    ExactFingerprint,
    FuzzyTitleArtist(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MatchResult {
    #[serde(rename_all = "camelCase")]
    Matched { track_id: String, tier: MatchTier },
    Unmatched { reason: String },
}

impl MatchResult {
    pub fn matched(track_id: impl Into<String>, tier: MatchTier) -> Self {
        Self::Matched {
            track_id: track_id.into(),
            tier,
        }
    }

    pub fn unmatched(reason: impl Into<String>) -> Self {
        Self::Unmatched {
            reason: reason.into(),
        }
    }
}

/// A single remote mutation. Positions are relative to the remote playlist as it
/// exists right after every earlier operation of the plan has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncOperation {
    #[serde(rename_all = "camelCase")]
    Add {
        track_id: String,
        position: usize,
        song_id: Option<SongId>,
    },
    #[serde(rename_all = "camelCase")]
    Remove { track_id: String, position: usize },
    #[serde(rename_all = "camelCase")]
    Move {
        track_id: String,
        from: usize,
        to: usize,
        song_id: Option<SongId>,
    },
}

impl SyncOperation {
    pub fn track_id(&self) -> &str {
        match self {
            Self::Add { track_id, .. }
            | Self::Remove { track_id, .. }
            | Self::Move { track_id, .. } => track_id,
        }
    }

    pub fn song_id(&self) -> Option<SongId> {
        match self {
            Self::Add { song_id, .. } | Self::Move { song_id, .. } => *song_id,
            Self::Remove { .. } => None,
        }
    }
}

/// Policy switches for one pass. All fields are mandatory inside the engine;
/// defaults are applied by the HTTP and CLI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    pub create_if_not_exists: bool,
    pub update_existing: bool,
    pub handle_conflicts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedSong {
    pub song_id: SongId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OperationFailure {
    RateLimitExhausted,
    TransientFailure { message: String },
    Rejected { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum OperationStatus {
    Succeeded,
    RetriedThenSucceeded { attempts: u32 },
    Failed { failure: OperationFailure },
}

impl OperationStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub operation: SyncOperation,
    pub status: OperationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub remote_playlist_id: Option<String>,
    pub created: bool,
    pub songs_added: usize,
    pub songs_removed: usize,
    pub songs_reordered: usize,
    pub unmatched: Vec<UnmatchedSong>,
    pub per_operation_outcomes: Vec<OperationOutcome>,
    /// Set when cancellation or the pass deadline stopped the pass early.
    pub cancelled: bool,
}
