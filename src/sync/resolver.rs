use crate::sync::error::{Result, SyncError};
use crate::sync::types::{LocalSong, MatchResult, SyncOptions, UnmatchedSong};

/// A local song paired with the remote track it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTarget {
    pub song: LocalSong,
    pub track_id: String,
}

/// Policy-adjusted input for the diff planner.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The remote playlist has to be created before anything is applied, and
    /// the diff runs against an empty playlist.
    pub create_playlist: bool,
    /// Matched songs in local order.
    pub targets: Vec<SyncTarget>,
    /// Skipped songs in local order.
    pub unmatched: Vec<UnmatchedSong>,
}

/// Applies the sync options to the per-song match results.
///
/// Rules are evaluated in a fixed order: remote existence first, then the
/// update permission, then unmatched songs. Remote tracks without a local
/// counterpart are not gated here; the planner always removes them.
pub fn resolve(
    options: &SyncOptions,
    remote_exists: bool,
    matches: Vec<(LocalSong, MatchResult)>,
) -> Result<Resolution> {
    let create_playlist = match (remote_exists, options.create_if_not_exists) {
        (false, false) => return Err(SyncError::RemotePlaylistMissing),
        (false, true) => true,
        (true, _) if !options.update_existing => return Err(SyncError::UpdateNotPermitted),
        (true, _) => false,
    };

    let mut targets = Vec::with_capacity(matches.len());
    let mut unmatched = Vec::new();

    for (song, result) in matches {
        match result {
            MatchResult::Matched { track_id, .. } => targets.push(SyncTarget { song, track_id }),
            MatchResult::Unmatched { reason } => unmatched.push(UnmatchedSong {
                song_id: song.id,
                reason,
            }),
        }
    }

    if !unmatched.is_empty() && !options.handle_conflicts {
        return Err(SyncError::UnresolvedConflict(unmatched));
    }

    Ok(Resolution {
        create_playlist,
        targets,
        unmatched,
    })
}
