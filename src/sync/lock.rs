use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::sync::types::PlaylistId;

type Slot = Arc<AsyncMutex<()>>;

/// Process-wide registry serializing passes per local playlist.
///
/// Entries are created on demand and dropped again once nobody holds or waits
/// for them, so the map only grows with the number of playlists in flight.
#[derive(Default)]
pub struct PlaylistLocks {
    slots: Arc<Mutex<HashMap<PlaylistId, Slot>>>,
}

/// Held for the duration of one pass. Dropping it releases the playlist.
pub struct PlaylistLockGuard {
    playlist_id: PlaylistId,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<Mutex<HashMap<PlaylistId, Slot>>>,
}

impl PlaylistLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, playlist_id: PlaylistId) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(playlist_id).or_default().clone()
    }

    /// Waits for exclusive access to `playlist_id`. Returns `None` if `cancel`
    /// fires first.
    pub async fn acquire(
        &self,
        playlist_id: PlaylistId,
        cancel: &CancellationToken,
    ) -> Option<PlaylistLockGuard> {
        let slot = self.slot(playlist_id);

        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = slot.clone().lock_owned() => Some(guard),
        };

        let mut lock = PlaylistLockGuard {
            playlist_id,
            slot,
            guard: None,
            slots: self.slots.clone(),
        };
        // Dropping `lock` unlocked still cleans up the map entry.
        lock.guard = Some(guard?);
        Some(lock)
    }

    /// Number of playlists with a pass running or waiting.
    pub fn in_flight(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or_default()
    }
}

impl Drop for PlaylistLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map and one here: nobody else is waiting.
        if Arc::strong_count(&self.slot) <= 2 {
            slots.remove(&self.playlist_id);
        }
    }
}
