use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::ports::local_store::LocalStore;
use crate::ports::provider::{PlaylistProvider, ProviderCredential};
use crate::sync::applier::{self, ApplyReport, MAX_BATCH_SIZE};
use crate::sync::error::{Result, SyncError};
use crate::sync::lock::PlaylistLocks;
use crate::sync::matcher::{DEFAULT_FUZZY_THRESHOLD, Matcher};
use crate::sync::planner;
use crate::sync::rate_limit::ProviderRateLimiter;
use crate::sync::reader::{self, DEFAULT_PAGE_SIZE};
use crate::sync::remote::{CallError, RemoteContext, RetryPolicy};
use crate::sync::resolver;
use crate::sync::types::{
    LocalPlaylistSnapshot, PlaylistId, RemoteTrackRef, SongId, SyncOperation, SyncOptions,
    SyncResult, UnmatchedSong,
};

/// Pass-wide default deadline.
pub const DEFAULT_PASS_DEADLINE: Duration = Duration::from_secs(60);

/// Tunables shared by every pass of one engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub fuzzy_threshold: f64,
    pub page_size: u32,
    pub max_batch_size: usize,
    pub pass_deadline: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            page_size: DEFAULT_PAGE_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
            pass_deadline: DEFAULT_PASS_DEADLINE,
            retry: RetryPolicy::default(),
        }
    }
}

/// Lifecycle of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Reading,
    Matching,
    Resolving,
    Planning,
    Applying,
    Reporting,
    Done,
    Aborted(String),
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Reading => write!(f, "reading"),
            Self::Matching => write!(f, "matching"),
            Self::Resolving => write!(f, "resolving"),
            Self::Planning => write!(f, "planning"),
            Self::Applying => write!(f, "applying"),
            Self::Reporting => write!(f, "reporting"),
            Self::Done => write!(f, "done"),
            Self::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

/// One caller's request to push a local playlist.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub playlist_id: PlaylistId,
    pub caller_user_id: String,
    pub credential: ProviderCredential,
    pub options: SyncOptions,
}

/// Result of one pass together with the remote playlist it created, if any.
/// A pass can create the playlist and still abort afterwards.
#[derive(Debug)]
pub struct PassOutcome {
    pub result: Result<SyncResult>,
    pub created_remote_playlist_id: Option<String>,
}

/// Reconciles local playlists with one provider.
///
/// Cheap to share: the lock registry and the rate limiter are the only state
/// that outlives a pass.
pub struct SyncEngine {
    store: Arc<dyn LocalStore>,
    provider: Arc<dyn PlaylistProvider>,
    provider_name: String,
    limiter: Arc<ProviderRateLimiter>,
    locks: Arc<PlaylistLocks>,
    settings: EngineSettings,
}

/// Bookkeeping for a single pass.
struct Pass {
    playlist_id: PlaylistId,
    state: SyncState,
    remote_playlist_id: Option<String>,
    created: bool,
}

impl Pass {
    fn enter(&mut self, next: SyncState) {
        tracing::debug!(playlist_id = self.playlist_id, from = %self.state, to = %next, "Sync state");
        self.state = next;
    }

    fn finish(&self, report: ApplyReport, unmatched: Vec<UnmatchedSong>, local_order: &[SongId]) -> SyncResult {
        let cancelled = report.cancelled;
        let mut result = assemble(report, unmatched, local_order);
        result.remote_playlist_id = self.remote_playlist_id.clone();
        result.created = self.created;
        result.cancelled = cancelled;
        result
    }

    /// Result for a pass stopped by cancellation or the deadline before any
    /// mutation was issued.
    fn stopped(&self, unmatched: Vec<UnmatchedSong>, local_order: &[SongId]) -> SyncResult {
        let report = ApplyReport {
            cancelled: true,
            ..ApplyReport::default()
        };
        self.finish(report, unmatched, local_order)
    }

    fn interrupted(&self) -> SyncResult {
        self.stopped(Vec::new(), &[])
    }
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn LocalStore>,
        provider: Arc<dyn PlaylistProvider>,
        provider_name: impl Into<String>,
        limiter: Arc<ProviderRateLimiter>,
        locks: Arc<PlaylistLocks>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            provider,
            provider_name: provider_name.into(),
            limiter,
            locks,
            settings,
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Runs one synchronization pass for `request.playlist_id`.
    ///
    /// Policy aborts happen before any remote mutation. Cancellation and the
    /// pass deadline are not errors: the pass returns what it completed with
    /// `cancelled` set.
    pub async fn sync_playlist(
        &self,
        request: SyncRequest,
        cancel: CancellationToken,
    ) -> Result<SyncResult> {
        self.run_pass(request, cancel).await.result
    }

    /// Like [`sync_playlist`](Self::sync_playlist), but also reports a remote
    /// playlist created during the pass when a later step aborts it.
    #[instrument(
        skip(self, request, cancel),
        fields(playlist_id = request.playlist_id, provider = %self.provider_name)
    )]
    pub async fn run_pass(&self, request: SyncRequest, cancel: CancellationToken) -> PassOutcome {
        let deadline = Instant::now() + self.settings.pass_deadline;
        let mut pass = Pass {
            playlist_id: request.playlist_id,
            state: SyncState::Idle,
            remote_playlist_id: None,
            created: false,
        };

        let lock = tokio::time::timeout_at(deadline, self.locks.acquire(request.playlist_id, &cancel)).await;
        let Ok(Some(_lock)) = lock else {
            tracing::info!("Cancelled while waiting for playlist lock");
            return PassOutcome {
                result: Ok(pass.interrupted()),
                created_remote_playlist_id: None,
            };
        };

        let ctx = RemoteContext::new(
            self.provider.clone(),
            &self.provider_name,
            request.credential.clone(),
            self.limiter.clone(),
            self.settings.retry,
            deadline,
            cancel,
        );

        let outcome = self.run(&mut pass, &ctx, &request).await;
        let result = match outcome {
            Ok(result) => {
                pass.enter(SyncState::Done);
                tracing::info!(
                    remote_playlist_id = ?result.remote_playlist_id,
                    created = result.created,
                    added = result.songs_added,
                    removed = result.songs_removed,
                    reordered = result.songs_reordered,
                    unmatched = result.unmatched.len(),
                    cancelled = result.cancelled,
                    "Playlist sync finished"
                );
                Ok(result)
            }
            Err(SyncError::Cancelled) => {
                pass.enter(SyncState::Aborted(SyncError::Cancelled.to_string()));
                Ok(pass.interrupted())
            }
            Err(e) => {
                pass.enter(SyncState::Aborted(e.kind().to_string()));
                tracing::warn!(
                    error = %e,
                    created_remote_playlist_id = ?pass.remote_playlist_id.as_ref().filter(|_| pass.created),
                    "Playlist sync aborted"
                );
                Err(e)
            }
        };

        PassOutcome {
            result,
            created_remote_playlist_id: pass.remote_playlist_id.filter(|_| pass.created),
        }
    }

    async fn load(&self, request: &SyncRequest) -> Result<LocalPlaylistSnapshot> {
        let snapshot = self
            .store
            .load_playlist(request.playlist_id)
            .await
            .map_err(|e| SyncError::Store(format!("{:#}", e)))?
            .ok_or(SyncError::NotFoundLocal(request.playlist_id))?;

        // Other users' playlists are indistinguishable from missing ones.
        if snapshot.owner_id != request.caller_user_id {
            tracing::debug!(owner = %snapshot.owner_id, caller = %request.caller_user_id, "Caller does not own playlist");
            return Err(SyncError::NotFoundLocal(request.playlist_id));
        }

        Ok(snapshot)
    }

    async fn run(&self, pass: &mut Pass, ctx: &RemoteContext, request: &SyncRequest) -> Result<SyncResult> {
        pass.enter(SyncState::Reading);
        let local = self.load(request).await?;
        let remote = reader::read_remote_playlist(
            ctx,
            local.remote_playlist_id.as_deref(),
            self.settings.page_size,
        )
        .await?;
        tracing::debug!(
            local_songs = local.songs.len(),
            remote_tracks = remote.tracks.len(),
            remote_exists = remote.exists,
            "Snapshots captured"
        );

        pass.enter(SyncState::Matching);
        let matcher = Matcher::new(ctx, self.settings.fuzzy_threshold);
        let mut matches = Vec::with_capacity(local.songs.len());
        for song in &local.songs {
            if ctx.is_interrupted() {
                return Err(SyncError::Cancelled);
            }
            let result = matcher.match_song(song, &remote.tracks).await?;
            matches.push((song.clone(), result));
        }

        pass.enter(SyncState::Resolving);
        let resolution = resolver::resolve(&request.options, remote.exists, matches)?;

        pass.enter(SyncState::Planning);
        let current: &[RemoteTrackRef] = if resolution.create_playlist {
            &[]
        } else {
            &remote.tracks
        };
        let operations = planner::plan(current, &resolution.targets);
        tracing::debug!(operations = operations.len(), "Planned remote mutations");

        pass.enter(SyncState::Applying);
        pass.remote_playlist_id = remote.remote_playlist_id.clone().filter(|_| remote.exists);
        let local_order: Vec<SongId> = local.songs.iter().map(|s| s.id).collect();

        let playlist_id = if resolution.create_playlist {
            if ctx.is_interrupted() {
                return Ok(pass.stopped(resolution.unmatched, &local_order));
            }
            let created = ctx
                .retrying("create playlist", || {
                    ctx.provider().create_playlist(ctx.credential(), &local.name)
                })
                .await;
            let remote_id = match created {
                Ok(created) => created.value,
                Err(CallError::Provider(e)) => return Err(SyncError::from_exhausted(e)),
                Err(CallError::Cancelled) | Err(CallError::DeadlineElapsed) => {
                    return Ok(pass.stopped(resolution.unmatched, &local_order));
                }
            };
            tracing::info!(remote_playlist_id = %remote_id, name = %local.name, "Created remote playlist");
            pass.created = true;
            pass.remote_playlist_id = Some(remote_id.clone());
            remote_id
        } else {
            remote.remote_playlist_id.clone().unwrap_or_default()
        };

        let report = if operations.is_empty() {
            ApplyReport::default()
        } else {
            applier::apply(
                ctx,
                &playlist_id,
                current.len(),
                &operations,
                self.settings.max_batch_size,
            )
            .await?
        };

        pass.enter(SyncState::Reporting);
        Ok(pass.finish(report, resolution.unmatched, &local_order))
    }
}

/// Builds the result counters from per-operation outcomes. Unmatched songs,
/// whether skipped up front or rejected by the provider, are listed in local
/// playlist order.
fn assemble(report: ApplyReport, mut unmatched: Vec<UnmatchedSong>, local_order: &[SongId]) -> SyncResult {
    let mut result = SyncResult::default();

    for outcome in &report.outcomes {
        if !outcome.status.is_success() {
            continue;
        }
        match outcome.operation {
            SyncOperation::Add { .. } => result.songs_added += 1,
            SyncOperation::Remove { .. } => result.songs_removed += 1,
            SyncOperation::Move { .. } => result.songs_reordered += 1,
        }
    }

    let rank: HashMap<SongId, usize> = local_order
        .iter()
        .enumerate()
        .rev()
        .map(|(i, id)| (*id, i))
        .collect();
    unmatched.extend(report.rejected);
    unmatched.sort_by_key(|u| rank.get(&u.song_id).copied().unwrap_or(usize::MAX));

    result.unmatched = unmatched;
    result.per_operation_outcomes = report.outcomes;
    result
}
