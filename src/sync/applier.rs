//! Executes an operation plan against the provider.
//!
//! Adds at contiguous positions and runs of removes are sent as one batched
//! call; moves always go one by one. Each batch draws from the shared rate
//! limiter before every attempt and is retried within the pass retry budget.
//!
//! A failed batch leaves the remote playlist different from what the plan
//! assumed. [`ShadowPlaylist`] tracks both the planned and the actual order so
//! that later operations are re-anchored onto what the remote really holds.

use crate::ports::provider::{PositionedTrack, ProviderError};
use crate::sync::error::{Result, SyncError};
use crate::sync::remote::{Attempted, CallError, RemoteContext};
use crate::sync::types::{
    OperationFailure, OperationOutcome, OperationStatus, SyncOperation, UnmatchedSong,
};

/// Largest batch the provider accepts for add and remove calls.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// One outcome per attempted operation, in plan order.
    pub outcomes: Vec<OperationOutcome>,
    /// Songs whose add or move the provider rejected outright.
    pub rejected: Vec<UnmatchedSong>,
    /// Set when cancellation or the deadline stopped the run early.
    pub cancelled: bool,
}

/// Identity of one playlist entry, independent of its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// Present before the pass, at this index of the remote snapshot.
    Existing(usize),
    /// Inserted by the plan operation with this index.
    Added(usize),
}

/// Planned versus actual remote order.
#[derive(Debug, Clone)]
struct ShadowPlaylist {
    planned: Vec<Entry>,
    actual: Vec<Entry>,
}

impl ShadowPlaylist {
    fn new(len: usize) -> Self {
        let entries: Vec<Entry> = (0..len).map(Entry::Existing).collect();
        Self {
            planned: entries.clone(),
            actual: entries,
        }
    }

    fn actual_position(&self, entry: Entry) -> Option<usize> {
        self.actual.iter().position(|e| *e == entry)
    }
}

/// Index in `actual` right after the closest entry preceding `planned[index]`
/// that really exists remotely.
fn insert_index(actual: &[Entry], planned: &[Entry], index: usize) -> usize {
    planned[..index]
        .iter()
        .rev()
        .find_map(|entry| actual.iter().position(|e| e == entry))
        .map_or(0, |p| p + 1)
}

type Batch<'a> = &'a [SyncOperation];

/// Splits the plan into provider calls without reordering anything.
fn batches(operations: &[SyncOperation], max_batch: usize) -> Vec<Batch<'_>> {
    let max_batch = max_batch.max(1);
    let mut batches = Vec::new();
    let mut start = 0;

    while start < operations.len() {
        let mut end = start + 1;
        while end < operations.len() && end - start < max_batch {
            let joins = match (&operations[end - 1], &operations[end]) {
                (
                    SyncOperation::Add { position: prev, .. },
                    SyncOperation::Add { position: next, .. },
                ) => *next == *prev + 1,
                (SyncOperation::Remove { .. }, SyncOperation::Remove { .. }) => true,
                _ => false,
            };
            if !joins {
                break;
            }
            end += 1;
        }
        batches.push(&operations[start..end]);
        start = end;
    }

    batches
}

fn failure_for(error: &ProviderError) -> OperationFailure {
    match error {
        ProviderError::RateLimited { .. } => OperationFailure::RateLimitExhausted,
        ProviderError::Server { .. } | ProviderError::Network(_) => {
            OperationFailure::TransientFailure {
                message: error.to_string(),
            }
        }
        ProviderError::NotFound => OperationFailure::Rejected {
            status: 404,
            message: error.to_string(),
        },
        ProviderError::Client { status, message } => OperationFailure::Rejected {
            status: *status,
            message: message.clone(),
        },
        // Escalated before outcomes are recorded.
        ProviderError::Unauthorized => OperationFailure::Rejected {
            status: 401,
            message: error.to_string(),
        },
    }
}

struct Applier<'a> {
    ctx: &'a RemoteContext,
    playlist_id: &'a str,
    shadow: ShadowPlaylist,
    report: ApplyReport,
}

impl<'a> Applier<'a> {
    /// Sends one batch and folds its outcome into the shadow playlist.
    async fn run(&mut self, batch: Batch<'_>, first_index: usize) -> Result<()> {
        match batch[0] {
            SyncOperation::Remove { .. } => self.remove(batch).await,
            SyncOperation::Move { .. } => self.move_one(&batch[0]).await,
            SyncOperation::Add { .. } => self.add(batch, first_index).await,
        }
    }

    async fn remove(&mut self, batch: Batch<'_>) -> Result<()> {
        // All positions refer to the playlist before the call.
        let mut targets = Vec::with_capacity(batch.len());
        let mut entries = Vec::with_capacity(batch.len());
        for operation in batch {
            if let SyncOperation::Remove { track_id, position } = operation {
                let entry = self.shadow.planned.remove(*position);
                if let Some(actual) = self.shadow.actual_position(entry) {
                    targets.push(PositionedTrack {
                        track_id: track_id.clone(),
                        position: actual,
                    });
                    entries.push(entry);
                }
            }
        }

        let outcome = if targets.is_empty() {
            Ok(Attempted {
                value: (),
                attempts: 1,
            })
        } else {
            self.ctx
                .retrying("remove tracks", || {
                    self.ctx
                        .provider()
                        .remove_tracks(self.ctx.credential(), self.playlist_id, &targets)
                })
                .await
        };

        let succeeded = self.record(batch, outcome)?;
        if succeeded {
            self.shadow.actual.retain(|e| !entries.contains(e));
        }
        Ok(())
    }

    async fn move_one(&mut self, operation: &SyncOperation) -> Result<()> {
        let SyncOperation::Move { from, to, .. } = operation else {
            return Ok(());
        };

        let entry = self.shadow.planned.remove(*from);
        let planned_index = *to;

        let actual_from = self.shadow.actual_position(entry);
        let mut actual_without = self.shadow.actual.clone();
        if let Some(p) = actual_from {
            actual_without.remove(p);
        }
        let actual_to = insert_index(&actual_without, &self.shadow.planned, planned_index);
        self.shadow.planned.insert(planned_index, entry);

        let outcome = match actual_from {
            Some(p) if p != actual_to => {
                self.ctx
                    .retrying("move track", || {
                        self.ctx.provider().move_track(
                            self.ctx.credential(),
                            self.playlist_id,
                            p,
                            actual_to,
                        )
                    })
                    .await
            }
            _ => Ok(Attempted {
                value: (),
                attempts: 1,
            }),
        };

        let succeeded = self.record(std::slice::from_ref(operation), outcome)?;
        if succeeded && actual_from.is_some() {
            actual_without.insert(actual_to, entry);
            self.shadow.actual = actual_without;
        }
        Ok(())
    }

    async fn add(&mut self, batch: Batch<'_>, first_index: usize) -> Result<()> {
        let SyncOperation::Add { position, .. } = batch[0] else {
            return Ok(());
        };

        let actual_position = insert_index(&self.shadow.actual, &self.shadow.planned, position);
        let track_ids: Vec<String> = batch.iter().map(|o| o.track_id().to_string()).collect();
        let entries: Vec<Entry> = (first_index..first_index + batch.len())
            .map(Entry::Added)
            .collect();
        for (offset, entry) in entries.iter().enumerate() {
            self.shadow.planned.insert(position + offset, *entry);
        }

        let outcome = self
            .ctx
            .retrying("add tracks", || {
                self.ctx.provider().add_tracks(
                    self.ctx.credential(),
                    self.playlist_id,
                    &track_ids,
                    actual_position,
                )
            })
            .await;

        if self.record(batch, outcome)? {
            for (offset, entry) in entries.into_iter().enumerate() {
                self.shadow.actual.insert(actual_position + offset, entry);
            }
        }
        Ok(())
    }

    /// Records one outcome per operation of the batch. Returns whether the
    /// batch took effect remotely.
    fn record(&mut self, batch: Batch<'_>, outcome: std::result::Result<Attempted<()>, CallError>) -> Result<bool> {
        let status = match outcome {
            Ok(Attempted { attempts: 1, .. }) => OperationStatus::Succeeded,
            Ok(Attempted { attempts, .. }) => OperationStatus::RetriedThenSucceeded { attempts },
            Err(CallError::Provider(ProviderError::Unauthorized)) => return Err(SyncError::Auth),
            Err(CallError::Cancelled) | Err(CallError::DeadlineElapsed) => {
                // No confirmed effect; leave it out of the outcomes. The next
                // pass re-reads the playlist either way.
                self.report.cancelled = true;
                return Ok(false);
            }
            Err(CallError::Provider(e)) => {
                let failure = failure_for(&e);
                tracing::warn!(
                    playlist_id = self.playlist_id,
                    operations = batch.len(),
                    error = %e,
                    "Remote mutation failed"
                );
                if let OperationFailure::Rejected { message, .. } = &failure {
                    self.report.rejected.extend(batch.iter().filter_map(|o| {
                        o.song_id().map(|song_id| UnmatchedSong {
                            song_id,
                            reason: format!("rejected by provider: {}", message),
                        })
                    }));
                }
                OperationStatus::Failed { failure }
            }
        };

        let succeeded = status.is_success();
        self.report
            .outcomes
            .extend(batch.iter().map(|operation| OperationOutcome {
                operation: operation.clone(),
                status: status.clone(),
            }));
        Ok(succeeded)
    }
}

/// Applies `operations` to `playlist_id`, whose contents had `remote_len`
/// entries when the plan was computed.
///
/// Only an authorization failure aborts; every other failure is recorded on
/// the affected operations and the run continues with the next batch.
pub async fn apply(
    ctx: &RemoteContext,
    playlist_id: &str,
    remote_len: usize,
    operations: &[SyncOperation],
    max_batch: usize,
) -> Result<ApplyReport> {
    let mut applier = Applier {
        ctx,
        playlist_id,
        shadow: ShadowPlaylist::new(remote_len),
        report: ApplyReport::default(),
    };

    let mut index = 0;
    for batch in batches(operations, max_batch) {
        if ctx.is_interrupted() {
            tracing::info!(
                playlist_id,
                remaining = operations.len() - index,
                "Stopping before next batch"
            );
            applier.report.cancelled = true;
            break;
        }

        applier.run(batch, index).await?;
        if applier.report.cancelled {
            break;
        }
        index += batch.len();
    }

    Ok(applier.report)
}
