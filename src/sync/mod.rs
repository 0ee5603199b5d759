//! Playlist synchronization engine.
//!
//! A pass reads the local and remote playlists, matches every local song to a
//! provider track, applies the caller's policy, plans the smallest edit script
//! and applies it under the provider's rate limits:
//!
//! ```text
//! reader -> matcher -> resolver -> planner -> applier
//! ```
//!
//! [`orchestrator::SyncEngine`] sequences the stages and owns the per-playlist
//! lock.

pub mod applier;
pub mod error;
pub mod lock;
pub mod matcher;
pub mod orchestrator;
pub mod planner;
pub mod rate_limit;
pub mod reader;
pub mod remote;
pub mod resolver;
pub mod types;

pub use error::SyncError;
pub use orchestrator::{EngineSettings, PassOutcome, SyncEngine, SyncRequest};
pub use types::{SyncOptions, SyncResult};
