use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::services::sync_service::SyncService;

pub struct AppState {
    pub sync: Arc<SyncService>,
    /// Cancelled on shutdown; every in-flight pass runs under a child token.
    pub shutdown: CancellationToken,
}
