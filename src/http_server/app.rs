use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use color_eyre::eyre::{Context, eyre};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::http_server::{routes, state::AppState};

async fn health() -> &'static str {
    "ok"
}

pub struct HttpServerConfig {
    pub port: u16,
    pub state: Arc<AppState>,
}

pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/playlists/{id}/sync", post(routes::sync::sync_playlist))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state)
}

pub async fn start(config: HttpServerConfig) -> color_eyre::Result<()> {
    let HttpServerConfig { port, state } = config;
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .wrap_err_with(|| eyre!("Failed to bind to port {}", port))?;
    tracing::info!(port, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down, cancelling in-flight sync passes");
            shutdown.cancel();
        })
        .await
        .wrap_err("Failed to start HTTP server")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::{Request, StatusCode}};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::ports::local_store::{LocalStore, MockLocalStore};
    use crate::services::sync_service::SyncService;
    use crate::sync::lock::PlaylistLocks;
    use crate::sync::{EngineSettings, SyncEngine};
    use crate::test_utils::{FakeProvider, TEST_PROVIDER, unlimited_limiter};

    #[tokio::test]
    async fn test_health() {
        let store: Arc<dyn LocalStore> = Arc::new(MockLocalStore::new());
        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(FakeProvider::new()),
            TEST_PROVIDER,
            unlimited_limiter(),
            Arc::new(PlaylistLocks::new()),
            EngineSettings::default(),
        );
        let app = router(Arc::new(AppState {
            sync: Arc::new(SyncService::new(Arc::new(engine), store)),
            shutdown: CancellationToken::new(),
        }));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
