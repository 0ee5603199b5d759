use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use serde::Deserialize;

use crate::http_server::{error::ApiError, state::AppState};
use crate::ports::provider::ProviderCredential;
use crate::sync::types::PlaylistId;
use crate::sync::{SyncOptions, SyncRequest, SyncResult};

/// Options as sent by clients. Missing switches default to `true`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncOptionsInput {
    create_if_not_exists: Option<bool>,
    update_existing: Option<bool>,
    handle_conflicts: Option<bool>,
}

impl SyncOptionsInput {
    pub fn resolve(self) -> SyncOptions {
        SyncOptions {
            create_if_not_exists: self.create_if_not_exists.unwrap_or(true),
            update_existing: self.update_existing.unwrap_or(true),
            handle_conflicts: self.handle_conflicts.unwrap_or(true),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlaylistInput {
    caller_user_id: String,
    /// Account id at the provider; defaults to the caller id.
    #[serde(default)]
    provider_user_id: Option<String>,
    #[serde(default)]
    options: Option<SyncOptionsInput>,
}

pub async fn sync_playlist(
    State(app_state): State<Arc<AppState>>,
    Path(playlist_id): Path<PlaylistId>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    input: Result<Json<SyncPlaylistInput>, JsonRejection>,
) -> Result<Json<SyncResult>, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| ApiError::Unauthenticated)?;
    if bearer.token().trim().is_empty() {
        return Err(ApiError::Unauthenticated);
    }

    let Json(input) = input.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if input.caller_user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("callerUserId must not be empty".into()));
    }

    let provider_user_id = input
        .provider_user_id
        .unwrap_or_else(|| input.caller_user_id.clone());
    let request = SyncRequest {
        playlist_id,
        credential: ProviderCredential::new(provider_user_id, bearer.token()),
        caller_user_id: input.caller_user_id,
        options: input.options.unwrap_or_default().resolve(),
    };

    tracing::debug!(playlist_id, options = ?request.options, "Sync requested");
    let result = app_state
        .sync
        .sync_playlist(request, app_state.shutdown.child_token())
        .await?;

    Ok(Json(result))
}
