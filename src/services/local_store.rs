use std::collections::HashMap;
use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr, eyre};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::database::Database;
use crate::entities::{playlist, playlist_track, track, track_external_id};
use crate::ports::local_store::LocalStore;
use crate::sync::types::{LocalPlaylistSnapshot, LocalSong, PlaylistId};

/// SQLite-backed local playlist store.
pub struct SeaOrmLocalStore {
    db: Arc<Database>,
}

impl SeaOrmLocalStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl LocalStore for SeaOrmLocalStore {
    async fn load_playlist(&self, playlist_id: PlaylistId) -> Result<Option<LocalPlaylistSnapshot>> {
        let Some(playlist) = playlist::Entity::find_by_id(playlist_id)
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to query playlist")?
        else {
            return Ok(None);
        };

        let entries = playlist_track::Entity::find()
            .filter(playlist_track::Column::PlaylistId.eq(playlist_id))
            .order_by_asc(playlist_track::Column::Position)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to query playlist tracks")?;

        let mut track_ids: Vec<i64> = entries.iter().map(|e| e.track_id).collect();
        track_ids.sort_unstable();
        track_ids.dedup();

        let tracks: HashMap<i64, track::Model> = track::Entity::find()
            .filter(track::Column::Id.is_in(track_ids.clone()))
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to query tracks")?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut external_ids: HashMap<i64, HashMap<String, String>> = HashMap::new();
        for external in track_external_id::Entity::find()
            .filter(track_external_id::Column::TrackId.is_in(track_ids))
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to query track external ids")?
        {
            external_ids
                .entry(external.track_id)
                .or_default()
                .insert(external.provider, external.remote_track_id);
        }

        let songs = entries
            .iter()
            .map(|entry| {
                let track = tracks
                    .get(&entry.track_id)
                    .ok_or_else(|| eyre!("Playlist entry references missing track {}", entry.track_id))?;
                Ok(LocalSong {
                    id: track.id,
                    title: track.title.clone(),
                    artist: track.artist.clone(),
                    album: track.album.clone(),
                    external_ids: external_ids.get(&track.id).cloned().unwrap_or_default(),
                    isrc: track.isrc.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(playlist_id, songs = songs.len(), "Loaded local playlist");

        Ok(Some(LocalPlaylistSnapshot {
            id: playlist.id,
            owner_id: playlist.owner_id,
            name: playlist.name,
            remote_playlist_id: playlist.remote_playlist_id,
            songs,
        }))
    }

    async fn record_remote_playlist_id(
        &self,
        playlist_id: PlaylistId,
        provider: &str,
        remote_playlist_id: &str,
    ) -> Result<()> {
        let playlist = playlist::Entity::find_by_id(playlist_id)
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to query playlist")?
            .ok_or_else(|| eyre!("Playlist with id {} not found", playlist_id))?;

        let mut active: playlist::ActiveModel = playlist.into();
        active.remote_provider = Set(Some(provider.to_string()));
        active.remote_playlist_id = Set(Some(remote_playlist_id.to_string()));
        active
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to record remote playlist id")?;

        tracing::info!(playlist_id, provider, remote_playlist_id, "Recorded remote playlist link");
        Ok(())
    }
}
