pub mod playlist;
pub mod playlist_track;
pub mod track;
pub mod track_external_id;
