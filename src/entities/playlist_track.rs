use sea_orm::entity::prelude::*;

/// Ordered playlist entry. A track may appear several times in one playlist.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "playlist_tracks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub playlist_id: i64,
    pub track_id: i64,
    pub position: i32,
}

impl ActiveModelBehavior for ActiveModel {}
