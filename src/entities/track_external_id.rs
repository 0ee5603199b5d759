use sea_orm::entity::prelude::*;

/// Remote track id recorded for a local track, one per provider.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "track_external_ids")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub track_id: i64,
    pub provider: String,
    pub remote_track_id: String,
}

impl ActiveModelBehavior for ActiveModel {}
