use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table("playlists")
                    .if_not_exists()
                    .col(
                        ColumnDef::new("id")
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new("owner_id").string().not_null())
                    .col(ColumnDef::new("name").string().not_null())
                    .col(ColumnDef::new("remote_provider").string())
                    .col(ColumnDef::new("remote_playlist_id").string())
                    .col(ColumnDef::new("created_at").big_integer().not_null())
                    .col(ColumnDef::new("updated_at").big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table("tracks")
                    .if_not_exists()
                    .col(
                        ColumnDef::new("id")
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new("title").string().not_null())
                    .col(ColumnDef::new("artist").string().not_null())
                    .col(ColumnDef::new("album").string())
                    .col(ColumnDef::new("isrc").string())
                    .col(ColumnDef::new("created_at").big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table("track_external_ids")
                    .if_not_exists()
                    .col(
                        ColumnDef::new("id")
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new("track_id").integer().not_null())
                    .col(ColumnDef::new("provider").string().not_null())
                    .col(ColumnDef::new("remote_track_id").string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_track_external_ids_track_id")
                            .from("track_external_ids", "track_id")
                            .to("tracks", "id")
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_track_external_ids_track_provider")
                    .table("track_external_ids")
                    .col("track_id")
                    .col("provider")
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Positions are dense per playlist; the same track may repeat.
        manager
            .create_table(
                Table::create()
                    .table("playlist_tracks")
                    .if_not_exists()
                    .col(
                        ColumnDef::new("id")
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new("playlist_id").integer().not_null())
                    .col(ColumnDef::new("track_id").integer().not_null())
                    .col(ColumnDef::new("position").integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_playlist_tracks_playlist_id")
                            .from("playlist_tracks", "playlist_id")
                            .to("playlists", "id")
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_playlist_tracks_track_id")
                            .from("playlist_tracks", "track_id")
                            .to("tracks", "id")
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_playlist_tracks_playlist_position")
                    .table("playlist_tracks")
                    .col("playlist_id")
                    .col("position")
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table("playlist_tracks").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table("track_external_ids").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table("tracks").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table("playlists").to_owned())
            .await?;

        Ok(())
    }
}
