use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_render_jobs_table(manager).await?;
        self.create_rendered_contents_table(manager).await?;
        self.create_indexes(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RenderedContents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RenderJobs::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    fn create_uuid_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.uuid().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    fn create_timestamp_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.timestamp_with_time_zone().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    fn create_nullable_timestamp_column(
        &self,
        manager: &SchemaManager,
        column: impl IntoIden,
    ) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.timestamp_with_time_zone(),
            _ => col.string(),
        };
        col
    }

    async fn create_render_jobs_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RenderJobs::Table)
                    .if_not_exists()
                    .col(self.create_uuid_column(manager, RenderJobs::Id).primary_key())
                    .col(self.create_uuid_column(manager, RenderJobs::TargetId))
                    .col(ColumnDef::new(RenderJobs::Priority).integer().not_null().default(0))
                    .col(self.create_timestamp_column(manager, RenderJobs::ScheduledFor))
                    .col(
                        ColumnDef::new(RenderJobs::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(RenderJobs::Attempts).integer().not_null().default(0))
                    .col(self.create_nullable_timestamp_column(manager, RenderJobs::LastAttempt))
                    .col(ColumnDef::new(RenderJobs::ErrorMessage).text())
                    .col(
                        ColumnDef::new(RenderJobs::Independent)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(self.create_timestamp_column(manager, RenderJobs::CreatedAt))
                    .col(self.create_timestamp_column(manager, RenderJobs::UpdatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_rendered_contents_table(
        &self,
        manager: &SchemaManager<'_>,
    ) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RenderedContents::Table)
                    .if_not_exists()
                    .col(self.create_uuid_column(manager, RenderedContents::Id).primary_key())
                    .col(self.create_uuid_column(manager, RenderedContents::TargetId))
                    .col(self.create_uuid_column(manager, RenderedContents::DeviceId))
                    .col(ColumnDef::new(RenderedContents::Width).integer().not_null())
                    .col(ColumnDef::new(RenderedContents::Height).integer().not_null())
                    .col(ColumnDef::new(RenderedContents::BitDepth).integer().not_null())
                    .col(ColumnDef::new(RenderedContents::ImagePath).string().not_null())
                    .col(ColumnDef::new(RenderedContents::FileSize).big_integer().not_null())
                    .col(ColumnDef::new(RenderedContents::ContentHash).string().not_null())
                    .col(ColumnDef::new(RenderedContents::PreviousHash).string())
                    .col(self.create_timestamp_column(manager, RenderedContents::RenderedAt))
                    .col(self.create_nullable_timestamp_column(
                        manager,
                        RenderedContents::LastCheckedAt,
                    ))
                    .col(
                        ColumnDef::new(RenderedContents::RenderAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(self.create_timestamp_column(manager, RenderedContents::CreatedAt))
                    .col(self.create_timestamp_column(manager, RenderedContents::UpdatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_indexes(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        // Feeder scan: pending rows due now
        manager
            .create_index(
                Index::create()
                    .name("idx_render_jobs_status_scheduled_for")
                    .table(RenderJobs::Table)
                    .col(RenderJobs::Status)
                    .col(RenderJobs::ScheduledFor)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_render_jobs_target_status")
                    .table(RenderJobs::Table)
                    .col(RenderJobs::TargetId)
                    .col(RenderJobs::Status)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_rendered_contents_target_device_rendered_at")
                    .table(RenderedContents::Table)
                    .col(RenderedContents::TargetId)
                    .col(RenderedContents::DeviceId)
                    .col(RenderedContents::RenderedAt)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum RenderJobs {
    Table,
    Id,
    TargetId,
    Priority,
    ScheduledFor,
    Status,
    Attempts,
    LastAttempt,
    ErrorMessage,
    Independent,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RenderedContents {
    Table,
    Id,
    TargetId,
    DeviceId,
    Width,
    Height,
    BitDepth,
    ImagePath,
    FileSize,
    ContentHash,
    PreviousHash,
    RenderedAt,
    LastCheckedAt,
    RenderAttempts,
    CreatedAt,
    UpdatedAt,
}
