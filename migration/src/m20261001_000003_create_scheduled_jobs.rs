use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScheduledJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScheduledJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScheduledJobs::Platform).string().not_null())
                    .col(ColumnDef::new(ScheduledJobs::TargetUrl).text().not_null())
                    .col(ColumnDef::new(ScheduledJobs::ContentType).string().not_null())
                    .col(ColumnDef::new(ScheduledJobs::Frequency).string().not_null())
                    .col(ColumnDef::new(ScheduledJobs::DayOfWeek).small_integer())
                    .col(ColumnDef::new(ScheduledJobs::DayOfMonth).small_integer())
                    .col(ColumnDef::new(ScheduledJobs::Hour).small_integer().not_null())
                    .col(ColumnDef::new(ScheduledJobs::Minute).small_integer().not_null())
                    .col(
                        ColumnDef::new(ScheduledJobs::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(ScheduledJobs::LastRunAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ScheduledJobs::NextRunAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ScheduledJobs::LastError).text())
                    .col(
                        ColumnDef::new(ScheduledJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ScheduledJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scheduled_jobs_active_next_run")
                    .table(ScheduledJobs::Table)
                    .col(ScheduledJobs::Active)
                    .col(ScheduledJobs::NextRunAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScheduledJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScheduledJobs {
    Table,
    Id,
    Platform,
    TargetUrl,
    ContentType,
    Frequency,
    DayOfWeek,
    DayOfMonth,
    Hour,
    Minute,
    Active,
    LastRunAt,
    NextRunAt,
    LastError,
    CreatedAt,
    UpdatedAt,
}
