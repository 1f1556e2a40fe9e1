use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Results::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Results::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Results::JobId).uuid().not_null())
                    .col(ColumnDef::new(Results::Platform).string().not_null())
                    .col(ColumnDef::new(Results::ContentType).string().not_null())
                    .col(ColumnDef::new(Results::Url).text().not_null())
                    .col(ColumnDef::new(Results::RawData).json().not_null())
                    .col(ColumnDef::new(Results::ProcessedData).json())
                    .col(ColumnDef::new(Results::Sentiment).json())
                    .col(
                        ColumnDef::new(Results::CreatedAt)
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
                    .name("idx_results_job_id")
                    .table(Results::Table)
                    .col(Results::JobId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Results::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Results {
    Table,
    Id,
    JobId,
    Platform,
    ContentType,
    Url,
    RawData,
    ProcessedData,
    Sentiment,
    CreatedAt,
}
