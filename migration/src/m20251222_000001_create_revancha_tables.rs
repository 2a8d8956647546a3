use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    #[allow(clippy::match_wildcard_for_single_variants)] // Wildcard matches for unsupported databases are semantically correct
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Postgres {
            manager
                .get_connection()
                .execute_unprepared("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\";")
                .await?;
        }

        // One row per (wall, measurement date); re-uploads replace the row
        let mut uploads_table = Table::create()
            .table(RevanchaUploads::Table)
            .if_not_exists()
            .col(ColumnDef::new(RevanchaUploads::Wall).string().not_null())
            .col(
                ColumnDef::new(RevanchaUploads::MeasurementDate)
                    .date()
                    .not_null(),
            )
            .col(ColumnDef::new(RevanchaUploads::FileName).text().not_null())
            .col(ColumnDef::new(RevanchaUploads::FileType).string().not_null())
            .col(
                ColumnDef::new(RevanchaUploads::TotalRecords)
                    .integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(RevanchaUploads::SectorsIncluded)
                    .text()
                    .not_null(),
            )
            .col(ColumnDef::new(RevanchaUploads::UploadedBy).integer())
            .col(
                ColumnDef::new(RevanchaUploads::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .index(
                Index::create()
                    .name("revancha_uploads_wall_date_unique")
                    .col(RevanchaUploads::Wall)
                    .col(RevanchaUploads::MeasurementDate)
                    .unique(),
            )
            .to_owned();

        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => {
                uploads_table.col(
                    ColumnDef::new(RevanchaUploads::Id)
                        .uuid()
                        .not_null()
                        .primary_key()
                        .default(Expr::cust("uuid_generate_v4()")),
                );
            }
            sea_orm::DatabaseBackend::Sqlite => {
                uploads_table.col(
                    ColumnDef::new(RevanchaUploads::Id)
                        .uuid()
                        .not_null()
                        .primary_key(),
                );
            }
            _ => {
                return Err(DbErr::Custom("Unsupported database backend".to_string()));
            }
        }

        manager.create_table(uploads_table).await?;

        let mut measurements_table = Table::create()
            .table(RevanchaMeasurements::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(RevanchaMeasurements::UploadId)
                    .uuid()
                    .not_null(),
            )
            .col(
                ColumnDef::new(RevanchaMeasurements::Sector)
                    .string()
                    .not_null(),
            )
            .col(
                ColumnDef::new(RevanchaMeasurements::Pk)
                    .string_len(20)
                    .not_null(),
            )
            .col(ColumnDef::new(RevanchaMeasurements::Coronamiento).double())
            .col(ColumnDef::new(RevanchaMeasurements::Revancha).double())
            .col(ColumnDef::new(RevanchaMeasurements::Lama).double())
            .col(ColumnDef::new(RevanchaMeasurements::Ancho).double())
            .col(ColumnDef::new(RevanchaMeasurements::Geomembrana).double())
            .col(ColumnDef::new(RevanchaMeasurements::DistGeoLama).double())
            .col(ColumnDef::new(RevanchaMeasurements::DistGeoCoronamiento).double())
            .col(
                ColumnDef::new(RevanchaMeasurements::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_revancha_measurements_upload_id")
                    .from(RevanchaMeasurements::Table, RevanchaMeasurements::UploadId)
                    .to(RevanchaUploads::Table, RevanchaUploads::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .to_owned();

        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => {
                measurements_table.col(
                    ColumnDef::new(RevanchaMeasurements::Id)
                        .uuid()
                        .not_null()
                        .primary_key()
                        .default(Expr::cust("uuid_generate_v4()")),
                );
            }
            sea_orm::DatabaseBackend::Sqlite => {
                measurements_table.col(
                    ColumnDef::new(RevanchaMeasurements::Id)
                        .uuid()
                        .not_null()
                        .primary_key(),
                );
            }
            _ => {
                return Err(DbErr::Custom("Unsupported database backend".to_string()));
            }
        }

        manager.create_table(measurements_table).await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_revancha_measurements_upload_id")
                    .table(RevanchaMeasurements::Table)
                    .col(RevanchaMeasurements::UploadId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(RevanchaMeasurements::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(RevanchaUploads::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum RevanchaUploads {
    Table,
    Id,
    Wall,
    MeasurementDate,
    FileName,
    FileType,
    TotalRecords,
    SectorsIncluded,
    UploadedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RevanchaMeasurements {
    Table,
    Id,
    UploadId,
    Sector,
    Pk,
    Coronamiento,
    Revancha,
    Lama,
    Ancho,
    Geomembrana,
    DistGeoLama,
    DistGeoCoronamiento,
    CreatedAt,
}
