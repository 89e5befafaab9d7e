use sea_orm::DatabaseBackend;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum FederationQueueJson {
    Table,
    JsonNid,
    EventKind,
    JsonBody,
}

#[derive(DeriveIden)]
enum FederationQueuePdus {
    Table,
    TransactionId,
    ServerName,
    JsonNid,
}

#[derive(DeriveIden)]
enum FederationQueueEdus {
    Table,
    EduType,
    ServerName,
    JsonNid,
    ExpiresAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // SQLite only honours AUTOINCREMENT on an INTEGER primary key, which is
        // 64-bit there anyway.
        let mut nid = ColumnDef::new(FederationQueueJson::JsonNid);
        match manager.get_database_backend() {
            DatabaseBackend::Sqlite => nid.integer(),
            _ => nid.big_integer(),
        };
        nid.not_null().auto_increment().primary_key();

        manager
            .create_table(
                Table::create()
                    .table(FederationQueueJson::Table)
                    .if_not_exists()
                    .col(&mut nid)
                    .col(ColumnDef::new(FederationQueueJson::EventKind).text().not_null())
                    .col(ColumnDef::new(FederationQueueJson::JsonBody).blob().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FederationQueuePdus::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FederationQueuePdus::TransactionId)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(FederationQueuePdus::ServerName).text().not_null())
                    .col(ColumnDef::new(FederationQueuePdus::JsonNid).big_integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(FederationQueuePdus::ServerName)
                            .col(FederationQueuePdus::JsonNid),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("federation_queue_pdus_json_nid_idx")
                    .table(FederationQueuePdus::Table)
                    .col(FederationQueuePdus::JsonNid)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FederationQueueEdus::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FederationQueueEdus::EduType).text().not_null())
                    .col(ColumnDef::new(FederationQueueEdus::ServerName).text().not_null())
                    .col(ColumnDef::new(FederationQueueEdus::JsonNid).big_integer().not_null())
                    .col(ColumnDef::new(FederationQueueEdus::ExpiresAt).big_integer().null())
                    .primary_key(
                        Index::create()
                            .col(FederationQueueEdus::ServerName)
                            .col(FederationQueueEdus::JsonNid),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("federation_queue_edus_json_nid_idx")
                    .table(FederationQueueEdus::Table)
                    .col(FederationQueueEdus::JsonNid)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("federation_queue_edus_expires_at_idx")
                    .table(FederationQueueEdus::Table)
                    .col(FederationQueueEdus::ExpiresAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FederationQueueEdus::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FederationQueuePdus::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FederationQueueJson::Table).to_owned())
            .await
    }
}
