//! Миграция: создание таблицы audit.

use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m002_create_audit"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Audit::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Audit::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Audit::AuditTimestamp).string().not_null())
                    .col(ColumnDef::new(Audit::AuditType).string().not_null())
                    .col(
                        ColumnDef::new(Audit::Hostname)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Audit::Port).integer().not_null().default(0))
                    .col(ColumnDef::new(Audit::Message).text().not_null())
                    .to_owned(),
            )
            .await?;

        // Журнал читается в обратном хронологическом порядке
        manager
            .create_index(
                Index::create()
                    .table(Audit::Table)
                    .col(Audit::AuditTimestamp)
                    .name("idx_audit_timestamp")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Audit::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Audit {
    Table,
    Id,
    AuditTimestamp,
    AuditType,
    Hostname,
    Port,
    Message,
}
