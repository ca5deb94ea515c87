//! Миграция: создание таблицы database_instance_maintenance.

use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m003_create_maintenance"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Maintenance::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Maintenance::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Maintenance::Hostname).string().not_null())
                    .col(ColumnDef::new(Maintenance::Port).integer().not_null())
                    .col(ColumnDef::new(Maintenance::Owner).string().not_null())
                    .col(ColumnDef::new(Maintenance::Reason).string().not_null())
                    .col(ColumnDef::new(Maintenance::BeginTimestamp).string().not_null())
                    .col(ColumnDef::new(Maintenance::EndTimestamp).string())
                    .to_owned(),
            )
            .await?;

        // Поиск активной заявки по инстансу
        manager
            .create_index(
                Index::create()
                    .table(Maintenance::Table)
                    .col(Maintenance::Hostname)
                    .col(Maintenance::Port)
                    .name("idx_maintenance_instance")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Maintenance::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Maintenance {
    Table,
    Id,
    Hostname,
    Port,
    Owner,
    Reason,
    BeginTimestamp,
    EndTimestamp,
}
