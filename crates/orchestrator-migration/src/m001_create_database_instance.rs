//! Миграция: создание таблицы database_instance.

use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_create_database_instance"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DatabaseInstance::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DatabaseInstance::Hostname).string().not_null())
                    .col(ColumnDef::new(DatabaseInstance::Port).integer().not_null())
                    .col(
                        ColumnDef::new(DatabaseInstance::ServerId)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::Version)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::BinlogFormat)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::LogBin)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::LogSlaveUpdates)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::BinaryLogFile)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::BinaryLogPos)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::MasterHost)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::MasterPort)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::SlaveSqlRunning)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::SlaveIoRunning)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::MasterLogFile)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::ReadMasterLogPos)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::RelayMasterLogFile)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::ExecMasterLogPos)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(DatabaseInstance::SecondsBehindMaster).big_integer())
                    .col(ColumnDef::new(DatabaseInstance::SlaveLagSeconds).big_integer())
                    .col(
                        ColumnDef::new(DatabaseInstance::NumSlaveHosts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(DatabaseInstance::SlaveHosts).text().not_null())
                    .col(
                        ColumnDef::new(DatabaseInstance::ClusterName)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::LastChecked)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DatabaseInstance::LastSeen)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .primary_key(
                        Index::create()
                            .col(DatabaseInstance::Hostname)
                            .col(DatabaseInstance::Port),
                    )
                    .to_owned(),
            )
            .await?;

        // Индекс по cluster_name для выборки инстансов кластера
        manager
            .create_index(
                Index::create()
                    .table(DatabaseInstance::Table)
                    .col(DatabaseInstance::ClusterName)
                    .name("idx_database_instance_cluster_name")
                    .to_owned(),
            )
            .await?;

        // Индексы свежести для планировщика обнаружения
        manager
            .create_index(
                Index::create()
                    .table(DatabaseInstance::Table)
                    .col(DatabaseInstance::LastChecked)
                    .name("idx_database_instance_last_checked")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(DatabaseInstance::Table)
                    .col(DatabaseInstance::LastSeen)
                    .name("idx_database_instance_last_seen")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DatabaseInstance::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DatabaseInstance {
    Table,
    Hostname,
    Port,
    ServerId,
    Version,
    BinlogFormat,
    LogBin,
    LogSlaveUpdates,
    BinaryLogFile,
    BinaryLogPos,
    MasterHost,
    MasterPort,
    SlaveSqlRunning,
    SlaveIoRunning,
    MasterLogFile,
    ReadMasterLogPos,
    RelayMasterLogFile,
    ExecMasterLogPos,
    SecondsBehindMaster,
    SlaveLagSeconds,
    NumSlaveHosts,
    SlaveHosts,
    ClusterName,
    LastChecked,
    LastSeen,
}
