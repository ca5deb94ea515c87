//! Entity для таблицы database_instance.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "database_instance")]
pub struct Model {
    /// Имя хоста инстанса
    #[sea_orm(primary_key, auto_increment = false)]
    pub hostname: String,

    /// Порт инстанса
    #[sea_orm(primary_key, auto_increment = false)]
    pub port: i32,

    /// server_id инстанса MySQL
    pub server_id: i64,

    /// Версия сервера
    pub version: String,

    /// Формат бинлога (STATEMENT / ROW / MIXED)
    pub binlog_format: String,

    pub log_bin: bool,
    pub log_slave_updates: bool,

    /// Собственные координаты бинлога инстанса
    pub binary_log_file: String,
    pub binary_log_pos: i64,

    /// Мастер, от которого инстанс реплицируется (пусто если не реплика)
    pub master_host: String,
    pub master_port: i32,

    pub slave_sql_running: bool,
    pub slave_io_running: bool,

    /// Докуда IO-поток дочитал бинлог мастера
    pub master_log_file: String,
    pub read_master_log_pos: i64,

    /// Докуда SQL-поток применил бинлог мастера
    pub relay_master_log_file: String,
    pub exec_master_log_pos: i64,

    pub seconds_behind_master: Option<i64>,
    pub slave_lag_seconds: Option<i64>,

    /// Обнаруженные реплики (JSON-массив ключей)
    pub num_slave_hosts: i32,
    pub slave_hosts: String,

    pub cluster_name: String,

    /// Время последней попытки опроса (ISO-8601)
    pub last_checked: String,

    /// Время последнего успешного опроса (ISO-8601)
    pub last_seen: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
