//! Entity для таблицы database_instance_maintenance.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "database_instance_maintenance")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub hostname: String,
    pub port: i32,

    /// Кто взял инстанс на обслуживание
    pub owner: String,

    /// Причина обслуживания
    pub reason: String,

    /// Начало обслуживания (ISO-8601)
    pub begin_timestamp: String,

    /// Конец обслуживания; NULL пока заявка активна
    pub end_timestamp: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
