//! Entity для таблицы audit: журнал операций, только добавление.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Время события (ISO-8601)
    pub audit_timestamp: String,

    /// Тип операции (move-up, forget, begin-maintenance, ...)
    pub audit_type: String,

    pub hostname: String,
    pub port: i32,

    pub message: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
