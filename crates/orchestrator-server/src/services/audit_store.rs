//! Журнал аудита: добавление записей и постраничное чтение.

use chrono::Utc;
use orchestrator_entities::audit::{ActiveModel, Column, Entity as AuditEntity, Model};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, QueryOrder, QuerySelect,
};

use crate::config::Config;
use crate::error::AppError;
use crate::model::InstanceKey;

/// Записать событие аудита. Записи неизменяемы после добавления.
pub async fn audit_operation(
    db: &DatabaseConnection,
    audit_type: &str,
    instance_key: Option<&InstanceKey>,
    message: &str,
) -> Result<(), AppError> {
    let (hostname, port) = match instance_key {
        Some(key) => (key.hostname.clone(), i32::from(key.port)),
        None => (String::new(), 0),
    };

    let entry = ActiveModel {
        audit_timestamp: Set(Utc::now().to_rfc3339()),
        audit_type: Set(audit_type.to_string()),
        hostname: Set(hostname),
        port: Set(port),
        message: Set(message.to_string()),
        ..Default::default()
    };
    entry.insert(db).await?;

    tracing::info!("Аудит {audit_type}: {} {message}", key_label(instance_key));
    Ok(())
}

/// Прочитать страницу журнала, новые записи первыми.
/// При равных метках времени порядок определяет id вставки.
pub async fn read_recent_audit(
    db: &DatabaseConnection,
    config: &Config,
    page: u64,
) -> Result<Vec<Model>, AppError> {
    let entries = AuditEntity::find()
        .order_by_desc(Column::AuditTimestamp)
        .order_by_desc(Column::Id)
        .limit(config.audit_page_size)
        .offset(page * config.audit_page_size)
        .all(db)
        .await?;
    Ok(entries)
}

fn key_label(key: Option<&InstanceKey>) -> String {
    key.map(|k| k.to_string()).unwrap_or_default()
}
