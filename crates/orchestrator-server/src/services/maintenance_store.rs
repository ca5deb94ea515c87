//! Реестр обслуживания: эксклюзивные заявки на инстансы.

use chrono::Utc;
use orchestrator_entities::maintenance::{
    ActiveModel, Column, Entity as MaintenanceEntity, Model,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};

use crate::error::AppError;
use crate::model::InstanceKey;
use crate::services::audit_store;

/// Открыть заявку на обслуживание. Возвращает её id.
/// На инстанс допустима максимум одна незакрытая заявка.
pub async fn begin_maintenance(
    db: &DatabaseConnection,
    key: &InstanceKey,
    owner: &str,
    reason: &str,
) -> Result<i32, AppError> {
    let active = find_active_claim(db, key).await?;
    if active.is_some() {
        return Err(AppError::InMaintenance(key.to_string()));
    }

    let claim = ActiveModel {
        hostname: Set(key.hostname.clone()),
        port: Set(i32::from(key.port)),
        owner: Set(owner.to_string()),
        reason: Set(reason.to_string()),
        begin_timestamp: Set(Utc::now().to_rfc3339()),
        end_timestamp: Set(None),
        ..Default::default()
    };
    let claim = claim.insert(db).await?;

    audit_store::audit_operation(
        db,
        "begin-maintenance",
        Some(key),
        &format!("владелец: {owner}, причина: {reason}"),
    )
    .await?;
    Ok(claim.id)
}

/// Закрыть заявку по id. Уже закрытая или несуществующая заявка — ошибка.
pub async fn end_maintenance(db: &DatabaseConnection, id: i32) -> Result<(), AppError> {
    let claim = MaintenanceEntity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("заявка на обслуживание не найдена: {id}")))?;
    if claim.end_timestamp.is_some() {
        return Err(AppError::NotFound(format!("заявка уже закрыта: {id}")));
    }

    let key = InstanceKey {
        hostname: claim.hostname.clone(),
        port: claim.port as u16,
    };
    let mut claim: ActiveModel = claim.into();
    claim.end_timestamp = Set(Some(Utc::now().to_rfc3339()));
    claim.update(db).await?;

    audit_store::audit_operation(db, "end-maintenance", Some(&key), &format!("заявка {id}"))
        .await?;
    Ok(())
}

/// Закрыть активную заявку инстанса, не зная её id.
pub async fn end_maintenance_by_instance_key(
    db: &DatabaseConnection,
    key: &InstanceKey,
) -> Result<(), AppError> {
    let claim = find_active_claim(db, key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("нет активной заявки: {key}")))?;
    end_maintenance(db, claim.id).await
}

/// Все незакрытые заявки.
pub async fn read_active_maintenance(db: &DatabaseConnection) -> Result<Vec<Model>, AppError> {
    let claims = MaintenanceEntity::find()
        .filter(Column::EndTimestamp.is_null())
        .all(db)
        .await?;
    Ok(claims)
}

async fn find_active_claim(
    db: &DatabaseConnection,
    key: &InstanceKey,
) -> Result<Option<Model>, AppError> {
    let claim = MaintenanceEntity::find()
        .filter(Column::Hostname.eq(&key.hostname))
        .filter(Column::Port.eq(i32::from(key.port)))
        .filter(Column::EndTimestamp.is_null())
        .one(db)
        .await?;
    Ok(claim)
}
