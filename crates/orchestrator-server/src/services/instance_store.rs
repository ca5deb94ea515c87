//! Каталог инстансов: запись результатов опроса и все выборки по каталогу.
//!
//! Метки времени хранятся строками ISO-8601; производные предикаты свежести
//! вычисляются после разбора, а не в SQL — каталог одинаково работает и на
//! MySQL-бэкенде, и на sqlite в тестах.

use chrono::{DateTime, Utc};
use orchestrator_entities::database_instance::{
    ActiveModel, Column, Entity as InstanceEntity, Model,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder,
};

use crate::config::Config;
use crate::error::AppError;
use crate::model::{BinlogCoordinates, Instance, InstanceKey};
use crate::services::audit_store;

/// Записать инстанс в каталог (upsert по hostname+port).
/// `last_checked` продвигается всегда; `last_seen` — только если опрос
/// прошёл без ошибки.
pub async fn write_instance(
    db: &DatabaseConnection,
    instance: &Instance,
    last_error: Option<&AppError>,
) -> Result<(), AppError> {
    let now = Utc::now().to_rfc3339();
    let existing = InstanceEntity::find_by_id(id_of(&instance.key)).one(db).await?;

    match existing {
        Some(record) => {
            let mut row: ActiveModel = record.into();
            set_probe_columns(&mut row, instance)?;
            row.last_checked = Set(now.clone());
            if last_error.is_none() {
                row.last_seen = Set(now);
            }
            row.update(db).await?;
        }
        None => {
            let mut row = ActiveModel {
                hostname: Set(instance.key.hostname.clone()),
                port: Set(i32::from(instance.key.port)),
                last_checked: Set(now.clone()),
                last_seen: Set(if last_error.is_none() { now } else { String::new() }),
                ..Default::default()
            };
            set_probe_columns(&mut row, instance)?;
            row.insert(db).await?;
        }
    }
    Ok(())
}

/// Продвинуть только last_checked: попытка опроса была, успеха не было.
pub async fn update_last_checked(
    db: &DatabaseConnection,
    key: &InstanceKey,
) -> Result<(), AppError> {
    let Some(record) = InstanceEntity::find_by_id(id_of(key)).one(db).await? else {
        return Ok(());
    };
    let mut row: ActiveModel = record.into();
    row.last_checked = Set(Utc::now().to_rfc3339());
    row.update(db).await?;
    Ok(())
}

/// Прочитать инстанс из каталога вместе с производными полями свежести.
pub async fn read_instance(
    db: &DatabaseConnection,
    config: &Config,
    key: &InstanceKey,
) -> Result<Option<Instance>, AppError> {
    let record = InstanceEntity::find_by_id(id_of(key)).one(db).await?;
    Ok(record.map(|m| instance_from_model(&m, config)))
}

/// Все инстансы кластера, упорядоченные по hostname и порту.
pub async fn read_cluster_instances(
    db: &DatabaseConnection,
    config: &Config,
    cluster_name: &str,
) -> Result<Vec<Instance>, AppError> {
    validate_no_quote(cluster_name, "имя кластера")?;
    let models = InstanceEntity::find()
        .filter(Column::ClusterName.eq(cluster_name))
        .order_by_asc(Column::Hostname)
        .order_by_asc(Column::Port)
        .all(db)
        .await?;
    Ok(models.iter().map(|m| instance_from_model(m, config)).collect())
}

/// Имена всех известных кластеров.
pub async fn read_clusters(db: &DatabaseConnection) -> Result<Vec<String>, AppError> {
    let models = InstanceEntity::find().all(db).await?;
    let mut names: Vec<String> = models.into_iter().map(|m| m.cluster_name).collect();
    names.sort();
    names.dedup();
    Ok(names)
}

/// Поиск инстансов по хосту, кластеру, версии, server_id, порту или host:port.
/// Строка с кавычкой отклоняется до обращения к бэкенду.
pub async fn search_instances(
    db: &DatabaseConnection,
    config: &Config,
    search_string: &str,
) -> Result<Vec<Instance>, AppError> {
    validate_no_quote(search_string, "строка поиска")?;

    let mut condition = Condition::any()
        .add(Column::Hostname.contains(search_string))
        .add(Column::ClusterName.contains(search_string))
        .add(Column::Version.contains(search_string));
    if let Ok(number) = search_string.parse::<i64>() {
        condition = condition
            .add(Column::ServerId.eq(number))
            .add(Column::Port.eq(number as i32));
    }
    if let Ok(key) = search_string.parse::<InstanceKey>() {
        condition = condition.add(
            Condition::all()
                .add(Column::Hostname.eq(key.hostname))
                .add(Column::Port.eq(i32::from(key.port))),
        );
    }

    let models = InstanceEntity::find()
        .filter(condition)
        .order_by_asc(Column::ClusterName)
        .order_by_asc(Column::Hostname)
        .order_by_asc(Column::Port)
        .all(db)
        .await?;
    Ok(models.iter().map(|m| instance_from_model(m, config)).collect())
}

/// Инстансы с проблемами: давно не опрашивались, последний опрос неудачен,
/// остановлен поток репликации или лаг выше допустимого.
pub async fn read_problem_instances(
    db: &DatabaseConnection,
    config: &Config,
) -> Result<Vec<Instance>, AppError> {
    let models = InstanceEntity::find()
        .order_by_asc(Column::Hostname)
        .order_by_asc(Column::Port)
        .all(db)
        .await?;

    let problems = models
        .iter()
        .map(|m| instance_from_model(m, config))
        .filter(|i| {
            !i.is_recently_checked
                || !i.is_last_check_valid
                || !i.slave_sql_running
                || !i.slave_io_running
                || i.seconds_behind_master
                    .is_some_and(|lag| lag > config.reasonable_replication_lag_seconds)
        })
        .collect();
    Ok(problems)
}

/// Ключи инстансов, чья запись старше InstancePollSeconds.
pub async fn read_outdated_instance_keys(
    db: &DatabaseConnection,
    config: &Config,
) -> Result<Vec<InstanceKey>, AppError> {
    let now = Utc::now();
    let models = InstanceEntity::find().all(db).await?;

    let keys = models
        .iter()
        .filter(|m| {
            seconds_since(&m.last_checked, now)
                .map_or(true, |secs| secs > i64::from(config.instance_poll_seconds))
        })
        .map(key_of)
        .collect();
    Ok(keys)
}

/// Удалить инстанс из каталога. Он может быть заново обнаружен топологией.
pub async fn forget_instance(
    db: &DatabaseConnection,
    key: &InstanceKey,
) -> Result<(), AppError> {
    InstanceEntity::delete_by_id(id_of(key)).exec(db).await?;
    audit_store::audit_operation(db, "forget", Some(key), "").await?;
    Ok(())
}

/// Удалить инстансы, не виданные дольше UnseenInstanceForgetHours.
pub async fn forget_long_unseen_instances(
    db: &DatabaseConnection,
    config: &Config,
) -> Result<(), AppError> {
    let now = Utc::now();
    let threshold = i64::from(config.unseen_instance_forget_hours) * 3600;
    let models = InstanceEntity::find().all(db).await?;

    let mut forgotten = 0u64;
    for model in models {
        let Some(elapsed) = seconds_since(&model.last_seen, now) else {
            continue;
        };
        if elapsed > threshold {
            tracing::info!(
                "Забываю инстанс {}:{} (не виден {elapsed} сек)",
                model.hostname,
                model.port
            );
            InstanceEntity::delete_by_id((model.hostname, model.port))
                .exec(db)
                .await?;
            forgotten += 1;
        }
    }

    if forgotten > 0 {
        audit_store::audit_operation(db, "forget-unseen", None, &format!("удалено: {forgotten}"))
            .await?;
    }
    Ok(())
}

/// Имя кластера инстанса: имя кластера его мастера, иначе host:port мастера,
/// иначе host:port самого инстанса.
pub async fn read_cluster_name_by_master(
    db: &DatabaseConnection,
    key: &InstanceKey,
    master_key: &InstanceKey,
) -> Result<String, AppError> {
    if !master_key.is_empty() {
        let master = InstanceEntity::find_by_id(id_of(master_key)).one(db).await?;
        if let Some(master) = master {
            if !master.cluster_name.is_empty() {
                return Ok(master.cluster_name);
            }
            return Ok(master_key.to_string());
        }
    }
    Ok(key.to_string())
}

// ── Преобразования строк каталога ────────────────────────────────────────────

fn id_of(key: &InstanceKey) -> (String, i32) {
    (key.hostname.clone(), i32::from(key.port))
}

fn key_of(model: &Model) -> InstanceKey {
    InstanceKey {
        hostname: model.hostname.clone(),
        port: model.port as u16,
    }
}

fn set_probe_columns(row: &mut ActiveModel, instance: &Instance) -> Result<(), AppError> {
    row.server_id = Set(i64::from(instance.server_id));
    row.version = Set(instance.version.clone());
    row.binlog_format = Set(instance.binlog_format.clone());
    row.log_bin = Set(instance.log_bin_enabled);
    row.log_slave_updates = Set(instance.log_slave_updates_enabled);
    row.binary_log_file = Set(instance.self_binlog_coordinates.log_file.clone());
    row.binary_log_pos = Set(instance.self_binlog_coordinates.log_pos);
    row.master_host = Set(instance.master_key.hostname.clone());
    row.master_port = Set(i32::from(instance.master_key.port));
    row.slave_sql_running = Set(instance.slave_sql_running);
    row.slave_io_running = Set(instance.slave_io_running);
    row.master_log_file = Set(instance.read_binlog_coordinates.log_file.clone());
    row.read_master_log_pos = Set(instance.read_binlog_coordinates.log_pos);
    row.relay_master_log_file = Set(instance.exec_binlog_coordinates.log_file.clone());
    row.exec_master_log_pos = Set(instance.exec_binlog_coordinates.log_pos);
    row.seconds_behind_master = Set(instance.seconds_behind_master);
    row.slave_lag_seconds = Set(instance.slave_lag_seconds);
    row.num_slave_hosts = Set(instance.slave_hosts.len() as i32);
    row.slave_hosts = Set(instance.slave_hosts_as_json()?);
    row.cluster_name = Set(instance.cluster_name.clone());
    Ok(())
}

fn instance_from_model(model: &Model, config: &Config) -> Instance {
    let now = Utc::now();
    let since_checked = seconds_since(&model.last_checked, now);
    let poll = i64::from(config.instance_poll_seconds);

    let mut instance = Instance {
        key: key_of(model),
        server_id: model.server_id as u32,
        version: model.version.clone(),
        binlog_format: model.binlog_format.clone(),
        log_bin_enabled: model.log_bin,
        log_slave_updates_enabled: model.log_slave_updates,
        self_binlog_coordinates: BinlogCoordinates {
            log_file: model.binary_log_file.clone(),
            log_pos: model.binary_log_pos,
        },
        master_key: if model.master_host.is_empty() {
            InstanceKey::default()
        } else {
            InstanceKey {
                hostname: model.master_host.clone(),
                port: model.master_port as u16,
            }
        },
        read_binlog_coordinates: BinlogCoordinates {
            log_file: model.master_log_file.clone(),
            log_pos: model.read_master_log_pos,
        },
        exec_binlog_coordinates: BinlogCoordinates {
            log_file: model.relay_master_log_file.clone(),
            log_pos: model.exec_master_log_pos,
        },
        slave_io_running: model.slave_io_running,
        slave_sql_running: model.slave_sql_running,
        seconds_behind_master: model.seconds_behind_master,
        slave_lag_seconds: model.slave_lag_seconds,
        slave_hosts: Vec::new(),
        cluster_name: model.cluster_name.clone(),
        is_up_to_date: since_checked.is_some_and(|secs| secs <= poll),
        is_recently_checked: since_checked.is_some_and(|secs| secs <= poll * 5),
        is_last_check_valid: last_check_valid(model),
        seconds_since_last_seen: seconds_since(&model.last_seen, now),
    };
    instance.read_slave_hosts_from_json(&model.slave_hosts);
    instance
}

fn seconds_since(timestamp: &str, now: DateTime<Utc>) -> Option<i64> {
    let parsed = DateTime::parse_from_rfc3339(timestamp).ok()?;
    Some(now.signed_duration_since(parsed.with_timezone(&Utc)).num_seconds())
}

fn last_check_valid(model: &Model) -> bool {
    let checked = DateTime::parse_from_rfc3339(&model.last_checked);
    let seen = DateTime::parse_from_rfc3339(&model.last_seen);
    match (checked, seen) {
        (Ok(checked), Ok(seen)) => checked <= seen,
        _ => false,
    }
}

fn validate_no_quote(input: &str, what: &str) -> Result<(), AppError> {
    if input.contains('\'') {
        return Err(AppError::InputInvalid(format!("{what} содержит кавычку: {input}")));
    }
    Ok(())
}
