//! Операции над топологией репликации: остановка и запуск реплик,
//! смена мастера, перенос реплики вверх и под собрата.
//!
//! Каждая операция переопрашивает затронутые инстансы до и после мутации;
//! состояние живой базы авторитетно, каталог лишь отражает его.

use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::time::{sleep, Instant};

use crate::config::Config;
use crate::error::AppError;
use crate::model::{BinlogCoordinates, Instance, InstanceKey};
use crate::services::audit_store::audit_operation;
use crate::services::maintenance_store;
use crate::services::topology_probe::{exec_instance, read_topology_instance, TopologyPools};

/// Пауза между переопросами в циклах ожидания.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Остановить реплику так, чтобы SQL-поток доел весь relay-лог:
/// stop slave io_thread, дождаться Exec == Read, затем stop slave.
/// После этого реплику безопасно переподчинять.
pub async fn stop_slave_nicely(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
) -> Result<Instance, AppError> {
    let instance = read_topology_instance(db, config, pools, key).await?;
    if !instance.is_slave() {
        return Err(AppError::PreconditionFailed(format!(
            "инстанс не является репликой: {key}"
        )));
    }

    exec_instance(pools, key, "stop slave io_thread").await?;

    let deadline = poll_deadline(config);
    loop {
        let polled = read_topology_instance(db, config, pools, key).await?;
        if polled.sql_thread_up_to_date() {
            break;
        }
        if Instant::now() >= deadline {
            return Err(AppError::TimedOut(format!("stop slave nicely: {key}")));
        }
        sleep(POLL_INTERVAL).await;
    }

    exec_instance(pools, key, "stop slave").await?;
    let instance = read_topology_instance(db, config, pools, key).await?;
    audit_operation(
        db,
        "stop-slave-nicely",
        Some(key),
        &format!("Exec: {}", instance.exec_binlog_coordinates),
    )
    .await?;
    Ok(instance)
}

/// Остановить репликацию.
pub async fn stop_slave(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
) -> Result<Instance, AppError> {
    let instance = read_topology_instance(db, config, pools, key).await?;
    if !instance.is_slave() {
        return Err(AppError::PreconditionFailed(format!(
            "инстанс не является репликой: {key}"
        )));
    }

    exec_instance(pools, key, "stop slave").await?;
    let instance = read_topology_instance(db, config, pools, key).await?;
    tracing::info!(
        "Репликация остановлена на {key}, Self: {}, Exec: {}",
        instance.self_binlog_coordinates,
        instance.exec_binlog_coordinates
    );
    audit_operation(db, "stop-slave", Some(key), "").await?;
    Ok(instance)
}

/// Запустить репликацию. После команды даём IO-потоку время подключиться
/// к мастеру, прежде чем переопрашивать.
pub async fn start_slave(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
) -> Result<Instance, AppError> {
    let instance = read_topology_instance(db, config, pools, key).await?;
    if !instance.is_slave() {
        return Err(AppError::PreconditionFailed(format!(
            "инстанс не является репликой: {key}"
        )));
    }

    exec_instance(pools, key, "start slave").await?;
    tracing::info!("Репликация запущена на {key}");
    if config.slave_start_post_wait_milliseconds > 0 {
        sleep(Duration::from_millis(config.slave_start_post_wait_milliseconds)).await;
    }

    let instance = read_topology_instance(db, config, pools, key).await?;
    audit_operation(db, "start-slave", Some(key), "").await?;
    Ok(instance)
}

/// Запустить репликацию до заданных координат мастера и остановиться там.
/// Переопрос каждые 200 мс; проскок целевых координат — ошибка.
pub async fn start_slave_until_master_coordinates(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
    target: &BinlogCoordinates,
) -> Result<Instance, AppError> {
    let instance = read_topology_instance(db, config, pools, key).await?;
    if !instance.is_slave() {
        return Err(AppError::PreconditionFailed(format!(
            "инстанс не является репликой: {key}"
        )));
    }
    if instance.slave_running() {
        return Err(AppError::PreconditionFailed(format!(
            "репликация уже запущена: {key}"
        )));
    }

    tracing::info!("Запускаю репликацию на {key} до координат {target}");
    exec_instance(
        pools,
        key,
        &format!(
            "start slave until master_log_file='{}', master_log_pos={}",
            target.log_file, target.log_pos
        ),
    )
    .await?;

    let deadline = poll_deadline(config);
    loop {
        let polled = read_topology_instance(db, config, pools, key).await?;
        if polled.exec_binlog_coordinates.equals(target) {
            break;
        }
        if target.smaller_than(&polled.exec_binlog_coordinates) {
            return Err(AppError::PreconditionFailed(format!(
                "SQL-поток проскочил целевые координаты: {key}, Exec: {}, цель: {target}",
                polled.exec_binlog_coordinates
            )));
        }
        if Instant::now() >= deadline {
            return Err(AppError::TimedOut(format!(
                "start slave until: {key}, цель: {target}"
            )));
        }
        sleep(POLL_INTERVAL).await;
    }

    let instance = stop_slave(db, config, pools, key).await?;
    audit_operation(db, "start-slave-until", Some(key), &format!("цель: {target}")).await?;
    Ok(instance)
}

/// Сменить мастера остановленной реплики.
pub async fn change_master_to(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
    master_key: &InstanceKey,
    coordinates: &BinlogCoordinates,
) -> Result<Instance, AppError> {
    let instance = read_topology_instance(db, config, pools, key).await?;
    if instance.slave_running() {
        return Err(AppError::PreconditionFailed(format!(
            "нельзя сменить мастера {key}: репликация запущена"
        )));
    }

    exec_instance(
        pools,
        key,
        &format!(
            "change master to master_host='{}', master_port={}, \
             master_log_file='{}', master_log_pos={}",
            master_key.hostname, master_key.port, coordinates.log_file, coordinates.log_pos
        ),
    )
    .await?;
    tracing::info!("Мастер {key} сменён на {master_key}, координаты {coordinates}");

    let instance = read_topology_instance(db, config, pools, key).await?;
    audit_operation(
        db,
        "change-master",
        Some(key),
        &format!("новый мастер: {master_key} @ {coordinates}"),
    )
    .await?;
    Ok(instance)
}

/// Барьер: дождаться на инстансе применения заданных координат мастера.
pub async fn master_pos_wait(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
    coordinates: &BinlogCoordinates,
) -> Result<Instance, AppError> {
    read_topology_instance(db, config, pools, key).await?;

    exec_instance(
        pools,
        key,
        &format!(
            "select master_pos_wait('{}', {})",
            coordinates.log_file, coordinates.log_pos
        ),
    )
    .await?;
    tracing::info!("Инстанс {key} достиг координат {coordinates}");

    read_topology_instance(db, config, pools, key).await
}

/// Переподчинить реплику её прадеду: R→M→G становится R→G.
///
/// Последовательность: аккуратно остановить мастера и реплику, догнать
/// реплику до замороженной позиции бинлога мастера, перевесить её на мастера
/// мастера в точке Exec-координат мастера, запустить обоих.
/// Компенсаций при сбое посреди последовательности нет: заявки обслуживания
/// снимаются, ошибка уходит наверх, смешанное состояние видно в problems.
pub async fn move_up(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
) -> Result<Instance, AppError> {
    let instance = read_topology_instance(db, config, pools, key).await?;
    if !instance.is_slave() {
        return Err(AppError::PreconditionFailed(format!(
            "инстанс не является репликой: {key}"
        )));
    }
    let master = read_topology_instance(db, config, pools, &instance.master_key).await?;
    if !master.is_slave() {
        return Err(AppError::PreconditionFailed(format!(
            "мастер {} сам не является репликой, двигаться выше некуда",
            master.key
        )));
    }
    ensure_reasonable_lag(&instance, config)?;
    ensure_reasonable_lag(&master, config)?;

    // На время операции оба инстанса берутся на обслуживание; чужая
    // активная заявка на любом из них срывает операцию
    let instance_claim =
        maintenance_store::begin_maintenance(db, key, "orchestrator", "move-up").await?;
    let master_claim =
        match maintenance_store::begin_maintenance(db, &master.key, "orchestrator", "move-up")
            .await
        {
            Ok(id) => id,
            Err(e) => {
                end_claim(db, instance_claim).await;
                return Err(e);
            }
        };

    let result = move_up_sequence(db, config, pools, key, &master.key).await;

    end_claim(db, master_claim).await;
    end_claim(db, instance_claim).await;

    let moved = result?;
    audit_operation(
        db,
        "move-up",
        Some(key),
        &format!("новый мастер: {}", moved.master_key),
    )
    .await?;
    Ok(moved)
}

async fn move_up_sequence(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
    master_key: &InstanceKey,
) -> Result<Instance, AppError> {
    let master = stop_slave_nicely(db, config, pools, master_key).await?;
    stop_slave_nicely(db, config, pools, key).await?;
    // Догнать замороженную позицию собственного бинлога мастера, затем
    // встать под прадеда в точке, которую мастер применил из его бинлога
    start_slave_until_master_coordinates(db, config, pools, key, &master.self_binlog_coordinates)
        .await?;
    change_master_to(
        db,
        config,
        pools,
        key,
        &master.master_key,
        &master.exec_binlog_coordinates,
    )
    .await?;
    let instance = start_slave(db, config, pools, key).await?;
    start_slave(db, config, pools, master_key).await?;
    Ok(instance)
}

/// Переподчинить реплику её собрату: обе реплики одного мастера, цель
/// начинает реплицироваться от собрата.
pub async fn move_below(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
    sibling_key: &InstanceKey,
) -> Result<Instance, AppError> {
    if key == sibling_key {
        return Err(AppError::PreconditionFailed(format!(
            "инстанс и собрат совпадают: {key}"
        )));
    }
    let instance = read_topology_instance(db, config, pools, key).await?;
    let sibling = read_topology_instance(db, config, pools, sibling_key).await?;
    if !instance.is_slave() || !sibling.is_slave() {
        return Err(AppError::PreconditionFailed(format!(
            "оба инстанса должны быть репликами: {key}, {sibling_key}"
        )));
    }
    if instance.master_key != sibling.master_key {
        return Err(AppError::PreconditionFailed(format!(
            "{key} и {sibling_key} не являются репликами одного мастера"
        )));
    }
    for checked in [&instance, &sibling] {
        if !checked.log_bin_enabled || !checked.log_slave_updates_enabled {
            return Err(AppError::PreconditionFailed(format!(
                "{}: требуются log_bin и log_slave_updates",
                checked.key
            )));
        }
    }
    ensure_reasonable_lag(&instance, config)?;
    ensure_reasonable_lag(&sibling, config)?;

    let instance_claim =
        maintenance_store::begin_maintenance(db, key, "orchestrator", "move-below").await?;
    let sibling_claim = match maintenance_store::begin_maintenance(
        db,
        sibling_key,
        "orchestrator",
        "move-below",
    )
    .await
    {
        Ok(id) => id,
        Err(e) => {
            end_claim(db, instance_claim).await;
            return Err(e);
        }
    };

    let result = move_below_sequence(db, config, pools, key, sibling_key).await;

    end_claim(db, sibling_claim).await;
    end_claim(db, instance_claim).await;

    let moved = result?;
    audit_operation(
        db,
        "move-below",
        Some(key),
        &format!("теперь реплицируется от {sibling_key}"),
    )
    .await?;
    Ok(moved)
}

async fn move_below_sequence(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
    sibling_key: &InstanceKey,
) -> Result<Instance, AppError> {
    let instance = stop_slave_nicely(db, config, pools, key).await?;
    let mut sibling = stop_slave_nicely(db, config, pools, sibling_key).await?;

    // Выровнять Exec-координаты: отстающий догоняет в общем бинлоге мастера
    if instance
        .exec_binlog_coordinates
        .smaller_than(&sibling.exec_binlog_coordinates)
    {
        start_slave_until_master_coordinates(
            db,
            config,
            pools,
            key,
            &sibling.exec_binlog_coordinates,
        )
        .await?;
    } else if sibling
        .exec_binlog_coordinates
        .smaller_than(&instance.exec_binlog_coordinates)
    {
        sibling = start_slave_until_master_coordinates(
            db,
            config,
            pools,
            sibling_key,
            &instance.exec_binlog_coordinates,
        )
        .await?;
    }

    change_master_to(
        db,
        config,
        pools,
        key,
        &sibling.key,
        &sibling.self_binlog_coordinates,
    )
    .await?;
    let moved = start_slave(db, config, pools, key).await?;
    start_slave(db, config, pools, sibling_key).await?;
    Ok(moved)
}

fn poll_deadline(config: &Config) -> Instant {
    Instant::now() + Duration::from_secs(config.operation_poll_timeout_seconds)
}

/// Лаг обязан быть известен и не выше допустимого для обслуживания.
fn ensure_reasonable_lag(instance: &Instance, config: &Config) -> Result<(), AppError> {
    match instance.slave_lag_seconds {
        Some(lag) if lag <= config.reasonable_maintenance_replication_lag_seconds => Ok(()),
        Some(lag) => Err(AppError::PreconditionFailed(format!(
            "{}: лаг репликации {lag} сек выше допустимого ({} сек)",
            instance.key, config.reasonable_maintenance_replication_lag_seconds
        ))),
        None => Err(AppError::PreconditionFailed(format!(
            "{}: лаг репликации неизвестен",
            instance.key
        ))),
    }
}

async fn end_claim(db: &DatabaseConnection, id: i32) {
    if let Err(e) = maintenance_store::end_maintenance(db, id).await {
        tracing::error!("Не удалось закрыть заявку на обслуживание {id}: {e}");
    }
}
