//! Инспектор топологии: опрос живого инстанса MySQL и сборка записи каталога.

use std::collections::HashMap;

use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Pool, Row};
use sea_orm::DatabaseConnection;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::AppError;
use crate::model::{Instance, InstanceKey};
use crate::services::instance_store;

/// Пулы подключений к живым базам топологии, по одному на (host, port).
pub struct TopologyPools {
    user: String,
    password: String,
    pools: Mutex<HashMap<InstanceKey, Pool>>,
}

impl TopologyPools {
    pub fn new(config: &Config) -> Self {
        TopologyPools {
            user: config.mysql_topology_user.clone(),
            password: config.mysql_topology_password.clone(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Получить подключение к инстансу, создав пул при первом обращении.
    pub async fn get_conn(&self, key: &InstanceKey) -> Result<Conn, AppError> {
        let pool = {
            let mut pools = self.pools.lock().await;
            pools
                .entry(key.clone())
                .or_insert_with(|| {
                    let opts = OptsBuilder::default()
                        .ip_or_hostname(key.hostname.clone())
                        .tcp_port(key.port)
                        .user(Some(self.user.clone()))
                        .pass(Some(self.password.clone()));
                    Pool::new(opts)
                })
                .clone()
        };
        pool.get_conn()
            .await
            .map_err(|e| AppError::ConnectFailed(format!("{key}: {e}")))
    }
}

/// Выполнить одиночную команду на живом инстансе.
pub async fn exec_instance(
    pools: &TopologyPools,
    key: &InstanceKey,
    query: &str,
) -> Result<(), AppError> {
    let mut conn = pools.get_conn(key).await?;
    conn.query_drop(query).await?;
    Ok(())
}

/// Опросить живой инстанс и записать результат в каталог.
///
/// При недоступности инстанса или ошибке посреди опроса продвигается только
/// last_checked, частичный результат не сохраняется, ошибка уходит наверх.
pub async fn read_topology_instance(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
) -> Result<Instance, AppError> {
    let mut conn = match pools.get_conn(key).await {
        Ok(conn) => conn,
        Err(e) => {
            instance_store::update_last_checked(db, key).await.ok();
            tracing::warn!("Инстанс {key} недоступен: {e}");
            return Err(e);
        }
    };

    match probe_instance(&mut conn, db, config, key).await {
        Ok(instance) => {
            instance_store::write_instance(db, &instance, None).await?;
            Ok(instance)
        }
        Err(e) => {
            instance_store::update_last_checked(db, key).await.ok();
            tracing::warn!("Ошибка опроса {key}: {e}");
            Err(e)
        }
    }
}

/// Синхронно переопросить инстанс и вернуть его каталожное представление.
pub async fn refresh_topology_instance(
    db: &DatabaseConnection,
    config: &Config,
    pools: &TopologyPools,
    key: &InstanceKey,
) -> Result<Instance, AppError> {
    read_topology_instance(db, config, pools, key).await?;
    instance_store::read_instance(db, config, key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("инстанс не найден в каталоге: {key}")))
}

/// Последовательность опроса: глобальные переменные, статус репликации, лаг,
/// собственные координаты, реплики, имя кластера.
async fn probe_instance(
    conn: &mut Conn,
    db: &DatabaseConnection,
    config: &Config,
    key: &InstanceKey,
) -> Result<Instance, AppError> {
    let mut instance = Instance {
        key: key.clone(),
        ..Default::default()
    };

    let globals: Option<(i64, String, String, bool, bool)> = conn
        .query_first(
            "select @@global.server_id, @@global.version, @@global.binlog_format, \
             @@global.log_bin, @@global.log_slave_updates",
        )
        .await?;
    let (server_id, version, binlog_format, log_bin, log_slave_updates) = globals
        .ok_or_else(|| AppError::QueryFailed(format!("нет глобальных переменных: {key}")))?;
    instance.server_id = server_id as u32;
    instance.version = version;
    instance.binlog_format = binlog_format;
    instance.log_bin_enabled = log_bin;
    instance.log_slave_updates_enabled = log_slave_updates;

    // Отсутствие строки SHOW SLAVE STATUS означает, что инстанс не реплика
    if let Some(row) = conn.query_first::<Row, _>("show slave status").await? {
        instance.slave_io_running =
            row.get::<String, _>("Slave_IO_Running").as_deref() == Some("Yes");
        instance.slave_sql_running =
            row.get::<String, _>("Slave_SQL_Running").as_deref() == Some("Yes");
        instance.read_binlog_coordinates.log_file =
            row.get::<String, _>("Master_Log_File").unwrap_or_default();
        instance.read_binlog_coordinates.log_pos =
            row.get::<i64, _>("Read_Master_Log_Pos").unwrap_or_default();
        instance.exec_binlog_coordinates.log_file =
            row.get::<String, _>("Relay_Master_Log_File").unwrap_or_default();
        instance.exec_binlog_coordinates.log_pos =
            row.get::<i64, _>("Exec_Master_Log_Pos").unwrap_or_default();
        instance.seconds_behind_master = row
            .get::<Option<i64>, _>("Seconds_Behind_Master")
            .flatten();

        let master_host: String = row.get("Master_Host").unwrap_or_default();
        let master_port: i64 = row.get("Master_Port").unwrap_or_default();
        if !master_host.is_empty() {
            instance.master_key = InstanceKey {
                hostname: master_host,
                port: master_port as u16,
            };
        }
    }

    if config.slave_lag_query.is_empty() {
        instance.slave_lag_seconds = instance.seconds_behind_master;
    } else {
        instance.slave_lag_seconds = conn.query_first(config.slave_lag_query.as_str()).await?;
    }

    if let Some(row) = conn.query_first::<Row, _>("show master status").await? {
        instance.self_binlog_coordinates.log_file =
            row.get::<String, _>("File").unwrap_or_default();
        instance.self_binlog_coordinates.log_pos =
            row.get::<i64, _>("Position").unwrap_or_default();
    }

    // Реплики: SHOW SLAVE HOSTS или PROCESSLIST
    let mut found_by_slave_hosts = false;
    if config.discover_by_show_slave_hosts {
        let rows: Vec<Row> = conn.query("show slave hosts").await?;
        for row in rows {
            let host: String = row.get("Host").unwrap_or_default();
            let port: i64 = row.get("Port").unwrap_or_default();
            if !host.is_empty() && port > 0 {
                instance.add_slave_key(InstanceKey {
                    hostname: host,
                    port: port as u16,
                });
                found_by_slave_hosts = true;
            }
        }
    }
    if !found_by_slave_hosts {
        // Не настроено или SHOW SLAVE HOSTS пуст — обнаруживаем по PROCESSLIST.
        // Порт реплики неизвестен, берём порт самого инстанса.
        let hostnames: Vec<String> = conn
            .query_map(
                "select substring_index(host, ':', 1) as slave_hostname \
                 from information_schema.processlist where command = 'Binlog Dump'",
                |hostname: String| hostname,
            )
            .await?;
        for hostname in hostnames {
            instance.add_slave_key(InstanceKey {
                hostname: canonical_cname(&hostname),
                port: key.port,
            });
        }
    }

    instance.cluster_name =
        instance_store::read_cluster_name_by_master(db, key, &instance.master_key).await?;

    Ok(instance)
}

/// Каноническое имя хоста. Сюда подключается внешняя DNS-канонизация CNAME;
/// по умолчанию имя лишь нормализуется.
pub fn canonical_cname(hostname: &str) -> String {
    hostname.trim().to_ascii_lowercase()
}
