//! Конфигурация оркестратора: JSON-файлы, читаемые по порядку.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;

/// Конфигурация оркестратора. Значения по умолчанию разумны для всего,
/// кроме учётных данных топологии — они обязаны прийти от пользователя.
#[derive(Debug, Clone)]
pub struct Config {
    /// Учётные данные для опроса живых баз топологии
    pub mysql_topology_user: String,
    pub mysql_topology_password: String,

    /// Подключение к бэкенд-каталогу оркестратора
    pub mysql_orchestrator_host: String,
    pub mysql_orchestrator_port: u16,
    pub mysql_orchestrator_database: String,
    pub mysql_orchestrator_user: String,
    pub mysql_orchestrator_password: String,

    /// Пользовательский запрос лага реплики (например heartbeat-таблица);
    /// пустая строка — использовать Seconds_Behind_Master
    pub slave_lag_query: String,

    /// Пауза после START SLAVE перед повторным опросом (мс)
    pub slave_start_post_wait_milliseconds: u64,

    /// Пробовать SHOW SLAVE HOSTS до PROCESSLIST
    pub discover_by_show_slave_hosts: bool,

    /// Порог свежести записи инстанса (сек)
    pub instance_poll_seconds: u32,

    /// Через сколько часов забывать невиданные инстансы
    pub unseen_instance_forget_hours: u32,

    /// Период цикла планировщика обнаружения (сек)
    pub discovery_poll_seconds: u64,

    /// Лаг выше этого значения считается проблемой (сек)
    pub reasonable_replication_lag_seconds: i64,

    /// Лаг выше этого значения блокирует move-up и move-below (сек)
    pub reasonable_maintenance_replication_lag_seconds: i64,

    /// Размер страницы журнала аудита
    pub audit_page_size: u64,

    /// HTTP Basic-аутентификация; пустой пользователь отключает её
    pub http_auth_user: String,
    pub http_auth_password: String,

    /// Потолок циклов опроса операций топологии (сек)
    pub operation_poll_timeout_seconds: u64,

    /// Число воркеров планировщика обнаружения
    pub discovery_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mysql_topology_user: String::new(),
            mysql_topology_password: String::new(),
            mysql_orchestrator_host: String::new(),
            mysql_orchestrator_port: 3306,
            mysql_orchestrator_database: "orchestrator".to_string(),
            mysql_orchestrator_user: String::new(),
            mysql_orchestrator_password: String::new(),
            slave_lag_query: String::new(),
            slave_start_post_wait_milliseconds: 1000,
            discover_by_show_slave_hosts: false,
            instance_poll_seconds: 60,
            unseen_instance_forget_hours: 240,
            discovery_poll_seconds: 5,
            reasonable_replication_lag_seconds: 10,
            reasonable_maintenance_replication_lag_seconds: 20,
            audit_page_size: 20,
            http_auth_user: String::new(),
            http_auth_password: String::new(),
            operation_poll_timeout_seconds: 600,
            discovery_workers: 5,
        }
    }
}

/// Один слой конфигурации: JSON-файл, в котором каждый ключ необязателен.
/// Отсутствующий ключ оставляет значение предыдущего слоя.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    #[serde(rename = "MySQLTopologyUser")]
    mysql_topology_user: Option<String>,
    #[serde(rename = "MySQLTopologyPassword")]
    mysql_topology_password: Option<String>,
    #[serde(rename = "MySQLOrchestratorHost")]
    mysql_orchestrator_host: Option<String>,
    #[serde(rename = "MySQLOrchestratorPort")]
    mysql_orchestrator_port: Option<u16>,
    #[serde(rename = "MySQLOrchestratorDatabase")]
    mysql_orchestrator_database: Option<String>,
    #[serde(rename = "MySQLOrchestratorUser")]
    mysql_orchestrator_user: Option<String>,
    #[serde(rename = "MySQLOrchestratorPassword")]
    mysql_orchestrator_password: Option<String>,
    #[serde(rename = "SlaveLagQuery")]
    slave_lag_query: Option<String>,
    #[serde(rename = "SlaveStartPostWaitMilliseconds")]
    slave_start_post_wait_milliseconds: Option<u64>,
    #[serde(rename = "DiscoverByShowSlaveHosts")]
    discover_by_show_slave_hosts: Option<bool>,
    #[serde(rename = "InstancePollSeconds")]
    instance_poll_seconds: Option<u32>,
    #[serde(rename = "UnseenInstanceForgetHours")]
    unseen_instance_forget_hours: Option<u32>,
    #[serde(rename = "DiscoveryPollSeconds")]
    discovery_poll_seconds: Option<u64>,
    #[serde(rename = "ReasonableReplicationLagSeconds")]
    reasonable_replication_lag_seconds: Option<i64>,
    #[serde(rename = "ReasonableMaintenanceReplicationLagSeconds")]
    reasonable_maintenance_replication_lag_seconds: Option<i64>,
    #[serde(rename = "AuditPageSize")]
    audit_page_size: Option<u64>,
    #[serde(rename = "HTTPAuthUser")]
    http_auth_user: Option<String>,
    #[serde(rename = "HTTPAuthPassword")]
    http_auth_password: Option<String>,
    #[serde(rename = "OperationPollTimeoutSeconds")]
    operation_poll_timeout_seconds: Option<u64>,
    #[serde(rename = "DiscoveryWorkers")]
    discovery_workers: Option<usize>,
}

impl ConfigLayer {
    fn apply_to(self, config: &mut Config) {
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    config.$field = value;
                })*
            };
        }
        apply!(
            mysql_topology_user,
            mysql_topology_password,
            mysql_orchestrator_host,
            mysql_orchestrator_port,
            mysql_orchestrator_database,
            mysql_orchestrator_user,
            mysql_orchestrator_password,
            slave_lag_query,
            slave_start_post_wait_milliseconds,
            discover_by_show_slave_hosts,
            instance_poll_seconds,
            unseen_instance_forget_hours,
            discovery_poll_seconds,
            reasonable_replication_lag_seconds,
            reasonable_maintenance_replication_lag_seconds,
            audit_page_size,
            http_auth_user,
            http_auth_password,
            operation_poll_timeout_seconds,
            discovery_workers,
        );
    }
}

impl Config {
    /// Прочитать конфигурацию из файлов по порядку. Отсутствующий файл
    /// молча пропускается; нечитаемый JSON — фатальная ошибка.
    pub fn read<P: AsRef<Path>>(paths: &[P]) -> Result<Config, AppError> {
        let mut config = Config::default();
        for path in paths {
            let path = path.as_ref();
            let contents = match fs::read_to_string(path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("Файл конфигурации не найден, пропускаю: {}", path.display());
                    continue;
                }
                Err(e) => {
                    return Err(AppError::ConfigFatal(format!(
                        "не удалось прочитать {}: {e}",
                        path.display()
                    )));
                }
            };
            config.apply_json(&contents).map_err(|e| {
                AppError::ConfigFatal(format!("файл {}: {e}", path.display()))
            })?;
            tracing::info!("Прочитан файл конфигурации: {}", path.display());
        }
        Ok(config)
    }

    /// Наложить один JSON-слой поверх текущих значений.
    pub fn apply_json(&mut self, json: &str) -> Result<(), AppError> {
        let layer: ConfigLayer = serde_json::from_str(json)
            .map_err(|e| AppError::ConfigFatal(format!("неверный JSON конфигурации: {e}")))?;
        layer.apply_to(self);
        Ok(())
    }

    /// Проверить обязательные поля перед стартом.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.mysql_topology_user.is_empty() {
            return Err(AppError::ConfigFatal("MySQLTopologyUser не задан".into()));
        }
        if self.mysql_topology_password.is_empty() {
            return Err(AppError::ConfigFatal("MySQLTopologyPassword не задан".into()));
        }
        Ok(())
    }

    /// URL бэкенд-каталога из ключей MySQLOrchestrator*, если хост задан.
    pub fn backend_db_url(&self) -> Option<String> {
        if self.mysql_orchestrator_host.is_empty() {
            return None;
        }
        Some(format!(
            "mysql://{}:{}@{}:{}/{}",
            self.mysql_orchestrator_user,
            self.mysql_orchestrator_password,
            self.mysql_orchestrator_host,
            self.mysql_orchestrator_port,
            self.mysql_orchestrator_database,
        ))
    }
}
