//! Доменная модель: ключи инстансов, координаты бинлога, запись инстанса.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Уникальный идентификатор инстанса MySQL: (hostname, port).
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceKey {
    pub hostname: String,
    pub port: u16,
}

impl InstanceKey {
    /// Собрать ключ из строковых host и port с валидацией.
    pub fn new_from_strings(hostname: &str, port: &str) -> Result<Self, AppError> {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return Err(AppError::InputInvalid("пустое имя хоста".into()));
        }
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| AppError::InputInvalid(format!("неверный порт: {port}")))?;
        if port == 0 {
            return Err(AppError::InputInvalid("порт должен быть в диапазоне 1..65535".into()));
        }
        Ok(InstanceKey {
            hostname: hostname.to_string(),
            port,
        })
    }

    /// Нулевой ключ означает отсутствие мастера.
    pub fn is_empty(&self) -> bool {
        self.hostname.is_empty()
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

impl FromStr for InstanceKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hostname, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AppError::InputInvalid(format!("ожидается host:port, получено: {s}")))?;
        Self::new_from_strings(hostname, port)
    }
}

/// Позиция в бинлоге: (файл, смещение).
///
/// Полный порядок: сначала лексикографически по файлу, затем по смещению —
/// этого достаточно, потому что имена бинлог-файлов нумеруются монотонно.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct BinlogCoordinates {
    pub log_file: String,
    pub log_pos: i64,
}

impl BinlogCoordinates {
    pub fn smaller_than(&self, other: &BinlogCoordinates) -> bool {
        self < other
    }

    pub fn equals(&self, other: &BinlogCoordinates) -> bool {
        self == other
    }

    pub fn is_empty(&self) -> bool {
        self.log_file.is_empty()
    }
}

impl fmt::Display for BinlogCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.log_file, self.log_pos)
    }
}

impl FromStr for BinlogCoordinates {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (log_file, log_pos) = s.rsplit_once(':').ok_or_else(|| {
            AppError::InputInvalid(format!("ожидается файл:позиция, получено: {s}"))
        })?;
        let log_pos: i64 = log_pos
            .parse()
            .map_err(|_| AppError::InputInvalid(format!("неверная позиция бинлога: {log_pos}")))?;
        Ok(BinlogCoordinates {
            log_file: log_file.to_string(),
            log_pos,
        })
    }
}

/// Запись об инстансе: результат опроса живой базы плюс производные поля
/// каталога.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub key: InstanceKey,
    pub server_id: u32,
    pub version: String,
    pub binlog_format: String,
    pub log_bin_enabled: bool,
    pub log_slave_updates_enabled: bool,

    /// Где находится собственный бинлог инстанса
    pub self_binlog_coordinates: BinlogCoordinates,

    /// Мастер инстанса; нулевой ключ если инстанс не реплика
    pub master_key: InstanceKey,

    /// Докуда IO-поток дочитал бинлог мастера
    pub read_binlog_coordinates: BinlogCoordinates,

    /// Докуда SQL-поток применил бинлог мастера
    pub exec_binlog_coordinates: BinlogCoordinates,

    pub slave_io_running: bool,
    pub slave_sql_running: bool,

    pub seconds_behind_master: Option<i64>,
    pub slave_lag_seconds: Option<i64>,

    /// Обнаруженные реплики (отсортированы, без дубликатов)
    pub slave_hosts: Vec<InstanceKey>,

    pub cluster_name: String,

    // Производные поля каталога
    pub is_up_to_date: bool,
    pub is_recently_checked: bool,
    pub is_last_check_valid: bool,
    pub seconds_since_last_seen: Option<i64>,
}

impl Instance {
    /// Инстанс является репликой, если у него задан мастер.
    pub fn is_slave(&self) -> bool {
        !self.master_key.is_empty()
    }

    /// Оба потока репликации работают.
    pub fn slave_running(&self) -> bool {
        self.slave_io_running && self.slave_sql_running
    }

    /// SQL-поток применил всё, что дочитал IO-поток.
    pub fn sql_thread_up_to_date(&self) -> bool {
        self.exec_binlog_coordinates.equals(&self.read_binlog_coordinates)
    }

    /// Добавить ключ реплики, сохраняя сортировку и уникальность.
    pub fn add_slave_key(&mut self, key: InstanceKey) {
        if let Err(pos) = self.slave_hosts.binary_search(&key) {
            self.slave_hosts.insert(pos, key);
        }
    }

    /// Сериализовать список реплик для колонки slave_hosts.
    pub fn slave_hosts_as_json(&self) -> Result<String, AppError> {
        serde_json::to_string(&self.slave_hosts)
            .map_err(|e| AppError::Internal(format!("сериализация slave_hosts: {e}")))
    }

    /// Восстановить список реплик из колонки slave_hosts.
    pub fn read_slave_hosts_from_json(&mut self, json: &str) {
        match serde_json::from_str::<Vec<InstanceKey>>(json) {
            Ok(mut hosts) => {
                hosts.sort();
                hosts.dedup();
                self.slave_hosts = hosts;
            }
            Err(e) => {
                tracing::warn!("Не удалось разобрать slave_hosts для {}: {e}", self.key);
                self.slave_hosts = Vec::new();
            }
        }
    }
}
