//! Типы ошибок оркестратора.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Неполная или нечитаемая конфигурация; процесс не стартует
    #[error("Фатальная ошибка конфигурации: {0}")]
    ConfigFatal(String),

    /// Целевая база недоступна или не принимает учётные данные
    #[error("Не удалось подключиться: {0}")]
    ConnectFailed(String),

    /// Запрос к живой базе завершился ошибкой посреди опроса или операции
    #[error("Ошибка запроса: {0}")]
    QueryFailed(String),

    /// Операция вызвана на инстансе в недопустимом состоянии
    #[error("Предусловие не выполнено: {0}")]
    PreconditionFailed(String),

    #[error("Не найдено: {0}")]
    NotFound(String),

    /// На инстансе уже есть активная заявка на обслуживание
    #[error("Инстанс на обслуживании: {0}")]
    InMaintenance(String),

    #[error("Неверный ввод: {0}")]
    InputInvalid(String),

    /// Цикл опроса операции не сошёлся за отведённое время
    #[error("Превышено время ожидания: {0}")]
    TimedOut(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

/// Любая ошибка ядра отдаётся наружу конвертом ERROR с кодом HTTP 200.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "Code": "ERROR",
            "Message": self.to_string(),
            "Details": serde_json::Value::Null,
        });
        (StatusCode::OK, axum::Json(body)).into_response()
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(e: sea_orm::DbErr) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<mysql_async::Error> for AppError {
    fn from(e: mysql_async::Error) -> Self {
        match &e {
            mysql_async::Error::Io(_) => AppError::ConnectFailed(e.to_string()),
            _ => AppError::QueryFailed(e.to_string()),
        }
    }
}
