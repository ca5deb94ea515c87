//! Маршруты операций над топологией и реестра обслуживания.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::{ApiResponse, AppState};
use crate::error::AppError;
use crate::model::InstanceKey;
use crate::services::{maintenance_store, topology_ops};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRow {
    pub id: i32,
    pub hostname: String,
    pub port: i32,
    pub owner: String,
    pub reason: String,
    pub begin_timestamp: String,
    pub end_timestamp: Option<String>,
}

/// GET /api/move-up/{host}/{port} — переподчинить реплику её прадеду.
pub async fn move_up(
    State(state): State<AppState>,
    Path((host, port)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, AppError> {
    let key = InstanceKey::new_from_strings(&host, &port)?;
    let instance = topology_ops::move_up(&state.db, &state.config, &state.pools, &key).await?;
    Ok(ApiResponse::ok_with("Инстанс перемещён вверх", instance))
}

/// GET /api/move-below/{host}/{port}/{siblingHost}/{siblingPort} —
/// переподчинить реплику её собрату.
pub async fn move_below(
    State(state): State<AppState>,
    Path((host, port, sibling_host, sibling_port)): Path<(String, String, String, String)>,
) -> Result<Json<ApiResponse>, AppError> {
    let key = InstanceKey::new_from_strings(&host, &port)?;
    let sibling_key = InstanceKey::new_from_strings(&sibling_host, &sibling_port)?;
    let instance =
        topology_ops::move_below(&state.db, &state.config, &state.pools, &key, &sibling_key)
            .await?;
    Ok(ApiResponse::ok_with(
        format!("Инстанс {key} перемещён под {sibling_key}"),
        instance,
    ))
}

/// GET /api/start-slave/{host}/{port}.
pub async fn start_slave(
    State(state): State<AppState>,
    Path((host, port)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, AppError> {
    let key = InstanceKey::new_from_strings(&host, &port)?;
    let instance = topology_ops::start_slave(&state.db, &state.config, &state.pools, &key).await?;
    Ok(ApiResponse::ok_with("Репликация запущена", instance))
}

/// GET /api/stop-slave/{host}/{port}.
pub async fn stop_slave(
    State(state): State<AppState>,
    Path((host, port)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, AppError> {
    let key = InstanceKey::new_from_strings(&host, &port)?;
    let instance = topology_ops::stop_slave(&state.db, &state.config, &state.pools, &key).await?;
    Ok(ApiResponse::ok_with("Репликация остановлена", instance))
}

/// GET /api/begin-maintenance/{host}/{port}/{owner}/{reason} —
/// открыть заявку на обслуживание; Details — её id.
pub async fn begin_maintenance(
    State(state): State<AppState>,
    Path((host, port, owner, reason)): Path<(String, String, String, String)>,
) -> Result<Json<ApiResponse>, AppError> {
    let key = InstanceKey::new_from_strings(&host, &port)?;
    let id = maintenance_store::begin_maintenance(&state.db, &key, &owner, &reason).await?;
    Ok(ApiResponse::ok_with(
        format!("Обслуживание начато: {key}"),
        id,
    ))
}

/// GET /api/end-maintenance/{host}/{port} — закрыть заявку инстанса.
pub async fn end_maintenance_by_key(
    State(state): State<AppState>,
    Path((host, port)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, AppError> {
    let key = InstanceKey::new_from_strings(&host, &port)?;
    maintenance_store::end_maintenance_by_instance_key(&state.db, &key).await?;
    Ok(ApiResponse::ok(format!("Обслуживание завершено: {key}")))
}

/// GET /api/end-maintenance/{id} — закрыть заявку по id.
pub async fn end_maintenance_by_id(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    let id: i32 = token
        .parse()
        .map_err(|_| AppError::InputInvalid(format!("ожидается id заявки: {token}")))?;
    maintenance_store::end_maintenance(&state.db, id).await?;
    Ok(ApiResponse::ok(format!(
        "Обслуживание завершено: заявка {id}"
    )))
}

/// GET /api/maintenance — все активные заявки.
pub async fn maintenance(
    State(state): State<AppState>,
) -> Result<Json<Vec<MaintenanceRow>>, AppError> {
    let claims = maintenance_store::read_active_maintenance(&state.db).await?;
    let rows = claims
        .into_iter()
        .map(|c| MaintenanceRow {
            id: c.id,
            hostname: c.hostname,
            port: c.port,
            owner: c.owner,
            reason: c.reason,
            begin_timestamp: c.begin_timestamp,
            end_timestamp: c.end_timestamp,
        })
        .collect();
    Ok(Json(rows))
}
