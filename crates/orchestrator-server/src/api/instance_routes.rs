//! Маршруты чтения и обнаружения: инстансы, кластеры, поиск, проблемы, аудит.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{ApiResponse, AppState};
use crate::error::AppError;
use crate::model::{Instance, InstanceKey};
use crate::services::{audit_store, instance_store, topology_probe};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub s: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRow {
    pub id: i32,
    pub audit_timestamp: String,
    pub audit_type: String,
    pub hostname: String,
    pub port: i32,
    pub message: String,
}

/// GET /api/instance/{host}/{port} — запись инстанса из каталога.
pub async fn instance(
    State(state): State<AppState>,
    Path((host, port)): Path<(String, String)>,
) -> Result<Json<Instance>, AppError> {
    let key = InstanceKey::new_from_strings(&host, &port)?;
    let instance = instance_store::read_instance(&state.db, &state.config, &key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("нет записи об инстансе: {key}")))?;
    Ok(Json(instance))
}

/// GET /api/discover/{host}/{port} — асинхронная заявка на опрос.
pub async fn discover(
    State(state): State<AppState>,
    Path((host, port)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, AppError> {
    let key = InstanceKey::new_from_strings(&host, &port)?;
    state.discovery.submit(key.clone()).await;
    Ok(ApiResponse::ok(format!(
        "Инстанс поставлен в очередь обнаружения: {key}"
    )))
}

/// GET /api/refresh/{host}/{port} — синхронный переопрос инстанса.
pub async fn refresh(
    State(state): State<AppState>,
    Path((host, port)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, AppError> {
    let key = InstanceKey::new_from_strings(&host, &port)?;
    topology_probe::refresh_topology_instance(&state.db, &state.config, &state.pools, &key)
        .await?;
    Ok(ApiResponse::ok(format!("Инстанс переопрошен: {key}")))
}

/// GET /api/forget/{host}/{port} — удалить инстанс из каталога.
pub async fn forget(
    State(state): State<AppState>,
    Path((host, port)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, AppError> {
    let key = InstanceKey::new_from_strings(&host, &port)?;
    instance_store::forget_instance(&state.db, &key).await?;
    Ok(ApiResponse::ok(format!("Инстанс забыт: {key}")))
}

/// GET /api/cluster/{name} — инстансы кластера.
pub async fn cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Instance>>, AppError> {
    let instances = instance_store::read_cluster_instances(&state.db, &state.config, &name).await?;
    Ok(Json(instances))
}

/// GET /api/clusters — имена известных кластеров.
pub async fn clusters(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let names = instance_store::read_clusters(&state.db).await?;
    Ok(Json(names))
}

/// GET /api/search/{query} — поиск инстансов.
pub async fn search_by_path(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<Vec<Instance>>, AppError> {
    search(state, query).await
}

/// GET /api/search?s=query — поиск инстансов через query-параметр.
pub async fn search_by_query(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Instance>>, AppError> {
    search(state, params.s.unwrap_or_default()).await
}

async fn search(state: AppState, query: String) -> Result<Json<Vec<Instance>>, AppError> {
    let instances = instance_store::search_instances(&state.db, &state.config, &query).await?;
    Ok(Json(instances))
}

/// GET /api/problems — инстансы с известными проблемами.
pub async fn problems(State(state): State<AppState>) -> Result<Json<Vec<Instance>>, AppError> {
    let instances = instance_store::read_problem_instances(&state.db, &state.config).await?;
    Ok(Json(instances))
}

/// GET /api/audit — первая страница журнала аудита.
pub async fn audit_first_page(
    State(state): State<AppState>,
) -> Result<Json<Vec<AuditRow>>, AppError> {
    read_audit(state, 0).await
}

/// GET /api/audit/{page} — страница журнала аудита.
/// Нечисловой или отрицательный номер трактуется как первая страница.
pub async fn audit_page(
    State(state): State<AppState>,
    Path(page): Path<String>,
) -> Result<Json<Vec<AuditRow>>, AppError> {
    read_audit(state, page.parse().unwrap_or(0)).await
}

async fn read_audit(state: AppState, page: u64) -> Result<Json<Vec<AuditRow>>, AppError> {
    let entries = audit_store::read_recent_audit(&state.db, &state.config, page).await?;
    let rows = entries
        .into_iter()
        .map(|e| AuditRow {
            id: e.id,
            audit_timestamp: e.audit_timestamp,
            audit_type: e.audit_type,
            hostname: e.hostname,
            port: e.port,
            message: e.message,
        })
        .collect();
    Ok(Json(rows))
}
