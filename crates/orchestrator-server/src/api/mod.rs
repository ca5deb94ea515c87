//! HTTP API: маршрутизация, состояние приложения, конверт ответов.

pub mod instance_routes;
pub mod middleware;
pub mod topology_routes;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::discovery::DiscoveryQueue;
use crate::services::topology_probe::TopologyPools;

/// Общее состояние приложения.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub pools: Arc<TopologyPools>,
    pub discovery: DiscoveryQueue,
}

/// Конверт операционного ответа. Ресурсные маршруты отдают полезную
/// нагрузку напрямую, без конверта.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiResponse {
    pub code: &'static str,
    pub message: String,
    pub details: serde_json::Value,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Json<ApiResponse> {
        Json(ApiResponse {
            code: "OK",
            message: message.into(),
            details: serde_json::Value::Null,
        })
    }

    pub fn ok_with(message: impl Into<String>, details: impl Serialize) -> Json<ApiResponse> {
        Json(ApiResponse {
            code: "OK",
            message: message.into(),
            details: serde_json::to_value(details).unwrap_or(serde_json::Value::Null),
        })
    }
}

/// Построить маршрутизатор Axum.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/instance/{host}/{port}", get(instance_routes::instance))
        .route("/discover/{host}/{port}", get(instance_routes::discover))
        .route("/refresh/{host}/{port}", get(instance_routes::refresh))
        .route("/forget/{host}/{port}", get(instance_routes::forget))
        .route("/move-up/{host}/{port}", get(topology_routes::move_up))
        .route(
            "/move-below/{host}/{port}/{sibling_host}/{sibling_port}",
            get(topology_routes::move_below),
        )
        .route(
            "/begin-maintenance/{host}/{port}/{owner}/{reason}",
            get(topology_routes::begin_maintenance),
        )
        .route(
            "/end-maintenance/{host}/{port}",
            get(topology_routes::end_maintenance_by_key),
        )
        .route(
            "/end-maintenance/{token}",
            get(topology_routes::end_maintenance_by_id),
        )
        .route("/start-slave/{host}/{port}", get(topology_routes::start_slave))
        .route("/stop-slave/{host}/{port}", get(topology_routes::stop_slave))
        .route("/maintenance", get(topology_routes::maintenance))
        .route("/cluster/{name}", get(instance_routes::cluster))
        .route("/clusters", get(instance_routes::clusters))
        .route("/search/{query}", get(instance_routes::search_by_path))
        .route("/search", get(instance_routes::search_by_query))
        .route("/problems", get(instance_routes::problems))
        .route("/audit", get(instance_routes::audit_first_page))
        .route("/audit/{page}", get(instance_routes::audit_page));

    // Basic-аутентификация включается непустым HTTPAuthUser
    let api = if state.config.http_auth_user.is_empty() {
        api
    } else {
        api.layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::basic_auth,
        ))
    };

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health — проверка работоспособности сервера.
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = state.db.execute_unprepared("SELECT 1").await.is_ok();
    Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "error" },
        "database": db_ok,
        "service": "orchestrator-server"
    }))
}
