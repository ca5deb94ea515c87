//! HTTP Basic-аутентификация для маршрутов API.

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use subtle::ConstantTimeEq;

use crate::api::AppState;
use crate::config::Config;

/// Middleware: пропускает запрос только с верными учётными данными.
pub async fn basic_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| check_credentials(&state.config, value))
        .unwrap_or(false);

    if !authorized {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"orchestrator\""),
        );
        return response;
    }
    next.run(req).await
}

/// Разобрать заголовок Authorization и сравнить учётные данные
/// константным по времени сравнением.
fn check_credentials(config: &Config, header_value: &str) -> bool {
    let Some(encoded) = header_value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, password)) = decoded.split_once(':') else {
        return false;
    };

    let user_ok: bool = user
        .as_bytes()
        .ct_eq(config.http_auth_user.as_bytes())
        .into();
    let password_ok: bool = password
        .as_bytes()
        .ct_eq(config.http_auth_password.as_bytes())
        .into();
    user_ok && password_ok
}
