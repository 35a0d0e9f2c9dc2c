pub mod auth;
pub mod catalog;
pub mod stats;
pub mod stream;

use ::catalog::Catalog;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::state::{AppState, AuthContext, CatalogStatus, ErrorResponse, HealthResponse};
use crate::utils::{json_error, json_error_response};

const SESSION_HEADER: &str = "x-session-token";
const TOKEN_QUERY_KEY: &str = "token";

pub fn api_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::auth_register))
        .route("/auth/login", post(auth::auth_login));

    let protected = Router::new()
        .route("/auth/logout", post(auth::auth_logout))
        .route("/auth/session", get(auth::auth_session))
        .route("/catalog", get(catalog::list_catalog))
        .route("/catalog/movies", get(catalog::list_movies))
        .route("/catalog/status", get(catalog::catalog_status))
        .route("/catalog/refresh", post(catalog::refresh_catalog))
        .route("/stats", get(stats::get_stats))
        .route("/stream", get(stream::stream_media))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new().merge(public).merge(protected).with_state(state)
}

async fn require_auth(
    State(state): State<AppState>,
    mut req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_token(req.headers(), req.uri().query()) {
        Some(token) => token,
        None => return json_error_response(StatusCode::UNAUTHORIZED, "unauthorized"),
    };

    match state.auth.user_from_token(&token) {
        Ok(Some(user)) => {
            req.extensions_mut().insert(AuthContext { user, token });
            next.run(req).await
        }
        Ok(None) => json_error_response(StatusCode::UNAUTHORIZED, "unauthorized"),
        Err(err) => json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("auth error: {}", err),
        ),
    }
}

/// Bearer header first, then `X-Session-Token`, then `?token=` for media
/// elements that cannot set headers.
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    if let Some(value) = headers.get(SESSION_HEADER) {
        if let Ok(value) = value.to_str() {
            let token = value.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    query_value(query?, TOKEN_QUERY_KEY)
}

fn query_value(query: &str, name: &str) -> Option<String> {
    for part in query.split('&') {
        let mut iter = part.splitn(2, '=');
        let key = iter.next()?.trim();
        let value = iter.next().unwrap_or("").trim();
        if key == name && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

pub(crate) fn catalog_or_json_error(
    state: &AppState,
) -> Result<Catalog, (StatusCode, Json<ErrorResponse>)> {
    match state.catalog.clone() {
        Some(catalog) => Ok(catalog),
        None => Err(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            catalog_status_message(&state.catalog_status.read()),
        )),
    }
}

pub(crate) fn catalog_status_message(status: &CatalogStatus) -> String {
    match status {
        CatalogStatus::Unconfigured => "media root must be set".to_string(),
        CatalogStatus::Missing(path) => format!("media root not found: {}", path.display()),
        CatalogStatus::Idle => "catalog not refreshed yet".to_string(),
        CatalogStatus::Refreshing { .. } => "catalog refresh in progress".to_string(),
        CatalogStatus::Ready(_) => "catalog ready".to_string(),
        CatalogStatus::Error(message) => format!("catalog error: {}", message),
    }
}
