use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::warn;

use crate::auth::AuthError;
use crate::state::{
    AppState, AuthContext, HealthResponse, JsonResult, LoginRequest, LoginResponse,
    RegisterRequest, RegisterResponse, SessionResponse,
};
use crate::utils::{json_error, json_error_response};

pub async fn auth_register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Response {
    if !state.config.registration_enabled {
        return json_error_response(StatusCode::FORBIDDEN, "registration disabled");
    }

    match state.auth.create_user(&payload.username, &payload.password) {
        Ok(user) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                id: user.id,
                username: user.username,
            }),
        )
            .into_response(),
        Err(AuthError::UserExists) => {
            json_error_response(StatusCode::CONFLICT, "username already exists")
        }
        Err(err @ (AuthError::InvalidUsername | AuthError::InvalidPassword)) => {
            json_error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            warn!("Registration failed: {}", err);
            json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("auth error: {}", err),
            )
        }
    }
}

pub async fn auth_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> JsonResult<LoginResponse> {
    let user = match state
        .auth
        .authenticate(&payload.username, &payload.password)
    {
        Ok(Some(user)) => user,
        Ok(None) => return Err(json_error(StatusCode::UNAUTHORIZED, "invalid credentials")),
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("auth error: {}", err),
            ))
        }
    };

    let session = state.auth.create_session(&user.id).map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("auth error: {}", err),
        )
    })?;

    Ok(Json(LoginResponse {
        token: session.token,
        username: user.username,
        expires_at: session.expires_at,
        token_type: "Bearer",
    }))
}

pub async fn auth_logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    if let Err(err) = state.auth.revoke_session(&ctx.token) {
        return json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("auth error: {}", err),
        );
    }
    Json(HealthResponse { status: "ok" }).into_response()
}

pub async fn auth_session(Extension(ctx): Extension<AuthContext>) -> Json<SessionResponse> {
    Json(SessionResponse {
        valid: true,
        username: ctx.user.username,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::api::api_router;
    use crate::api::tests::{json_body, test_server};
    use crate::config::ServerConfig;

    async fn post_json(app: &Router, uri: &str, body: Value) -> Response {
        app.clone()
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn register_login_session_logout() {
        let server = test_server();
        let app = server.app;

        let response = post_json(
            &app,
            "/auth/register",
            json!({"username": "alice", "password": "pw"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = post_json(
            &app,
            "/auth/register",
            json!({"username": "ALICE", "password": "other"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = post_json(
            &app,
            "/auth/login",
            json!({"username": "alice", "password": "wrong"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = post_json(
            &app,
            "/auth/login",
            json!({"username": "alice", "password": "pw"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["username"], "alice");
        assert_eq!(body["token_type"], "Bearer");
        let token = body["token"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get("/auth/session")
                    .header("X-Session-Token", token.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["valid"], true);

        let response = app
            .clone()
            .oneshot(
                Request::post("/auth/logout")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/auth/session")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_rejects_empty_fields() {
        let server = test_server();
        let response = post_json(
            &server.app,
            "/auth/register",
            json!({"username": "", "password": "pw"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_can_be_disabled() {
        let mut server = test_server();
        server.state.config = Arc::new(ServerConfig {
            registration_enabled: false,
            ..ServerConfig::clone(&server.state.config)
        });
        let app = api_router(server.state.clone());
        let response = post_json(
            &app,
            "/auth/register",
            json!({"username": "alice", "password": "pw"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
