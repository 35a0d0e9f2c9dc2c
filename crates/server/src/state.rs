use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use axum::http::StatusCode;
use axum::Json;
use catalog::{Catalog, CatalogStats, DriveStats};
use common::{CatalogEntry, MovieDetails};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthStore, AuthUser};
use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub auth: AuthStore,
    /// `None` until a media root is configured.
    pub catalog: Option<Catalog>,
    pub catalog_status: Arc<RwLock<CatalogStatus>>,
}

#[derive(Clone, Debug)]
pub enum CatalogStatus {
    Unconfigured,
    Missing(PathBuf),
    Idle,
    Refreshing { started: SystemTime },
    Ready(CatalogStats),
    Error(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

pub type CatalogListResponse = ListResponse<CatalogEntry>;
pub type MovieListResponse = ListResponse<MovieDetails>;

#[derive(Serialize)]
pub struct CatalogStatusResponse {
    pub status: String,
    pub message: Option<String>,
    pub movies: Option<usize>,
    pub tv_shows: Option<usize>,
    pub songs: Option<usize>,
    pub refreshed_at: Option<u64>,
    pub refresh_started_at: Option<u64>,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub movies: usize,
    pub tv_shows: usize,
    pub songs: usize,
    pub total: usize,
    pub files_seen: usize,
    pub skipped_entries: usize,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub drives: Vec<DriveStats>,
    pub total_files: usize,
    pub generated_at: u64,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub path: Option<String>,
}

#[derive(Clone)]
pub struct AuthContext {
    pub user: AuthUser,
    pub token: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub expires_at: u64,
    pub token_type: &'static str,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub username: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub valid: bool,
    pub username: String,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
