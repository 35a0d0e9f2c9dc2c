use std::time::{SystemTime, UNIX_EPOCH};

use ::catalog::{CatalogError, IndexError};
use axum::{extract::State, http::StatusCode, Json};

use crate::refresh::{run_refresh, RefreshError};
use crate::state::{
    AppState, CatalogListResponse, CatalogStatus, CatalogStatusResponse, JsonResult,
    ListResponse, MovieListResponse, RefreshResponse,
};
use crate::utils::json_error;

use super::{catalog_or_json_error, catalog_status_message};

pub async fn list_catalog(State(state): State<AppState>) -> JsonResult<CatalogListResponse> {
    let catalog = catalog_or_json_error(&state)?;
    let items = catalog.store().list().map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("catalog error: {}", err),
        )
    })?;
    Ok(Json(ListResponse {
        total: items.len(),
        items,
    }))
}

pub async fn list_movies(State(state): State<AppState>) -> JsonResult<MovieListResponse> {
    let catalog = catalog_or_json_error(&state)?;
    let items = catalog.store().list_movies().map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("catalog error: {}", err),
        )
    })?;
    Ok(Json(ListResponse {
        total: items.len(),
        items,
    }))
}

pub async fn catalog_status(State(state): State<AppState>) -> Json<CatalogStatusResponse> {
    let status = state.catalog_status.read().clone();
    let refreshed_at = state
        .catalog
        .as_ref()
        .and_then(|catalog| catalog.store().refreshed_at().ok().flatten());

    let response = match &status {
        CatalogStatus::Ready(stats) => CatalogStatusResponse {
            status: "ready".to_string(),
            message: None,
            movies: Some(stats.movies),
            tv_shows: Some(stats.tv_episodes),
            songs: Some(stats.songs),
            refreshed_at,
            refresh_started_at: None,
        },
        other => CatalogStatusResponse {
            status: status_label(other).to_string(),
            message: Some(catalog_status_message(other)),
            movies: None,
            tv_shows: None,
            songs: None,
            refreshed_at,
            refresh_started_at: match other {
                CatalogStatus::Refreshing { started } => Some(unix_secs(*started)),
                _ => None,
            },
        },
    };
    Json(response)
}

pub async fn refresh_catalog(State(state): State<AppState>) -> JsonResult<RefreshResponse> {
    let catalog = catalog_or_json_error(&state)?;
    if catalog.is_refreshing() {
        return Err(json_error(
            StatusCode::CONFLICT,
            CatalogError::RefreshInProgress.to_string(),
        ));
    }

    match run_refresh(&state, catalog).await {
        Ok(summary) => Ok(Json(RefreshResponse {
            movies: summary.stats.movies,
            tv_shows: summary.stats.tv_episodes,
            songs: summary.stats.songs,
            total: summary.stats.total(),
            files_seen: summary.files_seen,
            skipped_entries: summary.skipped_entries,
        })),
        Err(err) => Err(json_error(refresh_error_status(&err), err.to_string())),
    }
}

fn refresh_error_status(err: &RefreshError) -> StatusCode {
    match err {
        RefreshError::Catalog(CatalogError::RefreshInProgress) => StatusCode::CONFLICT,
        RefreshError::Catalog(CatalogError::Index(IndexError::DeadlineExceeded { .. })) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        RefreshError::Catalog(_) | RefreshError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}

fn status_label(status: &CatalogStatus) -> &'static str {
    match status {
        CatalogStatus::Unconfigured => "unconfigured",
        CatalogStatus::Missing(_) => "missing",
        CatalogStatus::Idle => "idle",
        CatalogStatus::Refreshing { .. } => "refreshing",
        CatalogStatus::Ready(_) => "ready",
        CatalogStatus::Error(_) => "error",
    }
}
