use axum::{extract::State, http::StatusCode, Json};

use crate::state::{AppState, JsonResult, StatsResponse};
use crate::utils::{json_error, now_secs};

use super::catalog_or_json_error;

/// Per-drive usage computed from the catalog.
pub async fn get_stats(State(state): State<AppState>) -> JsonResult<StatsResponse> {
    let catalog = catalog_or_json_error(&state)?;
    let drives = catalog.store().drive_stats().map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("catalog error: {}", err),
        )
    })?;
    let total_files = drives.iter().map(|drive| drive.total_files).sum::<usize>();
    Ok(Json(StatsResponse {
        drives,
        total_files,
        generated_at: now_secs(),
    }))
}
