use std::sync::Arc;
use std::time::SystemTime;

use catalog::{Catalog, CatalogError, RefreshSummary};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::state::{AppState, CatalogStatus};

#[derive(Debug)]
pub enum RefreshError {
    Catalog(CatalogError),
    Join(String),
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::Catalog(err) => write!(f, "{}", err),
            RefreshError::Join(err) => write!(f, "refresh task failed: {}", err),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Status to show before the first refresh of this process.
pub fn initial_status(catalog: Option<&Catalog>) -> CatalogStatus {
    let catalog = match catalog {
        Some(catalog) => catalog,
        None => return CatalogStatus::Unconfigured,
    };
    if !catalog.root().exists() {
        return CatalogStatus::Missing(catalog.root().to_path_buf());
    }
    match catalog.store().stats() {
        Ok(stats) if stats.total() > 0 => CatalogStatus::Ready(stats),
        Ok(_) => CatalogStatus::Idle,
        Err(err) => CatalogStatus::Error(err.to_string()),
    }
}

/// Runs one refresh on the blocking pool and records the outcome in the
/// shared status. Status updates happen on the blocking task, so they land
/// even when the caller stops waiting. A rejected concurrent refresh leaves
/// the status alone.
pub async fn run_refresh(state: &AppState, catalog: Catalog) -> Result<RefreshSummary, RefreshError> {
    let status = Arc::clone(&state.catalog_status);
    let task = tokio::task::spawn_blocking(move || {
        let result = catalog.refresh_with(|| {
            *status.write() = CatalogStatus::Refreshing {
                started: SystemTime::now(),
            };
        });
        record_outcome(&status, &result);
        result
    });

    match task.await {
        Ok(result) => result.map_err(RefreshError::Catalog),
        Err(err) => {
            let message = err.to_string();
            warn!("Catalog refresh join error: {}", message);
            *state.catalog_status.write() = CatalogStatus::Error(message.clone());
            Err(RefreshError::Join(message))
        }
    }
}

fn record_outcome(status: &RwLock<CatalogStatus>, result: &Result<RefreshSummary, CatalogError>) {
    match result {
        Ok(summary) => {
            info!(
                "Catalog ready: {} movies, {} episodes, {} songs",
                summary.stats.movies, summary.stats.tv_episodes, summary.stats.songs
            );
            *status.write() = CatalogStatus::Ready(summary.stats.clone());
        }
        Err(CatalogError::RefreshInProgress) => {}
        Err(err) => {
            warn!("Catalog refresh failed: {}", err);
            *status.write() = CatalogStatus::Error(err.to_string());
        }
    }
}

/// Fire-and-forget refresh used at startup.
pub fn start_refresh(state: AppState) {
    let catalog = match state.catalog.clone() {
        Some(catalog) => catalog,
        None => {
            info!("Media root not configured; skipping startup refresh.");
            return;
        }
    };
    tokio::spawn(async move {
        if let Err(err) = run_refresh(&state, catalog).await {
            warn!("Startup refresh did not complete: {}", err);
        }
    });
}
