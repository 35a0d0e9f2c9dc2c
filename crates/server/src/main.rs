mod api;
mod auth;
mod config;
mod paths;
mod range;
mod refresh;
mod state;
mod stream;
mod utils;

use std::sync::Arc;

use api::api_router;
use auth::{AuthStore, MemorySessionStore, RedbSessionStore, SessionStore};
use axum::Router;
use catalog::{Catalog, CatalogStore};
use config::{config_path_from_env, load_or_create_config, resolve_media_root, resolve_path};
use parking_lot::RwLock;
use refresh::{initial_status, start_refresh};
use state::{AppState, CatalogStatus};
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let index_path = resolve_path(&config_path, config.index_path.trim());
    let db = CatalogStore::open_db(&index_path)?;

    let sessions: Arc<dyn SessionStore> = if config.persist_sessions {
        Arc::new(RedbSessionStore::new(Arc::clone(&db))?)
    } else {
        Arc::new(MemorySessionStore::new())
    };
    let auth = AuthStore::new(Arc::clone(&db), sessions, config.session_ttl());
    auth.init_tables()?;
    match auth.purge_expired_sessions() {
        Ok(0) => {}
        Ok(count) => info!("Dropped {} expired sessions", count),
        Err(err) => warn!("Failed to purge expired sessions: {}", err),
    }

    let catalog = match resolve_media_root(&config_path, &config.media_root) {
        Some(root) => {
            let store = CatalogStore::open(Arc::clone(&db))?;
            Some(Catalog::new(
                root,
                store,
                config.index_options(),
                config.empty_index_policy,
            ))
        }
        None => {
            info!("Media root not configured yet; set media_root in {:?}.", config_path);
            None
        }
    };

    let status = initial_status(catalog.as_ref());
    if let CatalogStatus::Missing(root) = &status {
        warn!("Media root {:?} does not exist", root);
    }

    let refresh_on_start = config.refresh_on_start;
    let state = AppState {
        config: Arc::new(config),
        auth,
        catalog,
        catalog_status: Arc::new(RwLock::new(status)),
    };
    if refresh_on_start {
        start_refresh(state.clone());
    }

    let app = Router::new()
        .nest("/api/v1", api_router(state))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
