use std::env;
use std::path::PathBuf;

use catalog::{Catalog, CatalogStore, EmptyIndexPolicy, IndexOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let media_root = args
        .next()
        .or_else(|| env::var("MEDIA_ROOT").ok())
        .ok_or("MEDIA_ROOT not set and no path argument")?;
    let index_path = args
        .next()
        .or_else(|| env::var("INDEX_PATH").ok())
        .unwrap_or_else(|| "data/catalog.redb".to_string());
    let virtual_prefix = env::var("VIRTUAL_PREFIX").unwrap_or_else(|_| "/usb".to_string());

    let db = CatalogStore::open_db(&PathBuf::from(&index_path))?;
    let store = CatalogStore::open(db)?;
    let options = IndexOptions {
        virtual_prefix,
        ..IndexOptions::default()
    };
    let catalog = Catalog::new(
        PathBuf::from(&media_root),
        store,
        options,
        EmptyIndexPolicy::Replace,
    );

    let summary = catalog.refresh()?;
    info!("Catalog written to {}", index_path);
    println!(
        "Cataloged: {} movies, {} episodes, {} songs ({} files seen, {} skipped)",
        summary.stats.movies,
        summary.stats.tv_episodes,
        summary.stats.songs,
        summary.files_seen,
        summary.skipped_entries
    );

    Ok(())
}
