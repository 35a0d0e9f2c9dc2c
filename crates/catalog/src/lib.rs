use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use redb::{CommitError, DatabaseError, StorageError, TableError, TransactionError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod classify;
pub mod index;
pub mod store;

pub use index::{index_media, IndexError, IndexOptions, IndexReport};
pub use store::{CatalogStats, CatalogStore, DriveStats};

/// What a refresh does when the walk finds nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyIndexPolicy {
    /// Commit the empty result, emptying the catalog.
    #[default]
    Replace,
    /// Refuse to replace a non-empty catalog with nothing.
    Keep,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefreshSummary {
    pub stats: CatalogStats,
    pub files_seen: usize,
    pub skipped_entries: usize,
}

/// Walks the media root and swaps the result into the store. Only one
/// refresh runs at a time per `Catalog` (clones share the guard).
#[derive(Clone)]
pub struct Catalog {
    root: PathBuf,
    options: IndexOptions,
    policy: EmptyIndexPolicy,
    store: CatalogStore,
    refresh_lock: Arc<Mutex<()>>,
}

impl Catalog {
    pub fn new(
        root: PathBuf,
        store: CatalogStore,
        options: IndexOptions,
        policy: EmptyIndexPolicy,
    ) -> Self {
        Self {
            root,
            options,
            policy,
            store,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn virtual_prefix(&self) -> &str {
        &self.options.virtual_prefix
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_lock.is_locked()
    }

    /// Takes the refresh guard without walking. Refreshes are rejected until
    /// the guard drops; `None` when one is already running.
    pub fn pause_refreshes(&self) -> Option<MutexGuard<'_, ()>> {
        self.refresh_lock.try_lock()
    }

    /// Blocking; call from `spawn_blocking` in async code.
    pub fn refresh(&self) -> Result<RefreshSummary, CatalogError> {
        self.refresh_with(|| {})
    }

    /// Like `refresh`, calling `on_start` once the refresh guard is held.
    /// `on_start` never runs for a rejected concurrent refresh.
    pub fn refresh_with<F: FnOnce()>(&self, on_start: F) -> Result<RefreshSummary, CatalogError> {
        let _guard = self
            .refresh_lock
            .try_lock()
            .ok_or(CatalogError::RefreshInProgress)?;
        on_start();

        info!("Refreshing catalog from {:?}", self.root);
        let report = index_media(&self.root, &self.options)?;

        if report.records.is_empty() {
            if !report.root_readable {
                warn!("Media root {:?} could not be read; index is empty", self.root);
            }
            if self.policy == EmptyIndexPolicy::Keep && !self.store.is_empty()? {
                warn!("Empty index rejected; keeping the existing catalog");
                return Err(CatalogError::EmptyIndex);
            }
        }

        let stats = self.store.replace_all(&report.records)?;
        Ok(RefreshSummary {
            stats,
            files_seen: report.files_seen,
            skipped_entries: report.skipped_entries,
        })
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    Index(IndexError),
    DuplicatePath(String),
    DetailsMismatch(String),
    RefreshInProgress,
    EmptyIndex,
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "io error: {}", err),
            CatalogError::Redb(err) => write!(f, "db error: {}", err),
            CatalogError::Bincode(err) => write!(f, "bincode error: {}", err),
            CatalogError::Index(err) => write!(f, "{}", err),
            CatalogError::DuplicatePath(path) => write!(f, "duplicate file path: {}", path),
            CatalogError::DetailsMismatch(path) => {
                write!(f, "details do not match media kind: {}", path)
            }
            CatalogError::RefreshInProgress => write!(f, "a catalog refresh is already running"),
            CatalogError::EmptyIndex => {
                write!(f, "media walk found nothing; existing catalog kept")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

impl From<IndexError> for CatalogError {
    fn from(err: IndexError) -> Self {
        CatalogError::Index(err)
    }
}

impl From<redb::Error> for CatalogError {
    fn from(err: redb::Error) -> Self {
        CatalogError::Redb(err)
    }
}

impl From<DatabaseError> for CatalogError {
    fn from(err: DatabaseError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TableError> for CatalogError {
    fn from(err: TableError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TransactionError> for CatalogError {
    fn from(err: TransactionError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<StorageError> for CatalogError {
    fn from(err: StorageError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<CommitError> for CatalogError {
    fn from(err: CommitError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for CatalogError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        CatalogError::Bincode(err)
    }
}
