use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use common::{
    CatalogEntry, MediaDetails, MediaKind, MediaRecord, MovieDetails, SongDetails, TvDetails,
};
use redb::{
    Database, ReadableTable, TableDefinition, TableError, TableHandle, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::CatalogError;

const MEDIA_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("media");
const MEDIA_BY_PATH_TABLE: TableDefinition<&str, u64> = TableDefinition::new("media_by_path");
const MOVIES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("movies");
const TV_SHOWS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("tv_shows");
const SONGS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("songs");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("catalog_meta");

const META_NEXT_ID_KEY: &str = "next_id";
const META_REFRESHED_AT_KEY: &str = "refreshed_at";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct MediaRow {
    kind: MediaKind,
    file_path: String,
    drive_label: String,
    size_bytes: u64,
    extension: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub movies: usize,
    pub tv_episodes: usize,
    pub songs: usize,
}

impl CatalogStats {
    pub fn total(&self) -> usize {
        self.movies + self.tv_episodes + self.songs
    }

    fn count(&mut self, kind: MediaKind) {
        match kind {
            MediaKind::Movie => self.movies += 1,
            MediaKind::TvEpisode => self.tv_episodes += 1,
            MediaKind::Song => self.songs += 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveStats {
    pub name: String,
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub movies: usize,
    pub tv_shows: usize,
    pub songs: usize,
}

/// Media rows plus one detail table per kind, all keyed by the same id.
#[derive(Clone)]
pub struct CatalogStore {
    db: Arc<Database>,
}

impl CatalogStore {
    pub fn open_db(path: &Path) -> Result<Arc<Database>, CatalogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        Ok(Arc::new(db))
    }

    pub fn open(db: Arc<Database>) -> Result<Self, CatalogError> {
        let store = Self { db };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            write_txn.open_table(MEDIA_TABLE)?;
            write_txn.open_table(MEDIA_BY_PATH_TABLE)?;
            write_txn.open_table(MOVIES_TABLE)?;
            write_txn.open_table(TV_SHOWS_TABLE)?;
            write_txn.open_table(SONGS_TABLE)?;
            write_txn.open_table(META_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Replaces the whole catalog with `records` in a single write
    /// transaction. On any error the transaction is aborted and the previous
    /// contents stay untouched.
    pub fn replace_all(&self, records: &[MediaRecord]) -> Result<CatalogStats, CatalogError> {
        let write_txn = self.db.begin_write()?;
        match write_catalog(&write_txn, records) {
            Ok(stats) => {
                write_txn.commit()?;
                info!(
                    "Catalog replaced: {} movies, {} episodes, {} songs",
                    stats.movies, stats.tv_episodes, stats.songs
                );
                Ok(stats)
            }
            Err(err) => {
                if let Err(abort_err) = write_txn.abort() {
                    warn!("Failed to abort catalog transaction: {}", abort_err);
                }
                warn!("Catalog replace rolled back: {}", err);
                Err(err)
            }
        }
    }

    pub fn len(&self) -> Result<u64, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MEDIA_TABLE)?;
        Ok(table.len()?)
    }

    pub fn is_empty(&self) -> Result<bool, CatalogError> {
        Ok(self.len()? == 0)
    }

    /// Every media row joined with its detail row, in id order.
    pub fn list(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let media_table = read_txn.open_table(MEDIA_TABLE)?;
        let movies_table = read_txn.open_table(MOVIES_TABLE)?;
        let tv_table = read_txn.open_table(TV_SHOWS_TABLE)?;
        let songs_table = read_txn.open_table(SONGS_TABLE)?;

        let mut entries = Vec::new();
        for item in media_table.iter()? {
            let (key, value) = item?;
            let id = key.value();
            let row: MediaRow = decode_value(value.value())?;

            let detail_bytes = match row.kind {
                MediaKind::Movie => movies_table.get(id)?,
                MediaKind::TvEpisode => tv_table.get(id)?,
                MediaKind::Song => songs_table.get(id)?,
            };
            let details = match detail_bytes {
                Some(bytes) => decode_details(row.kind, bytes.value())?,
                None => {
                    warn!("Media row {} ({}) has no detail row", id, row.file_path);
                    MediaDetails::Empty {}
                }
            };

            entries.push(CatalogEntry {
                id,
                kind: row.kind,
                file_path: row.file_path,
                drive_label: row.drive_label,
                size_bytes: row.size_bytes,
                extension: row.extension,
                details,
            });
        }
        Ok(entries)
    }

    pub fn list_movies(&self) -> Result<Vec<MovieDetails>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MOVIES_TABLE)?;
        let mut movies = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            movies.push(decode_value(value.value())?);
        }
        Ok(movies)
    }

    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MEDIA_TABLE)?;
        let mut stats = CatalogStats::default();
        for item in table.iter()? {
            let (_, value) = item?;
            let row: MediaRow = decode_value(value.value())?;
            stats.count(row.kind);
        }
        Ok(stats)
    }

    /// Usage grouped by drive label, sorted by name.
    pub fn drive_stats(&self) -> Result<Vec<DriveStats>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MEDIA_TABLE)?;
        let mut drives: BTreeMap<String, DriveStats> = BTreeMap::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let row: MediaRow = decode_value(value.value())?;
            let drive = drives
                .entry(row.drive_label.clone())
                .or_insert_with(|| DriveStats {
                    name: row.drive_label.clone(),
                    ..DriveStats::default()
                });
            drive.total_files += 1;
            drive.total_size_bytes = drive.total_size_bytes.saturating_add(row.size_bytes);
            match row.kind {
                MediaKind::Movie => drive.movies += 1,
                MediaKind::TvEpisode => drive.tv_shows += 1,
                MediaKind::Song => drive.songs += 1,
            }
        }
        Ok(drives.into_values().collect())
    }

    pub fn refreshed_at(&self) -> Result<Option<u64>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(META_TABLE)?;
        let value = table.get(META_REFRESHED_AT_KEY)?.map(|value| value.value());
        Ok(value)
    }
}

fn write_catalog(
    txn: &WriteTransaction,
    records: &[MediaRecord],
) -> Result<CatalogStats, CatalogError> {
    clear_table(txn, MEDIA_TABLE)?;
    clear_table(txn, MEDIA_BY_PATH_TABLE)?;
    clear_table(txn, MOVIES_TABLE)?;
    clear_table(txn, TV_SHOWS_TABLE)?;
    clear_table(txn, SONGS_TABLE)?;

    let mut media_table = txn.open_table(MEDIA_TABLE)?;
    let mut by_path_table = txn.open_table(MEDIA_BY_PATH_TABLE)?;
    let mut movies_table = txn.open_table(MOVIES_TABLE)?;
    let mut tv_table = txn.open_table(TV_SHOWS_TABLE)?;
    let mut songs_table = txn.open_table(SONGS_TABLE)?;
    let mut meta_table = txn.open_table(META_TABLE)?;

    let mut next_id = meta_table
        .get(META_NEXT_ID_KEY)?
        .map(|value| value.value())
        .unwrap_or(1);
    let mut stats = CatalogStats::default();

    for record in records {
        if record.details.kind() != Some(record.kind) {
            return Err(CatalogError::DetailsMismatch(record.display_path.clone()));
        }

        let id = next_id;
        next_id += 1;

        if by_path_table
            .insert(record.display_path.as_str(), id)?
            .is_some()
        {
            return Err(CatalogError::DuplicatePath(record.display_path.clone()));
        }

        let row = MediaRow {
            kind: record.kind,
            file_path: record.display_path.clone(),
            drive_label: record.drive_label.clone(),
            size_bytes: record.size_bytes,
            extension: record.extension.clone(),
        };
        let row_bytes = encode_value(&row)?;
        media_table.insert(id, row_bytes.as_slice())?;

        match &record.details {
            MediaDetails::Movie(details) => {
                let bytes = encode_value(details)?;
                movies_table.insert(id, bytes.as_slice())?;
            }
            MediaDetails::Tv(details) => {
                let bytes = encode_value(details)?;
                tv_table.insert(id, bytes.as_slice())?;
            }
            MediaDetails::Song(details) => {
                let bytes = encode_value(details)?;
                songs_table.insert(id, bytes.as_slice())?;
            }
            MediaDetails::Empty {} => {}
        }
        stats.count(record.kind);
    }

    meta_table.insert(META_NEXT_ID_KEY, next_id)?;
    meta_table.insert(META_REFRESHED_AT_KEY, now_secs())?;
    Ok(stats)
}

fn clear_table(txn: &WriteTransaction, table: impl TableHandle) -> Result<(), CatalogError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn decode_details(kind: MediaKind, bytes: &[u8]) -> Result<MediaDetails, CatalogError> {
    let details = match kind {
        MediaKind::Movie => MediaDetails::Movie(decode_value::<MovieDetails>(bytes)?),
        MediaKind::TvEpisode => MediaDetails::Tv(decode_value::<TvDetails>(bytes)?),
        MediaKind::Song => MediaDetails::Song(decode_value::<SongDetails>(bytes)?),
    };
    Ok(details)
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, CatalogError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CatalogError> {
    Ok(bincode::deserialize(bytes)?)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}
