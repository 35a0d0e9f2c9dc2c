use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use common::{virtual_path, MediaRecord};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::classify::{classify_file_name, split_extension};

#[derive(Clone, Debug)]
pub struct IndexOptions {
    /// Public prefix that replaces the media root in stored paths.
    pub virtual_prefix: String,
    pub follow_links: bool,
    pub timeout: Option<Duration>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            virtual_prefix: "/usb".to_string(),
            follow_links: false,
            timeout: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct IndexReport {
    pub records: Vec<MediaRecord>,
    pub files_seen: usize,
    pub skipped_entries: usize,
    /// False when the root itself could not be listed. The walk still
    /// "succeeds" with no records in that case.
    pub root_readable: bool,
}

#[derive(Debug)]
pub enum IndexError {
    DeadlineExceeded { elapsed: Duration },
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::DeadlineExceeded { elapsed } => {
                write!(f, "media walk exceeded its deadline after {:?}", elapsed)
            }
        }
    }
}

impl std::error::Error for IndexError {}

/// Walks `root` and returns every file that classifies as a movie, episode
/// or song. Unreadable entries are logged and skipped.
pub fn index_media(root: &Path, options: &IndexOptions) -> Result<IndexReport, IndexError> {
    let started = Instant::now();
    let mut report = IndexReport {
        root_readable: true,
        ..IndexReport::default()
    };
    let real_root = if options.follow_links {
        None
    } else {
        fs::canonicalize(root).ok()
    };

    for entry in WalkDir::new(root).follow_links(options.follow_links) {
        if let Some(timeout) = options.timeout {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(IndexError::DeadlineExceeded { elapsed });
            }
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.depth() == 0 {
                    report.root_readable = false;
                    warn!("Media root {:?} is not readable: {}", root, err);
                } else {
                    warn!("Skipping unreadable entry: {}", err);
                }
                report.skipped_entries += 1;
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let file_name = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name,
            None => {
                debug!("Skipping non UTF-8 file name {:?}", path);
                continue;
            }
        };

        if let Some(real_root) = &real_root {
            if entry.path_is_symlink() && !link_stays_inside(path, real_root) {
                warn!("Skipping link that leaves the media root: {:?}", path);
                report.skipped_entries += 1;
                continue;
            }
        }

        // Symlinks are resolved here so a link to a file reports the
        // target's size; links to directories fall out as non-files.
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("Failed to stat {:?}: {}", path, err);
                report.skipped_entries += 1;
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        report.files_seen += 1;

        let details = match classify_file_name(file_name) {
            Some(details) => details,
            None => {
                debug!("Unclassified file {:?}", path);
                continue;
            }
        };
        let kind = match details.kind() {
            Some(kind) => kind,
            None => continue,
        };

        let display_path = match virtual_path(&options.virtual_prefix, root, path) {
            Some(display_path) => display_path,
            None => {
                warn!("File {:?} is outside media root {:?}", path, root);
                report.skipped_entries += 1;
                continue;
            }
        };
        let drive_label = path
            .parent()
            .and_then(|parent| parent.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let (_, extension) = split_extension(file_name);

        report.records.push(MediaRecord {
            kind,
            display_path,
            drive_label,
            size_bytes: metadata.len(),
            extension,
            details,
        });
    }

    info!(
        "Indexed {} media files out of {} files under {:?} ({} skipped) in {:?}",
        report.records.len(),
        report.files_seen,
        root,
        report.skipped_entries,
        started.elapsed()
    );
    Ok(report)
}

/// Dangling links count as inside; the stat that follows reports them.
fn link_stays_inside(path: &Path, real_root: &Path) -> bool {
    match fs::canonicalize(path) {
        Ok(target) => target.starts_with(real_root),
        Err(_) => true,
    }
}
