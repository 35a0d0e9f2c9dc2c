use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    #[serde(rename = "tv_show")]
    TvEpisode,
    Song,
}

impl MediaKind {
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::TvEpisode => "tv_show",
            MediaKind::Song => "song",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieDetails {
    pub title: String,
    pub release_year: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TvDetails {
    pub show_title: String,
    pub release_year: Option<i32>,
    pub season: i32,
    pub episode: i32,
    pub episode_title: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongDetails {
    pub artist: String,
    pub album: String,
    pub release_year: Option<i32>,
    pub song_title: String,
}

/// Type-specific part of a catalog entry.
///
/// Serialized without a tag: the surrounding `kind` field says which shape
/// the object has. `Empty` renders as `{}` and only shows up when a stored
/// media row has lost its detail row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaDetails {
    Movie(MovieDetails),
    Tv(TvDetails),
    Song(SongDetails),
    Empty {},
}

impl MediaDetails {
    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            MediaDetails::Movie(_) => Some(MediaKind::Movie),
            MediaDetails::Tv(_) => Some(MediaKind::TvEpisode),
            MediaDetails::Song(_) => Some(MediaKind::Song),
            MediaDetails::Empty {} => None,
        }
    }
}

/// A classified file produced by one walk of the media root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub kind: MediaKind,
    pub display_path: String,
    pub drive_label: String,
    pub size_bytes: u64,
    pub extension: String,
    pub details: MediaDetails,
}

/// A persisted catalog row joined with its detail row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    pub kind: MediaKind,
    pub file_path: String,
    pub drive_label: String,
    pub size_bytes: u64,
    pub extension: String,
    pub details: MediaDetails,
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

/// Rewrites an absolute path under `root` into its portable form under the
/// virtual prefix, e.g. `/mnt/media/drive1/a.mp4` -> `/usb/drive1/a.mp4`.
pub fn virtual_path(prefix: &str, root: &Path, path: &Path) -> Option<String> {
    let rel = relpath_from(root, path)?;
    let prefix = normalize_prefix(prefix);
    if rel.is_empty() {
        return Some(prefix);
    }
    if prefix == "/" {
        Some(format!("/{}", rel))
    } else {
        Some(format!("{}/{}", prefix, rel))
    }
}

/// Leading slash, no trailing slash (except for the bare root).
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Joins `relpath` under `root` after resolving `.` and `..` lexically.
/// Returns `None` when the path would climb above `root`.
pub fn join_relpath(root: &Path, relpath: &str) -> Option<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(relpath).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    let mut out = PathBuf::from(root);
    for part in parts {
        out.push(part);
    }
    Some(out)
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_path_rewrites_root() {
        let root = Path::new("/mnt/media");
        let path = Path::new("/mnt/media/drive1/Movies/Inception (2010).mp4");
        assert_eq!(
            virtual_path("/usb", root, path).as_deref(),
            Some("/usb/drive1/Movies/Inception (2010).mp4")
        );
        assert_eq!(
            virtual_path("usb/", root, path).as_deref(),
            Some("/usb/drive1/Movies/Inception (2010).mp4")
        );
        assert_eq!(virtual_path("/usb", root, Path::new("/elsewhere/a.mp4")), None);
    }

    #[test]
    fn join_relpath_rejects_escape() {
        let root = Path::new("/mnt/media");
        assert_eq!(
            join_relpath(root, "drive1/./a/../b.mp4"),
            Some(PathBuf::from("/mnt/media/drive1/b.mp4"))
        );
        assert_eq!(join_relpath(root, "../etc/passwd"), None);
        assert_eq!(join_relpath(root, "drive1/../../etc"), None);
        assert_eq!(join_relpath(root, "/drive1"), Some(PathBuf::from("/mnt/media/drive1")));
    }

    #[test]
    fn details_serialize_without_tag() {
        let details = MediaDetails::Movie(MovieDetails {
            title: "Inception".to_string(),
            release_year: Some(2010),
        });
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["title"], "Inception");
        assert_eq!(json["release_year"], 2010);

        let empty = serde_json::to_string(&MediaDetails::Empty {}).unwrap();
        assert_eq!(empty, "{}");
        assert_eq!(serde_json::to_string(&MediaKind::TvEpisode).unwrap(), "\"tv_show\"");
    }
}
