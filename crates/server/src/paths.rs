use std::path::{Path, PathBuf};

use common::{join_relpath, normalize_prefix};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    OutsideRoot,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::Empty => write!(f, "path is required"),
            PathError::OutsideRoot => write!(f, "path is outside the media root"),
        }
    }
}

impl std::error::Error for PathError {}

/// Maps a public path such as `/usb/drive1/a.mp4` onto the media root.
///
/// The virtual prefix is optional in the request. `.` and `..` are resolved
/// lexically before joining; anything that climbs above the root is
/// rejected. Existence is not checked here.
pub fn resolve_virtual_path(root: &Path, prefix: &str, requested: &str) -> Result<PathBuf, PathError> {
    let requested = requested.trim();
    if requested.is_empty() {
        return Err(PathError::Empty);
    }
    if requested.contains('\0') {
        return Err(PathError::OutsideRoot);
    }

    let prefix = normalize_prefix(prefix);
    let relative = strip_virtual_prefix(requested, &prefix);
    join_relpath(root, relative).ok_or(PathError::OutsideRoot)
}

fn strip_virtual_prefix<'a>(requested: &'a str, prefix: &str) -> &'a str {
    if prefix == "/" {
        return requested;
    }
    match requested.strip_prefix(prefix) {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => rest,
        _ => requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix_and_joins() {
        let root = Path::new("/mnt/media");
        assert_eq!(
            resolve_virtual_path(root, "/usb", "/usb/drive1/Movies/Heat (1995).mkv").unwrap(),
            PathBuf::from("/mnt/media/drive1/Movies/Heat (1995).mkv")
        );
        assert_eq!(
            resolve_virtual_path(root, "/usb", "drive1/a.mp4").unwrap(),
            PathBuf::from("/mnt/media/drive1/a.mp4")
        );
        assert_eq!(
            resolve_virtual_path(root, "/usb", "/usb").unwrap(),
            PathBuf::from("/mnt/media")
        );
    }

    #[test]
    fn prefix_must_match_a_whole_segment() {
        let root = Path::new("/mnt/media");
        assert_eq!(
            resolve_virtual_path(root, "/usb", "/usbdrive/a.mp4").unwrap(),
            PathBuf::from("/mnt/media/usbdrive/a.mp4")
        );
    }

    #[test]
    fn rejects_escape_attempts() {
        let root = Path::new("/mnt/media");
        assert_eq!(
            resolve_virtual_path(root, "/usb", "/usb/../../etc/passwd"),
            Err(PathError::OutsideRoot)
        );
        assert_eq!(
            resolve_virtual_path(root, "/usb", "/usb/drive1/../../secret"),
            Err(PathError::OutsideRoot)
        );
        assert_eq!(resolve_virtual_path(root, "/usb", "  "), Err(PathError::Empty));
    }

    #[test]
    fn dot_segments_inside_root_are_fine() {
        let root = Path::new("/mnt/media");
        assert_eq!(
            resolve_virtual_path(root, "/usb", "/usb/drive1/./x/../a.mp4").unwrap(),
            PathBuf::from("/mnt/media/drive1/a.mp4")
        );
    }
}
