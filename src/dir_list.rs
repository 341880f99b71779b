//! Non-recursive directory listing.
//!
//! Lists the immediate children of one directory and partitions them into
//! subdirectories and regular files, applying the hidden-entry and symlink
//! filters. The recursive walk built on top of this lives in `scan`.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum DirListError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
}

impl DirListError {
    fn from_io(path: &Path, e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::PermissionDenied {
            DirListError::PermissionDenied(path.to_path_buf())
        } else {
            DirListError::Io(e)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Include entries whose name starts with a dot.
    pub include_hidden: bool,
    /// Classify symlinks by their target instead of skipping them.
    pub follow_symlinks: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DirListing {
    /// Subdirectory names, sorted.
    pub dirs: Vec<String>,
    /// Regular file names mapped to their size in bytes.
    pub files: BTreeMap<String, u64>,
}

/// Lists `dir` and sorts its children into subdirectories and files.
///
/// Entries that are neither directories nor regular files (sockets, fifos,
/// dangling symlinks when following links) are left out, as are names that
/// are not valid UTF-8, since they cannot be represented in a checksum file.
pub fn list_directory(dir: &Path, options: ListOptions) -> Result<DirListing, DirListError> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| DirListError::from_io(dir, e))?;

    let mut listing = DirListing::default();

    for entry in read_dir {
        let entry = entry.map_err(DirListError::Io)?;
        let path = entry.path();

        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!("Skipping entry with non UTF-8 name: {}", Path::new(&raw).display());
                continue;
            }
        };

        if name.starts_with('.') && !options.include_hidden {
            continue;
        }

        let link_metadata =
            std::fs::symlink_metadata(&path).map_err(|e| DirListError::from_io(&path, e))?;

        let metadata = if link_metadata.file_type().is_symlink() {
            if !options.follow_symlinks {
                debug!("Ignoring symlink {}", path.display());
                continue;
            }
            match std::fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Ignoring unresolvable symlink {}: {}", path.display(), e);
                    continue;
                }
            }
        } else {
            link_metadata
        };

        if metadata.is_dir() {
            listing.dirs.push(name);
        } else if metadata.is_file() {
            listing.files.insert(name, metadata.len());
        }
    }

    listing.dirs.sort();

    Ok(listing)
}
