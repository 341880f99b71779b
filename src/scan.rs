//! Recursive tree scanner.
//!
//! Walks every root once, up front, and produces the ordered list of
//! directories that will be processed. A directory is eligible when it holds
//! at least one plain (non checksum) file and either has no subdirectories or
//! `--force` is given. The skip and limit counters are global across all roots.

use crate::config::{ChecksumFileName, RunOptions, has_checksum_suffix};
use crate::dir_list::{DirListError, ListOptions, list_directory};
use crate::interrupt::Interrupt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One eligible directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTask {
    /// Absolute path of the directory.
    pub path: PathBuf,
    /// Plain file names, sorted, checksum files excluded.
    pub files: Vec<String>,
    /// Checksum file names present in the directory, sorted.
    pub checksum_files: Vec<String>,
    /// Summed size of `files` in bytes.
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanWarning {
    RootNotFound(PathBuf),
    NotADirectory(PathBuf),
    Unreadable { path: PathBuf, message: String },
    SymlinkLoop(PathBuf),
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanWarning::RootNotFound(path) => write!(f, "does not exist: '{}'", path.display()),
            ScanWarning::NotADirectory(path) => {
                write!(f, "not a directory: '{}'", path.display())
            }
            ScanWarning::Unreadable { path, message } => {
                write!(f, "cannot list '{}': {}", path.display(), message)
            }
            ScanWarning::SymlinkLoop(path) => {
                write!(f, "symlink loop, not descending into '{}'", path.display())
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub tasks: Vec<DirectoryTask>,
    /// Bytes to hash across all tasks.
    pub total_size: u64,
    pub warnings: Vec<ScanWarning>,
    /// The walk stopped early because the interrupt flag was raised.
    pub interrupted: bool,
}

/// Scans all `roots` in the given order and collects the directory tasks.
///
/// Subdirectories are visited in sorted name order, so tasks come out in
/// sorted path order within each root. Problems with a root or a
/// subdirectory are returned as warnings and never abort the scan. The
/// interrupt flag is checked before every directory; once it is raised the
/// walk stops and the result is marked as interrupted.
pub fn scan_tree(roots: &[PathBuf], options: &RunOptions, interrupt: &Interrupt) -> ScanResult {
    let mut scanner = Scanner {
        options,
        interrupt,
        list_options: ListOptions {
            include_hidden: options.include_hidden,
            follow_symlinks: options.follow_symlinks,
        },
        skip: options.skip,
        limit: options.limit,
        ancestors: Vec::new(),
        result: ScanResult::default(),
    };

    for root in roots {
        if scanner.result.interrupted {
            break;
        }
        scanner.scan_root(root);
    }

    scanner.result
}

struct Scanner<'a> {
    options: &'a RunOptions,
    interrupt: &'a Interrupt,
    list_options: ListOptions,
    skip: usize,
    limit: Option<usize>,
    /// Canonical paths on the current descent, only tracked when following symlinks.
    ancestors: Vec<PathBuf>,
    result: ScanResult,
}

impl Scanner<'_> {
    fn scan_root(&mut self, root: &Path) {
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());

        if !root.exists() {
            self.warn(ScanWarning::RootNotFound(root));
            return;
        }
        if !root.is_dir() {
            self.warn(ScanWarning::NotADirectory(root));
            return;
        }

        let size = self.walk(&root);
        self.result.total_size += size;
    }

    /// Returns the size of all files queued for hashing at or below `dir`.
    fn walk(&mut self, dir: &Path) -> u64 {
        let canonical = if self.options.follow_symlinks {
            match dir.canonicalize() {
                Ok(canonical) if self.ancestors.contains(&canonical) => {
                    self.warn(ScanWarning::SymlinkLoop(dir.to_path_buf()));
                    return 0;
                }
                Ok(canonical) => Some(canonical),
                Err(_) => None,
            }
        } else {
            None
        };

        match canonical {
            Some(canonical) => {
                self.ancestors.push(canonical);
                let size = self.walk_listed(dir);
                self.ancestors.pop();
                size
            }
            None => self.walk_listed(dir),
        }
    }

    fn walk_listed(&mut self, dir: &Path) -> u64 {
        if self.interrupt.is_triggered() {
            self.result.interrupted = true;
            return 0;
        }

        let listing = match list_directory(dir, self.list_options) {
            Ok(listing) => listing,
            Err(e) => {
                let message = match &e {
                    DirListError::Io(io) => io.to_string(),
                    DirListError::PermissionDenied(_) => "Permission denied".to_string(),
                };
                self.warn(ScanWarning::Unreadable {
                    path: dir.to_path_buf(),
                    message,
                });
                return 0;
            }
        };

        let mut files = listing.files;
        let checksum_files: Vec<String> = match &self.options.checksum_file {
            ChecksumFileName::All => files
                .keys()
                .filter(|name| has_checksum_suffix(name))
                .cloned()
                .collect(),
            ChecksumFileName::Fixed(name) if files.contains_key(name) => vec![name.clone()],
            ChecksumFileName::Fixed(_) => Vec::new(),
        };
        for name in &checksum_files {
            files.remove(name);
        }

        let mut total = 0;

        if !files.is_empty() && (listing.dirs.is_empty() || self.options.force) {
            if self.skip == 0 && self.limit != Some(0) {
                let size: u64 = files.values().sum();
                total += size;
                debug!("Queueing {} ({} files)", dir.display(), files.len());
                self.result.tasks.push(DirectoryTask {
                    path: dir.to_path_buf(),
                    files: files.into_keys().collect(),
                    checksum_files,
                    size,
                });
                if let Some(limit) = self.limit.as_mut() {
                    *limit -= 1;
                }
            } else if self.skip > 0 {
                debug!("Skipping {}", dir.display());
                self.skip -= 1;
            }
        }

        for name in &listing.dirs {
            if self.limit == Some(0) || self.result.interrupted {
                return total;
            }
            total += self.walk(&dir.join(name));
        }

        total
    }

    fn warn(&mut self, warning: ScanWarning) {
        warn!("{warning}");
        self.result.warnings.push(warning);
    }
}
