//! Checksum files and the per-directory checksum store.
//!
//! A checksum file holds one `<digest> *<filename>` line per file. A
//! `ChecksumStore` owns all checksum files of one directory for the duration
//! of processing that directory: it loads their entries, tracks additions and
//! removals, and rewrites every modified checksum file (sorted by file name)
//! when it is closed. Closing also happens on drop, so a store that goes out
//! of scope through an early return still persists completed work.

use crate::checksum::DIGEST_HEX_LEN;
use crate::config::{CHECKSUM_SUFFIX, ChecksumFileName, Mode};
use crate::interrupt::Interrupt;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Malformed line {line} in {path}")]
    MalformedLine { path: PathBuf, line: usize },
    #[error("Interrupted while rewriting {0}, data loss is possible")]
    Interrupted(PathBuf),
}

impl StoreError {
    fn from_io(path: &Path, e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::PermissionDenied {
            StoreError::PermissionDenied(path.to_path_buf())
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    /// Lower case hex.
    pub digest: String,
    /// Checksum file the entry was read from or will be written to.
    pub source: PathBuf,
}

/// Splits a checksum file line into digest and file name.
///
/// The digest occupies the first 32 characters and is followed by a two
/// character separator: ` *` for binary mode or two spaces for text mode.
/// Returns `None` for lines that do not follow that layout.
pub fn parse_line(line: &str) -> Option<(String, &str)> {
    let digest = line.get(..DIGEST_HEX_LEN)?;
    if !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let rest = &line[DIGEST_HEX_LEN..];
    let name = rest
        .strip_prefix(" *")
        .or_else(|| rest.strip_prefix("  "))?;
    if name.is_empty() {
        return None;
    }
    Some((digest.to_ascii_lowercase(), name))
}

/// Formats one checksum file line, including the trailing newline.
pub fn format_line(digest: &str, name: &str) -> String {
    format!("{digest} *{name}\n")
}

/// What happened to the checksum files when a store was closed.
#[derive(Debug, Default)]
pub struct CloseReport {
    pub rewritten: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    /// Failures that affected a single checksum file; other files were still written.
    pub errors: Vec<StoreError>,
}

pub struct ChecksumStore {
    dir: PathBuf,
    mode: Mode,
    layout: ChecksumFileName,
    interrupt: Interrupt,
    /// Modification time of every checksum file present at open.
    mtimes: BTreeMap<PathBuf, SystemTime>,
    entries: BTreeMap<String, ChecksumEntry>,
    modified: BTreeSet<PathBuf>,
    /// Dead entries removed during this session, by checksum file.
    removed: BTreeMap<PathBuf, Vec<String>>,
    /// Checksum files written to during this session.
    written: BTreeSet<PathBuf>,
    /// Shared append handle when all entries go into one checksum file.
    writer: Option<BufWriter<File>>,
    closed: bool,
}

impl ChecksumStore {
    /// Opens the store for `dir`, whose existing checksum files are `checksum_files`.
    ///
    /// Modification times are captured for every checksum file. Entries are
    /// loaded unless `mode` is create. Problems reading one checksum file are
    /// returned next to the store; the entries of that file are simply absent.
    pub fn open(
        dir: &Path,
        checksum_files: &[String],
        mode: Mode,
        layout: ChecksumFileName,
        interrupt: Interrupt,
    ) -> (Self, Vec<StoreError>) {
        let mut store = ChecksumStore {
            dir: dir.to_path_buf(),
            mode,
            layout,
            interrupt,
            mtimes: BTreeMap::new(),
            entries: BTreeMap::new(),
            modified: BTreeSet::new(),
            removed: BTreeMap::new(),
            written: BTreeSet::new(),
            writer: None,
            closed: false,
        };
        let mut problems = Vec::new();

        for name in checksum_files {
            let path = dir.join(name);
            match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(mtime) => {
                    store.mtimes.insert(path.clone(), mtime);
                }
                Err(e) => {
                    let e = StoreError::from_io(&path, e);
                    error!("Could not read checksum file: {e}");
                    problems.push(e);
                    continue;
                }
            }

            if mode == Mode::Create {
                continue;
            }

            if let Err(e) = store.load(&path, &mut problems) {
                error!("Could not read checksum file: {e}");
                problems.push(e);
            }
        }

        (store, problems)
    }

    fn load(&mut self, path: &Path, problems: &mut Vec<StoreError>) -> Result<(), StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| StoreError::from_io(path, e))?;

        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Some((digest, name)) => {
                    self.entries.insert(
                        name.to_string(),
                        ChecksumEntry {
                            digest,
                            source: path.to_path_buf(),
                        },
                    );
                }
                None => {
                    let e = StoreError::MalformedLine {
                        path: path.to_path_buf(),
                        line: index + 1,
                    };
                    warn!("{e}");
                    problems.push(e);
                }
            }
        }

        debug!("Loaded {} entries from {}", self.entries.len(), path.display());
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All entries currently known, by file name.
    pub fn entries(&self) -> &BTreeMap<String, ChecksumEntry> {
        &self.entries
    }

    /// True once anything was recorded or removed during this session.
    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    /// True if the file is older than the checksum file that lists it, so its
    /// stored digest can be trusted without hashing it again.
    ///
    /// Returns false when the file is not listed or any modification time is
    /// unavailable.
    pub fn is_fresh(&self, name: &str) -> bool {
        let Some(entry) = self.entries.get(name) else {
            return false;
        };
        let Some(checksum_mtime) = self.mtimes.get(&entry.source) else {
            return false;
        };
        let Ok(file_mtime) = std::fs::metadata(self.dir.join(name)).and_then(|m| m.modified())
        else {
            return false;
        };

        let fresh = file_mtime < *checksum_mtime;
        debug!(
            "{} modified {}, checksum file {} modified {}: {}",
            name,
            format_mtime(file_mtime),
            entry.source.display(),
            format_mtime(*checksum_mtime),
            if fresh { "trusted" } else { "needs hashing" }
        );
        fresh
    }

    /// Compares `digest` with the stored entry. `None` if `name` is not listed.
    pub fn verify(&self, name: &str, digest: &str) -> Option<bool> {
        self.entries.get(name).map(|entry| entry.digest == digest)
    }

    /// Records a freshly computed digest, adding or replacing the entry.
    ///
    /// The line is written immediately: into `<name>.md5` when every file has
    /// its own checksum file, otherwise into the directory's shared checksum
    /// file. Files are appended to in update mode and truncated otherwise.
    pub fn record_hash(&mut self, name: &str, digest: &str) -> Result<(), StoreError> {
        let line = format_line(digest, name);

        let path = self.target_path(name);

        if self.layout.is_all() {
            let mut file = self
                .open_for_writing(&path)
                .map_err(|e| StoreError::from_io(&path, e))?;
            file.write_all(line.as_bytes())
                .map_err(|e| StoreError::from_io(&path, e))?;
        } else {
            if self.writer.is_none() {
                let file = self
                    .open_for_writing(&path)
                    .map_err(|e| StoreError::from_io(&path, e))?;
                self.writer = Some(BufWriter::new(file));
            }
            if let Some(writer) = self.writer.as_mut() {
                writer
                    .write_all(line.as_bytes())
                    .map_err(|e| StoreError::from_io(&path, e))?;
            }
        }

        let previous = self.entries.insert(
            name.to_string(),
            ChecksumEntry {
                digest: digest.to_string(),
                source: path.clone(),
            },
        );
        // An entry that moves to another checksum file must disappear from the old one.
        if let Some(previous) = previous
            && previous.source != path
        {
            self.modified.insert(previous.source);
        }
        self.written.insert(path.clone());
        self.modified.insert(path);
        Ok(())
    }

    /// Checksum file that receives the entry for `name`.
    fn target_path(&self, name: &str) -> PathBuf {
        match &self.layout {
            ChecksumFileName::All => self.dir.join(format!("{name}{CHECKSUM_SUFFIX}")),
            ChecksumFileName::Fixed(filename) => self.dir.join(filename),
        }
    }

    fn open_for_writing(&self, path: &Path) -> std::io::Result<File> {
        if self.mode == Mode::Update {
            OpenOptions::new().create(true).append(true).open(path)
        } else {
            File::create(path)
        }
    }

    /// Drops the entry of a file that no longer exists. The owning checksum
    /// file is rewritten without it on close.
    pub fn remove_entry(&mut self, name: &str) {
        if let Some(entry) = self.entries.remove(name) {
            self.removed
                .entry(entry.source.clone())
                .or_default()
                .push(name.to_string());
            self.modified.insert(entry.source);
        }
    }

    /// Deletes every checksum file of the directory, both those present at
    /// open and those written since. Nothing is rewritten on close afterwards.
    pub fn delete_all(&mut self) -> Result<Vec<PathBuf>, StoreError> {
        self.writer = None;
        self.modified.clear();
        self.entries.clear();

        let paths: BTreeSet<PathBuf> = self
            .mtimes
            .keys()
            .chain(self.written.iter())
            .cloned()
            .collect();
        self.written.clear();

        let mut deleted = Vec::new();
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => deleted.push(path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::from_io(&path, e)),
            }
        }
        Ok(deleted)
    }

    /// Flushes pending writes and rewrites every modified checksum file.
    ///
    /// A checksum file that ends up without entries is deleted. Failures on
    /// one checksum file are collected in the report; an interrupt that
    /// arrives while rewriting stops the close with `StoreError::Interrupted`.
    pub fn close(mut self) -> Result<CloseReport, StoreError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<CloseReport, StoreError> {
        self.closed = true;
        let mut report = CloseReport::default();

        if let Some(mut writer) = self.writer.take()
            && let Err(e) = writer.flush()
        {
            let e = StoreError::from_io(&self.dir, e);
            error!("Could not write to checksum file: {e}");
            report.errors.push(e);
        }

        for (path, names) in &self.removed {
            info!(
                "Removing {} dead entries from {}",
                names.len(),
                path.display()
            );
        }

        // Interrupts that arrived before closing are handled by the caller;
        // the completed work is still persisted.
        let interrupted_before = self.interrupt.is_triggered();
        let modified = std::mem::take(&mut self.modified);

        for path in modified {
            if !interrupted_before && self.interrupt.is_triggered() {
                let e = StoreError::Interrupted(path);
                error!("WARNING! {e}");
                return Err(e);
            }

            let names: Vec<&String> = self
                .entries
                .iter()
                .filter(|(_, entry)| !self.layout.is_all() || entry.source == path)
                .map(|(name, _)| name)
                .collect();

            if names.is_empty() {
                match std::fs::remove_file(&path) {
                    Ok(()) => report.deleted.push(path),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        let e = StoreError::from_io(&path, e);
                        error!("Could not delete checksum file: {e}");
                        report.errors.push(e);
                    }
                }
                continue;
            }

            let content: String = names
                .iter()
                .map(|name| format_line(&self.entries[*name].digest, name))
                .collect();

            match save_atomically(&path, &content) {
                Ok(()) => {
                    debug!("Rewrote {} with {} entries", path.display(), names.len());
                    report.rewritten.push(path);
                }
                Err(e) => {
                    error!("Could not write to checksum file: {e}");
                    report.errors.push(e);
                }
            }
        }

        Ok(report)
    }
}

impl Drop for ChecksumStore {
    fn drop(&mut self) {
        if !self.closed
            && let Err(e) = self.finish()
        {
            error!("Closing checksum store for {} failed: {e}", self.dir.display());
        }
    }
}

/// Replaces `path` with `content` through a fsynced temporary file in the
/// same directory. Permissions of an existing file are kept.
fn save_atomically(path: &Path, content: &str) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or(Path::new("."));

    let mut temp_file =
        tempfile::NamedTempFile::new_in(parent).map_err(|e| StoreError::from_io(parent, e))?;

    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| StoreError::from_io(path, e))?;

    if let Ok(metadata) = std::fs::metadata(path) {
        std::fs::set_permissions(temp_file.path(), metadata.permissions())
            .map_err(|e| StoreError::from_io(path, e))?;
    }

    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| StoreError::from_io(path, e))?;

    temp_file
        .persist(path)
        .map_err(|e| StoreError::from_io(path, e.error))?;

    Ok(())
}

fn format_mtime(mtime: SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Local> = mtime.into();
    datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests;
