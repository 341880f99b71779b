//! Processing of a single directory.
//!
//! `process_directory` reconciles the files of one `DirectoryTask` with the
//! entries of its checksum files according to the run mode, hashing files as
//! needed and updating the checksum store. Everything that goes wrong with a
//! single file or checksum file is recorded in the returned report; only an
//! operator abort or an interrupt stops the run, and both are reported as a
//! `DirectoryOutcome` rather than an error.

use crate::checksum::{ChecksumError, checksum_file};
use crate::checksum_file::{ChecksumEntry, ChecksumStore, StoreError};
use crate::config::{Mode, RunOptions};
use crate::interrupt::Interrupt;
use crate::prompt::{Interaction, OverwriteAnswer};
use crate::scan::DirectoryTask;
use crate::summary::format_size;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Per-directory tallies, summed into the run totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub hashed_files: usize,
    pub bytes_hashed: u64,
    pub passes: usize,
    pub fails: usize,
    /// Listed in a checksum file but not present on disk.
    pub files_missing: usize,
    /// Present on disk and listed in a checksum file.
    pub listed: usize,
    /// Present on disk but not listed (check and paths mode).
    pub not_listed: usize,
    /// New files hashed in update mode.
    pub added: usize,
    /// Listed files whose digest changed in update mode.
    pub updated: usize,
    /// Dead entries pruned with `--delete`.
    pub dead_entries_removed: usize,
    pub read_errors: usize,
    /// Checksum files that could not be read, written or deleted.
    pub checksum_file_errors: usize,
}

impl Counters {
    pub fn absorb(&mut self, other: &Counters) {
        self.hashed_files += other.hashed_files;
        self.bytes_hashed += other.bytes_hashed;
        self.passes += other.passes;
        self.fails += other.fails;
        self.files_missing += other.files_missing;
        self.listed += other.listed;
        self.not_listed += other.not_listed;
        self.added += other.added;
        self.updated += other.updated;
        self.dead_entries_removed += other.dead_entries_removed;
        self.read_errors += other.read_errors;
        self.checksum_file_errors += other.checksum_file_errors;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    Missing { path: PathBuf, listed_in: PathBuf },
    NotListed { path: PathBuf },
    Mismatch { path: PathBuf, listed_in: PathBuf },
    ReadError { path: PathBuf, message: String },
    ChecksumFileError { message: String },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Missing { path, listed_in } => write!(
                f,
                ">> file does not exist: '{}' (listed in '{}')",
                path.display(),
                listed_in.display()
            ),
            Finding::NotListed { path } => {
                write!(f, ">> not in any checksum file: '{}'", path.display())
            }
            Finding::Mismatch { path, listed_in } => write!(
                f,
                ">> checksum error: '{}' (listed in '{}')",
                path.display(),
                listed_in.display()
            ),
            Finding::ReadError { path, message } => {
                write!(f, "Could not read '{}': {}", path.display(), message)
            }
            Finding::ChecksumFileError { message } => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryOutcome {
    Processed,
    /// Check or paths mode and no checksum file to check against.
    NoChecksumFile,
    /// Create mode and the operator chose not to overwrite.
    SkippedOverwrite,
    /// The operator chose to abort the run.
    Aborted,
    Interrupted,
}

impl DirectoryOutcome {
    /// True if no further directories should be processed.
    pub fn stops_run(self) -> bool {
        matches!(self, DirectoryOutcome::Aborted | DirectoryOutcome::Interrupted)
    }
}

#[derive(Debug)]
pub struct DirectoryReport {
    pub outcome: DirectoryOutcome,
    pub counters: Counters,
    pub findings: Vec<Finding>,
}

impl DirectoryReport {
    fn new(outcome: DirectoryOutcome) -> Self {
        DirectoryReport {
            outcome,
            counters: Counters::default(),
            findings: Vec::new(),
        }
    }
}

/// Answers to the overwrite question that apply to all later directories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverwriteLatch {
    pub overwrite_all: bool,
    pub skip_all: bool,
}

enum OverwriteDecision {
    Proceed,
    Skip,
    Abort,
}

impl OverwriteLatch {
    fn decide(&mut self, dir: &Path, interaction: &mut dyn Interaction) -> OverwriteDecision {
        if self.skip_all {
            return OverwriteDecision::Skip;
        }
        if self.overwrite_all {
            return OverwriteDecision::Proceed;
        }
        match interaction.overwrite_decision(dir) {
            OverwriteAnswer::Overwrite => OverwriteDecision::Proceed,
            OverwriteAnswer::OverwriteAll => {
                self.overwrite_all = true;
                OverwriteDecision::Proceed
            }
            OverwriteAnswer::Skip => OverwriteDecision::Skip,
            OverwriteAnswer::SkipAll => {
                self.skip_all = true;
                OverwriteDecision::Skip
            }
            OverwriteAnswer::Abort => OverwriteDecision::Abort,
        }
    }
}

/// Raised from the reconciliation loop when the interrupt flag is seen.
struct Interrupted;

/// Processes one directory task.
///
/// # Behavior
///
/// - Check and paths mode without any checksum file: nothing is hashed, the
///   outcome is `NoChecksumFile`.
/// - Create mode with an existing checksum file: the overwrite latch or the
///   operator decides whether to proceed, skip, or abort the run. An
///   interrupt raised meanwhile wins over the answer.
/// - Otherwise the checksum store is opened, every candidate file is
///   reconciled, and the store is closed. The store is closed on every path,
///   including interruption. An interrupted create first offers to delete
///   the incomplete checksum file.
pub fn process_directory(
    task: &DirectoryTask,
    options: &RunOptions,
    latch: &mut OverwriteLatch,
    interaction: &mut dyn Interaction,
    interrupt: &Interrupt,
) -> DirectoryReport {
    if options.mode.is_read_only() && task.checksum_files.is_empty() {
        if !options.no_missing_checksums {
            warn!("No checksum file: '{}'", task.path.display());
        }
        return DirectoryReport::new(DirectoryOutcome::NoChecksumFile);
    }

    if options.mode == Mode::Create && !task.checksum_files.is_empty() {
        let decision = latch.decide(&task.path, interaction);
        // Ctrl-C while the question was pending.
        if interrupt.is_triggered() {
            return DirectoryReport::new(DirectoryOutcome::Interrupted);
        }
        match decision {
            OverwriteDecision::Proceed => {}
            OverwriteDecision::Skip => {
                info!("Skipping overwrite in {}", task.path.display());
                return DirectoryReport::new(DirectoryOutcome::SkippedOverwrite);
            }
            OverwriteDecision::Abort => return DirectoryReport::new(DirectoryOutcome::Aborted),
        }
    }

    info!(
        "Processing {} files in {} ({})",
        task.files.len(),
        task.path.display(),
        format_size(task.size)
    );

    let (mut store, problems) = ChecksumStore::open(
        &task.path,
        &task.checksum_files,
        options.mode,
        options.checksum_file.clone(),
        interrupt.clone(),
    );

    let mut reconciler = Reconciler {
        task,
        options,
        interrupt,
        report: DirectoryReport::new(DirectoryOutcome::Processed),
    };
    for problem in problems {
        reconciler.checksum_file_error(problem);
    }

    if reconciler.reconcile(&mut store).is_err() {
        reconciler.report.outcome = DirectoryOutcome::Interrupted;
        if options.mode == Mode::Create
            && store.is_modified()
            && interaction.confirm_delete_incomplete(store.dir())
        {
            match store.delete_all() {
                Ok(deleted) => {
                    for path in deleted {
                        warn!("Deleted incomplete checksum file {}", path.display());
                    }
                }
                Err(e) => {
                    error!("Could not delete checksum file: {e}");
                    reconciler.checksum_file_error(e);
                }
            }
        }
    }

    match store.close() {
        Ok(close) => {
            for path in &close.deleted {
                info!("Deleted checksum file without entries: {}", path.display());
            }
            debug!(
                "Rewrote {} checksum files in {}",
                close.rewritten.len(),
                task.path.display()
            );
            for e in close.errors {
                reconciler.checksum_file_error(e);
            }
        }
        Err(e) => {
            reconciler.checksum_file_error(e);
            reconciler.report.outcome = DirectoryOutcome::Interrupted;
        }
    }

    reconciler.report
}

struct Reconciler<'a> {
    task: &'a DirectoryTask,
    options: &'a RunOptions,
    interrupt: &'a Interrupt,
    report: DirectoryReport,
}

impl Reconciler<'_> {
    fn reconcile(&mut self, store: &mut ChecksumStore) -> Result<(), Interrupted> {
        let mode = self.options.mode;

        // Create mode starts from scratch; the other modes also look at every
        // listed name, so that files that disappeared are noticed.
        let candidates: Vec<String> = if mode == Mode::Create {
            self.task.files.clone()
        } else {
            self.task
                .files
                .iter()
                .chain(store.entries().keys())
                .cloned()
                .collect::<BTreeSet<String>>()
                .into_iter()
                .collect()
        };

        for name in candidates {
            if self.interrupt.is_triggered() {
                return Err(Interrupted);
            }

            let path = self.task.path.join(&name);
            let listed = store.entries().get(&name).cloned();

            if !path.is_file() {
                match listed {
                    Some(entry) => self.missing(store, &name, entry),
                    None => self.read_error(&path, "file vanished during processing".to_string()),
                }
                continue;
            }

            match (mode, listed) {
                (Mode::Create, _) => {
                    if let Some(digest) = self.hash(&path)? {
                        self.record(store, &name, &digest);
                    }
                }
                (Mode::Update, None) => {
                    if let Some(digest) = self.hash(&path)? {
                        self.report.counters.added += 1;
                        info!("Adding {}", path.display());
                        self.record(store, &name, &digest);
                    }
                }
                (Mode::Update, Some(entry)) => {
                    self.report.counters.listed += 1;
                    if store.is_fresh(&name) {
                        continue;
                    }
                    if let Some(digest) = self.hash(&path)? {
                        if digest != entry.digest {
                            self.report.counters.updated += 1;
                            info!("Updating checksum of {}", path.display());
                        }
                        self.record(store, &name, &digest);
                    }
                }
                (Mode::Check | Mode::Paths, None) => {
                    self.report.counters.not_listed += 1;
                    self.finding(Finding::NotListed { path });
                }
                (Mode::Paths, Some(_)) => {
                    self.report.counters.listed += 1;
                }
                (Mode::Check, Some(entry)) => {
                    self.report.counters.listed += 1;
                    let Some(digest) = self.hash(&path)? else {
                        continue;
                    };
                    if store.verify(&name, &digest) == Some(true) {
                        self.report.counters.passes += 1;
                    } else {
                        self.report.counters.fails += 1;
                        self.finding(Finding::Mismatch {
                            path,
                            listed_in: entry.source,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// A listed file does not exist. Update mode also prunes its entry.
    fn missing(&mut self, store: &mut ChecksumStore, name: &str, entry: ChecksumEntry) {
        let path = self.task.path.join(name);

        if self.options.mode == Mode::Update {
            store.remove_entry(name);
            if self.options.delete_dead_entries {
                info!("Removing entry of deleted file {}", path.display());
                self.report.counters.dead_entries_removed += 1;
                return;
            }
        }

        self.report.counters.files_missing += 1;
        self.finding(Finding::Missing {
            path,
            listed_in: entry.source,
        });
    }

    /// Hashes one file. Read failures are recorded and yield `None`.
    fn hash(&mut self, path: &Path) -> Result<Option<String>, Interrupted> {
        match checksum_file(path, self.interrupt) {
            Ok(checksum) => {
                self.report.counters.hashed_files += 1;
                self.report.counters.bytes_hashed += checksum.bytes;
                Ok(Some(checksum.digest))
            }
            Err(ChecksumError::Interrupted(_)) => Err(Interrupted),
            Err(e) if e.is_not_found() => {
                self.read_error(path, "file vanished during processing".to_string());
                Ok(None)
            }
            Err(e) => {
                self.read_error(path, e.to_string());
                Ok(None)
            }
        }
    }

    fn record(&mut self, store: &mut ChecksumStore, name: &str, digest: &str) {
        if let Err(e) = store.record_hash(name, digest) {
            error!("Could not write to checksum file: {e}");
            self.checksum_file_error(e);
        }
    }

    fn read_error(&mut self, path: &Path, message: String) {
        self.report.counters.read_errors += 1;
        self.finding(Finding::ReadError {
            path: path.to_path_buf(),
            message,
        });
    }

    /// Logs a per-file finding and adds it to the report.
    fn finding(&mut self, finding: Finding) {
        match finding {
            Finding::Mismatch { .. } | Finding::ReadError { .. } => error!("{finding}"),
            Finding::Missing { .. } | Finding::NotListed { .. } => warn!("{finding}"),
            // Already logged where the checksum file was accessed.
            Finding::ChecksumFileError { .. } => {}
        }
        self.report.findings.push(finding);
    }

    fn checksum_file_error(&mut self, e: StoreError) {
        if !matches!(e, StoreError::MalformedLine { .. }) {
            self.report.counters.checksum_file_errors += 1;
        }
        self.finding(Finding::ChecksumFileError {
            message: e.to_string(),
        });
    }
}
