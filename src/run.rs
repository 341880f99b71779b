use crate::config::RunOptions;
use crate::interrupt::Interrupt;
use crate::process::{
    Counters, DirectoryOutcome, DirectoryReport, OverwriteLatch, process_directory,
};
use crate::prompt::Interaction;
use crate::scan::DirectoryTask;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Aborted,
    Interrupted,
}

/// Totals across all processed directories.
#[derive(Debug, Default)]
pub struct RunState {
    pub directories_processed: usize,
    pub skipped_overwrites: usize,
    pub without_checksum_file: usize,
    pub counters: Counters,
    pub latch: OverwriteLatch,
    /// Set when the run ended before all tasks were processed.
    pub stopped: Option<StopReason>,
}

impl RunState {
    pub fn new(options: &RunOptions) -> Self {
        RunState {
            latch: OverwriteLatch {
                overwrite_all: options.overwrite,
                skip_all: false,
            },
            ..RunState::default()
        }
    }

    /// Folds one directory's report into the totals.
    pub fn record(&mut self, report: &DirectoryReport) {
        if !report.findings.is_empty() {
            debug!("{} findings reported", report.findings.len());
        }
        self.counters.absorb(&report.counters);
        match report.outcome {
            DirectoryOutcome::Processed => self.directories_processed += 1,
            DirectoryOutcome::NoChecksumFile => self.without_checksum_file += 1,
            DirectoryOutcome::SkippedOverwrite => self.skipped_overwrites += 1,
            DirectoryOutcome::Aborted => self.stopped = Some(StopReason::Aborted),
            DirectoryOutcome::Interrupted => self.stopped = Some(StopReason::Interrupted),
        }
    }

    /// The run failed if any check failed, any listed file was missing, any
    /// file was not listed, or any directory had no checksum file.
    pub fn is_failure(&self) -> bool {
        self.counters.fails > 0
            || self.counters.files_missing > 0
            || self.counters.not_listed > 0
            || self.without_checksum_file > 0
    }
}

/// Processes `tasks` strictly in order until all are done, the operator
/// aborts, or the interrupt flag is raised.
pub fn run(
    tasks: &[DirectoryTask],
    options: &RunOptions,
    interaction: &mut dyn Interaction,
    interrupt: &Interrupt,
) -> RunState {
    let mut state = RunState::new(options);

    for task in tasks {
        if interrupt.is_triggered() {
            state.stopped = Some(StopReason::Interrupted);
            break;
        }

        let report = process_directory(task, options, &mut state.latch, interaction, interrupt);
        state.record(&report);

        if report.outcome.stops_run() {
            break;
        }
    }

    state
}
