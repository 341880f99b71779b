mod checksum;
mod checksum_file;
mod cli;
mod config;
mod dir_list;
mod interrupt;
mod process;
mod prompt;
mod run;
mod scan;
mod summary;

use anyhow::Context;
use cli::Cli;
use config::{Mode, RunOptions};
use interrupt::Interrupt;
use prompt::ConsolePrompt;
use run::{RunState, StopReason};
use std::fmt as stdfmt;
use std::io::{IsTerminal, stderr};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{Event, Level, Subscriber, error, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

struct DirhashExitCode;

impl DirhashExitCode {
    /// Exit code used when checks failed, files are missing or unlisted, or
    /// directories have no checksum file.
    fn findings() -> ExitCode {
        ExitCode::from(1)
    }

    /// Exit code used for other errors (I/O errors, invalid arguments, etc.).
    fn any_error() -> ExitCode {
        ExitCode::from(255)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet, cli.log_level);

    // Change working directory if -C was specified
    if let Some(directory) = &cli.directory
        && let Err(e) = std::env::set_current_dir(directory)
    {
        error!(
            "Failed to change directory to {}: {}",
            directory.display(),
            e
        );
        return DirhashExitCode::any_error();
    }

    match handle_run(&cli) {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err:#}");
            DirhashExitCode::any_error()
        }
    }
}

fn handle_run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let options = cli.run_options();

    let interrupt = Interrupt::new();
    interrupt
        .install_handler()
        .context("Failed to set signal handler")?;

    let start = Instant::now();

    info!("Gathering list of files...");
    let scan = scan::scan_tree(&cli.locations(), &options, &interrupt);
    if !scan.warnings.is_empty() {
        let count = scan.warnings.len();
        info!(
            "{} {} could not be scanned",
            count,
            plural(count, "location", "locations")
        );
    }

    if scan.interrupted {
        let mut state = RunState::new(&options);
        state.stopped = Some(StopReason::Interrupted);
        return Ok(finish_run(&state, &options, start));
    }

    if scan.tasks.is_empty() {
        warn!("Nothing worth checking found.");
        return Ok(ExitCode::SUCCESS);
    }

    let file_count: usize = scan.tasks.iter().map(|task| task.files.len()).sum();
    let dir_count = scan.tasks.len();
    match options.mode {
        Mode::Paths | Mode::Update => info!(
            "Checking checksum consistency for {} {} in {} {}",
            file_count,
            plural(file_count, "file", "files"),
            dir_count,
            plural(dir_count, "directory", "directories")
        ),
        Mode::Check | Mode::Create => info!(
            "Processing {} {} in {} {} ({})",
            file_count,
            plural(file_count, "file", "files"),
            dir_count,
            plural(dir_count, "directory", "directories"),
            summary::format_size(scan.total_size)
        ),
    }

    let mut prompt = ConsolePrompt::stdin(interrupt.clone());
    let state = run::run(&scan.tasks, &options, &mut prompt, &interrupt);

    Ok(finish_run(&state, &options, start))
}

/// Reports how the run ended, prints the summary and classifies the run.
fn finish_run(state: &RunState, options: &RunOptions, start: Instant) -> ExitCode {
    match state.stopped {
        Some(StopReason::Interrupted) if options.mode == Mode::Create => {
            warn!("Hashing aborted.")
        }
        Some(StopReason::Interrupted) => warn!("Check aborted."),
        Some(StopReason::Aborted) => warn!("Aborted, remaining directories were not processed."),
        None => {}
    }

    let unreadable = state.counters.read_errors;
    if unreadable > 0 {
        warn!(
            "Could not read {} {}, see the errors above",
            unreadable,
            plural(unreadable, "file", "files")
        );
    }

    summary::print_summary(state, options, start.elapsed());

    if state.is_failure() {
        DirhashExitCode::findings()
    } else {
        ExitCode::SUCCESS
    }
}

fn plural(count: usize, singular: &'static str, plural: &'static str) -> &'static str {
    if count == 1 { singular } else { plural }
}

fn init_tracing(verbose: u8, quiet: bool, log_level: Option<Level>) {
    let stderr_is_terminal = stderr().is_terminal();
    let formatter = EmojiFormatter { stderr_is_terminal };

    let forced_level = match (log_level, quiet, verbose) {
        (Some(level), _, _) => Some(level.to_string().to_lowercase()),
        (None, true, _) => Some("error".to_string()),
        (None, false, 0) => None,
        (None, false, 1) => Some("info".to_string()),
        (None, false, _) => Some("debug".to_string()),
    };

    let filter = match forced_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let fmt_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

struct EmojiFormatter {
    stderr_is_terminal: bool,
}

impl<S, N> FormatEvent<S, N> for EmojiFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        if self.stderr_is_terminal {
            match *event.metadata().level() {
                Level::DEBUG => write!(writer, "🔍 ")?,
                Level::INFO => write!(writer, "ℹ️ ")?,
                Level::WARN => write!(writer, "⚠️  ")?,
                Level::ERROR => write!(writer, "❌️ ")?,
                _ => {}
            }
        } else {
            match *event.metadata().level() {
                Level::DEBUG => writer.write_str("DEBUG: ")?,
                Level::INFO => writer.write_str("INFO: ")?,
                Level::WARN => writer.write_str("WARN: ")?,
                Level::ERROR => writer.write_str("ERROR: ")?,
                _ => {}
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
