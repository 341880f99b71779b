use crate::config::{Mode, RunOptions};
use crate::run::RunState;
use std::time::Duration;

enum Row {
    Heading(&'static str),
    Value(&'static str, String),
}

/// Prints the end-of-run statistics table to stdout.
pub fn print_summary(state: &RunState, options: &RunOptions, elapsed: Duration) {
    for line in summary_lines(state, options, elapsed) {
        println!("{line}");
    }
}

fn summary_lines(state: &RunState, options: &RunOptions, elapsed: Duration) -> Vec<String> {
    let rows = summary_rows(state, options, elapsed);

    let label_width = rows
        .iter()
        .map(|row| match row {
            Row::Heading(label) | Row::Value(label, _) => label.len(),
        })
        .max()
        .unwrap_or(0);
    let value_width = rows
        .iter()
        .filter_map(|row| match row {
            Row::Value(_, value) if value.chars().all(|c| c.is_ascii_digit()) => Some(value.len()),
            _ => None,
        })
        .max()
        .unwrap_or(0);

    let mut lines = vec!["-".repeat(label_width + value_width + 2)];
    for row in rows {
        lines.push(match row {
            Row::Heading(label) => label.to_string(),
            Row::Value(label, value) => {
                format!("{label:<label_width$}: {value:>value_width$}")
            }
        });
    }
    lines
}

fn summary_rows(state: &RunState, options: &RunOptions, elapsed: Duration) -> Vec<Row> {
    let counters = &state.counters;
    let mode = options.mode;
    let mut rows = vec![
        Row::Heading("DIRECTORIES:"),
        Row::Value("  processed", state.directories_processed.to_string()),
    ];

    if options.skip > 0 {
        rows.push(Row::Value("  after skipping", options.skip.to_string()));
    }
    if state.skipped_overwrites > 0 {
        rows.push(Row::Value(
            "  skipped for overwriting",
            state.skipped_overwrites.to_string(),
        ));
    }
    if state.without_checksum_file > 0 {
        rows.push(Row::Value(
            "  with no checksum file",
            state.without_checksum_file.to_string(),
        ));
    }

    rows.push(Row::Heading("FILES:"));

    if mode != Mode::Create {
        rows.push(Row::Value("  listed in checksum file", counters.listed.to_string()));
        if counters.not_listed > 0 {
            rows.push(Row::Value("  not in checksum file", counters.not_listed.to_string()));
        }
        if counters.files_missing > 0 {
            rows.push(Row::Value("  listed, but not found", counters.files_missing.to_string()));
        }
    }
    if mode == Mode::Update {
        if counters.added > 0 {
            rows.push(Row::Value("  added", counters.added.to_string()));
        }
        if counters.updated > 0 {
            rows.push(Row::Value("  checksum updated", counters.updated.to_string()));
        }
        if counters.dead_entries_removed > 0 {
            rows.push(Row::Value(
                "  dead entries removed",
                counters.dead_entries_removed.to_string(),
            ));
        }
    }
    if mode != Mode::Paths {
        rows.push(Row::Value("  hashed", counters.hashed_files.to_string()));
    }
    if mode == Mode::Check {
        rows.push(Row::Value("  checks passed", counters.passes.to_string()));
        rows.push(Row::Value("  checks failed", counters.fails.to_string()));
    }
    if counters.read_errors > 0 {
        rows.push(Row::Value("  read errors", counters.read_errors.to_string()));
    }
    if counters.checksum_file_errors > 0 {
        rows.push(Row::Value(
            "  checksum file errors",
            counters.checksum_file_errors.to_string(),
        ));
    }

    if mode != Mode::Paths {
        rows.push(Row::Heading("VOLUME:"));
        let bytes = counters.bytes_hashed;
        rows.push(Row::Value(
            "  hashed bytes",
            if bytes == 0 {
                "0".to_string()
            } else {
                format!("{} ({})", bytes, format_size(bytes))
            },
        ));

        let seconds = elapsed.as_secs_f64();
        let mut value = format!("{seconds:.1} seconds");
        if bytes != 0 && seconds > 0.0 {
            value.push_str(&format!(
                " ({:.1} MiB/second)",
                bytes as f64 / 1_048_576.0 / seconds
            ));
        }
        rows.push(Row::Value("  time elapsed", value));
    }

    rows
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes >= GB {
        format!("{:.1} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} kiB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
