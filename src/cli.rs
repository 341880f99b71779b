use crate::config::{ChecksumFileName, DEFAULT_CHECKSUM_FILENAME, Mode, RunOptions};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Recursively create, verify and update MD5 checksum files in directories
#[derive(Parser, Debug)]
#[command(
    name = "dirhash",
    version,
    about,
    after_help = "By default, only directories without any subdirectories (\"leaves\") are \
processed. This can be overridden with --force. All files in a directory (except the checksum \
files) are hashed and either stored in the checksum file or checked against it, depending on the \
mode. Without a mode flag, checksums are verified.",
    group(ArgGroup::new("mode").args(["create", "update", "paths"]).multiple(false))
)]
pub struct Cli {
    /// Hash everything and create checksum files
    #[arg(short, long)]
    pub create: bool,

    /// Only hash new or changed files and remove dead entries
    #[arg(short, long)]
    pub update: bool,

    /// Only check that listed files exist, don't compare checksums (fast)
    #[arg(short, long)]
    pub paths: bool,

    /// Include hidden files and directories
    #[arg(short, long)]
    pub all: bool,

    /// Process files in directories that also have subdirectories
    #[arg(short, long)]
    pub force: bool,

    /// Follow symlinks instead of ignoring them
    #[arg(short = 'l', long)]
    pub follow_links: bool,

    /// Name of checksum files; 'all' uses every *.md5 file when checking and
    /// creates one checksum file per input file
    #[arg(short = 'F', long, value_name = "NAME", default_value = DEFAULT_CHECKSUM_FILENAME)]
    pub filename: String,

    /// Overwrite existing checksum files without asking
    #[arg(short = 'O', long)]
    pub overwrite: bool,

    /// Accept removal of entries for deleted files in update mode
    #[arg(short, long, requires = "update")]
    pub delete: bool,

    /// Don't warn about directories without checksum files
    #[arg(long)]
    pub no_missing_checksums: bool,

    /// Only process this many directories (after the skipped ones), -1 for all
    #[arg(
        short = 'n',
        long,
        value_name = "N",
        default_value_t = -1,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(-1..)
    )]
    pub number: i64,

    /// Skip this many directories (to resume an aborted run)
    #[arg(short, long, value_name = "N", default_value_t = 0)]
    pub skip: usize,

    /// Change to directory before operating
    #[arg(short = 'C', value_name = "DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Increase log output (-v for info, -vv for debug). Takes precedence over RUST_LOG.
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with_all = ["quiet", "log_level"])]
    pub verbose: u8,

    /// Only log errors. Takes precedence over RUST_LOG.
    #[arg(short, long, conflicts_with = "log_level")]
    pub quiet: bool,

    /// Log level (error, warn, info, debug, trace). Takes precedence over RUST_LOG.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<tracing::Level>,

    /// Directories to process (default: current directory)
    #[arg(value_name = "DIR")]
    pub locations: Vec<PathBuf>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn mode(&self) -> Mode {
        if self.create {
            Mode::Create
        } else if self.update {
            Mode::Update
        } else if self.paths {
            Mode::Paths
        } else {
            Mode::Check
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            mode: self.mode(),
            include_hidden: self.all,
            force: self.force,
            follow_symlinks: self.follow_links,
            checksum_file: ChecksumFileName::parse(&self.filename),
            overwrite: self.overwrite,
            delete_dead_entries: self.delete,
            no_missing_checksums: self.no_missing_checksums,
            skip: self.skip,
            limit: usize::try_from(self.number).ok(),
        }
    }

    pub fn locations(&self) -> Vec<PathBuf> {
        if self.locations.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.locations.clone()
        }
    }
}
