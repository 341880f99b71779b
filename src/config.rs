use std::path::Path;

/// Name written by create mode unless another one is configured.
pub const DEFAULT_CHECKSUM_FILENAME: &str = "Checksums.md5";

/// Suffix identifying checksum files when every `*.md5` file is used.
pub const CHECKSUM_SUFFIX: &str = ".md5";

const ALL_SENTINEL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Hash listed files and compare against the stored digests.
    #[default]
    Check,
    /// Hash every file and write fresh checksum files.
    Create,
    /// Hash new and changed files, prune entries for deleted files.
    Update,
    /// Only compare the set of listed files with the files on disk.
    Paths,
}

impl Mode {
    /// Check and paths mode never write checksum files.
    pub fn is_read_only(self) -> bool {
        matches!(self, Mode::Check | Mode::Paths)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumFileName {
    /// One shared checksum file per directory.
    Fixed(String),
    /// Every `*.md5` file is read; each hashed file gets its own `<name>.md5`.
    All,
}

impl ChecksumFileName {
    /// Interprets a user supplied name. Only the final path component is
    /// used, so `-F sub/dir/sums.md5` still names a file inside each
    /// processed directory.
    pub fn parse(value: &str) -> Self {
        if value == ALL_SENTINEL {
            return ChecksumFileName::All;
        }
        let name = Path::new(value)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CHECKSUM_FILENAME.to_string());
        ChecksumFileName::Fixed(name)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ChecksumFileName::All)
    }
}

impl Default for ChecksumFileName {
    fn default() -> Self {
        ChecksumFileName::Fixed(DEFAULT_CHECKSUM_FILENAME.to_string())
    }
}

/// True if `name` has the checksum file suffix, ignoring case.
pub fn has_checksum_suffix(name: &str) -> bool {
    name.to_lowercase().ends_with(CHECKSUM_SUFFIX)
}

/// Typed run configuration, built once from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: Mode,
    pub include_hidden: bool,
    pub force: bool,
    pub follow_symlinks: bool,
    pub checksum_file: ChecksumFileName,
    /// Overwrite existing checksum files in create mode without asking.
    pub overwrite: bool,
    /// Pruned dead entries do not count as missing files.
    pub delete_dead_entries: bool,
    pub no_missing_checksums: bool,
    /// Number of eligible directories to skip before processing starts.
    pub skip: usize,
    /// Maximum number of directories to process after skipping; `None` is unbounded.
    pub limit: Option<usize>,
}
