use crate::interrupt::Interrupt;
use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Length of a hex encoded digest as stored in checksum files.
pub const DIGEST_HEX_LEN: usize = 32;

const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("File modified during checksumming: {0}")]
    ConcurrentModification(PathBuf),
    #[error("Interrupted while checksumming {0}")]
    Interrupted(PathBuf),
}

impl ChecksumError {
    fn from_io(path: &Path, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ChecksumError::PermissionDenied(path.to_path_buf())
        } else {
            ChecksumError::Io(e)
        }
    }

    /// True if the file disappeared before or while it was read.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChecksumError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

#[derive(Debug)]
pub struct FileChecksum {
    /// Lower case hex.
    pub digest: String,
    /// Number of bytes fed to the digest.
    pub bytes: u64,
}

/// Computes the MD5 digest of a file, reading it in 1 MiB chunks.
///
/// The interrupt flag is polled between chunks so that hashing a very large
/// file does not delay Ctrl-C handling until the whole file has been read.
///
/// # Errors
/// - `ChecksumError::Io`: File doesn't exist or became unreadable mid-stream
/// - `ChecksumError::PermissionDenied`: Insufficient permissions to read the file
/// - `ChecksumError::ConcurrentModification`: The file's modification time changed
///   while it was being read
/// - `ChecksumError::Interrupted`: The interrupt flag was raised
pub fn checksum_file(path: &Path, interrupt: &Interrupt) -> Result<FileChecksum, ChecksumError> {
    info!("Checksumming {}", path.display());

    let metadata_before = std::fs::metadata(path).map_err(|e| ChecksumError::from_io(path, e))?;
    let mtime_before = metadata_before.modified().map_err(ChecksumError::Io)?;

    let mut file = File::open(path).map_err(|e| ChecksumError::from_io(path, e))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut bytes = 0u64;

    loop {
        if interrupt.is_triggered() {
            return Err(ChecksumError::Interrupted(path.to_path_buf()));
        }
        let bytes_read = file.read(&mut buffer).map_err(ChecksumError::Io)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        bytes += bytes_read as u64;
    }

    let metadata_after = std::fs::metadata(path).map_err(ChecksumError::Io)?;
    let mtime_after = metadata_after.modified().map_err(ChecksumError::Io)?;

    if mtime_before != mtime_after {
        return Err(ChecksumError::ConcurrentModification(path.to_path_buf()));
    }

    let digest = format!("{:x}", hasher.finalize());

    debug!("Checksum of {} is {}", path.display(), digest);

    Ok(FileChecksum { digest, bytes })
}
