//! Per-file failure taxonomy for the rewrite protocol.
//!
//! Every failure is scoped to a single file. Workers log them and move on;
//! nothing here is ever allowed to stop a run.
//! - Capacity: not enough free space to stage the copy
//! - Concurrency: the source changed while it was being copied, or its
//!   working path is already taken by another file
//! - Io: an OS call failed (permission denied, vanished file, interrupted syscall)

use std::io;
use std::path::{Path, PathBuf};

/// Category of rewrite failure, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The file does not fit in the free space of its filesystem.
    Capacity,
    /// The file was modified or replaced during the copy window, or its
    /// working path is held by something else.
    Concurrency,
    /// An OS-level operation failed.
    Io,
}

/// A failed rewrite attempt for one file. The original file is untouched.
#[derive(Debug)]
pub enum RewriteError {
    InsufficientSpace {
        path: PathBuf,
        needed: u64,
        available: u64,
    },
    ChangedDuringCopy {
        path: PathBuf,
    },
    /// `working` already existed; it is left exactly as found.
    WorkingPathOccupied {
        path: PathBuf,
        working: PathBuf,
    },
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

impl RewriteError {
    pub fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InsufficientSpace { .. } => ErrorCategory::Capacity,
            Self::ChangedDuringCopy { .. } | Self::WorkingPathOccupied { .. } => {
                ErrorCategory::Concurrency
            }
            Self::Io { .. } => ErrorCategory::Io,
        }
    }
}

impl std::fmt::Display for RewriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientSpace {
                path,
                needed,
                available,
            } => write!(
                f,
                "{}: not enough free space to process file (need {} bytes, {} available)",
                path.display(),
                needed,
                available
            ),
            Self::ChangedDuringCopy { path } => {
                write!(f, "{}: file changed during copy", path.display())
            }
            Self::WorkingPathOccupied { path, working } => write!(
                f,
                "{}: working path {} already exists",
                path.display(),
                working.display()
            ),
            Self::Io { op, path, source } => write!(f, "{}: {} failed: {}", path.display(), op, source),
        }
    }
}

impl std::error::Error for RewriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let space = RewriteError::InsufficientSpace {
            path: PathBuf::from("big.bin"),
            needed: 10,
            available: 5,
        };
        assert_eq!(space.category(), ErrorCategory::Capacity);

        let changed = RewriteError::ChangedDuringCopy {
            path: PathBuf::from("busy.log"),
        };
        assert_eq!(changed.category(), ErrorCategory::Concurrency);

        let denied = RewriteError::io(
            "copy",
            Path::new("secret"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(denied.category(), ErrorCategory::Io);

        let occupied = RewriteError::WorkingPathOccupied {
            path: PathBuf::from("notes.txt"),
            working: PathBuf::from("notes.txt.zfs-recompress"),
        };
        assert_eq!(occupied.category(), ErrorCategory::Concurrency);
        assert!(occupied.to_string().contains("notes.txt.zfs-recompress already exists"));
    }

    #[test]
    fn test_display_names_path_and_cause() {
        let err = RewriteError::io(
            "rename",
            Path::new("dir/file.txt"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("dir/file.txt: rename failed"));
        assert!(msg.contains("gone"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
