//! Run configuration and startup validation.

use eyre::{bail, Context, Result};
use std::path::PathBuf;

use crate::DEFAULT_WORKERS;

/// Startup configuration for a recompression run.
#[derive(Debug, Clone)]
pub struct RecompressConfig {
    /// Directory tree to rewrite.
    pub root: PathBuf,
    /// Number of concurrent rewrite workers.
    pub workers: usize,
}

impl RecompressConfig {
    pub fn new(root: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            root: root.into(),
            workers,
        }
    }

    /// Check the values that must hold before any worker starts.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("thread count must be at least 1");
        }
        let md = std::fs::metadata(&self.root)
            .with_context(|| format!("target folder {}", self.root.display()))?;
        if !md.is_dir() {
            bail!("target folder is not a directory: {}", self.root.display());
        }
        Ok(())
    }
}

impl Default for RecompressConfig {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            workers: DEFAULT_WORKERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_four_workers() {
        assert_eq!(RecompressConfig::default().workers, 4);
    }

    #[test]
    fn validate_rejects_bad_startup_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("plain.txt");
        std::fs::write(&file, b"x").expect("write");

        assert!(RecompressConfig::new(temp.path(), 2).validate().is_ok());
        assert!(RecompressConfig::new(temp.path(), 0).validate().is_err());
        assert!(RecompressConfig::new(&file, 2).validate().is_err());
        assert!(RecompressConfig::new(temp.path().join("missing"), 2)
            .validate()
            .is_err());
    }
}
