//! Rewrite files in place so the filesystem stores them under its current
//! compression settings.
//!
//! [`Pipeline`] walks a tree and feeds eligible files to a [`WorkerPool`].
//! Each worker replaces a file with a verified copy (see [`rewrite_in_place`])
//! and reports its size to a single progress aggregator.

pub mod buffer;
pub mod config;
pub mod dispatcher;
pub mod enumeration;
pub mod errors;
pub mod probe;
pub mod progress;
pub mod queue;
pub mod rewrite;
pub mod worker;

pub use config::RecompressConfig;
pub use dispatcher::{Pipeline, RunReport};
pub use enumeration::enumerate_eligible;
pub use errors::{ErrorCategory, RewriteError};
pub use progress::{format_bytes, LineSink, ProgressLine, ProgressSink, Totals};
pub use rewrite::{rewrite_in_place, RewriteHooks, RewriteOutcome, SystemHooks};
pub use worker::{FailureCounts, WorkerPool, WorkerStats};

/// Suffix appended to a path to name its in-flight temporary copy.
pub const WORKING_SUFFIX: &str = ".zfs-recompress";

/// Worker count used when none is configured.
pub const DEFAULT_WORKERS: usize = 4;
