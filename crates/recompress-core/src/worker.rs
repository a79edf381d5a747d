//! Fixed-size pool of rewrite workers.
//!
//! Each worker pops paths until it receives a stop message. It re-checks
//! eligibility, reports the size to the aggregator before attempting the
//! rewrite, and then runs the rewrite protocol. Failures are logged and
//! counted locally; a bad file never ends a worker. Workers share nothing but
//! the two queues and read-only helpers, and hand their counters back through
//! their join handles.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use eyre::{eyre, Context, Result};

use crate::buffer::BufferSizer;
use crate::errors::ErrorCategory;
use crate::probe;
use crate::queue::{ResultMessage, ResultRecord, ResultSender, Task, TaskReceiver};
use crate::rewrite::{rewrite_with, RewriteHooks, RewriteOutcome};

/// Failed rewrites broken down by [`ErrorCategory`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FailureCounts {
    pub capacity: u64,
    pub concurrency: u64,
    pub io: u64,
}

impl FailureCounts {
    pub fn record(&mut self, category: ErrorCategory) {
        match category {
            ErrorCategory::Capacity => self.capacity += 1,
            ErrorCategory::Concurrency => self.concurrency += 1,
            ErrorCategory::Io => self.io += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.capacity + self.concurrency + self.io
    }

    fn merge(&mut self, other: &FailureCounts) {
        self.capacity += other.capacity;
        self.concurrency += other.concurrency;
        self.io += other.io;
    }
}

impl std::fmt::Display for FailureCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} out of space, {} changed or in use, {} I/O error(s)",
            self.capacity, self.concurrency, self.io
        )
    }
}

/// Outcome counters for one worker, or summed over a pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub rewritten: u64,
    pub bytes_rewritten: u64,
    pub failures: FailureCounts,
    pub skipped: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: &WorkerStats) {
        self.rewritten += other.rewritten;
        self.bytes_rewritten += other.bytes_rewritten;
        self.failures.merge(&other.failures);
        self.skipped += other.skipped;
    }

    pub fn failed(&self) -> u64 {
        self.failures.total()
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    pub fn spawn(
        workers: usize,
        tasks: TaskReceiver,
        results: ResultSender,
        hooks: Arc<dyn RewriteHooks>,
    ) -> Result<Self> {
        let sizer = Arc::new(BufferSizer::default());
        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let tasks = tasks.clone();
            let results = results.clone();
            let hooks = Arc::clone(&hooks);
            let sizer = Arc::clone(&sizer);
            let handle = thread::Builder::new()
                .name(format!("recompress-w{idx}"))
                .spawn(move || worker_loop(idx, &tasks, &results, hooks.as_ref(), &sizer))
                .with_context(|| format!("spawn worker {idx}"))?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit and sum their counters.
    pub fn join(self) -> Result<WorkerStats> {
        let mut total = WorkerStats::default();
        for handle in self.handles {
            let stats = handle
                .join()
                .map_err(|_| eyre!("worker thread panicked"))?;
            total.merge(&stats);
        }
        Ok(total)
    }
}

fn worker_loop(
    idx: usize,
    tasks: &TaskReceiver,
    results: &ResultSender,
    hooks: &dyn RewriteHooks,
    sizer: &BufferSizer,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    loop {
        let path = match tasks.pop() {
            Task::Process(path) => path,
            Task::Stop => break,
        };

        let Some(size) = probe::eligible_size(&path) else {
            log::debug!("[w{idx}] skip {}: no longer eligible", path.display());
            stats.skipped += 1;
            continue;
        };

        let record = ResultRecord {
            path: path.clone(),
            size,
        };
        if results.push(ResultMessage::Record(record)).is_err() {
            log::debug!("[w{idx}] progress receiver gone; continuing");
        }

        match rewrite_with(&path, sizer, hooks) {
            Ok(RewriteOutcome::Rewritten { bytes }) => {
                stats.rewritten += 1;
                stats.bytes_rewritten += bytes;
            }
            Ok(RewriteOutcome::Skipped) => {
                log::debug!("[w{idx}] skip {}: vanished before rewrite", path.display());
                stats.skipped += 1;
            }
            Err(err) => {
                log::warn!("[w{idx}] {err}");
                stats.failures.record(err.category());
            }
        }
    }

    stats
}
