//! Run orchestration: enumerate, fan out to workers, drain, summarise.
//!
//! Shutdown order matters. Stop messages go out only after the walk has
//! finished, the aggregator is told to finish only after every worker has been
//! joined, so the summary covers every record any worker pushed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::{eyre, Context, Result};

use crate::config::RecompressConfig;
use crate::enumeration::enumerate_eligible;
use crate::progress::{spawn_aggregator, ProgressSink, Totals};
use crate::queue::{result_queue, work_queue, ResultMessage, Task};
use crate::rewrite::{RewriteHooks, SystemHooks};
use crate::worker::{WorkerPool, WorkerStats};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunReport {
    /// Count and bytes as aggregated from the result queue.
    pub totals: Totals,
    /// Per-outcome counters summed over all workers.
    pub workers: WorkerStats,
    /// Eligible paths handed to the work queue.
    pub enumerated: u64,
    pub elapsed: Duration,
}

pub struct Pipeline {
    config: RecompressConfig,
    hooks: Arc<dyn RewriteHooks>,
}

impl Pipeline {
    pub fn new(config: RecompressConfig) -> Self {
        Self {
            config,
            hooks: Arc::new(SystemHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RewriteHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Rewrite every eligible file under the configured root.
    ///
    /// Only startup and thread-level failures are returned as errors; per-file
    /// failures are logged by the workers and counted in the report.
    pub fn run<S>(&self, sink: S) -> Result<(RunReport, S)>
    where
        S: ProgressSink + 'static,
    {
        self.config.validate()?;
        let started = Instant::now();
        let workers = self.config.workers;
        log::info!(
            "rewriting files under {} with {} worker(s)",
            self.config.root.display(),
            workers
        );

        let (result_tx, result_rx) = result_queue();
        let aggregator = spawn_aggregator(sink, result_rx)?;

        let (task_tx, task_rx) = work_queue();
        let pool = WorkerPool::spawn(workers, task_rx, result_tx.clone(), Arc::clone(&self.hooks))?;

        let enumerated = enumerate_eligible(&self.config.root, |path| {
            task_tx.push(Task::Process(path))
        })
        .with_context(|| format!("walk {}", self.config.root.display()))?;
        log::debug!(
            "enumerated {enumerated} file(s); {} still queued",
            task_tx.len()
        );

        task_tx.push_stops(pool.len())?;
        let worker_stats = pool.join()?;

        result_tx.push(ResultMessage::Finish)?;
        let (totals, sink) = aggregator
            .join()
            .map_err(|_| eyre!("progress aggregator panicked"))?;

        let report = RunReport {
            totals,
            workers: worker_stats,
            enumerated,
            elapsed: started.elapsed(),
        };
        log::info!(
            "done: {} attempted, {} rewritten, {} failed, {} skipped in {:.2?}",
            report.totals.count,
            report.workers.rewritten,
            report.workers.failed(),
            report.workers.skipped,
            report.elapsed
        );
        Ok((report, sink))
    }
}
