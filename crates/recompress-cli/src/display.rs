//! Console plumbing: log backend and the optional indicatif progress sink.

use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use eyre::{eyre, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{LevelFilter, Log};
use recompress_core::{ProgressLine, ProgressSink, Totals};

/// Progress sink drawing a spinner on stdout.
pub struct SpinnerSink {
    bar: ProgressBar,
}

impl SpinnerSink {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl ProgressSink for SpinnerSink {
    fn update(&mut self, line: &ProgressLine) -> io::Result<()> {
        self.bar.set_message(line.to_string());
        Ok(())
    }

    fn finish(&mut self, totals: &Totals) -> io::Result<()> {
        self.bar.finish_and_clear();
        let mut out = io::stdout().lock();
        writeln!(out, "{totals}")?;
        out.flush()
    }
}

pub fn spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed}] {msg}")
            .map_err(|err| eyre!("progress template: {err}"))?
            .tick_strings(&["-", "\\", "|", "/", "-"]),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Scanning...");
    Ok(pb)
}

/// Routes records through the spinner so it is cleared before a record is
/// written and redrawn afterwards.
struct SuspendingLogger {
    inner: env_logger::Logger,
    bar: ProgressBar,
}

impl Log for SuspendingLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.inner.matches(record) {
            self.bar.suspend(|| self.inner.log(record));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the stderr log backend. `RUST_LOG` overrides the default level.
pub fn init_logging(verbose: bool, bar: Option<ProgressBar>) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    // Plain progress lines have no trailing newline; clear it before a record lands on it.
    let clear_line = bar.is_none() && io::stdout().is_terminal() && io::stderr().is_terminal();

    let logger = env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .format(move |buf, record| {
            if clear_line {
                write!(buf, "\x1B[2K\r")?;
            }
            writeln!(buf, "[{}] {}", record.level(), record.args())
        })
        .build();
    let max_level = logger.filter();

    let installed = match bar {
        Some(bar) => log::set_boxed_logger(Box::new(SuspendingLogger { inner: logger, bar })),
        None => log::set_boxed_logger(Box::new(logger)),
    };
    installed.map_err(|err| eyre!("install logger: {err}"))?;
    log::set_max_level(max_level);
    Ok(())
}
