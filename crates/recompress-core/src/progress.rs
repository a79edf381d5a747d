//! Single-consumer progress aggregation.
//!
//! The aggregator owns the running totals outright: it is the only reader of
//! the result queue and the only writer of the counters. Output goes through a
//! [`ProgressSink`] so the console framing can vary without touching the
//! accounting.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};

use eyre::{Context, Result};

use crate::queue::{ResultMessage, ResultReceiver, ResultRecord};

/// Emit a line every this many results.
pub const REPORT_EVERY: u64 = 10;
/// Results at least this large are reported immediately.
pub const LARGE_FILE_BYTES: u64 = 20 << 20;
/// Maximum display width of a file name in a progress line.
pub const DISPLAY_WIDTH: usize = 24;

const CLEAR_LINE: &str = "\x1B[2K\r";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub count: u64,
    pub bytes: u64,
}

impl Totals {
    pub fn add(&mut self, size: u64) {
        self.count += 1;
        self.bytes += size;
    }
}

impl fmt::Display for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} files, {} total",
            self.count,
            format_bytes(self.bytes)
        )
    }
}

/// One in-place progress update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub count: u64,
    pub name: String,
    pub size: u64,
    pub total_bytes: u64,
}

impl fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {}: {} ({} / {})",
            self.count,
            self.name,
            format_bytes(self.size),
            format_bytes(self.total_bytes)
        )
    }
}

/// Destination for progress output.
pub trait ProgressSink: Send {
    fn update(&mut self, line: &ProgressLine) -> io::Result<()>;
    fn finish(&mut self, totals: &Totals) -> io::Result<()>;
}

/// Rewrites a single console line in place with `ESC[2K` + `CR`.
pub struct LineSink<W: Write> {
    out: W,
}

impl LineSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ProgressSink for LineSink<W> {
    fn update(&mut self, line: &ProgressLine) -> io::Result<()> {
        write!(self.out, "{CLEAR_LINE}{line}")?;
        self.out.flush()
    }

    fn finish(&mut self, totals: &Totals) -> io::Result<()> {
        writeln!(self.out, "{CLEAR_LINE}{totals}")?;
        self.out.flush()
    }
}

/// Whether the `count`-th result, of `size` bytes, warrants a progress line.
pub fn should_report(count: u64, size: u64) -> bool {
    count % REPORT_EVERY == 0 || size >= LARGE_FILE_BYTES
}

/// Basename of `path`, middle-elided to [`DISPLAY_WIDTH`] characters.
pub fn display_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= DISPLAY_WIDTH {
        return name;
    }
    let head: String = chars[..DISPLAY_WIDTH - 8].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{head}...{tail}")
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes == 0 {
        return "0 B".to_owned();
    }
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

pub struct Aggregator<S> {
    sink: S,
    totals: Totals,
}

impl<S: ProgressSink> Aggregator<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            totals: Totals::default(),
        }
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn record(&mut self, record: &ResultRecord) {
        self.totals.add(record.size);
        if should_report(self.totals.count, record.size) {
            let line = ProgressLine {
                count: self.totals.count,
                name: display_name(&record.path),
                size: record.size,
                total_bytes: self.totals.bytes,
            };
            if let Err(err) = self.sink.update(&line) {
                log::debug!("progress output failed: {err}");
            }
        }
    }

    /// Print the summary and hand back the totals and the sink.
    pub fn finish(mut self) -> (Totals, S) {
        if let Err(err) = self.sink.finish(&self.totals) {
            log::debug!("summary output failed: {err}");
        }
        (self.totals, self.sink)
    }

    /// Drain `results` until a finish message arrives.
    pub fn run(mut self, results: &ResultReceiver) -> (Totals, S) {
        while let ResultMessage::Record(record) = results.pop() {
            self.record(&record);
        }
        self.finish()
    }
}

pub fn spawn_aggregator<S>(sink: S, results: ResultReceiver) -> Result<JoinHandle<(Totals, S)>>
where
    S: ProgressSink + 'static,
{
    thread::Builder::new()
        .name("recompress-progress".into())
        .spawn(move || Aggregator::new(sink).run(&results))
        .context("spawn progress aggregator")
}
