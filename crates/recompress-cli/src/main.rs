mod cli;
mod display;

use clap::Parser;
use eyre::{Context, Result};
use recompress_core::{format_bytes, LineSink, Pipeline, RecompressConfig, RunReport};

use crate::cli::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let root = match cli.folder {
        Some(path) => path,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let config = RecompressConfig::new(root, cli.threads);
    config.validate()?;
    let pipeline = Pipeline::new(config);

    let report = if cli.progress {
        let bar = display::spinner()?;
        display::init_logging(cli.verbose, Some(bar.clone()))?;
        pipeline.run(display::SpinnerSink::new(bar))?.0
    } else {
        display::init_logging(cli.verbose, None)?;
        pipeline.run(LineSink::stdout())?.0
    };

    report_outcome(&report);
    Ok(())
}

fn report_outcome(report: &RunReport) {
    let failed = report.workers.failed();
    if failed > 0 {
        eprintln!(
            "[warn] {} file(s) could not be rewritten and were left unchanged ({})",
            failed, report.workers.failures
        );
    }
    log::debug!(
        "rewrote {} file(s), {} in {:.2?}",
        report.workers.rewritten,
        format_bytes(report.workers.bytes_rewritten),
        report.elapsed
    );
}
