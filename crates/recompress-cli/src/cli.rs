use clap::builder::TypedValueParser;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "zfs-recompress")]
#[command(about = "Rewrite every file under a directory in place so the filesystem re-applies its compression settings")]
pub struct Cli {
    /// Directory to process (defaults to the current working directory)
    #[arg(long, short = 'f', value_name = "PATH")]
    pub folder: Option<PathBuf>,
    /// Number of concurrent rewrite workers
    #[arg(
        long,
        short = 't',
        default_value_t = recompress_core::DEFAULT_WORKERS,
        value_parser = clap::value_parser!(u16).range(1..).map(usize::from)
    )]
    pub threads: usize,
    /// Log skipped entries and per-file details
    #[arg(long, short = 'v')]
    pub verbose: bool,
    /// Show an interactive progress indicator instead of a plain status line
    #[arg(long, short = 'p')]
    pub progress: bool,
}
