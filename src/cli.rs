use clap::Parser;
use std::path::PathBuf;

use stickerpress::config::DEFAULT_CONCURRENCY;

#[derive(Parser)]
#[command(name = "stickerpress")]
#[command(
    author,
    version,
    about = "Batch-normalize video clips into size-capped looping WebM stickers"
)]
pub struct Cli {
    /// Input files or folders; prompted interactively if omitted
    #[arg(short, long = "input", value_name = "PATH")]
    pub input: Vec<PathBuf>,

    /// Output folder
    #[arg(short, long, value_name = "DIR", default_value = "output")]
    pub output: PathBuf,

    /// Use nearest-neighbor scaling; pass without a value for on, leave
    /// the flag off entirely to be asked per job
    #[arg(
        short,
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub nearest: Option<bool>,

    /// Answer every prompt with its default
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Maximum number of jobs converting at once
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_CONCURRENCY)]
    pub jobs: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
