mod cli;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{bail, Result};
use clap::Parser;
use cli::Cli;

use stickerpress::batch::BatchOrchestrator;
use stickerpress::config::BatchConfig;
use stickerpress::prompt::PromptGate;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    // Respect RUST_LOG if set, otherwise key the default filter on -v.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "stickerpress=debug".to_string()
        } else {
            "stickerpress=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    check_tools()?;

    let roots = if cli.input.is_empty() {
        collect_inputs_interactively()?
    } else {
        for path in &cli.input {
            if !path.exists() {
                bail!("input path does not exist: {}", path.display());
            }
        }
        cli.input
    };
    if roots.is_empty() {
        bail!("no input paths given");
    }

    let config = BatchConfig {
        output_dir: cli.output,
        concurrency: cli.jobs,
        assume_yes: cli.yes,
        nearest: cli.nearest,
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let gate = PromptGate::new(config.assume_yes);
        let orchestrator = BatchOrchestrator::new(config, gate);

        let shutdown = orchestrator.shutdown_signal();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; finishing in-flight jobs");
                shutdown.store(true, Ordering::Relaxed);
            }
        });

        orchestrator.run(&roots).await.map(|_| ())
    })
}

/// The external engine is a hard requirement; fail fast before any batch
/// work starts.
fn check_tools() -> Result<()> {
    for tool in ["ffmpeg", "ffprobe"] {
        if which::which(tool).is_err() {
            bail!("required tool not found on PATH: {tool}");
        }
    }
    Ok(())
}

/// One path per line, empty line ends the list; nonexistent paths only
/// invalidate their own entry and are re-prompted.
fn collect_inputs_interactively() -> Result<Vec<PathBuf>> {
    println!("Enter input file or folder paths, one per line; empty line to finish:");

    let stdin = std::io::stdin();
    let mut roots = Vec::new();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        let path = PathBuf::from(line);
        if !path.exists() {
            eprintln!("path does not exist: {line}");
            continue;
        }
        roots.push(path);
    }

    Ok(roots)
}
