//! makebuildserver - Reproducible Android build-server VM provisioning
//!
//! CLI entry point: load configuration, then run the pipeline.

use clap::Parser;
use console::style;
use makebuildserver::cli::Cli;
use makebuildserver::config::ConfigManager;
use makebuildserver::error::BuildServerResult;
use makebuildserver::pipeline::{self, RunOptions};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> BuildServerResult<()> {
    let cli = Cli::parse();

    // -q = warnings only, default = info, -v = debug, -vv+ = trace
    let filter = if cli.quiet {
        EnvFilter::new("makebuildserver=warn")
    } else {
        match cli.verbose {
            0 => EnvFilter::new("makebuildserver=info"),
            1 => EnvFilter::new("makebuildserver=debug"),
            _ => EnvFilter::new("makebuildserver=trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    let opts = RunOptions {
        clean: cli.clean,
        skip_cache_update: cli.skip_cache_update,
        keep_box_file: cli.keep_box_file,
        verbose: cli.verbose,
    };

    pipeline::run(&opts, &config).await
}
