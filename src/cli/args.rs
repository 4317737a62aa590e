//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// makebuildserver - Reproducible Android build-server VM provisioning
///
/// Downloads and verifies build-tool artifacts, converges the build-server
/// VM to the declared configuration, and packages it as a reusable box.
#[derive(Parser, Debug)]
#[command(name = "makebuildserver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Restrict output to warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Destroy the existing VM and rebuild from scratch
    #[arg(long)]
    pub clean: bool,

    /// Skip the artifact cache refresh (use whatever is already cached)
    #[arg(long)]
    pub skip_cache_update: bool,

    /// Keep the packaged box file after it is registered
    #[arg(long)]
    pub keep_box_file: bool,

    /// Configuration file path
    #[arg(short, long, env = "MAKEBUILDSERVER_CONFIG")]
    pub config: Option<PathBuf>,
}
