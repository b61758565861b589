//! `whisper-aggregate`: fold every file matching a glob into one destination.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use whisper_common::MergeMode;
use whisper_merge::Orchestrator;
use whisper_tools::cli::{init_tracing, normalize_args};
use whisper_tools::config::ToolConfig;

#[derive(Debug, Parser)]
#[command(
    name = "whisper-aggregate",
    about = "Aggregate many whisper files into one",
    after_help = "Running twice over the same sources adds their values twice."
)]
struct Args {
    /// sum adds values; delta adds the non-negative change between points
    #[arg(long, value_name = "MODE")]
    mode: Option<MergeMode>,

    /// Fail if DEST already exists instead of adding to it
    #[arg(long = "no-reuse")]
    no_reuse: bool,

    /// TOML file with an [aggregate] section
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    /// Destination file; created from the first source when missing
    dest: PathBuf,

    /// Glob selecting the source files
    pattern: String,
}

fn main() -> Result<()> {
    let args = Args::parse_from(normalize_args(std::env::args_os()));
    init_tracing(args.verbose);

    let mut config = ToolConfig::load_optional(args.config.as_deref())?.aggregate;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if args.no_reuse {
        config.reuse_destination = false;
    }

    let mut orchestrator = Orchestrator::new(config);
    let report = orchestrator
        .run_with_progress(&args.dest, &args.pattern, |_, path| {
            println!("Source file: {}", path.display());
        })
        .with_context(|| format!("aggregating {} into {}", args.pattern, args.dest.display()))?;

    info!(
        dest = %report.destination.display(),
        sources = report.sources.len(),
        created = report.created_destination,
        mode = %orchestrator.config().mode,
        "aggregation finished"
    );
    Ok(())
}
