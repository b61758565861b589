//! `whisper-create`: allocate a new file from `PRECISION:RETENTION` archive specs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use whisper_common::AggregationMethod;
use whisper_merge::factory;
use whisper_schema::parse_archives;
use whisper_tools::cli::{init_tracing, normalize_args};
use whisper_tools::config::ToolConfig;

#[derive(Debug, Parser)]
#[command(
    name = "whisper-create",
    about = "Create a round-robin time-series file",
    after_help = "Archive specs look like 60:1d or 300:2016. Retention units: s m h d w y."
)]
struct Args {
    /// average, sum, last, max or min
    #[arg(long = "aggregationMethod", visible_alias = "aggregation-method", value_name = "METHOD")]
    aggregation_method: Option<AggregationMethod>,

    /// Fraction of known points needed to roll a window up
    #[arg(long = "xFilesFactor", visible_alias = "x-files-factor", value_name = "F")]
    x_files_factor: Option<f32>,

    /// Extend the file without writing zeroes
    #[arg(long)]
    sparse: bool,

    /// TOML file with defaults for the flags above
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    path: PathBuf,

    #[arg(value_name = "PRECISION:RETENTION")]
    archives: Vec<String>,
}

fn main() {
    let args = Args::parse_from(normalize_args(std::env::args_os()));
    init_tracing(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("Error: {e:#}\n\n{}", Args::command().render_usage());
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = ToolConfig::load_optional(args.config.as_deref())?;
    let specs = if args.archives.is_empty() {
        &config.create.archives
    } else {
        &args.archives
    };
    if specs.is_empty() {
        Args::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "you must specify at least one PRECISION:RETENTION pair",
            )
            .exit();
    }

    let archives = parse_archives(specs)?;
    let options = config
        .create
        .options(args.aggregation_method, args.x_files_factor, args.sparse);

    let file = factory::create(&args.path, &archives, &options)
        .with_context(|| format!("creating {}", args.path.display()))?;
    file.close()?;
    Ok(())
}
