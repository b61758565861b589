//! `whisper-info`: print the header (and optionally the points) of a file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use whisper_common::Point;
use whisper_storage::{Header, TimeSeries, WhisperFile};
use whisper_tools::cli::{init_tracing, normalize_args};

#[derive(Debug, Parser)]
#[command(name = "whisper-info", about = "Show the layout of a whisper file")]
struct Args {
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Also dump every valid point
    #[arg(long)]
    points: bool,

    /// Fetch the range after this Unix time from the best-fitting archive
    #[arg(long, value_name = "UNIX")]
    from: Option<u32>,

    /// End of the fetched range; defaults to now
    #[arg(long, value_name = "UNIX", requires = "from")]
    until: Option<u32>,

    #[arg(short, long)]
    verbose: bool,

    path: PathBuf,
}

#[derive(Serialize)]
struct Report<'a> {
    path: &'a Path,
    #[serde(flatten)]
    header: &'a Header,
    #[serde(skip_serializing_if = "Option::is_none")]
    points: Option<Vec<Vec<Point>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fetch: Option<TimeSeries>,
}

fn main() -> Result<()> {
    let args = Args::parse_from(normalize_args(std::env::args_os()));
    init_tracing(args.verbose);

    let file = WhisperFile::open_read_only(&args.path)?;
    let points = if args.points {
        let mut archives = Vec::with_capacity(file.header().archives.len());
        for index in 0..file.header().archives.len() {
            let series = file.read_archive(index)?;
            archives.push(series.into_iter().map(|(t, v)| Point::new(t, v)).collect());
        }
        Some(archives)
    } else {
        None
    };

    let fetch = match args.from {
        Some(from) => Some(
            file.fetch(from, args.until.unwrap_or(u32::MAX))
                .with_context(|| format!("fetching from {}", args.path.display()))?,
        ),
        None => None,
    };

    let report = Report {
        path: &args.path,
        header: file.header(),
        points,
        fetch,
    };
    if args.json {
        let out = serde_json::to_string_pretty(&report).context("encoding header")?;
        println!("{out}");
    } else {
        print_text(&report);
    }
    Ok(())
}

fn print_text(report: &Report<'_>) {
    let header = report.header;
    println!("path: {}", report.path.display());
    println!("aggregation method: {}", header.aggregation_method);
    println!("max retention: {}", header.max_retention);
    println!("xFilesFactor: {}", header.x_files_factor);

    for (i, archive) in header.archives.iter().enumerate() {
        println!();
        println!("Archive {i}");
        println!("  offset: {}", archive.offset);
        println!("  precision: {}", archive.precision);
        println!("  points: {}", archive.points);
        println!("  retention: {}", archive.retention());
        println!("  size: {}", archive.size());

        if let Some(points) = report.points.as_ref().and_then(|p| p.get(i)) {
            println!();
            for point in points {
                println!("  {}: {}", point.interval, point.value);
            }
        }
    }

    if let Some(series) = &report.fetch {
        println!();
        println!("Fetch {}..{} step {}", series.from, series.until, series.step);
        for (interval, value) in series.points() {
            match value {
                Some(value) => println!("  {interval}: {value}"),
                None => println!("  {interval}: None"),
            }
        }
    }
}
