mod config;
mod persistence;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use engine_logging::{engine_error, engine_info, engine_warn, LogDestination};
use log::LevelFilter;
use migrator_core::parse_url_list;
use migrator_engine::{LogSink, Pipeline};

use crate::persistence::LastRun;

/// Migrate a list of pages into an import file with local images.
#[derive(Debug, Parser)]
#[command(name = "migrator", version, about)]
struct Args {
    /// Newline-delimited URL list. A URL may be followed by `post` or `page`.
    urls: PathBuf,

    /// Pipeline settings (RON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Classification selectors and manual mapping (JSON).
    #[arg(long)]
    classification: Option<PathBuf>,

    /// Link rewrite table (JSON).
    #[arg(long)]
    links: Option<PathBuf>,

    /// Output directory. Overrides the config file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Reuse raw documents already in the output directory.
    #[arg(long)]
    resume: bool,

    /// Also write the log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            engine_error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(args: &Args) {
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    match &args.log_file {
        Some(path) => engine_logging::initialize(LogDestination::Both, level, path),
        None => engine_logging::initialize(LogDestination::Terminal, level, Path::new("")),
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = config::resolve(
        args.config.as_deref(),
        args.classification.as_deref(),
        args.links.as_deref(),
    )?;
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if args.resume {
        config.fetch.reuse_cached = true;
    }

    let text = fs::read_to_string(&args.urls)
        .with_context(|| format!("could not read URL list {}", args.urls.display()))?;
    let parsed = parse_url_list(&text);
    if parsed.skipped_invalid > 0 {
        engine_warn!("Ignored {} invalid URLs", parsed.skipped_invalid);
    }
    if parsed.skipped_duplicates > 0 {
        engine_info!("Ignored {} duplicate URLs", parsed.skipped_duplicates);
    }
    if parsed.unknown_hints > 0 {
        engine_warn!("Ignored {} unknown type hints", parsed.unknown_hints);
    }

    let output_dir = config.output_dir.clone();
    if let Some(previous) = persistence::load_last_run(&output_dir) {
        engine_info!(
            "Previous run finished {} with {} rows",
            previous.finished_utc,
            previous.export_rows
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start async runtime")?;
    let report = runtime.block_on(Pipeline::new(config).run(&parsed.entries, &LogSink))?;

    for summary in report.summaries() {
        engine_info!("{}", summary);
    }
    engine_info!(
        "Export written to {} ({} posts, {} pages)",
        report.export.output_path.display(),
        report.export.posts,
        report.export.pages
    );

    let finished = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    persistence::save_last_run(
        &output_dir,
        &LastRun::from_report(&report, parsed.entries.len(), finished),
    );
    Ok(())
}
