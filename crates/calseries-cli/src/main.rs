//! CLI tool for locating, checking and merging calibrated CSV files.

mod args;
mod error;
mod preview;

use std::path::{Path, PathBuf};

use calseries_core::{
    QueryConfig, TimeWindow,
    continuity::continuity_report,
    locate::locate,
    output::{output_file_name, write_csv},
    read_calibrated_files,
};
use chrono::Duration;
use clap::{Parser, Subcommand};
use log::info;
use rayon::prelude::*;
use snafu::{OptionExt, ResultExt, ensure};

use crate::{
    args::QueryArgs,
    error::{
        CliResult, DiscontinuousSnafu, InvalidSplitSnafu, LocateSnafu, OutputSnafu,
        QuerySnafu, SplitWithoutOutputDirSnafu, ThreadPoolSnafu, WindowsFailedSnafu,
    },
    preview::render_preview,
};

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the files selected for a query window, one per line
    Locate {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Locate files and report gaps between them (exit 1 when discontinuous)
    Check {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Merge the selected files into one table
    Merge {
        #[command(flatten)]
        query: QueryArgs,

        /// Write the merged table to this CSV file instead of printing a preview
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,

        /// Run one query per sub-window of this many minutes
        #[arg(long = "split-minutes")]
        split_minutes: Option<i64>,

        /// Directory receiving one file per sub-window (with --split-minutes)
        #[arg(long = "output-dir")]
        output_dir: Option<PathBuf>,

        /// Root name used for files written to --output-dir
        #[arg(long = "output-root", default_value = "merged")]
        output_root: String,

        /// Worker threads for --split-minutes (default: one per core)
        #[arg(long)]
        jobs: Option<usize>,
    },
}

#[derive(Debug, Parser)]
#[command(name = "calseries", version, about)]
struct Cli {
    /// Log progress at info level (RUST_LOG overrides)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn cmd_locate(query: &QueryArgs) -> CliResult<()> {
    let cfg = query.query_config()?;
    let window = query.window(&cfg)?;
    let candidates = locate(&query.folder, &cfg, &window).context(LocateSnafu)?;
    for path in &candidates {
        println!("{}", path.display());
    }
    Ok(())
}

fn cmd_check(query: &QueryArgs) -> CliResult<()> {
    let cfg = query.query_config()?;
    let window = query.window(&cfg)?;
    let candidates = locate(&query.folder, &cfg, &window).context(LocateSnafu)?;
    let report = continuity_report(candidates.paths());

    println!("{} candidate(s) for {window}", candidates.len());
    if let Some(cadence) = report.cadence {
        println!("cadence: {} min", cadence.num_minutes());
    }
    if let Some(gap) = &report.first_violation {
        println!(
            "first gap: {} -> {} ({} min)",
            gap.before.display(),
            gap.after.display(),
            gap.size.num_minutes()
        );
    }

    ensure!(
        report.is_continuous(),
        DiscontinuousSnafu {
            violations: report.violations
        }
    );
    println!("continuous");
    Ok(())
}

/// Query one sub-window and write it under `dir`. `None` when it had no row.
fn merge_window(
    folder: &Path,
    cfg: &QueryConfig,
    window: &TimeWindow,
    dir: &Path,
    output_root: &str,
) -> CliResult<Option<PathBuf>> {
    let merged =
        read_calibrated_files(folder, window.start(), window.stop(), cfg).context(QuerySnafu)?;
    if merged.is_empty() {
        return Ok(None);
    }
    let path = dir.join(output_file_name(output_root, window, cfg.substructure_id));
    write_csv(&merged, &path).context(OutputSnafu)?;
    Ok(Some(path))
}

struct SplitArgs<'a> {
    minutes: i64,
    dir: &'a Path,
    output_root: &'a str,
    jobs: Option<usize>,
}

fn cmd_merge_split(query: &QueryArgs, split: SplitArgs<'_>) -> CliResult<()> {
    ensure!(split.minutes > 0, InvalidSplitSnafu { minutes: split.minutes });
    let step = Duration::try_minutes(split.minutes)
        .context(InvalidSplitSnafu { minutes: split.minutes })?;

    let cfg = query.query_config()?;
    let windows = query.window(&cfg)?.split(step);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(split.jobs.unwrap_or(0))
        .build()
        .context(ThreadPoolSnafu)?;

    let results: Vec<(TimeWindow, CliResult<Option<PathBuf>>)> = pool.install(|| {
        windows
            .par_iter()
            .map(|w| {
                (
                    *w,
                    merge_window(&query.folder, &cfg, w, split.dir, split.output_root),
                )
            })
            .collect()
    });

    let total = results.len();
    let mut failed = 0;
    for (window, result) in results {
        match result {
            Ok(Some(path)) => println!("{window}: wrote {}", path.display()),
            Ok(None) => println!("{window}: no rows"),
            Err(e) => {
                failed += 1;
                eprintln!("{window}: {e}");
            }
        }
    }
    info!("{} of {total} window(s) merged", total - failed);

    ensure!(failed == 0, WindowsFailedSnafu { failed, total });
    Ok(())
}

fn cmd_merge(query: &QueryArgs, output: Option<&Path>, max_rows: usize) -> CliResult<()> {
    let cfg = query.query_config()?;
    let window = query.window(&cfg)?;
    let merged = read_calibrated_files(&query.folder, window.start(), window.stop(), &cfg)
        .context(QuerySnafu)?;

    match output {
        Some(path) => {
            write_csv(&merged, path).context(OutputSnafu)?;
            println!("{} row(s) written to {}", merged.num_rows(), path.display());
        }
        None => println!("{}", render_preview(&merged, max_rows)?),
    }
    Ok(())
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Command::Locate { query } => cmd_locate(&query),
        Command::Check { query } => cmd_check(&query),
        Command::Merge {
            query,
            output,
            max_rows,
            split_minutes,
            output_dir,
            output_root,
            jobs,
        } => match split_minutes {
            Some(minutes) => {
                let dir = output_dir.context(SplitWithoutOutputDirSnafu)?;
                cmd_merge_split(
                    &query,
                    SplitArgs {
                        minutes,
                        dir: &dir,
                        output_root: &output_root,
                        jobs,
                    },
                )
            }
            None => cmd_merge(&query, output.as_deref(), max_rows),
        },
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
