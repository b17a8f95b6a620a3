use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

mod aggregate;
mod config;
mod error;
mod export;
mod forecast;
mod ingest;
mod model;
mod models;
mod observer;
mod pipeline;
mod report;
mod seasonality;
mod summary;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::observer::{LogObserver, NoopObserver, PipelineObserver};
use crate::pipeline::{Pipeline, PipelineResult};

#[derive(Parser)]
#[command(name = "contact-forecast")]
#[command(about = "Hourly contact volume aggregation and short-horizon forecasting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct InputArgs {
    /// Contact export to process, or `-` to read it from stdin
    #[arg(long)]
    csv: PathBuf,
    /// TOML file with column names and model settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Days to forecast past the last observation
    #[arg(long)]
    horizon_days: Option<u32>,
    /// Suppress stage progress logging
    #[arg(long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and emit the JSON response
    Process {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write the hourly grid, hourly totals and predictions as CSV files
    Export {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "export")]
        out_dir: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print the overview statistics without fitting a model
    Overview {
        #[command(flatten)]
        input: InputArgs,
    },
}

fn build_pipeline(input: &InputArgs) -> anyhow::Result<Pipeline> {
    let mut config = match &input.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(horizon_days) = input.horizon_days {
        config.horizon_days = horizon_days;
    }

    let observer: Arc<dyn PipelineObserver + Send + Sync> = if input.quiet {
        Arc::new(NoopObserver)
    } else {
        Arc::new(LogObserver)
    };
    Ok(Pipeline::new(config)?.with_observer(observer))
}

fn reads_stdin(csv: &Path) -> bool {
    csv == Path::new("-")
}

/// Runs the pipeline on a blocking worker; model fitting is CPU-bound.
async fn run_pipeline(input: &InputArgs) -> anyhow::Result<Result<PipelineResult, PipelineError>> {
    let pipeline = build_pipeline(input)?;
    let csv = input.csv.clone();
    tokio::task::spawn_blocking(move || {
        if reads_stdin(&csv) {
            pipeline.run_reader(std::io::stdin().lock())
        } else {
            pipeline.run_path(&csv)
        }
    })
    .await
    .context("pipeline worker failed")
}

fn write_or_print(out: Option<&Path>, contents: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, contents)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Results written to {}.", path.display());
        }
        None => println!("{contents}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observer::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Process { input, out } => match run_pipeline(&input).await? {
            Ok(result) => {
                let body = serde_json::to_string_pretty(&export::response_json(&result.summary)?)?;
                write_or_print(out.as_deref(), &body)?;
            }
            Err(err) => {
                log::error!("Processing {} failed: {err}", input.csv.display());
                let body = serde_json::to_string_pretty(&export::error_json(&err)?)?;
                write_or_print(out.as_deref(), &body)?;
                return Err(err.into());
            }
        },
        Commands::Export { input, out_dir } => {
            let result = run_pipeline(&input).await??;
            let written = export::write_all(&out_dir, &result)?;
            for path in written {
                println!("Wrote {}.", path.display());
            }
        }
        Commands::Report { input, out } => {
            let result = run_pipeline(&input).await??;
            let report = report::build_report(&result);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Overview { input } => {
            let pipeline = build_pipeline(&input)?;
            let normalized = if reads_stdin(&input.csv) {
                pipeline.normalize(std::io::stdin().lock())?
            } else {
                pipeline.normalize_path(&input.csv)?
            };
            let overview = pipeline.overview(&normalized)?;
            println!(
                "{} rows from {} to {} ({} days)",
                overview.total_rows, overview.min_date, overview.max_date, overview.coverage_days
            );
            println!("Partners: {}", overview.programs.join(", "));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_reads_from_stdin() {
        let cli = Cli::parse_from(["contact-forecast", "process", "--csv", "-", "--quiet"]);
        let Commands::Process { input, out } = cli.command else {
            panic!("expected process command");
        };
        assert!(reads_stdin(&input.csv));
        assert!(input.quiet);
        assert!(out.is_none());
        assert!(!reads_stdin(Path::new("contacts.csv")));
    }
}
