//! Regime inference CLI
//!
//! Reads feature tables from CSV, runs rolling Gaussian-HMM regime inference
//! and writes the committed regime series back out.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use regime_engine::application::regimes::diagnostics::{RegimeStats, regime_stats};
use regime_engine::application::regimes::{RegimeRun, RollingRegimeInference, TracingProgress};
use regime_engine::config::RegimeConfig;
use regime_engine::domain::market::feature_table::FeatureTable;
use regime_engine::infrastructure::persistence::{
    ModelStore, read_feature_table, write_regime_series,
};
use regime_engine::infrastructure::InferenceMetrics;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "Rolling Gaussian-HMM market regime inference", long_about = None)]
struct Cli {
    /// TOML configuration file (REGIME_* variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics after the run
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer regimes for one feature CSV
    Infer {
        /// Feature CSV (timestamp column first)
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV for the regime series
        #[arg(short, long, default_value = "regimes.csv")]
        output: PathBuf,

        /// Save the model active at the end of the run as JSON
        #[arg(long)]
        save_model: Option<PathBuf>,
    },
    /// Infer regimes and print regime statistics
    Diagnose {
        /// Feature CSV (timestamp column first)
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Infer regimes for several feature CSVs in parallel
    Batch {
        /// Feature CSVs
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory receiving one `<stem>_regimes.csv` per input
        #[arg(short, long, default_value = "regimes")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let config = RegimeConfig::load(cli.config.as_deref())?;
    let driver = RollingRegimeInference::new(config.model.clone(), config.rolling.clone())
        .context("Invalid regime configuration")?;
    let metrics = InferenceMetrics::new()?;

    match cli.command {
        Commands::Infer {
            input,
            output,
            save_model,
        } => {
            let table = load_table(&input, config.rolling.window)?;
            let run = run_one(&driver, &metrics, &table, &run_label(&input))?;
            write_regime_series(&output, &run.series)?;

            if let Some(path) = save_model {
                match &run.model {
                    Some(model) => ModelStore::new(path).save_model(model)?,
                    None => warn!("No successful fit during the run, model not saved"),
                }
            }
        }
        Commands::Diagnose { input } => {
            let table = load_table(&input, config.rolling.window)?;
            let run = run_one(&driver, &metrics, &table, &run_label(&input))?;
            let stats = regime_stats(&table, &run.series)?;
            print_stats(&stats, &run);
        }
        Commands::Batch { inputs, output_dir } => {
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;

            let results: Vec<(PathBuf, Result<usize>)> = inputs
                .par_iter()
                .map(|input| {
                    let result = infer_into_dir(&driver, &metrics, input, &output_dir);
                    (input.clone(), result)
                })
                .collect();

            let mut failed = 0;
            for (input, result) in &results {
                match result {
                    Ok(committed) => info!("{}: {} committed rows", input.display(), committed),
                    Err(e) => {
                        failed += 1;
                        warn!("{}: {:#}", input.display(), e);
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} inputs failed", failed, results.len());
            }
        }
    }

    if cli.metrics {
        println!("{}", metrics.render());
    }
    Ok(())
}

/// Load a table and reject inputs shorter than one window.
fn load_table(path: &Path, window: usize) -> Result<FeatureTable> {
    let table = read_feature_table(path)?;
    if table.len() < window {
        bail!(
            "{} has {} rows, fewer than the rolling window of {}",
            path.display(),
            table.len(),
            window
        );
    }
    Ok(table)
}

fn run_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}

fn run_one(
    driver: &RollingRegimeInference,
    metrics: &InferenceMetrics,
    table: &FeatureTable,
    label: &str,
) -> Result<RegimeRun> {
    let mut observer = (
        TracingProgress::new(label, driver.rolling_config().verbose),
        metrics.observer(label),
    );
    let run = driver
        .run_observed(table, &mut observer)
        .with_context(|| format!("Regime inference failed for {}", label))?;
    info!("[{}] {}", label, run.report);
    Ok(run)
}

/// Returns the number of committed rows.
fn infer_into_dir(
    driver: &RollingRegimeInference,
    metrics: &InferenceMetrics,
    input: &Path,
    output_dir: &Path,
) -> Result<usize> {
    let table = load_table(input, driver.rolling_config().window)?;
    let label = run_label(input);
    let run = run_one(driver, metrics, &table, &label)?;
    let output = output_dir.join(format!("{}_regimes.csv", label));
    write_regime_series(&output, &run.series)?;
    Ok(run.series.committed_count())
}

fn print_stats(stats: &RegimeStats, run: &RegimeRun) {
    println!("{}", "=".repeat(60));
    println!("REGIME DIAGNOSTICS");
    println!("{}", "=".repeat(60));
    println!("Run: {}", run.report);
    println!(
        "Rows: {} committed, {} unset",
        run.series.committed_count(),
        run.series.unset_count()
    );

    println!("\nRegime distribution:");
    let committed = run.series.committed_count().max(1) as f64;
    for (state, count) in stats.state_counts.iter().enumerate() {
        println!(
            "  regime {:>2}: {:>7} rows ({:>5.1}%)",
            state,
            count,
            *count as f64 / committed * 100.0
        );
    }

    println!("\nTransition matrix:");
    for row in stats.transition_matrix.rows() {
        let cells: Vec<String> = row.iter().map(|p| format!("{:.3}", p)).collect();
        println!("  [{}]", cells.join(", "));
    }

    println!("\nDurations (rows):");
    for (state, d) in stats.durations.iter().enumerate() {
        match (d.mean, d.median, d.max) {
            (Some(mean), Some(median), Some(max)) => println!(
                "  regime {:>2}: {} runs, mean {:.1}, median {:.1}, max {}",
                state, d.count_runs, mean, median, max
            ),
            _ => println!("  regime {:>2}: never observed", state),
        }
    }

    println!("\nPer-state feature means:");
    for (state, means) in stats.per_state_means.iter().enumerate() {
        let Some(means) = means else {
            continue;
        };
        println!("  regime {}:", state);
        for (name, value) in stats.feature_names.iter().zip(means) {
            println!("    {:<28} {:>12.6}", name, value);
        }
    }
}
