//! OS Monitor Command Line Interface
//!
//! # Usage
//!
//! ```bash
//! # Consolidate today's extract on top of the previous run; closed intervals
//! # are read back from relatorios/historico_status.csv
//! os_monitor consolidate "uploads/Base 04-03-2024.csv" \
//!     --snapshot relatorios/monitoramento.csv --output relatorios
//!
//! # Re-consolidate a set of extracts from scratch
//! os_monitor consolidate uploads/*.csv --targets config/metas.csv
//!
//! # Headline figures and rankings of an existing consolidated table
//! os_monitor summary --snapshot relatorios/monitoramento.csv
//! ```
//!
//! Logs go to stderr (`RUST_LOG=os_monitor=debug` for per-transition detail).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use os_monitor::calendar::ContinuationPolicy;
use os_monitor::config::MonitorConfig;
use os_monitor::io::{load_targets, read_snapshot, CsvDirectorySink};
use os_monitor::pipeline::{consolidate, ConsolidationInputs, ConsolidationOutcome};
use os_monitor::runner;

#[derive(Parser)]
#[command(name = "os_monitor")]
#[command(version)]
#[command(about = "Consolidates service-order status extracts into delay reports")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (falls back to config/os_monitor.yaml)
    #[arg(long, short, global = true, env = "OS_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,

    /// How many ranking rows to print
    #[arg(long, global = true, default_value_t = 10)]
    top: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Consolidate extracts and write the report tables
    Consolidate {
        /// Extract files; the reference date is read from each file name
        #[arg(required = true)]
        batches: Vec<PathBuf>,

        /// Previous consolidated table to resume from
        #[arg(long, short)]
        snapshot: Option<PathBuf>,

        /// Interval history of the previous run (defaults to the one next to the snapshot)
        #[arg(long)]
        history: Option<PathBuf>,

        /// Status → target table
        #[arg(long, short)]
        targets: Option<PathBuf>,

        /// Directory the report is written to
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Day counting for an unchanged status: flat or elapsed
        #[arg(long)]
        continuation: Option<ContinuationPolicy>,
    },

    /// Summarize an existing consolidated table without new extracts
    Summary {
        /// Consolidated table to summarize
        #[arg(long, short)]
        snapshot: PathBuf,

        /// Status → target table
        #[arg(long, short)]
        targets: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "os_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Consolidate {
            batches,
            snapshot,
            history,
            targets,
            output,
            continuation,
        } => load_config(cli.config).and_then(|mut config| {
            if let Some(path) = snapshot {
                config.snapshot_path = Some(path);
            }
            if let Some(path) = history {
                config.history_path = Some(path);
            }
            if let Some(path) = targets {
                config.targets_path = path;
            }
            if let Some(dir) = output {
                config.output_dir = dir;
            }
            if let Some(policy) = continuation {
                config.continuation = policy;
            }
            cmd_consolidate(&config, &batches, cli.format, cli.top)
        }),
        Commands::Summary { snapshot, targets } => {
            load_config(cli.config).and_then(|mut config| {
                if let Some(path) = targets {
                    config.targets_path = path;
                }
                cmd_summary(&config, snapshot, cli.format, cli.top)
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
            } else {
                eprintln!("{}: {:#}", "error".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<MonitorConfig> {
    MonitorConfig::load(path.as_deref()).context("loading configuration")
}

fn cmd_consolidate(
    config: &MonitorConfig,
    batches: &[PathBuf],
    format: OutputFormat,
    top: usize,
) -> anyhow::Result<()> {
    let mut sink = CsvDirectorySink::new(&config.output_dir);
    let outcome = runner::run(config, batches, &mut sink).with_context(|| {
        format!(
            "consolidating {} extract(s) into {}",
            batches.len(),
            config.output_dir.display()
        )
    })?;

    print_outcome(&outcome, format, top)?;
    if format == OutputFormat::Pretty {
        println!(
            "{} Report written to {}",
            "OK".green().bold(),
            sink.dir().display()
        );
    }
    Ok(())
}

fn cmd_summary(
    config: &MonitorConfig,
    snapshot: PathBuf,
    format: OutputFormat,
    top: usize,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        snapshot.exists(),
        "snapshot {} does not exist",
        snapshot.display()
    );

    let (targets, mut diagnostics) = load_targets(&config.targets_path)
        .with_context(|| format!("loading targets from {}", config.targets_path.display()))?;
    let (entries, mut found) = read_snapshot(&snapshot)
        .with_context(|| format!("reading snapshot {}", snapshot.display()))?;
    diagnostics.append(&mut found);

    let inputs = ConsolidationInputs {
        snapshot: entries,
        targets,
        diagnostics,
        ..Default::default()
    };
    let outcome = consolidate(inputs, &config.engine_options())?;
    print_outcome(&outcome, format, top)
}

fn print_outcome(
    outcome: &ConsolidationOutcome,
    format: OutputFormat,
    top: usize,
) -> anyhow::Result<()> {
    let report = &outcome.report;
    let summary = report.summary();

    if format == OutputFormat::Json {
        let document = serde_json::json!({
            "summary": summary,
            "applied_batches": outcome.applied_batches,
            "location_ranking": report.location_ranking.iter().take(top).collect::<Vec<_>>(),
            "entity_ranking": report.entity_ranking.iter().take(top).collect::<Vec<_>>(),
            "status_ranking": report.status_ranking.iter().take(top).collect::<Vec<_>>(),
            "diagnostics": outcome.diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    let as_of = summary
        .as_of
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("{}: {}", "As of".cyan().bold(), as_of);
    println!(
        "  {} entities ({} open, {} closed), {} over target",
        summary.entities,
        summary.open_entities,
        summary.closed_entities,
        summary.breaching_entities.to_string().red().bold()
    );
    if !outcome.applied_batches.is_empty() {
        let dates: Vec<String> = outcome
            .applied_batches
            .iter()
            .map(|d| d.to_string())
            .collect();
        println!("  batches applied: {}", dates.join(", "));
    }

    if !report.location_ranking.is_empty() {
        println!("\n{}", "Locations over target".yellow().bold());
        for row in report.location_ranking.iter().take(top) {
            println!(
                "  {:<16} {:>5} OS  {:>6} days",
                row.location, row.breaching_entities, row.total_days_over_target
            );
        }
    }

    if !report.status_ranking.is_empty() {
        println!("\n{}", "Statuses over target".yellow().bold());
        for row in report.status_ranking.iter().take(top) {
            println!(
                "  {:<24} {:>5} OS  {:>6} days",
                row.status.as_str(),
                row.breaching_entities,
                row.total_days_over_target
            );
        }
    }

    if !report.entity_ranking.is_empty() {
        println!("\n{}", "Orders most over target".yellow().bold());
        for row in report.entity_ranking.iter().take(top) {
            println!(
                "  {:<12} {:<10} {:<24} {:>4}/{:<4} +{}",
                row.entity_id.as_str(),
                row.location.as_deref().unwrap_or("-"),
                row.status.as_str(),
                row.days_in_status,
                row.target,
                row.days_over_target.to_string().red()
            );
        }
    }

    if !outcome.diagnostics.is_empty() {
        println!(
            "\n{} ({})",
            "Diagnostics".yellow().bold(),
            outcome.diagnostics.len()
        );
        for diagnostic in &outcome.diagnostics {
            let marker = if diagnostic.drops_data() {
                "skipped".red()
            } else {
                "notice".yellow()
            };
            println!("  [{}] {}", marker, diagnostic);
        }
    }

    Ok(())
}
