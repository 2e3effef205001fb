use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use pipe_analysis::audit::{AuditLog, CsvAuditLog, RouteChangeRequest};
use pipe_analysis::batch::{latest_batch, load_batches, DirectorySource, LoadOutcome};
use pipe_analysis::export::to_csv_bytes;
use pipe_analysis::sync::{replace_collection, JsonFileStore};
use pipe_analysis::{
    run, AnalysisConfig, AnalysisError, BatchSource, HealthTier, Report, Result, Session,
    SortOrder,
};

#[derive(Parser)]
#[command(name = "pipe-analysis")]
#[command(about = "Client code-wise payment gateway and payment mode analysis")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, default_value = "pipe_analysis.toml")]
    config: PathBuf,
    /// Folder holding one <batch>.csv per batch, overrides the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available batches
    List,
    /// Aggregate the selected batches and show the result
    Analyze {
        /// Batches to include, defaults to the latest one
        #[arg(long = "batch")]
        batches: Vec<String>,
        /// Only show rows of this tier (healthy, warning, critical)
        #[arg(long)]
        tier: Option<HealthTier>,
        /// Sort by success rate (asc, desc)
        #[arg(long, default_value = "none")]
        sort: SortOrder,
        /// Only show critical rows
        #[arg(long)]
        alerts: bool,
        /// Write the view as CSV to this file, or into this folder under its download name
        #[arg(long)]
        out: Option<PathBuf>,
        /// Replace the summary collection in this JSON document store with the view
        #[arg(long)]
        sync: Option<PathBuf>,
    },
    /// Record a route change request for one client route
    ChangeRoute {
        #[arg(long = "batch")]
        batches: Vec<String>,
        #[arg(long)]
        client_code: String,
        #[arg(long)]
        route: String,
        #[arg(long)]
        mode: String,
        #[arg(long)]
        new_route: String,
        #[arg(long)]
        new_mode: String,
        #[arg(long)]
        remarks: String,
        /// CSV audit log to append to
        #[arg(long, default_value = "route_changes.csv")]
        audit: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        if e.is_informational() {
            println!("{}", e);
            return;
        }
        error!("{}", e);
        std::process::exit(1);
    }
}

fn execute(cli: Cli) -> Result<()> {
    let mut config = AnalysisConfig::load(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let source = DirectorySource::new(&config.data_dir);

    match cli.command {
        Commands::List => {
            for id in source.list_batches()? {
                println!("{}", id);
            }
            Ok(())
        }
        Commands::Analyze {
            batches,
            tier,
            sort,
            alerts,
            out,
            sync,
        } => {
            let outcome = load(&source, batches)?;
            let mut session = Session::default().sort_by(sort);
            if let Some(tier) = tier {
                session = session.select_tier(tier);
            }
            if alerts {
                session = session.select_tier(HealthTier::Critical);
            }
            let report = run(&outcome.batches, &config, &session)?;
            print_report(&report, &outcome);

            if let Some(out) = out {
                let path = if out.is_dir() {
                    out.join(report.export_name())
                } else {
                    out
                };
                fs::write(&path, to_csv_bytes(&report.view)?)?;
                println!("summary written to {}", path.display());
            }
            if let Some(store_path) = sync {
                let mut store = JsonFileStore::new(store_path);
                match replace_collection(&mut store, &config.collection, &report.view) {
                    Ok(done) => println!(
                        "synced '{}': {} replaced by {} documents",
                        config.collection, done.deleted, done.written
                    ),
                    Err(e) => error!("{}", e),
                }
            }
            Ok(())
        }
        Commands::ChangeRoute {
            batches,
            client_code,
            route,
            mode,
            new_route,
            new_mode,
            remarks,
            audit,
        } => {
            let outcome = load(&source, batches)?;
            let report = run(&outcome.batches, &config, &Session::default())?;
            let key = report
                .find_route(&client_code, &route, &mode)
                .map(|row| row.key())
                .ok_or_else(|| AnalysisError::InvalidField {
                    field: "client_code/route/mode".to_string(),
                    value: format!("{}/{}/{}", client_code, route, mode),
                })?;
            let session = Session::default().select_row(key);
            let selected = report
                .selected(&session)
                .map(|row| row.key())
                .ok_or_else(|| AnalysisError::InvalidField {
                    field: "selected".to_string(),
                    value: format!("{}/{}/{}", client_code, route, mode),
                })?;
            let request =
                RouteChangeRequest::for_row(&selected, &new_route, &new_mode, &remarks, Utc::now())?;
            CsvAuditLog::new(audit).append(&request)?;
            println!(
                "route change recorded for {}: {}/{} -> {}/{}",
                request.client_code,
                request.old_route,
                request.old_mode,
                request.new_route,
                request.new_mode
            );
            Ok(())
        }
    }
}

fn load(source: &dyn BatchSource, mut batches: Vec<String>) -> Result<LoadOutcome> {
    if batches.is_empty() {
        match latest_batch(source)? {
            Some(latest) => {
                info!("no batch selected, using latest {}", latest);
                batches.push(latest);
            }
            None => warn!("no batch files found"),
        }
    }
    let outcome = load_batches(source, &batches)?;
    for failure in &outcome.failures {
        error!("skipped: {}", failure);
    }
    Ok(outcome)
}

fn print_report(report: &Report, outcome: &LoadOutcome) {
    let totals = &report.totals;
    println!(
        "total {}, success {} ({} %), failed {} ({} %)",
        totals.total, totals.success, totals.success_pct, totals.failed, totals.failed_pct
    );
    println!(
        "healthy {}, warning {}, critical {}",
        report.summary.healthy, report.summary.warning, report.summary.critical
    );
    println!();
    println!(
        "{:<24} {:<12} {:<12} {:<12} {:>8} {:>8} {:>8} {:>9}  {}",
        "client_name", "client_code", "pg_pay_mode", "payment_mode", "success", "failed", "total", "success%", "tier"
    );
    for row in &report.view {
        println!(
            "{:<24} {:<12} {:<12} {:<12} {:>8} {:>8} {:>8} {:>9.2}  {}",
            row.client_name,
            row.client_code,
            row.route,
            row.payment_mode,
            row.success_count,
            row.failed_count,
            row.total,
            row.success_rate,
            row.health_tier.map(|t| t.to_string()).unwrap_or_default()
        );
    }
    println!();
    println!("loaded files: {}", outcome.summary());
}
