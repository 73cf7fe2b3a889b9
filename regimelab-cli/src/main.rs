//! RegimeLab CLI — validate configs and run regime-aware backtests.
//!
//! Commands:
//! - `run` — execute a backtest run from a TOML config and write CSV artifacts
//! - `validate` — parse and validate a config without touching any data

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regimelab_runner::config::RunConfig;
use regimelab_runner::runner::{run, RunReport};

#[derive(Parser)]
#[command(
    name = "regimelab",
    about = "RegimeLab CLI — regime-conditioned backtesting engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest run from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Directory holding per-symbol CSV data files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Output directory for CSV artifacts.
        #[arg(long, default_value = "results")]
        out_dir: PathBuf,

        /// Print per-symbol summaries as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Parse and validate a config file without running anything.
    Validate {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Run {
            config,
            data_dir,
            out_dir,
            json,
        } => run_cmd(&config, &data_dir, &out_dir, json),
        Commands::Validate { config } => validate_cmd(&config),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_cmd(config_path: &PathBuf, data_dir: &PathBuf, out_dir: &PathBuf, json: bool) -> Result<ExitCode> {
    let config = RunConfig::from_toml_path(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let report = run(&config, data_dir, out_dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.summaries)?);
    } else {
        print_report(&report);
    }

    println!("Artifacts written to: {}", out_dir.display());

    // A partially failed run still writes artifacts for the symbols that
    // succeeded, but exits nonzero so scripts notice.
    if report.failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn validate_cmd(config_path: &PathBuf) -> Result<ExitCode> {
    let config = RunConfig::from_toml_path(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    println!("OK: {} ({} symbols)", config.run_id(), config.symbols.len());
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &RunReport) {
    println!("Run: {}", report.run_id);
    println!();
    println!(
        "{:<8} {:>7} {:>7} {:>8} {:>12} {:>9} {:>8} {:>8}",
        "Symbol", "Bars", "Trades", "Win %", "Net PnL", "Ret %", "MaxDD %", "Blocked"
    );
    println!("{}", "-".repeat(74));
    for s in &report.summaries {
        println!(
            "{:<8} {:>7} {:>7} {:>8.1} {:>12.2} {:>9.2} {:>8.2} {:>8}",
            s.symbol,
            s.bar_count,
            s.trade_count,
            s.win_rate_pct,
            s.total_net_pnl,
            s.total_return_pct,
            s.max_drawdown_pct,
            s.blocked_total(),
        );
    }

    for failure in &report.failures {
        eprintln!("Failed: {} ({})", failure.symbol, failure.error);
    }
}
