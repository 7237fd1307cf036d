mod commands;
mod config;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::lending::{AppraiseArgs, ExtractArgs, PromptArgs, ScheduleArgs};

/// Loan repayment schedules and credit appraisal
#[derive(Parser)]
#[command(
    name = "lap",
    version,
    about = "Loan repayment schedules and credit appraisal",
    long_about = "A CLI for building loan repayment schedules and appraising repayment \
                  capacity with decimal precision. Supports equal-principal and \
                  equal-instalment amortisation, DSR/DSCR metrics, LTV checks and \
                  field extraction from plain-text loan applications."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a month-by-month repayment schedule
    Schedule(ScheduleArgs),
    /// Appraise a loan: schedule, DSR, DSCR, surplus and LTV
    Appraise(AppraiseArgs),
    /// Extract loan fields from a plain-text application
    Extract(ExtractArgs),
    /// Render the narrative-analysis prompt for an appraisal or document
    AnalysisPrompt(PromptArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("loan_appraisal_core=debug,lap=debug"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("loan_appraisal_core=warn,lap=warn"))
    };
    // stdout carries the result; logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Schedule(args) => commands::lending::run_schedule(args, &config),
        Commands::Appraise(args) => commands::lending::run_appraise(args, &config),
        Commands::Extract(args) => commands::lending::run_extract(args, &config),
        Commands::AnalysisPrompt(args) => commands::lending::run_analysis_prompt(args, &config),
        Commands::Version => {
            println!("lap {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
