//! hearth CLI — the main entry point.
//!
//! Commands:
//! - `serve`           — Run the automation runtime (plus status endpoint)
//! - `mcp`             — Expose the tool suites over stdio JSON-RPC
//! - `evals`           — Run the evaluation scenario catalog
//! - `dump-bug-report` — Write a diagnostic bundle

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "hearth",
    about = "hearth — agentic automation engine for a home-automation hub",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the automation runtime
    Serve {
        /// Override the status endpoint port
        #[arg(long)]
        port: Option<u16>,

        /// Override the notebook directory
        #[arg(long)]
        notebook: Option<PathBuf>,

        /// Validate service calls without contacting the hub
        #[arg(long)]
        test_mode: bool,

        /// Replace the hub with the canned eval fixture
        #[arg(long)]
        eval_mode: bool,
    },

    /// Expose the scheduling and execution tool suites over stdio JSON-RPC
    Mcp {
        /// Validate service calls without contacting the hub
        #[arg(long)]
        test_mode: bool,

        /// Override the notebook directory
        #[arg(long)]
        notebook: Option<PathBuf>,
    },

    /// Run the evaluation scenario catalog
    Evals {
        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Driver override (anthropic, ollama, ...)
        #[arg(long)]
        driver: Option<String>,

        /// Cap the number of scenarios
        #[arg(long)]
        num: Option<usize>,

        /// Mechanical scenarios only (no judge model)
        #[arg(long)]
        quick: bool,
    },

    /// Write the latest diagnostic bundle to a timestamped directory
    DumpBugReport {
        /// Override the database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let outcome = match cli.command {
        Commands::Serve {
            port,
            notebook,
            test_mode,
            eval_mode,
        } => commands::serve::run(port, notebook, test_mode, eval_mode).await,
        Commands::Mcp { test_mode, notebook } => commands::mcp::run(test_mode, notebook).await,
        Commands::Evals {
            model,
            driver,
            num,
            quick,
        } => commands::evals::run(model, driver, num, quick).await,
        Commands::DumpBugReport { db_path } => commands::bug_report::run(db_path).await,
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
