//! todo-ops - operations tooling for the Todo web application.
//!
//! Builds the Docker image with strategy fallback, smoke tests it, and
//! manages the Azure AD identity and GitHub secrets used by its workflows.

#![deny(clippy::all)]

mod cli;
mod commands;
mod config;
mod docker;
mod error;
mod github;
mod identity;
mod runner;
mod tool;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use commands::output;
use config::Config;

fn main() {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        // .env file is optional - only warn if it exists but is unreadable
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging.level, cli.verbose);
    debug!("Starting {} v{}", config.app.name, env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(commands::dispatch(cli.command, &config));

    if let Err(e) = result {
        debug!("command failed: {:?}", e);
        output::failure(e.user_message());
        eprintln!("     {}", e);
        output::checklist(&e.troubleshooting());
        std::process::exit(1);
    }
}

/// Initialize tracing/logging on stderr.
///
/// `RUST_LOG` wins over the configured level; `--verbose` forces debug.
fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}
