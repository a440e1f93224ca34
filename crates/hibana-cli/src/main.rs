//! Hibana CLI
//!
//! Command-line interface for chatting, generating images and checking the
//! account behind a Hibana gateway key.

use clap::Parser;
use std::process::ExitCode;

mod cli;
mod commands;
mod output;
mod settings;

use cli::Cli;
use output::OutputFormat;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json);

    let format = OutputFormat::from_json_flag(cli.json);
    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::report_failure(format, &format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing/logging based on verbosity and format.
fn init_tracing(verbose: u8, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(verbose > 1).with_writer(std::io::stderr))
            .init();
    }
}
