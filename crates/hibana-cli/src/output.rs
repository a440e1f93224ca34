//! Output formatting utilities for the CLI.

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use hibana_sdk::{BalanceStatus, Usage};
use serde::Serialize;
use std::io::{self, Write};
use std::time::Duration;

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Create an output format from a JSON flag.
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Print a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message.
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a key-value pair.
pub fn key_value(key: &str, value: &str) {
    println!("  {}: {}", key.bold(), value);
}

/// Print a section header.
pub fn section(title: &str) {
    println!("\n{}", title.bold().underline());
}

/// Print JSON output.
pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let output = serde_json::to_string_pretty(value)?;
    println!("{output}");
    Ok(())
}

/// Create a spinner for long-running operations.
pub fn spinner(message: &str) -> indicatif::ProgressBar {
    let spinner = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Rows as a rounded table. Callers report empty results themselves.
pub fn table<T: tabled::Tabled>(rows: &[T]) {
    use tabled::{settings::Style, Table};

    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print streaming text output.
pub fn stream_text(text: &str) {
    print!("{text}");
    io::stdout().flush().ok();
}

/// Print a newline for streaming output.
pub fn stream_newline() {
    println!();
}

/// Print token usage as a section.
pub fn usage(usage: &Usage) {
    section("Token Usage");
    key_value("Prompt", &usage.prompt_tokens.to_string());
    key_value("Completion", &usage.completion_tokens.to_string());
    key_value("Total", &usage.total_tokens.to_string());
}

/// Balance status with its traffic-light color.
pub fn balance_status(status: BalanceStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        BalanceStatus::Healthy => label.green().bold(),
        BalanceStatus::Low => label.yellow().bold(),
        BalanceStatus::Critical => label.red().bold(),
    }
}

/// Format bytes as a human-readable size.
pub fn format_bytes(bytes: u64) -> String {
    bytesize::ByteSize(bytes).to_string()
}

/// Format a duration as a human-readable string, to millisecond precision.
pub fn format_duration(duration: Duration) -> String {
    let rounded = Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
    humantime::format_duration(rounded).to_string()
}

/// Format a timestamp as a human-readable string.
pub fn format_timestamp(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp.map_or_else(
        || "unknown".to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Envelope every `--json` run prints exactly once on stdout.
#[derive(Debug, Serialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Pretty-print the envelope to stdout.
    pub fn emit(&self) -> anyhow::Result<()> {
        json(self)
    }
}

impl CommandResult<()> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Report a failed run: an error envelope on stdout for `--json`, a marked
/// line on stderr otherwise.
pub fn report_failure(format: OutputFormat, message: &str) {
    match format {
        OutputFormat::Json => {
            // Nothing more can be reported if stdout itself is gone.
            let _ = CommandResult::failure(message).emit();
        }
        OutputFormat::Text => error(message),
    }
}
