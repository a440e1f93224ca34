//! Compare command - one prompt, several models, side by side.

use anyhow::{bail, Result};
use clap::Args;
use hibana_sdk::{fastest, Client, CompletionRequest, Message, ModelComparison};
use serde::Serialize;
use std::time::Duration;
use tabled::Tabled;

use crate::output::{self, CommandResult, OutputFormat};

const DEFAULT_MODELS: &[&str] = &["gpt-5-nano", "claude-haiku-4-5", "deepseek-chat"];

/// Arguments for the compare command.
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Prompt sent to every model
    pub prompt: String,

    /// Models to compare (repeatable)
    #[arg(short = 'M', long = "model", value_name = "MODEL", default_values_t = DEFAULT_MODELS.iter().map(ToString::to_string).collect::<Vec<_>>())]
    pub models: Vec<String>,

    /// Maximum tokens per reply
    #[arg(long, default_value_t = 150)]
    pub max_tokens: u32,

    /// Temperature (0.0 to 2.0)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Print each model's reply below the table
    #[arg(long)]
    pub show_replies: bool,
}

#[derive(Debug, Tabled)]
struct ComparisonRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Tokens")]
    tokens: String,
    #[tabled(rename = "Reply chars")]
    chars: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&ModelComparison> for ComparisonRow {
    fn from(comparison: &ModelComparison) -> Self {
        let dash = || "-".to_string();
        Self {
            model: comparison.model.clone(),
            latency: output::format_duration(comparison.latency),
            tokens: comparison.total_tokens().map_or_else(dash, |t| t.to_string()),
            chars: comparison.reply_chars().map_or_else(dash, |c| c.to_string()),
            status: match &comparison.outcome {
                Ok(_) => "ok".to_string(),
                Err(e) => e.kind().to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ComparisonOutput {
    model: String,
    latency_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&ModelComparison> for ComparisonOutput {
    fn from(comparison: &ModelComparison) -> Self {
        let (reply, error) = match &comparison.outcome {
            Ok(result) => (Some(result.text.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            model: comparison.model.clone(),
            latency_ms: comparison.latency.as_millis(),
            total_tokens: comparison.total_tokens(),
            reply,
            error,
        }
    }
}

impl CompareArgs {
    fn template(&self) -> CompletionRequest {
        let mut request = CompletionRequest::new(String::new(), vec![Message::user(&self.prompt)]);
        request.max_tokens = Some(self.max_tokens);
        if let Some(temperature) = self.temperature {
            request.temperature = temperature;
        }
        request
    }
}

/// Fastest first; failures keep their input order after every success.
fn by_latency(results: &mut [ModelComparison]) {
    results.sort_by_key(|r| {
        let latency = if r.is_success() { r.latency } else { Duration::ZERO };
        (!r.is_success(), latency)
    });
}

/// Execute the compare command.
pub async fn execute(args: CompareArgs, client: &Client, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);
    if args.models.is_empty() {
        bail!("at least one model is required");
    }

    let spinner = (format == OutputFormat::Text)
        .then(|| output::spinner(&format!("Asking {} models...", args.models.len())));
    let mut results = client.compare_models(&args.models, &args.template()).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    by_latency(&mut results);

    if results.iter().all(|r| !r.is_success()) {
        for result in &results {
            if let Err(e) = &result.outcome {
                tracing::warn!(model = %result.model, error = %e, "Model failed");
            }
        }
        bail!("every model failed");
    }

    match format {
        OutputFormat::Json => {
            let rows: Vec<ComparisonOutput> = results.iter().map(ComparisonOutput::from).collect();
            CommandResult::success(rows).emit()?;
        }
        OutputFormat::Text => {
            let rows: Vec<ComparisonRow> = results.iter().map(ComparisonRow::from).collect();
            output::table(&rows);
            if let Some(winner) = fastest(&results) {
                output::success(&format!(
                    "Fastest: {} ({})",
                    winner.model,
                    output::format_duration(winner.latency)
                ));
            }
            for result in &results {
                if let Err(e) = &result.outcome {
                    output::warning(&format!("{}: {e}", result.model));
                }
            }
            if args.show_replies {
                for result in &results {
                    if let Ok(reply) = &result.outcome {
                        output::section(&result.model);
                        println!("{}", reply.text);
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use hibana_sdk::{CompletionResult, Error};

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: CompareArgs,
    }

    fn comparison(model: &str, millis: u64, ok: bool) -> ModelComparison {
        ModelComparison {
            model: model.to_string(),
            latency: Duration::from_millis(millis),
            outcome: if ok {
                Ok(CompletionResult {
                    id: "id".to_string(),
                    model: model.to_string(),
                    text: "Paris".to_string(),
                    finish_reason: None,
                    usage: None,
                })
            } else {
                Err(Error::transport("connection reset"))
            },
        }
    }

    #[test]
    fn test_default_models() {
        let harness = Harness::parse_from(["compare", "What is Rust?"]);
        assert_eq!(harness.args.models, DEFAULT_MODELS);
        assert_eq!(harness.args.template().max_tokens, Some(150));
    }

    #[test]
    fn test_explicit_models_replace_defaults() {
        let harness = Harness::parse_from(["compare", "Hi", "-M", "gpt-5-nano", "-M", "deepseek-chat"]);
        assert_eq!(harness.args.models, ["gpt-5-nano", "deepseek-chat"]);
    }

    #[test]
    fn test_ordering_puts_failures_last() {
        let mut results = vec![
            comparison("slow", 900, true),
            comparison("refused", 400, false),
            comparison("broken", 10, false),
            comparison("quick", 120, true),
        ];
        by_latency(&mut results);

        let order: Vec<&str> = results.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(order, ["quick", "slow", "refused", "broken"]);
    }

    #[test]
    fn test_row_for_failure() {
        let row = ComparisonRow::from(&comparison("broken", 10, false));
        assert_eq!(row.status, "transport");
        assert_eq!(row.tokens, "-");
    }
}
