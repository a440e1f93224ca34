//! Chat command - send chat completion requests.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use futures::StreamExt;
use hibana_sdk::{ChatBuilder, Client, CompletionResult, FinishReason, StreamResult, Usage};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, BufRead, Write};

use crate::output::{self, CommandResult, OutputFormat};
use crate::settings::DEFAULT_CHAT_MODEL;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Message to send (if not provided, reads from stdin)
    #[arg(short, long)]
    pub message: Option<String>,

    /// Model to use (defaults to the profile's default_model)
    #[arg(short = 'M', long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Enable streaming output
    #[arg(long)]
    pub stream: bool,

    /// Ask for a JSON object and pretty-print the parsed reply
    #[arg(long)]
    pub json_object: bool,

    /// Temperature (0.0 to 2.0)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Top-p sampling parameter
    #[arg(long)]
    pub top_p: Option<f32>,

    /// Seed for deterministic outputs
    #[arg(long)]
    pub seed: Option<i64>,

    /// Stop sequence (repeatable)
    #[arg(long = "stop", value_name = "SEQUENCE")]
    pub stop: Vec<String>,

    /// Interactive chat mode
    #[arg(short, long, conflicts_with_all = ["message", "json_object"])]
    pub interactive: bool,

    /// Show token usage
    #[arg(long)]
    pub show_usage: bool,
}

/// Chat response for output.
#[derive(Debug, Serialize)]
pub struct ChatOutput {
    pub model: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatOutput {
    fn new(result: &CompletionResult, parsed: Option<Value>) -> Self {
        Self {
            model: result.model.clone(),
            content: result.text.clone(),
            parsed,
            finish_reason: result.finish_reason.as_ref().map(ToString::to_string),
            usage: result.usage,
        }
    }
}

/// Execute the chat command.
pub async fn execute(args: ChatArgs, client: &Client, json: bool) -> Result<()> {
    if args.interactive {
        run_interactive_mode(client, &args).await
    } else {
        run_single_message(client, &args, OutputFormat::from_json_flag(json)).await
    }
}

fn model_for(client: &Client, args: &ChatArgs) -> String {
    args.model
        .clone()
        .or_else(|| client.config().default_model().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string())
}

/// Apply the sampling options shared by every request.
fn configure(mut chat: ChatBuilder, args: &ChatArgs) -> ChatBuilder {
    if let Some(ref model) = args.model {
        chat = chat.model(model);
    }
    if let Some(ref system) = args.system {
        chat = chat.system_message(system);
    }
    if let Some(temp) = args.temperature {
        chat = chat.temperature(temp);
    }
    if let Some(max) = args.max_tokens {
        chat = chat.max_tokens(max);
    }
    if let Some(top_p) = args.top_p {
        chat = chat.top_p(top_p);
    }
    if let Some(seed) = args.seed {
        chat = chat.seed(seed);
    }
    for sequence in &args.stop {
        chat = chat.stop(sequence);
    }
    if args.json_object {
        chat = chat.json_mode();
    }
    chat
}

/// A folded stream as a completion, so both paths print the same way.
fn stream_to_completion(model: String, result: StreamResult) -> CompletionResult {
    CompletionResult {
        id: String::new(),
        model,
        text: result.text,
        finish_reason: result.finish_reason,
        usage: result.usage,
    }
}

fn read_message(args: &ChatArgs) -> Result<String> {
    let message = match args.message {
        Some(ref msg) => msg.clone(),
        None => io::read_to_string(io::stdin())?,
    };
    let message = message.trim();
    if message.is_empty() {
        bail!("no message provided");
    }
    Ok(message.to_string())
}

/// Run a single message chat.
async fn run_single_message(client: &Client, args: &ChatArgs, format: OutputFormat) -> Result<()> {
    let message = read_message(args)?;
    let chat = configure(client.chat(), args).user_message(message);

    if args.stream && format == OutputFormat::Text && !args.json_object {
        let mut stream = chat.stream().await?;
        let mut folded = StreamResult::default();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    if let Some(text) = chunk.delta_text.as_deref() {
                        output::stream_text(text);
                    }
                    folded.add_chunk(chunk);
                }
                Err(e) => {
                    output::stream_newline();
                    return Err(e.into());
                }
            }
        }
        output::stream_newline();

        if folded.finish_reason == Some(FinishReason::Length) {
            output::warning("Reply truncated at the token limit");
        }
        if args.show_usage {
            if let Some(usage) = &folded.usage {
                output::usage(usage);
            }
        }
        return Ok(());
    }

    let spinner = (format == OutputFormat::Text).then(|| output::spinner("Generating response..."));
    let result = if args.stream {
        chat.stream_collect()
            .await
            .map(|folded| stream_to_completion(model_for(client, args), folded))
    } else {
        chat.send().await
    };
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let result = result?;

    let parsed = if args.json_object {
        Some(result.json::<Value>()?)
    } else {
        None
    };

    match format {
        OutputFormat::Json => CommandResult::success(ChatOutput::new(&result, parsed)).emit()?,
        OutputFormat::Text => {
            match parsed {
                Some(ref value) => output::json(value)?,
                None => println!("{}", result.text),
            }
            if result.is_truncated() {
                output::warning("Reply truncated at the token limit");
            }
            if args.show_usage {
                if let Some(usage) = &result.usage {
                    output::usage(usage);
                }
            }
        }
    }

    Ok(())
}

/// Run interactive chat mode.
async fn run_interactive_mode(client: &Client, args: &ChatArgs) -> Result<()> {
    let model = model_for(client, args);
    output::info(&format!(
        "Interactive chat with {model} (type 'exit' to quit, '/clear' to start over)"
    ));

    let mut conversation = client.conversation(model);
    if let Some(ref system) = args.system {
        output::info(&format!("System: {system}"));
        conversation = conversation.with_system(system);
    }
    if let Some(temp) = args.temperature {
        conversation = conversation.temperature(temp);
    }
    if let Some(max) = args.max_tokens {
        conversation = conversation.max_tokens(max);
    }
    if let Some(top_p) = args.top_p {
        conversation = conversation.top_p(top_p);
    }
    if let Some(seed) = args.seed {
        conversation = conversation.seed(seed);
    }
    for sequence in &args.stop {
        conversation = conversation.stop(sequence);
    }

    println!();

    let stdin = io::stdin();
    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            println!();
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        if input == "/clear" {
            conversation.clear();
            output::info("History cleared");
            continue;
        }
        if input.is_empty() {
            continue;
        }

        if args.stream {
            print!("{} ", "Assistant:".green().bold());
            io::stdout().flush()?;

            let outcome = conversation.send_streaming(input, output::stream_text).await;
            output::stream_newline();
            match outcome {
                Ok(result) => {
                    if args.show_usage {
                        if let Some(usage) = &result.usage {
                            output::info(&format!("Tokens: {} total", usage.total_tokens));
                        }
                    }
                }
                Err(e) => output::error(&format!("Error: {e}")),
            }
        } else {
            let spinner = output::spinner("Thinking...");
            let outcome = conversation.send(input).await;
            spinner.finish_and_clear();

            match outcome {
                Ok(result) => {
                    println!("{} {}", "Assistant:".green().bold(), result.text);
                    if args.show_usage {
                        if let Some(usage) = &result.usage {
                            output::info(&format!(
                                "Tokens: {} prompt, {} completion, {} total",
                                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                            ));
                        }
                    }
                }
                Err(e) => output::error(&format!("Error: {e}")),
            }
        }

        println!();
    }

    output::info(&format!("Goodbye! ({} turns)", conversation.turns()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ChatArgs,
    }

    fn parse(argv: &[&str]) -> ChatArgs {
        let mut full = vec!["chat"];
        full.extend_from_slice(argv);
        Harness::parse_from(full).args
    }

    fn client() -> Client {
        Client::builder()
            .api_key("test-key")
            .default_model("claude-haiku-4-5")
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_from_flags() {
        let args = parse(&[
            "-m", "Hi", "-M", "gpt-5-nano", "-s", "Be brief", "-t", "0.2", "--max-tokens", "50",
            "--stop", "END", "--stop", "STOP", "--json-object",
        ]);

        let request = configure(client().chat(), &args).user_message("Hi").build().unwrap();
        assert_eq!(request.model, "gpt-5-nano");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, "Be brief");
        assert_eq!(request.max_tokens, Some(50));
        assert_eq!(request.stop, Some(vec!["END".to_string(), "STOP".to_string()]));
        assert!(request.response_format.is_some());
    }

    #[test]
    fn test_model_falls_back_to_profile() {
        let args = parse(&["-m", "Hi"]);
        assert_eq!(model_for(&client(), &args), "claude-haiku-4-5");

        let request = configure(client().chat(), &args).user_message("Hi").build().unwrap();
        assert_eq!(request.model, "claude-haiku-4-5");
    }

    #[test]
    fn test_interactive_conflicts_with_message() {
        assert!(Harness::try_parse_from(["chat", "-i", "-m", "Hi"]).is_err());
    }

    #[test]
    fn test_blank_message_rejected() {
        let args = parse(&["-m", "   "]);
        assert!(read_message(&args).is_err());
    }

    #[test]
    fn test_stream_fold_keeps_finish_reason() {
        let folded = StreamResult {
            text: "{\"ok\": true}".to_string(),
            finish_reason: Some(FinishReason::Stop),
            usage: None,
            chunk_count: 3,
        };

        let completion = stream_to_completion("gpt-5-nano".to_string(), folded);
        assert!(completion.is_complete());
        assert_eq!(completion.json::<Value>().unwrap()["ok"], true);
    }
}
