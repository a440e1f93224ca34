//! CLI argument definitions using clap.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::commands;
use crate::settings::Settings;

/// Hibana - one key for OpenAI, Anthropic, DeepSeek and Google models
#[derive(Parser, Debug)]
#[command(name = "hibana")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Gateway base URL
    #[arg(short = 'u', long, env = "HIBANA_BASE_URL", global = true)]
    pub url: Option<String>,

    /// API key for authentication
    #[arg(short = 'k', long, env = "HIBANA_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Profile file (defaults to config.toml in the user config directory)
    #[arg(short = 'c', long, env = "HIBANA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Per-attempt request timeout, e.g. "30s" or "2m"
    #[arg(long, env = "HIBANA_TIMEOUT", value_parser = humantime::parse_duration, global = true)]
    pub timeout: Option<Duration>,

    /// Retries for rate-limited and server errors
    #[arg(long, env = "HIBANA_MAX_RETRIES", global = true)]
    pub max_retries: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a chat completion request
    Chat(commands::chat::ChatArgs),

    /// Generate images from a prompt
    #[command(visible_alias = "image")]
    Images(commands::images::ImagesArgs),

    /// List available models
    Models(commands::models::ModelsArgs),

    /// Show the account balance
    Balance(commands::balance::BalanceArgs),

    /// Send one prompt to several models and compare them
    Compare(commands::compare::CompareArgs),

    /// Generate shell completions
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        if let Commands::Completions(args) = self.command {
            return commands::completions::execute(args);
        }

        let settings = Settings::load(self.global.config.as_deref())?.merge(&self.global);
        let client = settings.build_client()?;

        match self.command {
            Commands::Chat(args) => commands::chat::execute(args, &client, self.json).await,
            Commands::Images(args) => commands::images::execute(args, &client, self.json).await,
            Commands::Models(args) => commands::models::execute(args, &client, self.json).await,
            Commands::Balance(args) => commands::balance::execute(args, &client, self.json).await,
            Commands::Compare(args) => commands::compare::execute(args, &client, self.json).await,
            Commands::Completions(_) => Ok(()),
        }
    }
}
