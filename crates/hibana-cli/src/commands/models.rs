//! Models command - list and query available models.

use anyhow::Result;
use clap::{Args, ValueEnum};
use hibana_sdk::{Client, ModelCategory, ModelInfo};
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::output::{self, CommandResult, OutputFormat};

/// Arguments for the models command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    /// Filter models by provider (openai, anthropic, etc.)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Filter models by name pattern
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Only show models of this type
    #[arg(short = 't', long = "type", value_enum)]
    pub kind: Option<KindFilter>,

    /// Group the listing by provider
    #[arg(short, long)]
    pub group: bool,

    /// Get info for a specific model
    #[arg(long, conflicts_with_all = ["provider", "filter", "kind", "group"])]
    pub model: Option<String>,
}

/// Model types accepted by `--type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindFilter {
    Chat,
    Image,
    Other,
}

impl KindFilter {
    fn matches(self, category: ModelCategory) -> bool {
        matches!(
            (self, category),
            (Self::Chat, ModelCategory::Chat)
                | (Self::Image, ModelCategory::Image)
                | (Self::Other, ModelCategory::Other)
        )
    }
}

/// Model information for table display.
#[derive(Debug, Tabled)]
pub struct ModelRow {
    #[tabled(rename = "Model ID")]
    pub id: String,
    #[tabled(rename = "Provider")]
    pub owned_by: String,
    #[tabled(rename = "Type")]
    pub category: ModelCategory,
    #[tabled(rename = "Created")]
    pub created: String,
}

impl From<&ModelInfo> for ModelRow {
    fn from(model: &ModelInfo) -> Self {
        Self {
            id: model.id.clone(),
            owned_by: model.owned_by.clone(),
            category: model.category(),
            created: output::format_timestamp(model.created_at),
        }
    }
}

/// Apply the listing filters, keeping the gateway's order.
fn select(models: Vec<ModelInfo>, args: &ModelsArgs) -> Vec<ModelInfo> {
    let provider = args.provider.as_deref().map(str::to_lowercase);
    let pattern = args.filter.as_deref().map(str::to_lowercase);

    models
        .into_iter()
        .filter(|m| {
            provider
                .as_deref()
                .map_or(true, |p| m.owned_by.to_lowercase().contains(p))
        })
        .filter(|m| pattern.as_deref().map_or(true, |p| m.id.to_lowercase().contains(p)))
        .filter(|m| args.kind.map_or(true, |kind| kind.matches(m.category())))
        .collect()
}

fn group_by_provider(models: &[ModelInfo]) -> BTreeMap<&str, Vec<&ModelInfo>> {
    let mut groups: BTreeMap<&str, Vec<&ModelInfo>> = BTreeMap::new();
    for model in models {
        groups.entry(model.owned_by.as_str()).or_default().push(model);
    }
    groups
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, client: &Client, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);

    if let Some(ref id) = args.model {
        let model = client.get_model(id).await?;
        return match format {
            OutputFormat::Json => CommandResult::success(model).emit(),
            OutputFormat::Text => {
                output::section(&model.id);
                output::key_value("Provider", &model.owned_by);
                output::key_value("Type", &model.category().to_string());
                output::key_value("Created", &output::format_timestamp(model.created_at));
                Ok(())
            }
        };
    }

    let spinner = (format == OutputFormat::Text).then(|| output::spinner("Fetching models..."));
    let models = client.list_models().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let models = select(models?, &args);

    match format {
        OutputFormat::Json if args.group => CommandResult::success(group_by_provider(&models)).emit()?,
        OutputFormat::Json => CommandResult::success(&models).emit()?,
        OutputFormat::Text if models.is_empty() => output::warning("No models found matching the criteria"),
        OutputFormat::Text => {
            output::success(&format!("Found {} models", models.len()));
            if args.group {
                for (provider, members) in group_by_provider(&models) {
                    output::section(&format!("{provider} ({})", members.len()));
                    let rows: Vec<ModelRow> = members.into_iter().map(ModelRow::from).collect();
                    output::table(&rows);
                }
            } else {
                println!();
                let rows: Vec<ModelRow> = models.iter().map(ModelRow::from).collect();
                output::table(&rows);
            }
        }
    }

    Ok(())
}
