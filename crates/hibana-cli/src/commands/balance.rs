//! Balance command - show the account balance and what it still buys.

use anyhow::{bail, Result};
use clap::Args;
use hibana_sdk::{group_thousands, BalanceInfo, BalanceStatus, Client};
use serde::Serialize;

use crate::output::{self, CommandResult, OutputFormat};

/// Arguments for the balance command.
#[derive(Args, Debug)]
pub struct BalanceArgs {
    /// Estimate how many requests of this cost the balance covers
    #[arg(long, value_name = "AMOUNT", value_parser = clap::value_parser!(i64).range(1..))]
    pub cost_per_request: Option<i64>,

    /// Exit with an error if the balance is below this amount
    #[arg(long, value_name = "AMOUNT")]
    pub require: Option<i64>,
}

#[derive(Debug, Serialize)]
struct BalanceOutput {
    #[serde(flatten)]
    balance: BalanceInfo,
    status: BalanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimated_requests: Option<i64>,
}

/// Execute the balance command.
pub async fn execute(args: BalanceArgs, client: &Client, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);

    let balance = client.balance().await?;
    if let Some(minimum) = args.require {
        if !balance.covers(minimum) {
            bail!(
                "balance {balance} is below the required {} {}",
                group_thousands(minimum),
                balance.currency
            );
        }
    }

    let status = balance.status();
    let estimated = args
        .cost_per_request
        .and_then(|cost| balance.estimated_requests(cost));

    match format {
        OutputFormat::Json => CommandResult::success(BalanceOutput {
            balance: balance.clone(),
            status,
            estimated_requests: estimated,
        })
        .emit()?,
        OutputFormat::Text => {
            output::section("Account Balance");
            output::key_value("Balance", &balance.to_string());
            output::key_value("Status", &output::balance_status(status).to_string());
            if let (Some(cost), Some(count)) = (args.cost_per_request, estimated) {
                output::key_value(
                    &format!("Requests at {} {}", group_thousands(cost), balance.currency),
                    &format!("~{}", group_thousands(count)),
                );
            }
            if status == BalanceStatus::Critical {
                output::warning("Balance is critically low; top up to avoid failed requests");
            }
        }
    }

    Ok(())
}
