//! Cost quote commands.
//!
//! Each command reads a calculator input as JSON, prices it with the same
//! engine the ledger uses, and prints the breakdown to stdout. Nothing is
//! booked.

use std::path::Path;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncReadExt;
use tracing::info;

use backoffice_charges::calculators::ExchangeRateTable;
use backoffice_charges::calculators::shipping::ShippingRate;
use backoffice_charges::db::StaticRateProvider;
use backoffice_charges::{ChargeDetails, ChargeRequest, ChargesConfig, CostEngine};
use backoffice_core::{ChargeType, Currency};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Printed quote.
#[derive(Debug, Serialize)]
struct Quote {
    charge_type: ChargeType,
    total_cost: Decimal,
    currency: Currency,
    details: ChargeDetails,
}

/// Price a shipment against the rates in `rates`.
///
/// # Errors
///
/// Returns an error if a file cannot be read or parsed, or the calculator
/// rejects the input.
pub async fn shipping(input: &Path, rates: &Path) -> CommandResult {
    let rates: Vec<ShippingRate> = read_json(rates).await?;
    info!(rates = rates.len(), "Loaded rate card");
    let input = read_json(input).await?;
    quote(rates, None, ChargeRequest::Shipping { input }).await
}

/// Price a packaging run.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the calculator
/// rejects the input.
pub async fn boxing(input: &Path) -> CommandResult {
    let input = read_json(input).await?;
    quote(
        Vec::new(),
        None,
        ChargeRequest::Boxing {
            input,
            batch_id: None,
        },
    )
    .await
}

/// Price a product return.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the calculator
/// rejects the input.
pub async fn returns(input: &Path) -> CommandResult {
    let input = read_json(input).await?;
    quote(Vec::new(), None, ChargeRequest::Returns { input }).await
}

/// Price one pay period for an employee.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the calculator
/// rejects the input.
pub async fn salary(input: &Path) -> CommandResult {
    let input = read_json(input).await?;
    quote(Vec::new(), None, ChargeRequest::Salary { input }).await
}

/// Price a currency exchange, optionally against a rate table.
///
/// # Errors
///
/// Returns an error if a file cannot be read or parsed, the table holds a
/// non-positive rate, or no rate is available for the pair.
pub async fn exchange(input: &Path, rates: Option<&Path>) -> CommandResult {
    let table = match rates {
        Some(path) => Some(read_json::<ExchangeRateTable>(path).await?),
        None => None,
    };
    let input = read_json(input).await?;
    quote(Vec::new(), table, ChargeRequest::Exchange { input }).await
}

async fn quote(
    shipping_rates: Vec<ShippingRate>,
    exchange_rates: Option<ExchangeRateTable>,
    request: ChargeRequest,
) -> CommandResult {
    let config = ChargesConfig::from_env()?;
    let mut engine =
        CostEngine::from_config(Arc::new(StaticRateProvider::new(shipping_rates)), &config);
    if let Some(table) = exchange_rates {
        engine = engine.with_exchange_rates(table);
    }

    let details = engine.price(request).await?;
    let quote = Quote {
        charge_type: details.charge_type(),
        total_cost: details.total_cost(),
        currency: details.billing_currency(config.default_currency),
        details,
    };
    info!(
        charge_type = %quote.charge_type,
        total_cost = %quote.total_cost,
        currency = %quote.currency,
        "Quote computed"
    );

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&quote)?);
    }
    Ok(())
}

/// Read and parse a JSON document from a file, or stdin for `-`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Cannot read {}: {e}", path.display()))?
    };
    serde_json::from_str(&content)
        .map_err(|e| format!("Invalid JSON in {}: {e}", path.display()).into())
}
