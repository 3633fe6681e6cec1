//! Back-office CLI - cost quotes and database migrations.
//!
//! # Usage
//!
//! ```bash
//! # Price a shipment against a rate card
//! bo-cli quote shipping --input shipment.json --rates rates.json
//!
//! # Price a packaging run (read the input from stdin)
//! bo-cli quote boxing --input - < batch.json
//!
//! # Convert currency using a rate table
//! bo-cli quote exchange --input transfer.json --rates fx.json
//!
//! # Run the charges schema migrations (requires the `postgres` feature)
//! bo-cli migrate
//! ```
//!
//! # Commands
//!
//! - `quote` - Run one cost calculator and print the breakdown as JSON
//! - `migrate` - Run database migrations
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Log filter (default: `backoffice_charges=info,backoffice_cli=info`)
//! - `LOG_FORMAT` - Set to `json` for structured logs on stderr
//! - Calculator policies and `CHARGES_DATABASE_URL`, see `backoffice_charges::config`

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "bo-cli")]
#[command(author, version, about = "Back-office charges CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Price a charge without booking it
    Quote {
        #[command(subcommand)]
        calculator: QuoteTarget,
    },
    /// Run database migrations
    #[cfg(feature = "postgres")]
    Migrate,
}

#[derive(Subcommand)]
enum QuoteTarget {
    /// Shipping cost from weight, dimensions, and carrier rates
    Shipping {
        /// Shipment JSON file (`-` for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// JSON array of carrier rates
        #[arg(short, long)]
        rates: PathBuf,
    },
    /// Packaging run cost
    Boxing {
        /// Batch JSON file (`-` for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Return processing cost and decision
    Returns {
        /// Return JSON file (`-` for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Payroll cost for one pay period
    Salary {
        /// Payroll JSON file (`-` for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Currency exchange cost
    Exchange {
        /// Exchange JSON file (`-` for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// JSON array of exchange rates, used when the input carries no rate
        #[arg(short, long)]
        rates: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so quote output on stdout stays machine-readable.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "backoffice_charges=info,backoffice_cli=info".into());

    let is_json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let json_layer = is_json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer =
        (!is_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Quote { calculator } => match calculator {
            QuoteTarget::Shipping { input, rates } => {
                commands::quote::shipping(&input, &rates).await?;
            }
            QuoteTarget::Boxing { input } => commands::quote::boxing(&input).await?,
            QuoteTarget::Returns { input } => commands::quote::returns(&input).await?,
            QuoteTarget::Salary { input } => commands::quote::salary(&input).await?,
            QuoteTarget::Exchange { input, rates } => {
                commands::quote::exchange(&input, rates.as_deref()).await?;
            }
        },
        #[cfg(feature = "postgres")]
        Commands::Migrate => commands::migrate::run().await?,
    }
    Ok(())
}
