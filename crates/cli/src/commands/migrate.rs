//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! bo-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `CHARGES_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Charges migrations: `crates/charges/migrations/`, embedded at build time.

use tracing::info;

use backoffice_charges::ChargesConfig;
use backoffice_charges::db::create_pool;

/// Run the charges schema migrations.
///
/// # Errors
///
/// Returns an error if no database URL is configured, the connection fails,
/// or a migration fails to apply.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ChargesConfig::from_env()?;
    let database_url = config.require_database_url()?;

    info!("Connecting to charges database...");
    let pool = create_pool(database_url).await?;

    info!("Running charges migrations...");
    backoffice_charges::MIGRATOR.run(&pool).await?;

    info!("Charges migrations complete!");
    Ok(())
}
