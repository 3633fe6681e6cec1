//! Charges engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CHARGES_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `CHARGES_DEFAULT_CURRENCY` - Currency for charges that do not name one (default: DZD)
//! - `SHIPPING_VOLUMETRIC_DIVISOR` - cm³ per volumetric kg (default: 5000)
//! - `SHIPPING_COD_FEE_RATE` - Cash-on-delivery fee as a fraction (default: 0.02)
//! - `RETURNS_HIGH_VALUE_THRESHOLD` - Return value flagged as a risk (default: 50000)
//! - `RETURNS_APPROVAL_NET_LOSS_LIMIT` - Net loss at which returns stop being approved (default: 100000)
//! - `RETURNS_PARTIAL_REFUND_THRESHOLD` - Net loss above which a partial refund is suggested (default: 50000)
//! - `RETURNS_RESTOCKING_RATE` - Restocking cost as a fraction of item value (default: 0.15)
//! - `RETURNS_HIGH_RISK_FACTOR_COUNT` - Risk factors a return may have before it is high risk (default: 2)
//! - `BULK_MAX_ITEMS` - Largest bulk request accepted (default: 500)

use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use backoffice_core::Currency;

use crate::bulk::DEFAULT_MAX_ITEMS;
use crate::calculators::{ReturnsPolicy, ShippingPolicy};

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Charges engine configuration.
///
/// Implements `Debug` manually to redact the database URL.
#[derive(Clone)]
pub struct ChargesConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// Currency for new charges that do not name one
    pub default_currency: Currency,
    /// Carrier constants for the shipping calculator
    pub shipping: ShippingPolicy,
    /// Thresholds for the returns calculator
    pub returns: ReturnsPolicy,
    /// Largest bulk request accepted
    pub bulk_max_items: usize,
}

impl std::fmt::Debug for ChargesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChargesConfig")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("default_currency", &self.default_currency)
            .field("shipping", &self.shipping)
            .field("returns", &self.returns)
            .field("bulk_max_items", &self.bulk_max_items)
            .finish()
    }
}

impl Default for ChargesConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            default_currency: Currency::default(),
            shipping: ShippingPolicy::default(),
            returns: ReturnsPolicy::default(),
            bulk_max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

impl ChargesConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable is set but cannot be
    /// parsed or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`ChargesConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = lookup("CHARGES_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .map(SecretString::from);
        let default_currency =
            parse_or("CHARGES_DEFAULT_CURRENCY", &lookup, defaults.default_currency)?;

        let shipping = ShippingPolicy {
            volumetric_divisor: parse_or(
                "SHIPPING_VOLUMETRIC_DIVISOR",
                &lookup,
                defaults.shipping.volumetric_divisor,
            )?,
            cod_fee_rate: parse_or(
                "SHIPPING_COD_FEE_RATE",
                &lookup,
                defaults.shipping.cod_fee_rate,
            )?,
        };
        require_positive("SHIPPING_VOLUMETRIC_DIVISOR", shipping.volumetric_divisor)?;
        require_fraction("SHIPPING_COD_FEE_RATE", shipping.cod_fee_rate)?;

        let returns = ReturnsPolicy {
            high_value_threshold: parse_or(
                "RETURNS_HIGH_VALUE_THRESHOLD",
                &lookup,
                defaults.returns.high_value_threshold,
            )?,
            approval_net_loss_limit: parse_or(
                "RETURNS_APPROVAL_NET_LOSS_LIMIT",
                &lookup,
                defaults.returns.approval_net_loss_limit,
            )?,
            partial_refund_threshold: parse_or(
                "RETURNS_PARTIAL_REFUND_THRESHOLD",
                &lookup,
                defaults.returns.partial_refund_threshold,
            )?,
            restocking_rate: parse_or(
                "RETURNS_RESTOCKING_RATE",
                &lookup,
                defaults.returns.restocking_rate,
            )?,
            high_risk_factor_count: parse_or(
                "RETURNS_HIGH_RISK_FACTOR_COUNT",
                &lookup,
                defaults.returns.high_risk_factor_count,
            )?,
        };
        require_fraction("RETURNS_RESTOCKING_RATE", returns.restocking_rate)?;

        let bulk_max_items = parse_or("BULK_MAX_ITEMS", &lookup, defaults.bulk_max_items)?;
        if bulk_max_items == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BULK_MAX_ITEMS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            default_currency,
            shipping,
            returns,
            bulk_max_items,
        })
    }

    /// Returns the database URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if neither `CHARGES_DATABASE_URL`
    /// nor `DATABASE_URL` was set.
    pub fn require_database_url(&self) -> Result<&SecretString, ConfigError> {
        self.database_url
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("CHARGES_DATABASE_URL".to_string()))
    }
}

/// Parse an optional variable, falling back to `default` when unset or blank.
fn parse_or<T>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn require_positive(key: &str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be greater than zero (got {value})"),
        ));
    }
    Ok(())
}

fn require_fraction(key: &str, value: Decimal) -> Result<(), ConfigError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be between 0 and 1 (got {value})"),
        ));
    }
    Ok(())
}
