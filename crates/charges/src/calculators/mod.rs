//! Per-category cost calculators.
//!
//! Every calculator is a pure function from a typed input to a typed cost
//! breakdown, in major currency units. [`CostEngine`] dispatches a
//! [`ChargeRequest`] to the right calculator and gathers the reference data
//! (shipping rates, exchange rates, policies) it needs.

pub mod boxing;
pub mod exchange;
pub mod returns;
pub mod salary;
pub mod shipping;

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;

use crate::config::ChargesConfig;
use crate::db::RateProvider;
use crate::error::{ChargeError, Result};
use crate::models::{ChargeDetails, ChargeRequest};

pub use exchange::ExchangeRateTable;
pub use returns::ReturnsPolicy;
pub use shipping::ShippingPolicy;

/// Fail with `InvalidInput` if `value` is negative.
pub(crate) fn ensure_non_negative(value: Decimal, field: &str) -> Result<()> {
    if value < Decimal::ZERO {
        return Err(ChargeError::invalid_input(format!(
            "{field} must not be negative, got {value}"
        )));
    }
    Ok(())
}

/// Fail with `InvalidInput` unless `value` is strictly positive.
pub(crate) fn ensure_positive(value: Decimal, field: &str) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(ChargeError::invalid_input(format!(
            "{field} must be greater than zero, got {value}"
        )));
    }
    Ok(())
}

fn overflow(what: &str) -> ChargeError {
    ChargeError::invalid_input(format!("{what} overflows the supported decimal range"))
}

/// `a × b`, failing with `InvalidInput` instead of panicking on overflow.
pub(crate) fn mul(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_mul(b).ok_or_else(|| overflow(what))
}

/// `a + b`, failing with `InvalidInput` instead of panicking on overflow.
pub(crate) fn add(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_add(b).ok_or_else(|| overflow(what))
}

/// `a − b`, failing with `InvalidInput` instead of panicking on overflow.
pub(crate) fn sub(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_sub(b).ok_or_else(|| overflow(what))
}

/// `a ÷ b`. Callers reject a zero divisor before dividing.
pub(crate) fn div(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_div(b).ok_or_else(|| overflow(what))
}

/// Sum of `values`, failing with `InvalidInput` on overflow.
pub(crate) fn sum(values: impl IntoIterator<Item = Decimal>, what: &str) -> Result<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |total, value| add(total, value, what))
}

/// `pct` percent of `base`.
pub(crate) fn percent_of(base: Decimal, pct: Decimal, what: &str) -> Result<Decimal> {
    div(mul(base, pct, what)?, Decimal::ONE_HUNDRED, what)
}

/// Prices charge requests against the current reference data.
#[derive(Clone)]
pub struct CostEngine {
    rates: Arc<dyn RateProvider>,
    exchange_rates: ExchangeRateTable,
    shipping: ShippingPolicy,
    returns: ReturnsPolicy,
}

impl std::fmt::Debug for CostEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostEngine")
            .field("exchange_rates", &self.exchange_rates.len())
            .field("shipping", &self.shipping)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl CostEngine {
    /// Engine with default policies and an empty exchange-rate table.
    #[must_use]
    pub fn new(rates: Arc<dyn RateProvider>) -> Self {
        Self {
            rates,
            exchange_rates: ExchangeRateTable::new(),
            shipping: ShippingPolicy::default(),
            returns: ReturnsPolicy::default(),
        }
    }

    /// Engine with policies taken from configuration.
    #[must_use]
    pub fn from_config(rates: Arc<dyn RateProvider>, config: &ChargesConfig) -> Self {
        Self::new(rates)
            .with_shipping_policy(config.shipping)
            .with_returns_policy(config.returns)
    }

    #[must_use]
    pub fn with_exchange_rates(mut self, table: ExchangeRateTable) -> Self {
        self.exchange_rates = table;
        self
    }

    #[must_use]
    pub const fn with_shipping_policy(mut self, policy: ShippingPolicy) -> Self {
        self.shipping = policy;
        self
    }

    #[must_use]
    pub const fn with_returns_policy(mut self, policy: ReturnsPolicy) -> Self {
        self.returns = policy;
        self
    }

    #[must_use]
    pub const fn exchange_rates(&self) -> &ExchangeRateTable {
        &self.exchange_rates
    }

    /// Run the calculator matching the request and wrap its breakdown.
    ///
    /// # Errors
    ///
    /// Returns the calculator's error, `ChargeError::NoRateAvailable` when no
    /// shipping rate serves the route, or a repository error from the rate
    /// provider.
    #[instrument(skip(self, request), fields(charge_type = %request.charge_type()))]
    pub async fn price(&self, request: ChargeRequest) -> Result<ChargeDetails> {
        match request {
            ChargeRequest::Shipping { input } => {
                let candidates = self
                    .rates
                    .fetch_rates_for_route(
                        &input.origin_zone,
                        &input.destination_zone,
                        input.service_type.as_deref(),
                        input.provider_id,
                    )
                    .await?;
                let (rate, cost) =
                    shipping::select_and_calculate(&input, &candidates, &self.shipping)?;
                Ok(ChargeDetails::Shipping { input, rate, cost })
            }
            ChargeRequest::Boxing { input, batch_id } => {
                let cost = boxing::calculate(&input)?;
                Ok(ChargeDetails::Boxing {
                    input,
                    cost,
                    batch_id,
                })
            }
            ChargeRequest::Salary { input } => {
                let cost = salary::calculate(&input)?;
                Ok(ChargeDetails::Salary { input, cost })
            }
            ChargeRequest::Exchange { input } => {
                let cost = exchange::calculate(&input, &self.exchange_rates)?;
                Ok(ChargeDetails::Exchange { input, cost })
            }
            ChargeRequest::Returns { input } => {
                let cost = returns::calculate(&input, &self.returns)?;
                Ok(ChargeDetails::Returns { input, cost })
            }
            ChargeRequest::Generic {
                amount,
                description,
            } => {
                ensure_non_negative(amount, "amount")?;
                Ok(ChargeDetails::Generic {
                    amount,
                    description,
                })
            }
        }
    }
}
