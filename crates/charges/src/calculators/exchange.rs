//! Currency conversion cost and loss/gain against an expected rate.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use backoffice_core::Currency;

use super::{add, div, ensure_non_negative, ensure_positive, mul, percent_of, sub};
use crate::error::{ChargeError, Result};

/// Units of `to` bought by one unit of `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: Currency,
    pub to: Currency,
    pub rate: Decimal,
}

/// Known exchange rates keyed by currency pair.
///
/// Serialized as a flat list of [`ExchangeRate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ExchangeRate>", into = "Vec<ExchangeRate>")]
pub struct ExchangeRateTable {
    rates: BTreeMap<(Currency, Currency), Decimal>,
}

impl ExchangeRateTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or replace the rate for a pair.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidExchangeRate` if `rate <= 0`.
    pub fn insert(&mut self, rate: ExchangeRate) -> Result<()> {
        if rate.rate <= Decimal::ZERO {
            return Err(ChargeError::InvalidExchangeRate(format!(
                "{}/{} rate must be positive, got {}",
                rate.from, rate.to, rate.rate
            )));
        }
        self.rates.insert((rate.from, rate.to), rate.rate);
        Ok(())
    }

    /// Rate converting `from` into `to`.
    ///
    /// Identical currencies convert at 1. A missing direct pair falls back to
    /// the inverse of the opposite pair.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidExchangeRate` if neither direction is known.
    pub fn rate(&self, from: Currency, to: Currency) -> Result<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        if let Some(rate) = self.rates.get(&(from, to)) {
            return Ok(*rate);
        }
        self.rates
            .get(&(to, from))
            .and_then(|inverse| Decimal::ONE.checked_div(*inverse))
            .ok_or_else(|| ChargeError::InvalidExchangeRate(format!("no rate for {from}/{to}")))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl TryFrom<Vec<ExchangeRate>> for ExchangeRateTable {
    type Error = ChargeError;

    fn try_from(rates: Vec<ExchangeRate>) -> Result<Self> {
        let mut table = Self::new();
        for rate in rates {
            table.insert(rate)?;
        }
        Ok(table)
    }
}

impl From<ExchangeRateTable> for Vec<ExchangeRate> {
    fn from(table: ExchangeRateTable) -> Self {
        table
            .rates
            .into_iter()
            .map(|((from, to), rate)| ExchangeRate { from, to, rate })
            .collect()
    }
}

/// A currency purchase to be costed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeInput {
    pub source_currency: Currency,
    pub target_currency: Currency,
    pub source_amount: Decimal,
    /// Applied rate; looked up in the rate table when absent.
    #[serde(default)]
    pub rate: Option<Decimal>,
    /// Bank or bureau fee, in percent of the source amount.
    #[serde(default)]
    pub fee_percentage: Decimal,
    /// Budgeted rate to measure the loss or gain against.
    #[serde(default)]
    pub expected_rate: Option<Decimal>,
}

/// Difference between the applied and the expected rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossGain {
    pub amount: Decimal,
    pub is_gain: bool,
    /// Amount relative to the expected conversion, in percent.
    pub percentage: Decimal,
}

/// Cost breakdown for one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeCost {
    pub source_currency: Currency,
    pub target_currency: Currency,
    pub applied_rate: Decimal,
    pub source_amount: Decimal,
    pub target_amount: Decimal,
    pub fee_amount: Decimal,
    /// Source amount plus fee.
    pub total_cost: Decimal,
    pub loss_gain: Option<LossGain>,
}

/// Cost a currency conversion.
///
/// # Errors
///
/// Returns `ChargeError::InvalidInput` if the source amount is not positive or
/// the fee falls outside 0..=100 or an amount overflows, and
/// `ChargeError::InvalidExchangeRate` if the applied or expected rate is
/// missing or not positive.
pub fn calculate(input: &ExchangeInput, table: &ExchangeRateTable) -> Result<ExchangeCost> {
    ensure_positive(input.source_amount, "source_amount")?;
    ensure_non_negative(input.fee_percentage, "fee_percentage")?;
    if input.fee_percentage > Decimal::ONE_HUNDRED {
        return Err(ChargeError::invalid_input(format!(
            "fee_percentage must be at most 100, got {}",
            input.fee_percentage
        )));
    }

    let rate = match input.rate {
        Some(rate) => rate,
        None => table.rate(input.source_currency, input.target_currency)?,
    };
    if rate <= Decimal::ZERO {
        return Err(ChargeError::InvalidExchangeRate(format!(
            "applied rate must be positive, got {rate}"
        )));
    }

    let fee_amount = percent_of(input.source_amount, input.fee_percentage, "fee_amount")?;
    let target_amount = mul(input.source_amount, rate, "target_amount")?;
    let total_cost = add(input.source_amount, fee_amount, "total_cost")?;

    let loss_gain = input
        .expected_rate
        .map(|expected| loss_gain(rate, expected, input.source_amount))
        .transpose()?;

    debug!(
        from = %input.source_currency,
        to = %input.target_currency,
        %rate,
        %total_cost,
        "Priced currency exchange"
    );

    Ok(ExchangeCost {
        source_currency: input.source_currency,
        target_currency: input.target_currency,
        applied_rate: rate,
        source_amount: input.source_amount,
        target_amount,
        fee_amount,
        total_cost,
        loss_gain,
    })
}

fn loss_gain(rate: Decimal, expected: Decimal, source_amount: Decimal) -> Result<LossGain> {
    if expected <= Decimal::ZERO {
        return Err(ChargeError::InvalidExchangeRate(format!(
            "expected rate must be positive, got {expected}"
        )));
    }
    let amount = mul(sub(rate, expected, "loss_gain")?, source_amount, "loss_gain")?;
    let expected_amount = mul(expected, source_amount, "loss_gain")?;
    Ok(LossGain {
        amount,
        is_gain: amount >= Decimal::ZERO,
        percentage: mul(
            div(amount, expected_amount, "loss_gain")?,
            Decimal::ONE_HUNDRED,
            "loss_gain",
        )?,
    })
}
