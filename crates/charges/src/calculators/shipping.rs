//! Shipping cost calculation from package weight, dimensions, and carrier rates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use backoffice_core::ShippingProviderId;

use super::{add, div, ensure_non_negative, ensure_positive, mul, percent_of, sum};
use crate::error::{ChargeError, Result};

/// Carrier volumetric divisor for centimetre dimensions (cm³ per kg).
pub const DEFAULT_VOLUMETRIC_DIVISOR: Decimal = Decimal::from_parts(5000, 0, 0, false, 0);

/// Cash-on-delivery fee as a fraction of the collected amount.
pub const DEFAULT_COD_FEE_RATE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// Cubic centimetres per cubic inch.
pub const CUBIC_CM_PER_CUBIC_INCH: Decimal = Decimal::from_parts(16387, 0, 0, false, 3);

/// Unit of the package dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DimensionUnit {
    #[default]
    Cm,
    Inch,
}

/// Outer package dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    #[serde(default)]
    pub unit: DimensionUnit,
}

impl Dimensions {
    /// Package volume in cubic centimetres.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidInput` if the volume overflows.
    pub fn volume_cm3(&self) -> Result<Decimal> {
        let volume = mul(mul(self.length, self.width, "volume")?, self.height, "volume")?;
        match self.unit {
            DimensionUnit::Cm => Ok(volume),
            DimensionUnit::Inch => mul(volume, CUBIC_CM_PER_CUBIC_INCH, "volume"),
        }
    }

    fn validate(&self) -> Result<()> {
        ensure_non_negative(self.length, "dimensions.length")?;
        ensure_non_negative(self.width, "dimensions.width")?;
        ensure_non_negative(self.height, "dimensions.height")
    }
}

/// A carrier's published rate for one route and service level.
///
/// Reference data: consumed by the calculator, never modified by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    pub provider_id: ShippingProviderId,
    pub service_type: String,
    pub origin_zone: String,
    pub destination_zone: String,
    /// Flat amount charged per shipment.
    pub base_rate: Decimal,
    /// Amount per billable kilogram.
    pub rate_per_kg: Decimal,
    /// Floor applied to `base_rate + rate_per_kg × billable_weight`.
    pub minimum_charge: Decimal,
    /// Fuel surcharge, in percent of the base cost.
    pub fuel_surcharge_rate: Decimal,
    /// Insurance premium, in percent of the declared value.
    pub insurance_rate: Decimal,
    pub estimated_days: u32,
}

impl ShippingRate {
    /// Whether this rate serves the route and matches the optional filters.
    #[must_use]
    pub fn serves(
        &self,
        origin: &str,
        destination: &str,
        service_type: Option<&str>,
        provider_id: Option<ShippingProviderId>,
    ) -> bool {
        self.origin_zone.eq_ignore_ascii_case(origin)
            && self.destination_zone.eq_ignore_ascii_case(destination)
            && service_type.is_none_or(|s| self.service_type.eq_ignore_ascii_case(s))
            && provider_id.is_none_or(|p| self.provider_id == p)
    }

    fn validate(&self) -> Result<()> {
        ensure_non_negative(self.base_rate, "rate.base_rate")?;
        ensure_non_negative(self.rate_per_kg, "rate.rate_per_kg")?;
        ensure_non_negative(self.minimum_charge, "rate.minimum_charge")?;
        ensure_non_negative(self.fuel_surcharge_rate, "rate.fuel_surcharge_rate")?;
        ensure_non_negative(self.insurance_rate, "rate.insurance_rate")
    }
}

/// A shipment to be priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInput {
    pub origin_zone: String,
    pub destination_zone: String,
    /// Actual weight in kilograms.
    pub weight_kg: Decimal,
    pub dimensions: Dimensions,
    /// Restrict rate selection to one service level.
    #[serde(default)]
    pub service_type: Option<String>,
    /// Restrict rate selection to one carrier.
    #[serde(default)]
    pub provider_id: Option<ShippingProviderId>,
    /// Declared value to insure.
    #[serde(default)]
    pub insurance_value: Option<Decimal>,
    #[serde(default)]
    pub cash_on_delivery: bool,
    /// Amount collected from the recipient when `cash_on_delivery` is set.
    #[serde(default)]
    pub cod_amount: Option<Decimal>,
}

impl ShippingInput {
    fn validate(&self) -> Result<()> {
        ensure_positive(self.weight_kg, "weight_kg")?;
        self.dimensions.validate()?;
        if let Some(value) = self.insurance_value {
            ensure_non_negative(value, "insurance_value")?;
        }
        if let Some(amount) = self.cod_amount {
            ensure_non_negative(amount, "cod_amount")?;
        }
        Ok(())
    }
}

/// Tunable carrier constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPolicy {
    pub volumetric_divisor: Decimal,
    pub cod_fee_rate: Decimal,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            volumetric_divisor: DEFAULT_VOLUMETRIC_DIVISOR,
            cod_fee_rate: DEFAULT_COD_FEE_RATE,
        }
    }
}

/// Cost breakdown for one shipment under one rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingCost {
    pub provider_id: ShippingProviderId,
    pub service_type: String,
    pub volumetric_weight: Decimal,
    pub billable_weight: Decimal,
    pub base_cost: Decimal,
    pub fuel_surcharge: Decimal,
    pub insurance_cost: Decimal,
    pub cod_fee: Decimal,
    pub total_cost: Decimal,
    pub estimated_delivery_days: u32,
}

/// Volumetric weight in kilograms for the given dimensions.
///
/// # Errors
///
/// Returns `ChargeError::InvalidInput` if the divisor is not positive or the
/// volume overflows.
pub fn volumetric_weight(dimensions: &Dimensions, policy: &ShippingPolicy) -> Result<Decimal> {
    ensure_positive(policy.volumetric_divisor, "volumetric_divisor")?;
    div(dimensions.volume_cm3()?, policy.volumetric_divisor, "volumetric_weight")
}

/// Price a shipment under a specific rate.
///
/// # Errors
///
/// Returns `ChargeError::InvalidInput` if the weight is not positive, any
/// dimension, declared value, COD amount, or rate component is negative, or
/// a figure is too large to price.
pub fn calculate(
    input: &ShippingInput,
    rate: &ShippingRate,
    policy: &ShippingPolicy,
) -> Result<ShippingCost> {
    input.validate()?;
    rate.validate()?;

    let volumetric_weight = volumetric_weight(&input.dimensions, policy)?;
    let billable_weight = input.weight_kg.max(volumetric_weight);

    let weight_cost = mul(rate.rate_per_kg, billable_weight, "base_cost")?;
    let base_cost = add(rate.base_rate, weight_cost, "base_cost")?.max(rate.minimum_charge);
    let fuel_surcharge = percent_of(base_cost, rate.fuel_surcharge_rate, "fuel_surcharge")?;
    let insurance_cost = match input.insurance_value {
        Some(value) => percent_of(value, rate.insurance_rate, "insurance_cost")?,
        None => Decimal::ZERO,
    };
    let cod_fee = if input.cash_on_delivery {
        mul(input.cod_amount.unwrap_or_default(), policy.cod_fee_rate, "cod_fee")?
    } else {
        Decimal::ZERO
    };
    let total_cost = sum([base_cost, fuel_surcharge, insurance_cost, cod_fee], "total_cost")?;

    debug!(
        provider_id = %rate.provider_id,
        service = %rate.service_type,
        %billable_weight,
        %total_cost,
        "Priced shipment"
    );

    Ok(ShippingCost {
        provider_id: rate.provider_id,
        service_type: rate.service_type.clone(),
        volumetric_weight,
        billable_weight,
        base_cost,
        fuel_surcharge,
        insurance_cost,
        cod_fee,
        total_cost,
        estimated_delivery_days: rate.estimated_days,
    })
}

/// Price a shipment under every candidate rate that serves it.
///
/// Quotes are ordered cheapest first, then fastest.
///
/// # Errors
///
/// Returns `ChargeError::NoRateAvailable` if no candidate serves the route
/// and filters, or any error from [`calculate`].
pub fn quote_all(
    input: &ShippingInput,
    rates: &[ShippingRate],
    policy: &ShippingPolicy,
) -> Result<Vec<(ShippingRate, ShippingCost)>> {
    let mut quotes = rates
        .iter()
        .filter(|rate| {
            rate.serves(
                &input.origin_zone,
                &input.destination_zone,
                input.service_type.as_deref(),
                input.provider_id,
            )
        })
        .map(|rate| calculate(input, rate, policy).map(|cost| (rate.clone(), cost)))
        .collect::<Result<Vec<_>>>()?;

    if quotes.is_empty() {
        return Err(no_rate(input));
    }

    quotes.sort_by(|(_, a), (_, b)| {
        a.total_cost
            .cmp(&b.total_cost)
            .then(a.estimated_delivery_days.cmp(&b.estimated_delivery_days))
    });
    Ok(quotes)
}

/// Pick the cheapest rate serving the shipment and price it.
///
/// # Errors
///
/// Same as [`quote_all`].
pub fn select_and_calculate(
    input: &ShippingInput,
    rates: &[ShippingRate],
    policy: &ShippingPolicy,
) -> Result<(ShippingRate, ShippingCost)> {
    quote_all(input, rates, policy)?
        .into_iter()
        .next()
        .ok_or_else(|| no_rate(input))
}

fn no_rate(input: &ShippingInput) -> ChargeError {
    ChargeError::NoRateAvailable {
        origin: input.origin_zone.clone(),
        destination: input.destination_zone.clone(),
        service_type: input.service_type.clone(),
    }
}
