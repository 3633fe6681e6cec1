//! Currency and minor-unit money representation.
//!
//! Calculators work in [`Decimal`] major units. Persisted charge amounts are
//! integers in the currency's minor unit (centimes for DZD, cents for EUR and
//! USD); [`Money::from_decimal`] is the single conversion point between the two.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places held by every supported currency's minor unit.
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Errors that can occur when parsing a [`Currency`] or building [`Money`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    /// The currency code is not one of the supported codes.
    #[error("unsupported currency code: {0}")]
    Unsupported(String),
    /// The amount does not fit in an `i64` count of minor units.
    #[error("amount {0} overflows minor-unit storage")]
    Overflow(Decimal),
}

/// ISO 4217 currency codes handled by the back-office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Currency {
    /// Algerian dinar (home currency of the franchise network).
    #[default]
    DZD,
    EUR,
    USD,
}

impl Currency {
    /// All supported currencies.
    pub const ALL: [Self; 3] = [Self::DZD, Self::EUR, Self::USD];

    /// ISO 4217 alphabetic code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::DZD => "DZD",
            Self::EUR => "EUR",
            Self::USD => "USD",
        }
    }

    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::DZD => "DA",
            Self::EUR => "€",
            Self::USD => "$",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DZD" => Ok(Self::DZD),
            "EUR" => Ok(Self::EUR),
            "USD" => Ok(Self::USD),
            _ => Err(CurrencyError::Unsupported(s.to_owned())),
        }
    }
}

/// An amount of money held as an integer count of minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the smallest currency unit (e.g., centimes for DZD).
    pub minor_units: i64,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new amount from minor units.
    #[must_use]
    pub const fn new(minor_units: i64, currency: Currency) -> Self {
        Self {
            minor_units,
            currency,
        }
    }

    /// Convert a major-unit decimal into minor units.
    ///
    /// Rounds half away from zero to [`MINOR_UNIT_SCALE`] places first.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyError::Overflow` if the result does not fit in `i64`.
    pub fn from_decimal(amount: Decimal, currency: Currency) -> Result<Self, CurrencyError> {
        let rounded =
            amount.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero);
        let scaled = rounded
            .checked_mul(Decimal::from(10_i64.pow(MINOR_UNIT_SCALE)))
            .ok_or(CurrencyError::Overflow(amount))?;
        let minor_units = i64::try_from(scaled).map_err(|_| CurrencyError::Overflow(amount))?;
        Ok(Self::new(minor_units, currency))
    }

    /// The amount in major units.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.minor_units, MINOR_UNIT_SCALE)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.to_decimal(), self.currency)
    }
}
