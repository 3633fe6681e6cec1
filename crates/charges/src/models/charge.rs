//! Charge domain models.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::{
    ChargeId, ChargeStatus, ChargeType, CompanyId, Currency, Money, PackagingBatchId, Priority,
};

use crate::calculators::boxing::{BoxingCost, BoxingInput};
use crate::calculators::exchange::{ExchangeCost, ExchangeInput};
use crate::calculators::returns::{ReturnsCost, ReturnsInput};
use crate::calculators::salary::{SalaryCost, SalaryInput};
use crate::calculators::shipping::{ShippingCost, ShippingInput, ShippingRate};
use crate::error::{ChargeError, Result};

/// Category-specific payload of a charge: the calculator input and the
/// breakdown it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChargeDetails {
    Shipping {
        input: ShippingInput,
        /// Rate the shipment was priced under.
        rate: ShippingRate,
        cost: ShippingCost,
    },
    Boxing {
        input: BoxingInput,
        cost: BoxingCost,
        /// Packaging batch whose completion produced this charge.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_id: Option<PackagingBatchId>,
    },
    Salary {
        input: SalaryInput,
        cost: SalaryCost,
    },
    Exchange {
        input: ExchangeInput,
        cost: ExchangeCost,
    },
    Returns {
        input: ReturnsInput,
        cost: ReturnsCost,
    },
    /// Free-form expense with no calculator.
    Generic {
        amount: Decimal,
        #[serde(default)]
        description: Option<String>,
    },
}

impl ChargeDetails {
    #[must_use]
    pub const fn charge_type(&self) -> ChargeType {
        match self {
            Self::Shipping { .. } => ChargeType::Shipping,
            Self::Boxing { .. } => ChargeType::Boxing,
            Self::Salary { .. } => ChargeType::Salary,
            Self::Exchange { .. } => ChargeType::Exchange,
            Self::Returns { .. } => ChargeType::Returns,
            Self::Generic { .. } => ChargeType::Generic,
        }
    }

    /// Total cost in major units, as booked on the charge.
    #[must_use]
    pub const fn total_cost(&self) -> Decimal {
        match self {
            Self::Shipping { cost, .. } => cost.total_cost,
            Self::Boxing { cost, .. } => cost.total_cost,
            Self::Salary { cost, .. } => cost.total_cost(),
            Self::Exchange { cost, .. } => cost.total_cost,
            Self::Returns { cost, .. } => cost.total_cost(),
            Self::Generic { amount, .. } => *amount,
        }
    }

    /// Currency the total is expressed in.
    ///
    /// An exchange is paid in its source currency; every other category uses
    /// the charge's own currency.
    #[must_use]
    pub const fn billing_currency(&self, default: Currency) -> Currency {
        match self {
            Self::Exchange { input, .. } => input.source_currency,
            _ => default,
        }
    }

    #[must_use]
    pub const fn batch_id(&self) -> Option<PackagingBatchId> {
        match self {
            Self::Boxing { batch_id, .. } => *batch_id,
            _ => None,
        }
    }

    /// Items costed by a boxing calculation.
    #[must_use]
    pub const fn batch_size(&self) -> Option<i64> {
        match self {
            Self::Boxing { input, .. } => Some(input.batch_size),
            _ => None,
        }
    }

    /// Free text that participates in search.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Generic { description, .. } => description.as_deref(),
            _ => None,
        }
    }
}

/// What to price for a new charge or a recalculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChargeRequest {
    Shipping {
        input: ShippingInput,
    },
    Boxing {
        input: BoxingInput,
        #[serde(default)]
        batch_id: Option<PackagingBatchId>,
    },
    Salary {
        input: SalaryInput,
    },
    Exchange {
        input: ExchangeInput,
    },
    Returns {
        input: ReturnsInput,
    },
    Generic {
        amount: Decimal,
        #[serde(default)]
        description: Option<String>,
    },
}

impl ChargeRequest {
    #[must_use]
    pub const fn charge_type(&self) -> ChargeType {
        match self {
            Self::Shipping { .. } => ChargeType::Shipping,
            Self::Boxing { .. } => ChargeType::Boxing,
            Self::Salary { .. } => ChargeType::Salary,
            Self::Exchange { .. } => ChargeType::Exchange,
            Self::Returns { .. } => ChargeType::Returns,
            Self::Generic { .. } => ChargeType::Generic,
        }
    }
}

/// One entry of a charge's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: ChargeStatus,
    pub to: ChargeStatus,
    /// Approval note or rejection reason.
    #[serde(default)]
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// A recorded operating cost moving through approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    /// Unique charge ID.
    pub id: ChargeId,
    /// Company (franchise) the cost belongs to.
    pub company_id: CompanyId,
    /// Free-form accounting category.
    pub category: String,
    pub title: String,
    /// Total cost in minor units of `currency`.
    pub amount: i64,
    pub currency: Currency,
    pub status: ChargeStatus,
    pub priority: Priority,
    pub tags: BTreeSet<String>,
    pub details: ChargeDetails,
    /// Note recorded by the last approval or rejection.
    pub approval_notes: Option<String>,
    /// Every status change, oldest first.
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Charge {
    /// Attach a storage-assigned id to a freshly priced charge.
    #[must_use]
    pub fn draft(id: ChargeId, unsaved: UnsavedCharge) -> Self {
        Self {
            id,
            company_id: unsaved.company_id,
            category: unsaved.category,
            title: unsaved.title,
            amount: unsaved.amount,
            currency: unsaved.currency,
            status: ChargeStatus::Draft,
            priority: unsaved.priority,
            tags: unsaved.tags,
            details: unsaved.details,
            approval_notes: None,
            history: Vec::new(),
            created_at: unsaved.created_at,
            updated_at: unsaved.created_at,
        }
    }

    #[must_use]
    pub const fn charge_type(&self) -> ChargeType {
        self.details.charge_type()
    }

    /// The booked amount.
    #[must_use]
    pub const fn money(&self) -> Money {
        Money::new(self.amount, self.currency)
    }

    /// Replace the details with a new calculation and rebook the amount.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidStateTransition` unless the charge is in
    /// draft or rejected, or `ChargeError::InvalidInput` if the category
    /// changes, the packaging batch reference changes, a batch-booked charge
    /// is repriced for a different item count, or the total does not fit in
    /// minor units.
    pub fn replace_details(&mut self, details: ChargeDetails, now: DateTime<Utc>) -> Result<()> {
        if !self.status.is_editable() {
            return Err(ChargeError::transition(self.status, "recalculate"));
        }
        if details.charge_type() != self.charge_type() {
            return Err(ChargeError::invalid_input(format!(
                "cannot change a {} charge into a {} charge",
                self.charge_type(),
                details.charge_type()
            )));
        }

        // The batch reference is written once, at booking
        let booked_for = self.details.batch_id();
        if details.batch_id() != booked_for {
            return Err(ChargeError::invalid_input(match booked_for {
                Some(batch) => format!(
                    "charge {} is booked for packaging batch {batch}; \
                     its batch reference cannot change",
                    self.id
                ),
                None => format!("charge {} was not booked from a packaging batch", self.id),
            }));
        }
        if booked_for.is_some() && details.batch_size() != self.details.batch_size() {
            return Err(ChargeError::invalid_input(format!(
                "charge {} must be costed for the {} items of its packaging batch",
                self.id,
                self.details.batch_size().unwrap_or_default()
            )));
        }
        let currency = details.billing_currency(self.currency);
        self.amount = amount_in_minor_units(&details, currency)?;
        self.currency = currency;
        self.details = details;
        self.updated_at = now;
        Ok(())
    }
}

/// Caller-supplied fields for a new charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCharge {
    pub company_id: CompanyId,
    pub category: String,
    pub title: String,
    /// Defaults to the configured currency.
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub request: ChargeRequest,
}

impl NewCharge {
    /// Validate the header fields.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidInput` if the title or category is blank.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ChargeError::invalid_input("title must not be blank"));
        }
        if self.category.trim().is_empty() {
            return Err(ChargeError::invalid_input("category must not be blank"));
        }
        Ok(())
    }
}

/// A priced charge waiting for an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsavedCharge {
    pub company_id: CompanyId,
    pub category: String,
    pub title: String,
    pub amount: i64,
    pub currency: Currency,
    pub priority: Priority,
    pub tags: BTreeSet<String>,
    pub details: ChargeDetails,
    pub created_at: DateTime<Utc>,
}

impl UnsavedCharge {
    /// Combine header fields with a calculation.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidInput` if the total does not fit in
    /// minor units.
    pub fn priced(
        new: NewCharge,
        details: ChargeDetails,
        default_currency: Currency,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let currency = details.billing_currency(new.currency.unwrap_or(default_currency));
        let amount = amount_in_minor_units(&details, currency)?;
        Ok(Self {
            company_id: new.company_id,
            category: new.category.trim().to_string(),
            title: new.title.trim().to_string(),
            amount,
            currency,
            priority: new.priority,
            tags: new.tags,
            details,
            created_at: now,
        })
    }
}

fn amount_in_minor_units(details: &ChargeDetails, currency: Currency) -> Result<i64> {
    Money::from_decimal(details.total_cost(), currency)
        .map(|money| money.minor_units)
        .map_err(|err| ChargeError::invalid_input(err.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::ErrorKind;

    fn generic(amount: Decimal) -> ChargeDetails {
        ChargeDetails::Generic {
            amount,
            description: Some("office rent".to_string()),
        }
    }

    fn new_charge() -> NewCharge {
        NewCharge {
            company_id: CompanyId::new(1),
            category: " rent ".to_string(),
            title: "March rent".to_string(),
            currency: None,
            priority: Priority::High,
            tags: BTreeSet::from(["office".to_string()]),
            request: ChargeRequest::Generic {
                amount: dec!(1234.565),
                description: None,
            },
        }
    }

    #[test]
    fn test_priced_books_minor_units() {
        let unsaved = UnsavedCharge::priced(
            new_charge(),
            generic(dec!(1234.565)),
            Currency::DZD,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(unsaved.amount, 123_457);
        assert_eq!(unsaved.currency, Currency::DZD);
        assert_eq!(unsaved.category, "rent");

        let charge = Charge::draft(ChargeId::new(9), unsaved);
        assert_eq!(charge.status, ChargeStatus::Draft);
        assert_eq!(charge.money().to_string(), "1234.57 DZD");
        assert!(charge.history.is_empty());
    }

    #[test]
    fn test_blank_title_rejected() {
        let mut new = new_charge();
        new.title = "   ".to_string();
        assert_eq!(new.validate().unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_replace_details_only_when_editable() {
        let unsaved =
            UnsavedCharge::priced(new_charge(), generic(dec!(10)), Currency::EUR, Utc::now())
                .unwrap();
        let mut charge = Charge::draft(ChargeId::new(1), unsaved);

        charge.replace_details(generic(dec!(20)), Utc::now()).unwrap();
        assert_eq!(charge.amount, 2000);

        charge.status = ChargeStatus::Approved;
        let err = charge
            .replace_details(generic(dec!(30)), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(charge.amount, 2000);
    }

    fn boxing(batch_size: i64, labor_hours: Decimal, batch_id: Option<i32>) -> ChargeDetails {
        let input = BoxingInput {
            batch_size,
            materials: vec![],
            labor_hours,
            labor_rate: dec!(1500),
        };
        ChargeDetails::Boxing {
            cost: crate::calculators::boxing::calculate(&input).unwrap(),
            input,
            batch_id: batch_id.map(PackagingBatchId::new),
        }
    }

    #[test]
    fn test_batch_reference_is_fixed() {
        let unsaved = UnsavedCharge::priced(
            new_charge(),
            boxing(100, dec!(10), Some(4)),
            Currency::DZD,
            Utc::now(),
        )
        .unwrap();
        let mut charge = Charge::draft(ChargeId::new(3), unsaved);

        for details in [
            boxing(100, dec!(10), None),
            boxing(100, dec!(10), Some(5)),
            boxing(101, dec!(10), Some(4)),
        ] {
            let err = charge.replace_details(details, Utc::now()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(charge.details.batch_id(), Some(PackagingBatchId::new(4)));
        assert_eq!(charge.amount, 1_500_000);

        // Same batch, corrected labor
        charge
            .replace_details(boxing(100, dec!(12), Some(4)), Utc::now())
            .unwrap();
        assert_eq!(charge.amount, 1_800_000);
    }

    #[test]
    fn test_unbooked_charge_cannot_gain_batch_reference() {
        let details = boxing(10, dec!(1), None);
        let unsaved =
            UnsavedCharge::priced(new_charge(), details, Currency::DZD, Utc::now()).unwrap();
        let mut charge = Charge::draft(ChargeId::new(3), unsaved);
        let err = charge
            .replace_details(boxing(10, dec!(1), Some(4)), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_details_serialize_with_type_tag() {
        let json = serde_json::to_value(generic(dec!(5))).unwrap();
        assert_eq!(json["type"], "generic");

        let request: ChargeRequest =
            serde_json::from_str(r#"{"type":"generic","amount":"12.50"}"#).unwrap();
        assert_eq!(request.charge_type(), ChargeType::Generic);
    }
}
