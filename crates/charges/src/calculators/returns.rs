//! Customer return costing, fraud-risk scoring, and resolution recommendation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::ProductId;

use super::{add, ensure_non_negative, mul, sub, sum};
use crate::error::{ChargeError, Result};

/// Total return value above which the return counts as a risk factor.
pub const DEFAULT_HIGH_VALUE_THRESHOLD: Decimal = Decimal::from_parts(50_000, 0, 0, false, 0);

/// Net loss at or above which a return is not auto-approved.
pub const DEFAULT_APPROVAL_NET_LOSS_LIMIT: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

/// Net loss above which a partial refund is suggested.
pub const DEFAULT_PARTIAL_REFUND_THRESHOLD: Decimal = Decimal::from_parts(50_000, 0, 0, false, 0);

/// Restocking cost as a fraction of the item value.
pub const DEFAULT_RESTOCKING_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);

/// Risk is high when strictly more factors than this are present.
pub const DEFAULT_HIGH_RISK_FACTOR_COUNT: usize = 2;

/// Physical condition of a returned item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
    Damaged,
    Defective,
}

impl ItemCondition {
    /// Fraction of the original price refunded for this condition.
    #[must_use]
    pub const fn refund_rate(self) -> Decimal {
        match self {
            Self::New | Self::Defective => Decimal::ONE,
            Self::LikeNew => Decimal::from_parts(90, 0, 0, false, 2),
            Self::Good => Decimal::from_parts(75, 0, 0, false, 2),
            Self::Fair => Decimal::from_parts(60, 0, 0, false, 2),
            Self::Poor => Decimal::from_parts(45, 0, 0, false, 2),
            Self::Damaged => Decimal::from_parts(30, 0, 0, false, 2),
        }
    }

    /// Whether the item must be disposed of rather than restocked.
    #[must_use]
    pub const fn requires_disposal(self) -> bool {
        matches!(self, Self::Damaged | Self::Defective)
    }

    /// Whether the condition counts toward fraud risk.
    #[must_use]
    pub const fn is_suspicious(self) -> bool {
        matches!(self, Self::Poor | Self::Damaged)
    }
}

/// Customer-stated reason for the return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    DefectiveProduct,
    WrongItem,
    NotAsDescribed,
    DamagedInShipping,
    CustomerChangedMind,
    SizeIssue,
    QualityIssue,
    Other,
}

/// One returned product line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price the customer originally paid.
    pub original_price: Decimal,
    pub condition: ItemCondition,
}

/// Handling applied to every returned item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProcessingOptions {
    #[serde(default)]
    pub inspection_required: bool,
    /// Flat cost per item line when inspection is required.
    #[serde(default)]
    pub inspection_cost: Decimal,
    #[serde(default)]
    pub apply_restocking_fee: bool,
    #[serde(default)]
    pub refurbishment_needed: bool,
    /// Flat cost per item line when refurbishment is needed.
    #[serde(default)]
    pub refurbishment_cost: Decimal,
    /// Flat cost per damaged or defective item line.
    #[serde(default)]
    pub disposal_cost: Decimal,
}

/// A customer return to be costed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnsInput {
    pub reason: ReturnReason,
    pub items: Vec<ReturnItem>,
    #[serde(default)]
    pub processing: ProcessingOptions,
    /// Return shipping paid by the business.
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub administrative_cost: Decimal,
    /// Original outbound shipping refunded to the customer.
    #[serde(default)]
    pub shipping_refund: Decimal,
    /// Restocking fee collected from the customer.
    #[serde(default)]
    pub restocking_fee: Decimal,
    /// Processing fee collected from the customer.
    #[serde(default)]
    pub processing_fee: Decimal,
}

/// Business thresholds for return costing and risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnsPolicy {
    pub high_value_threshold: Decimal,
    pub approval_net_loss_limit: Decimal,
    pub partial_refund_threshold: Decimal,
    pub restocking_rate: Decimal,
    pub high_risk_factor_count: usize,
}

impl Default for ReturnsPolicy {
    fn default() -> Self {
        Self {
            high_value_threshold: DEFAULT_HIGH_VALUE_THRESHOLD,
            approval_net_loss_limit: DEFAULT_APPROVAL_NET_LOSS_LIMIT,
            partial_refund_threshold: DEFAULT_PARTIAL_REFUND_THRESHOLD,
            restocking_rate: DEFAULT_RESTOCKING_RATE,
            high_risk_factor_count: DEFAULT_HIGH_RISK_FACTOR_COUNT,
        }
    }
}

/// Observed signal that raises the fraud risk of a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    CustomerChangedMind,
    HighReturnValue,
    PoorOrDamagedCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    FullRefund,
    PartialRefund,
}

/// Per-line refund and handling cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItemCost {
    pub product_id: ProductId,
    pub condition: ItemCondition,
    pub item_value: Decimal,
    pub refund_rate: Decimal,
    pub refund_price: Decimal,
    pub inspection_cost: Decimal,
    pub restocking_cost: Decimal,
    pub refurbishment_cost: Decimal,
    pub disposal_cost: Decimal,
    pub processing_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub approve_return: bool,
    pub suggested_resolution: Resolution,
}

/// Full cost and risk breakdown of a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnsCost {
    pub items: Vec<ReturnItemCost>,
    pub total_return_value: Decimal,
    pub total_refund: Decimal,
    pub total_processing_cost: Decimal,
    /// Net cost of the return to the business; the charge amount.
    pub net_loss: Decimal,
    pub risk: RiskAssessment,
    pub recommendation: Recommendation,
}

impl ReturnsCost {
    /// The amount booked for a returns charge.
    #[must_use]
    pub const fn total_cost(&self) -> Decimal {
        self.net_loss
    }
}

/// Cost one returned line under the given handling options.
///
/// # Errors
///
/// Returns `ChargeError::InvalidInput` if quantity is not positive, the
/// price is negative, or the line is too large to price.
pub fn cost_item(
    item: &ReturnItem,
    options: &ProcessingOptions,
    policy: &ReturnsPolicy,
) -> Result<ReturnItemCost> {
    if item.quantity <= 0 {
        return Err(ChargeError::invalid_input(format!(
            "items.quantity must be positive for product {}",
            item.product_id
        )));
    }
    ensure_non_negative(item.original_price, "items.original_price")?;

    let item_value = mul(item.original_price, Decimal::from(item.quantity), "items.item_value")?;
    let refund_rate = item.condition.refund_rate();
    let refund_price = mul(item_value, refund_rate, "items.refund_price")?;

    let inspection_cost = if options.inspection_required {
        options.inspection_cost
    } else {
        Decimal::ZERO
    };
    let restocking_cost = if options.apply_restocking_fee {
        mul(item_value, policy.restocking_rate, "items.restocking_cost")?
    } else {
        Decimal::ZERO
    };
    let refurbishment_cost = if options.refurbishment_needed {
        options.refurbishment_cost
    } else {
        Decimal::ZERO
    };
    let disposal_cost = if item.condition.requires_disposal() {
        options.disposal_cost
    } else {
        Decimal::ZERO
    };

    Ok(ReturnItemCost {
        product_id: item.product_id,
        condition: item.condition,
        item_value,
        refund_rate,
        refund_price,
        inspection_cost,
        restocking_cost,
        refurbishment_cost,
        disposal_cost,
        processing_cost: sum(
            [inspection_cost, restocking_cost, refurbishment_cost, disposal_cost],
            "items.processing_cost",
        )?,
    })
}

/// Classify fraud risk from the return reason, value, and item conditions.
#[must_use]
pub fn assess_risk(
    input: &ReturnsInput,
    total_return_value: Decimal,
    policy: &ReturnsPolicy,
) -> RiskAssessment {
    let mut factors = Vec::new();
    if input.reason == ReturnReason::CustomerChangedMind {
        factors.push(RiskFactor::CustomerChangedMind);
    }
    if total_return_value > policy.high_value_threshold {
        factors.push(RiskFactor::HighReturnValue);
    }
    if input.items.iter().any(|item| item.condition.is_suspicious()) {
        factors.push(RiskFactor::PoorOrDamagedCondition);
    }

    let level = if factors.len() > policy.high_risk_factor_count {
        RiskLevel::High
    } else if factors.is_empty() {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    };

    RiskAssessment { level, factors }
}

/// Cost a customer return and recommend how to resolve it.
///
/// # Errors
///
/// Returns `ChargeError::InvalidInput` if there are no items, an item is
/// invalid, any cost or fee is negative, or a total overflows.
pub fn calculate(input: &ReturnsInput, policy: &ReturnsPolicy) -> Result<ReturnsCost> {
    if input.items.is_empty() {
        return Err(ChargeError::invalid_input("a return needs at least one item"));
    }
    ensure_non_negative(policy.restocking_rate, "restocking_rate")?;
    let options = &input.processing;
    ensure_non_negative(options.inspection_cost, "processing.inspection_cost")?;
    ensure_non_negative(options.refurbishment_cost, "processing.refurbishment_cost")?;
    ensure_non_negative(options.disposal_cost, "processing.disposal_cost")?;
    ensure_non_negative(input.shipping_cost, "shipping_cost")?;
    ensure_non_negative(input.administrative_cost, "administrative_cost")?;
    ensure_non_negative(input.shipping_refund, "shipping_refund")?;
    ensure_non_negative(input.restocking_fee, "restocking_fee")?;
    ensure_non_negative(input.processing_fee, "processing_fee")?;

    let items = input
        .items
        .iter()
        .map(|item| cost_item(item, options, policy))
        .collect::<Result<Vec<_>>>()?;

    let total_return_value = sum(items.iter().map(|i| i.item_value), "total_return_value")?;
    let total_refund = sum(items.iter().map(|i| i.refund_price), "total_refund")?;
    let total_processing_cost =
        sum(items.iter().map(|i| i.processing_cost), "total_processing_cost")?;

    let gross_loss = sum(
        [
            total_processing_cost,
            input.shipping_cost,
            input.administrative_cost,
            total_refund,
            input.shipping_refund,
        ],
        "net_loss",
    )?;
    let recovered = add(input.restocking_fee, input.processing_fee, "net_loss")?;
    let net_loss = sub(gross_loss, recovered, "net_loss")?;

    let risk = assess_risk(input, total_return_value, policy);
    let recommendation = Recommendation {
        approve_return: risk.level != RiskLevel::High && net_loss < policy.approval_net_loss_limit,
        suggested_resolution: if net_loss > policy.partial_refund_threshold {
            Resolution::PartialRefund
        } else {
            Resolution::FullRefund
        },
    };

    Ok(ReturnsCost {
        items,
        total_return_value,
        total_refund,
        total_processing_cost,
        net_loss,
        risk,
        recommendation,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::ErrorKind;

    fn item(condition: ItemCondition, quantity: i32, price: Decimal) -> ReturnItem {
        ReturnItem {
            product_id: ProductId::new(500),
            quantity,
            original_price: price,
            condition,
        }
    }

    fn simple_return(reason: ReturnReason, items: Vec<ReturnItem>) -> ReturnsInput {
        ReturnsInput {
            reason,
            items,
            processing: ProcessingOptions::default(),
            shipping_cost: Decimal::ZERO,
            administrative_cost: Decimal::ZERO,
            shipping_refund: Decimal::ZERO,
            restocking_fee: Decimal::ZERO,
            processing_fee: Decimal::ZERO,
        }
    }

    #[test]
    fn test_refund_rates() {
        assert_eq!(ItemCondition::New.refund_rate(), dec!(1.0));
        assert_eq!(ItemCondition::Damaged.refund_rate(), dec!(0.30));
        for condition in [
            ItemCondition::New,
            ItemCondition::LikeNew,
            ItemCondition::Good,
            ItemCondition::Fair,
            ItemCondition::Poor,
            ItemCondition::Damaged,
            ItemCondition::Defective,
        ] {
            let rate = condition.refund_rate();
            assert!(rate >= Decimal::ZERO && rate <= Decimal::ONE);
        }
    }

    #[test]
    fn test_item_processing_costs() {
        let options = ProcessingOptions {
            inspection_required: true,
            inspection_cost: dec!(200),
            apply_restocking_fee: true,
            refurbishment_needed: true,
            refurbishment_cost: dec!(500),
            disposal_cost: dec!(300),
        };
        let cost = cost_item(
            &item(ItemCondition::Damaged, 2, dec!(1000)),
            &options,
            &ReturnsPolicy::default(),
        )
        .unwrap();

        assert_eq!(cost.item_value, dec!(2000));
        assert_eq!(cost.refund_price, dec!(600));
        assert_eq!(cost.restocking_cost, dec!(300));
        assert_eq!(cost.disposal_cost, dec!(300));
        assert_eq!(cost.processing_cost, dec!(1300));
    }

    #[test]
    fn test_disposal_only_for_damaged_or_defective() {
        let options = ProcessingOptions {
            disposal_cost: dec!(300),
            ..ProcessingOptions::default()
        };
        let good = cost_item(
            &item(ItemCondition::Good, 1, dec!(100)),
            &options,
            &ReturnsPolicy::default(),
        )
        .unwrap();
        assert_eq!(good.disposal_cost, Decimal::ZERO);

        let defective = cost_item(
            &item(ItemCondition::Defective, 1, dec!(100)),
            &options,
            &ReturnsPolicy::default(),
        )
        .unwrap();
        assert_eq!(defective.disposal_cost, dec!(300));
    }

    #[test]
    fn test_net_loss_subtracts_collected_fees() {
        let mut input = simple_return(
            ReturnReason::WrongItem,
            vec![item(ItemCondition::New, 1, dec!(4000))],
        );
        input.shipping_cost = dec!(600);
        input.administrative_cost = dec!(150);
        input.shipping_refund = dec!(400);
        input.restocking_fee = dec!(250);
        input.processing_fee = dec!(100);

        let cost = calculate(&input, &ReturnsPolicy::default()).unwrap();
        // 0 + 600 + 150 + 4000 + 400 - (250 + 100)
        assert_eq!(cost.net_loss, dec!(4800));
        assert_eq!(cost.total_cost(), dec!(4800));
        assert_eq!(cost.risk.level, RiskLevel::Low);
        assert!(cost.recommendation.approve_return);
        assert_eq!(cost.recommendation.suggested_resolution, Resolution::FullRefund);
    }

    #[test]
    fn test_risk_escalates_to_high_with_three_factors() {
        let input = simple_return(
            ReturnReason::CustomerChangedMind,
            vec![item(ItemCondition::Poor, 10, dec!(6000))],
        );
        let cost = calculate(&input, &ReturnsPolicy::default()).unwrap();

        assert_eq!(cost.risk.factors.len(), 3);
        assert_eq!(cost.risk.level, RiskLevel::High);
        assert!(!cost.recommendation.approve_return);
    }

    #[test]
    fn test_single_factor_is_medium_risk() {
        let input = simple_return(
            ReturnReason::CustomerChangedMind,
            vec![item(ItemCondition::New, 1, dec!(1000))],
        );
        let cost = calculate(&input, &ReturnsPolicy::default()).unwrap();
        assert_eq!(cost.risk.factors, vec![RiskFactor::CustomerChangedMind]);
        assert_eq!(cost.risk.level, RiskLevel::Medium);
    }

    #[test]
    fn test_large_loss_suggests_partial_refund_and_blocks_approval() {
        let input = simple_return(
            ReturnReason::DefectiveProduct,
            vec![item(ItemCondition::Defective, 3, dec!(40000))],
        );
        let cost = calculate(&input, &ReturnsPolicy::default()).unwrap();

        assert_eq!(cost.net_loss, dec!(120000));
        assert_eq!(cost.recommendation.suggested_resolution, Resolution::PartialRefund);
        assert!(!cost.recommendation.approve_return);
    }

    #[test]
    fn test_policy_thresholds_are_overridable() {
        let policy = ReturnsPolicy {
            high_value_threshold: dec!(500),
            ..ReturnsPolicy::default()
        };
        let input = simple_return(
            ReturnReason::WrongItem,
            vec![item(ItemCondition::New, 1, dec!(1000))],
        );
        let cost = calculate(&input, &policy).unwrap();
        assert_eq!(cost.risk.factors, vec![RiskFactor::HighReturnValue]);
    }

    #[test]
    fn test_empty_return_rejected() {
        let err = calculate(
            &simple_return(ReturnReason::Other, Vec::new()),
            &ReturnsPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let err = calculate(
            &simple_return(
                ReturnReason::Other,
                vec![item(ItemCondition::New, 0, dec!(10))],
            ),
            &ReturnsPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_oversized_returns_rejected() {
        for items in [
            vec![item(ItemCondition::New, 2, Decimal::MAX)],
            vec![
                item(ItemCondition::New, 1, Decimal::MAX),
                item(ItemCondition::New, 1, Decimal::MAX),
            ],
        ] {
            let err = calculate(
                &simple_return(ReturnReason::Other, items),
                &ReturnsPolicy::default(),
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
    }
}
