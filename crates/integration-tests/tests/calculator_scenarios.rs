//! Reference pricing scenarios run through the ledger, from request to booked
//! amount.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeSet;

use rust_decimal_macros::dec;

use backoffice_charges::calculators::boxing::{BoxingInput, MaterialRequirement};
use backoffice_charges::calculators::exchange::ExchangeInput;
use backoffice_charges::calculators::returns::{
    ItemCondition, ProcessingOptions, ReturnItem, ReturnReason, ReturnsInput, RiskLevel,
};
use backoffice_charges::calculators::salary::{
    Allowances, Deductions, PayFrequency, SalaryInput,
};
use backoffice_charges::{ChargeDetails, ChargeRequest, ErrorKind, NewCharge};
use backoffice_core::{Currency, EmployeeId, MaterialId, Priority, ProductId};
use backoffice_integration_tests::{COMPANY, TestContext, shipment};

fn new_charge(title: &str, request: ChargeRequest) -> NewCharge {
    NewCharge {
        company_id: COMPANY,
        category: "operations".to_string(),
        title: title.to_string(),
        currency: None,
        priority: Priority::Medium,
        tags: BTreeSet::new(),
        request,
    }
}

// =============================================================================
// Shipping
// =============================================================================

#[tokio::test]
async fn test_shipping_reference_scenario() {
    let ctx = TestContext::new();
    let charge = ctx
        .ledger
        .create(new_charge(
            "Parcel to Oran",
            ChargeRequest::Shipping {
                input: shipment(dec!(10), dec!(10)),
            },
        ))
        .await
        .unwrap();

    // 500 + 150 × 10 kg = 2000, plus 15% fuel
    assert_eq!(charge.details.total_cost(), dec!(2300));
    assert_eq!(charge.amount, 230_000);
    assert_eq!(charge.currency, Currency::DZD);

    let ChargeDetails::Shipping { rate, cost, .. } = &charge.details else {
        panic!("expected shipping details");
    };
    assert_eq!(rate.service_type, "standard");
    assert_eq!(cost.billable_weight, dec!(10));
}

#[tokio::test]
async fn test_shipping_bills_volumetric_weight() {
    let ctx = TestContext::new();
    // 50 cm cube: 125000 cm³ / 5000 = 25 kg volumetric
    let details = ctx
        .ledger
        .engine()
        .price(ChargeRequest::Shipping {
            input: shipment(dec!(2), dec!(50)),
        })
        .await
        .unwrap();

    let ChargeDetails::Shipping { cost, .. } = details else {
        panic!("expected shipping details");
    };
    assert_eq!(cost.volumetric_weight, dec!(25));
    assert_eq!(cost.billable_weight, dec!(25));
}

#[tokio::test]
async fn test_shipping_unserved_route() {
    let ctx = TestContext::new();
    let mut input = shipment(dec!(1), dec!(10));
    input.destination_zone = "TAM".to_string();

    let err = ctx
        .ledger
        .create(new_charge("Parcel to Tamanrasset", ChargeRequest::Shipping { input }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoRateAvailable);
}

// =============================================================================
// Boxing
// =============================================================================

#[tokio::test]
async fn test_boxing_reference_scenario() {
    let ctx = TestContext::new();
    let charge = ctx
        .ledger
        .create(new_charge(
            "Gift box run",
            ChargeRequest::Boxing {
                input: BoxingInput {
                    batch_size: 100,
                    materials: vec![MaterialRequirement {
                        material_id: MaterialId::new(1),
                        name: None,
                        quantity_per_item: dec!(2),
                        cost_per_unit: dec!(35),
                    }],
                    labor_hours: dec!(10),
                    labor_rate: dec!(1500),
                },
                batch_id: None,
            },
        ))
        .await
        .unwrap();

    let ChargeDetails::Boxing { cost, .. } = &charge.details else {
        panic!("expected boxing details");
    };
    assert_eq!(cost.material_cost, dec!(7000));
    assert_eq!(cost.labor_cost, dec!(15000));
    assert_eq!(cost.total_cost, dec!(22000));
    assert_eq!(cost.cost_per_unit_output, dec!(220));
}

#[tokio::test]
async fn test_boxing_rejects_empty_batch() {
    let ctx = TestContext::new();
    let err = ctx
        .ledger
        .create(new_charge(
            "Empty run",
            ChargeRequest::Boxing {
                input: BoxingInput {
                    batch_size: 0,
                    materials: vec![],
                    labor_hours: dec!(1),
                    labor_rate: dec!(1500),
                },
                batch_id: None,
            },
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBatchSize);
}

// =============================================================================
// Returns
// =============================================================================

#[tokio::test]
async fn test_returns_high_risk_is_not_approved() {
    let ctx = TestContext::new();
    let charge = ctx
        .ledger
        .create(new_charge(
            "Return of order 1182",
            ChargeRequest::Returns {
                input: ReturnsInput {
                    reason: ReturnReason::CustomerChangedMind,
                    items: vec![ReturnItem {
                        product_id: ProductId::new(9),
                        quantity: 1,
                        original_price: dec!(60000),
                        condition: ItemCondition::Damaged,
                    }],
                    processing: ProcessingOptions {
                        disposal_cost: dec!(500),
                        ..ProcessingOptions::default()
                    },
                    shipping_cost: dec!(800),
                    administrative_cost: dec!(0),
                    shipping_refund: dec!(0),
                    restocking_fee: dec!(0),
                    processing_fee: dec!(0),
                },
            },
        ))
        .await
        .unwrap();

    let ChargeDetails::Returns { cost, .. } = &charge.details else {
        panic!("expected returns details");
    };
    // Damaged items refund 30%
    assert_eq!(cost.total_refund, dec!(18000));
    assert_eq!(cost.net_loss, dec!(19300));
    assert_eq!(cost.risk.level, RiskLevel::High);
    assert_eq!(cost.risk.factors.len(), 3);
    assert!(!cost.recommendation.approve_return);
    assert_eq!(charge.amount, 1_930_000);
}

// =============================================================================
// Salary
// =============================================================================

#[tokio::test]
async fn test_salary_net_is_gross_minus_deductions() {
    let ctx = TestContext::new();
    let charge = ctx
        .ledger
        .create(new_charge(
            "March payroll, employee 7",
            ChargeRequest::Salary {
                input: SalaryInput {
                    employee_id: EmployeeId::new(7),
                    pay_frequency: PayFrequency::Monthly,
                    base_salary: dec!(52800),
                    overtime_hours: dec!(10),
                    overtime_multiplier: None,
                    work_days: None,
                    work_hours: None,
                    absent_days: dec!(0),
                    allowances: Allowances {
                        transport: dec!(3000),
                        ..Allowances::default()
                    },
                    deductions: Deductions {
                        social_security: dec!(4000),
                        ..Deductions::default()
                    },
                },
            },
        ))
        .await
        .unwrap();

    let ChargeDetails::Salary { cost, .. } = &charge.details else {
        panic!("expected salary details");
    };
    // 52800 / 176 h × 1.5
    assert_eq!(cost.overtime_rate, dec!(450));
    assert_eq!(cost.overtime_amount, dec!(4500));
    assert_eq!(cost.gross_amount, dec!(60300));
    assert_eq!(cost.net_amount, dec!(56300));
    // The employer's cost is the gross amount
    assert_eq!(charge.amount, 6_030_000);
}

// =============================================================================
// Exchange
// =============================================================================

#[tokio::test]
async fn test_exchange_is_billed_in_source_currency() {
    let ctx = TestContext::new();
    let charge = ctx
        .ledger
        .create(new_charge(
            "Supplier payment in euros",
            ChargeRequest::Exchange {
                input: ExchangeInput {
                    source_currency: Currency::EUR,
                    target_currency: Currency::DZD,
                    source_amount: dec!(1000),
                    rate: None,
                    fee_percentage: dec!(2),
                    expected_rate: None,
                },
            },
        ))
        .await
        .unwrap();

    let ChargeDetails::Exchange { cost, .. } = &charge.details else {
        panic!("expected exchange details");
    };
    assert_eq!(cost.applied_rate, dec!(145));
    assert_eq!(cost.target_amount, dec!(145000));
    assert_eq!(cost.total_cost, dec!(1020));
    assert_eq!(charge.currency, Currency::EUR);
    assert_eq!(charge.amount, 102_000);
}

#[tokio::test]
async fn test_exchange_without_known_rate() {
    let ctx = TestContext::new();
    let err = ctx
        .ledger
        .create(new_charge(
            "Dollar to euro",
            ChargeRequest::Exchange {
                input: ExchangeInput {
                    source_currency: Currency::USD,
                    target_currency: Currency::EUR,
                    source_amount: dec!(100),
                    rate: None,
                    fee_percentage: dec!(0),
                    expected_rate: None,
                },
            },
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidExchangeRate);
}
