//! Integration tests for the back-office charges engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p backoffice-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `charge_lifecycle` - Ledger create, approval, recalculation, deletion
//! - `packaging_batches` - Batch execution and cost booking
//! - `bulk_operations` - Bulk approval runs and cancellation
//! - `calculator_scenarios` - Reference pricing scenarios through the engine
//! - `charge_queries` - Filtering, sorting, pagination, summaries
//!
//! Every test runs against the in-memory repositories; no database is needed.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use backoffice_charges::calculators::ExchangeRateTable;
use backoffice_charges::calculators::boxing::MaterialRequirement;
use backoffice_charges::calculators::exchange::ExchangeRate;
use backoffice_charges::calculators::shipping::{
    DimensionUnit, Dimensions, ShippingInput, ShippingRate,
};
use backoffice_charges::db::{
    InMemoryBatchRepository, InMemoryChargeRepository, StaticRateProvider,
};
use backoffice_charges::{
    BatchCosting, BatchProduct, BatchService, BulkCoordinator, ChargeLedger, ChargeRequest,
    CostEngine, NewCharge, NewPackagingBatch,
};
use backoffice_core::{
    CompanyId, Currency, EmployeeId, MaterialId, Priority, ProductId, ShippingProviderId,
};

/// Company every fixture books against.
pub const COMPANY: CompanyId = CompanyId::new(1);

/// Services wired to fresh in-memory storage.
#[derive(Debug, Clone)]
pub struct TestContext {
    pub ledger: ChargeLedger,
    pub batches: BatchService,
    pub bulk: BulkCoordinator,
}

impl TestContext {
    /// Context with the reference carrier rates and DZD/EUR/USD exchange rates.
    #[must_use]
    pub fn new() -> Self {
        let engine = CostEngine::new(Arc::new(StaticRateProvider::new(carrier_rates())))
            .with_exchange_rates(exchange_rates());
        let ledger = ChargeLedger::new(Arc::new(InMemoryChargeRepository::new()), engine);
        let batches = BatchService::new(Arc::new(InMemoryBatchRepository::new()), ledger.clone());
        let bulk = BulkCoordinator::new(ledger.clone());
        Self {
            ledger,
            batches,
            bulk,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Two carriers on ALG → ORN and one on ALG → CZL.
#[must_use]
pub fn carrier_rates() -> Vec<ShippingRate> {
    vec![
        rate(1, "standard", "ALG", "ORN", dec!(500), dec!(150), 3),
        rate(2, "express", "ALG", "ORN", dec!(900), dec!(200), 1),
        rate(1, "standard", "ALG", "CZL", dec!(600), dec!(180), 4),
    ]
}

fn rate(
    provider: i32,
    service: &str,
    origin: &str,
    destination: &str,
    base_rate: Decimal,
    rate_per_kg: Decimal,
    estimated_days: u32,
) -> ShippingRate {
    ShippingRate {
        provider_id: ShippingProviderId::new(provider),
        service_type: service.to_string(),
        origin_zone: origin.to_string(),
        destination_zone: destination.to_string(),
        base_rate,
        rate_per_kg,
        minimum_charge: dec!(800),
        fuel_surcharge_rate: dec!(15),
        insurance_rate: dec!(1),
        estimated_days,
    }
}

/// EUR and USD quoted against DZD.
#[must_use]
pub fn exchange_rates() -> ExchangeRateTable {
    let mut table = ExchangeRateTable::new();
    for (from, rate) in [(Currency::EUR, dec!(145)), (Currency::USD, dec!(134))] {
        table
            .insert(ExchangeRate {
                from,
                to: Currency::DZD,
                rate,
            })
            .unwrap_or_default();
    }
    table
}

/// A shipment from ALG to ORN in a cm-measured box.
#[must_use]
pub fn shipment(weight_kg: Decimal, side_cm: Decimal) -> ShippingInput {
    ShippingInput {
        origin_zone: "ALG".to_string(),
        destination_zone: "ORN".to_string(),
        weight_kg,
        dimensions: Dimensions {
            length: side_cm,
            width: side_cm,
            height: side_cm,
            unit: DimensionUnit::Cm,
        },
        service_type: None,
        provider_id: None,
        insurance_value: None,
        cash_on_delivery: false,
        cod_amount: None,
    }
}

/// A draft request for a free-form expense.
#[must_use]
pub fn generic_charge(title: &str, amount: Decimal) -> NewCharge {
    NewCharge {
        company_id: COMPANY,
        category: "operations".to_string(),
        title: title.to_string(),
        currency: None,
        priority: Priority::Medium,
        tags: BTreeSet::new(),
        request: ChargeRequest::Generic {
            amount,
            description: None,
        },
    }
}

/// A batch of 60 units of product 1 and 40 units of product 2.
#[must_use]
pub fn batch_plan() -> NewPackagingBatch {
    NewPackagingBatch {
        company_id: COMPANY,
        batch_name: "Ramadan gift boxes".to_string(),
        batch_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap_or_default(),
        planned_duration: 480,
        assigned_workers: [EmployeeId::new(7), EmployeeId::new(8)].into_iter().collect(),
        products: vec![
            BatchProduct {
                product_id: ProductId::new(1),
                quantity: 60,
                completed_quantity: 0,
                priority: Priority::High,
                packaging_template_id: None,
            },
            BatchProduct {
                product_id: ProductId::new(2),
                quantity: 40,
                completed_quantity: 0,
                priority: Priority::Medium,
                packaging_template_id: None,
            },
        ],
        notes: None,
    }
}

/// Two cartons per item at 35 DA each, 10 labor hours at 1500 DA.
///
/// For the 100-item reference batch: 7000 materials + 15000 labor = 22000.
#[must_use]
pub fn reference_costing() -> BatchCosting {
    BatchCosting {
        materials: vec![MaterialRequirement {
            material_id: MaterialId::new(1),
            name: Some("carton".to_string()),
            quantity_per_item: dec!(2),
            cost_per_unit: dec!(35),
        }],
        labor_hours: Some(dec!(10)),
        labor_rate: dec!(1500),
        currency: None,
        priority: Priority::Medium,
    }
}
