//! Packaging batch domain models.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::{
    BatchStatus, ChargeId, CompanyId, EmployeeId, PackagingBatchId, PackagingTemplateId,
    Priority, ProductId,
};

use crate::error::{ChargeError, Result};

/// One product line of a packaging batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProduct {
    pub product_id: ProductId,
    /// Units to pack.
    pub quantity: i64,
    /// Units packed so far.
    #[serde(default)]
    pub completed_quantity: i64,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub packaging_template_id: Option<PackagingTemplateId>,
}

/// A packaging run on the warehouse floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingBatch {
    /// Unique batch ID.
    pub id: PackagingBatchId,
    /// Company (franchise) running the batch.
    pub company_id: CompanyId,
    pub batch_name: String,
    /// Day the batch is scheduled for.
    pub batch_date: NaiveDate,
    pub status: BatchStatus,
    /// Planned duration in minutes.
    pub planned_duration: i64,
    /// Actual duration in minutes, set only at completion.
    pub actual_duration: Option<i64>,
    pub assigned_workers: BTreeSet<EmployeeId>,
    pub products: Vec<BatchProduct>,
    pub defect_count: u32,
    pub rework_count: u32,
    /// Quality score in 0..=100, set only at completion.
    pub overall_quality_score: Option<Decimal>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    /// Boxing charge booked for this batch's cost.
    pub charge_id: Option<ChargeId>,
    pub notes: Option<String>,
    /// Bumped on every stored change; writers compare it before saving.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PackagingBatch {
    /// A new batch in `planned` with nothing packed yet.
    #[must_use]
    pub fn planned(id: PackagingBatchId, new: NewPackagingBatch, now: DateTime<Utc>) -> Self {
        Self {
            id,
            company_id: new.company_id,
            batch_name: new.batch_name,
            batch_date: new.batch_date,
            status: BatchStatus::Planned,
            planned_duration: new.planned_duration,
            actual_duration: None,
            assigned_workers: new.assigned_workers,
            products: new
                .products
                .into_iter()
                .map(|product| BatchProduct {
                    completed_quantity: 0,
                    ..product
                })
                .collect(),
            defect_count: 0,
            rework_count: 0,
            overall_quality_score: None,
            started_at: None,
            completed_at: None,
            cancellation_reason: None,
            charge_id: None,
            notes: new.notes,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Units to pack across all products.
    #[must_use]
    pub fn total_items(&self) -> i64 {
        self.products.iter().map(|p| p.quantity).sum()
    }

    /// Units packed across all products.
    #[must_use]
    pub fn completed_items(&self) -> i64 {
        self.products.iter().map(|p| p.completed_quantity).sum()
    }

    /// Percentage of units packed, recomputed from the product lines.
    ///
    /// An empty batch reports 0.
    #[must_use]
    pub fn completion_percentage(&self) -> Decimal {
        let total = self.total_items();
        if total <= 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.completed_items()) / Decimal::from(total) * Decimal::ONE_HUNDRED
    }

    #[must_use]
    pub fn product(&self, product_id: ProductId) -> Option<&BatchProduct> {
        self.products.iter().find(|p| p.product_id == product_id)
    }
}

/// Input for planning a new packaging batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPackagingBatch {
    pub company_id: CompanyId,
    pub batch_name: String,
    pub batch_date: NaiveDate,
    /// Planned duration in minutes.
    pub planned_duration: i64,
    #[serde(default)]
    pub assigned_workers: BTreeSet<EmployeeId>,
    pub products: Vec<BatchProduct>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewPackagingBatch {
    /// Validate the plan.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidInput` for a blank name, a negative
    /// duration, an empty product list, a non-positive quantity, or a product
    /// listed twice.
    pub fn validate(&self) -> Result<()> {
        if self.batch_name.trim().is_empty() {
            return Err(ChargeError::invalid_input("batch_name must not be blank"));
        }
        if self.planned_duration < 0 {
            return Err(ChargeError::invalid_input(format!(
                "planned_duration must not be negative, got {}",
                self.planned_duration
            )));
        }
        if self.products.is_empty() {
            return Err(ChargeError::invalid_input("a batch needs at least one product"));
        }
        let mut seen = BTreeSet::new();
        for product in &self.products {
            if product.quantity <= 0 {
                return Err(ChargeError::invalid_input(format!(
                    "product {} quantity must be greater than zero",
                    product.product_id
                )));
            }
            if !seen.insert(product.product_id) {
                return Err(ChargeError::invalid_input(format!(
                    "product {} is listed more than once",
                    product.product_id
                )));
            }
        }
        Ok(())
    }
}
