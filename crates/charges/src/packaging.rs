//! Packaging batch execution.
//!
//! A batch is planned, started, progressed line by line, and finally either
//! completed (once every unit is packed) or cancelled. Completing a batch can
//! book its material and labor cost as a boxing charge; the batch keeps the
//! resulting charge id so the cost is booked once.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use backoffice_core::{
    BatchStatus, ChargeStatus, CompanyId, Currency, PackagingBatchId, Priority, ProductId,
};

use crate::calculators::boxing::{BoxingInput, MaterialRequirement};
use crate::db::{BatchRepository, RepositoryError};
use crate::error::{ChargeError, Result};
use crate::fsm::Transition;
use crate::ledger::ChargeLedger;
use crate::models::{Charge, ChargeRequest, NewCharge, NewPackagingBatch, PackagingBatch};

/// Accounting category used for booked batch costs.
pub const PACKAGING_CATEGORY: &str = "packaging";

const MINUTES_PER_HOUR: Decimal = Decimal::from_parts(60, 0, 0, false, 0);

/// Packed quantity reported for one product line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub product_id: ProductId,
    /// Total units packed so far for this line (not an increment).
    pub completed_quantity: i64,
}

/// Something that happens to a packaging batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Start,
    UpdateProgress {
        #[serde(default)]
        updates: Vec<ProgressUpdate>,
        /// Total defects found so far; `None` keeps the stored count.
        #[serde(default)]
        defect_count: Option<u32>,
        /// Total units reworked so far; `None` keeps the stored count.
        #[serde(default)]
        rework_count: Option<u32>,
    },
    Complete {
        /// Minutes actually spent.
        actual_duration: i64,
    },
    Cancel {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl BatchEvent {
    /// Status this event leads to when legal.
    #[must_use]
    pub const fn target(&self) -> BatchStatus {
        match self {
            Self::Start | Self::UpdateProgress { .. } => BatchStatus::InProgress,
            Self::Complete { .. } => BatchStatus::Completed,
            Self::Cancel { .. } => BatchStatus::Cancelled,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::UpdateProgress { .. } => "update_progress",
            Self::Complete { .. } => "complete",
            Self::Cancel { .. } => "cancel",
        }
    }
}

impl Transition<BatchEvent> for BatchStatus {
    fn transition(self, event: &BatchEvent) -> Result<Self> {
        match (self, event) {
            (Self::Planned, BatchEvent::Start)
            | (Self::InProgress, BatchEvent::UpdateProgress { .. } | BatchEvent::Complete { .. })
            | (Self::Planned | Self::InProgress, BatchEvent::Cancel { .. }) => Ok(event.target()),
            (current, event) => Err(ChargeError::transition(current, event.target())),
        }
    }
}

/// Quality score in 0..=100 from defects and reworks against packed volume.
#[must_use]
pub fn quality_score(defect_count: u32, rework_count: u32, total_items: i64) -> Decimal {
    if total_items <= 0 {
        return Decimal::ZERO;
    }
    let issues = Decimal::from(u64::from(defect_count) + u64::from(rework_count));
    let score = Decimal::ONE_HUNDRED - issues / Decimal::from(total_items) * Decimal::ONE_HUNDRED;
    score.max(Decimal::ZERO)
}

impl PackagingBatch {
    /// Apply an execution event to this batch.
    ///
    /// On failure the batch is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidStateTransition` when the event is illegal
    /// from the current status or the batch is not fully packed at completion,
    /// and `ChargeError::InvalidInput` for an unknown product, a packed
    /// quantity outside `0..=quantity`, or a negative actual duration.
    pub fn apply(&mut self, event: &BatchEvent, now: DateTime<Utc>) -> Result<()> {
        let next = self.status.transition(event)?;

        match event {
            BatchEvent::Start => {
                self.started_at = Some(now);
            }
            BatchEvent::UpdateProgress {
                updates,
                defect_count,
                rework_count,
            } => {
                let positions = self.validate_progress(updates)?;
                for (index, update) in positions.into_iter().zip(updates) {
                    if let Some(product) = self.products.get_mut(index) {
                        product.completed_quantity = update.completed_quantity;
                    }
                }
                if let Some(count) = defect_count {
                    self.defect_count = *count;
                }
                if let Some(count) = rework_count {
                    self.rework_count = *count;
                }
            }
            BatchEvent::Complete { actual_duration } => {
                if *actual_duration < 0 {
                    return Err(ChargeError::invalid_input(format!(
                        "actual_duration must not be negative, got {actual_duration}"
                    )));
                }
                let completion = self.completion_percentage();
                if completion < Decimal::ONE_HUNDRED {
                    return Err(ChargeError::transition(
                        format!("{} at {}% packed", self.status, completion.round_dp(2)),
                        next,
                    ));
                }
                self.actual_duration = Some(*actual_duration);
                self.completed_at = Some(now);
                self.overall_quality_score = Some(quality_score(
                    self.defect_count,
                    self.rework_count,
                    self.total_items(),
                ));
            }
            BatchEvent::Cancel { reason } => {
                self.cancellation_reason = reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(ToString::to_string);
            }
        }

        self.status = next;
        self.version = self.version.saturating_add(1);
        self.updated_at = now;
        Ok(())
    }

    /// Check every update before any is applied; returns line positions.
    fn validate_progress(&self, updates: &[ProgressUpdate]) -> Result<Vec<usize>> {
        let mut seen = BTreeSet::new();
        updates
            .iter()
            .map(|update| {
                let (index, product) = self
                    .products
                    .iter()
                    .enumerate()
                    .find(|(_, p)| p.product_id == update.product_id)
                    .ok_or_else(|| {
                        ChargeError::invalid_input(format!(
                            "product {} is not part of batch {}",
                            update.product_id, self.id
                        ))
                    })?;
                if !seen.insert(update.product_id) {
                    return Err(ChargeError::invalid_input(format!(
                        "product {} updated twice",
                        update.product_id
                    )));
                }
                let quantity = product.quantity;
                if !(0..=quantity).contains(&update.completed_quantity) {
                    return Err(ChargeError::invalid_input(format!(
                        "completed_quantity for product {} must be within 0..={quantity}, got {}",
                        update.product_id, update.completed_quantity
                    )));
                }
                Ok(index)
            })
            .collect()
    }
}

/// How to cost a completed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCosting {
    pub materials: Vec<MaterialRequirement>,
    /// Defaults to the batch's actual duration.
    #[serde(default)]
    pub labor_hours: Option<Decimal>,
    pub labor_rate: Decimal,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub priority: Priority,
}

/// Runs packaging batches and books their cost.
#[derive(Clone)]
pub struct BatchService {
    repo: Arc<dyn BatchRepository>,
    ledger: ChargeLedger,
}

impl std::fmt::Debug for BatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchService")
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl BatchService {
    #[must_use]
    pub fn new(repo: Arc<dyn BatchRepository>, ledger: ChargeLedger) -> Self {
        Self { repo, ledger }
    }

    /// Plan a new batch.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidInput` for an invalid plan, or a
    /// repository error.
    #[instrument(
        skip(self, new),
        fields(company_id = %new.company_id, batch_name = %new.batch_name)
    )]
    pub async fn create(&self, new: NewPackagingBatch) -> Result<PackagingBatch> {
        new.validate()?;
        let batch = self.repo.insert(new, Utc::now()).await?;
        info!(batch_id = %batch.id, total_items = batch.total_items(), "Packaging batch planned");
        Ok(batch)
    }

    /// Load a batch.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::NotFound` if no batch has this id.
    pub async fn get(&self, id: PackagingBatchId) -> Result<PackagingBatch> {
        self.repo
            .load(id)
            .await?
            .ok_or_else(|| ChargeError::NotFound(format!("packaging batch {id}")))
    }

    /// Start a planned batch.
    ///
    /// # Errors
    ///
    /// See [`BatchService::apply`].
    pub async fn start(&self, id: PackagingBatchId) -> Result<PackagingBatch> {
        self.apply(id, &BatchEvent::Start).await
    }

    /// Batches, optionally of one company only, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a repository error.
    pub async fn list(&self, company_id: Option<CompanyId>) -> Result<Vec<PackagingBatch>> {
        Ok(self.repo.list(company_id).await?)
    }

    /// Record packed quantities and the running defect and rework totals.
    ///
    /// Every figure is a total, so repeating an update leaves the batch as
    /// the first call did.
    ///
    /// # Errors
    ///
    /// See [`BatchService::apply`].
    pub async fn update_progress(
        &self,
        id: PackagingBatchId,
        updates: Vec<ProgressUpdate>,
        defect_count: Option<u32>,
        rework_count: Option<u32>,
    ) -> Result<PackagingBatch> {
        self.apply(
            id,
            &BatchEvent::UpdateProgress {
                updates,
                defect_count,
                rework_count,
            },
        )
        .await
    }

    /// Complete a fully packed batch, booking its cost when `costing` is given.
    ///
    /// # Errors
    ///
    /// See [`BatchService::apply`] and [`BatchService::book_cost`]. If booking
    /// fails the batch stays completed and the booking can be retried.
    pub async fn complete(
        &self,
        id: PackagingBatchId,
        actual_duration: i64,
        costing: Option<BatchCosting>,
    ) -> Result<(PackagingBatch, Option<Charge>)> {
        let batch = self
            .apply(id, &BatchEvent::Complete { actual_duration })
            .await?;
        match costing {
            Some(costing) => {
                let (batch, charge) = self.book_cost(id, costing).await?;
                Ok((batch, Some(charge)))
            }
            None => Ok((batch, None)),
        }
    }

    /// Cancel a planned or running batch.
    ///
    /// # Errors
    ///
    /// See [`BatchService::apply`].
    pub async fn cancel(
        &self,
        id: PackagingBatchId,
        reason: Option<String>,
    ) -> Result<PackagingBatch> {
        self.apply(id, &BatchEvent::Cancel { reason }).await
    }

    /// Load, transition, and save a batch.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::NotFound` for an unknown id, any error from
    /// [`PackagingBatch::apply`], or `ChargeError::InvalidStateTransition`
    /// when another writer changed the batch between load and save.
    #[instrument(skip(self, event), fields(batch_id = %id, event = event.name()))]
    pub async fn apply(&self, id: PackagingBatchId, event: &BatchEvent) -> Result<PackagingBatch> {
        let mut batch = self.get(id).await?;
        let expected = batch.status;
        let expected_version = batch.version;

        if let Err(err) = batch.apply(event, Utc::now()) {
            warn!(status = %expected, error = %err, "Batch transition rejected");
            return Err(err);
        }
        if let Err(err) = self
            .repo
            .save_transition(&batch, expected, expected_version)
            .await
        {
            let err = ChargeError::from(err);
            warn!(status = %expected, error = %err, "Batch transition not saved");
            return Err(err);
        }

        info!(
            from = %expected,
            to = %batch.status,
            completion = %batch.completion_percentage().round_dp(2),
            "Batch transitioned"
        );
        Ok(batch)
    }

    /// Book a completed batch's cost as a boxing charge.
    ///
    /// Idempotent: a batch that already has a charge returns that charge. A
    /// link to a charge that was since deleted is dropped and the cost is
    /// booked again.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidStateTransition` unless the batch is
    /// completed, any boxing calculator error, or a repository error.
    #[instrument(skip(self, costing), fields(batch_id = %id))]
    pub async fn book_cost(
        &self,
        id: PackagingBatchId,
        costing: BatchCosting,
    ) -> Result<(PackagingBatch, Charge)> {
        let mut batch = self.get(id).await?;
        if batch.status != BatchStatus::Completed {
            return Err(ChargeError::transition(batch.status, "book_cost"));
        }
        if let Some(charge_id) = batch.charge_id {
            match self.ledger.get(charge_id).await {
                Ok(charge) => return Ok((batch, charge)),
                Err(ChargeError::NotFound(_)) => {
                    warn!(%charge_id, "Booked charge was deleted, booking again");
                    self.repo.detach_charge(id, charge_id).await?;
                    batch = self.get(id).await?;
                    if let Some(current) = batch.charge_id {
                        // Rebooked by someone else meanwhile
                        let charge = self.ledger.get(current).await?;
                        return Ok((batch, charge));
                    }
                }
                Err(err) => return Err(err),
            }
        }

        let labor_hours = costing.labor_hours.unwrap_or_else(|| {
            Decimal::from(batch.actual_duration.unwrap_or_default()) / MINUTES_PER_HOUR
        });
        let charge = self
            .ledger
            .create(NewCharge {
                company_id: batch.company_id,
                category: PACKAGING_CATEGORY.to_string(),
                title: format!("Packaging batch {}", batch.batch_name),
                currency: costing.currency,
                priority: costing.priority,
                tags: BTreeSet::new(),
                request: ChargeRequest::Boxing {
                    input: BoxingInput {
                        batch_size: batch.total_items(),
                        materials: costing.materials,
                        labor_hours,
                        labor_rate: costing.labor_rate,
                    },
                    batch_id: Some(id),
                },
            })
            .await?;

        match self.repo.attach_charge(id, charge.id).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict(message)) => {
                // Another caller booked first; drop our draft and return theirs
                warn!(charge_id = %charge.id, %message, "Batch cost already booked");
                if charge.status == ChargeStatus::Draft {
                    self.ledger.delete(charge.id).await?;
                }
                let batch = self.get(id).await?;
                let existing = batch
                    .charge_id
                    .ok_or_else(|| ChargeError::Conflict(message.clone()))?;
                let charge = self.ledger.get(existing).await?;
                return Ok((batch, charge));
            }
            Err(err) => return Err(err.into()),
        }

        batch.charge_id = Some(charge.id);
        batch.version = batch.version.saturating_add(1);
        info!(charge_id = %charge.id, amount = %charge.money(), "Batch cost booked");
        Ok((batch, charge))
    }
}
