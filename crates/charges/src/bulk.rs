//! Apply one approval operation to many charges.
//!
//! Each charge is handled independently: a failure is recorded and the run
//! moves on. Cancellation is checked between charges; transitions already
//! saved stay saved and the remaining ids are reported as skipped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use backoffice_core::ChargeId;

use crate::config::ChargesConfig;
use crate::error::{ChargeError, ErrorKind, Result};
use crate::ledger::{ChargeEvent, ChargeLedger};

/// Default cap on the number of ids in one bulk request.
pub const DEFAULT_MAX_ITEMS: usize = 500;

/// Operation to apply to every charge in a bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum BulkOperation {
    Submit,
    Approve {
        #[serde(default)]
        notes: Option<String>,
    },
    Reject {
        reason: String,
    },
    MarkPaid,
    Delete,
}

impl BulkOperation {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::MarkPaid => "mark_paid",
            Self::Delete => "delete",
        }
    }

    fn validate(&self) -> Result<()> {
        if let Self::Reject { reason } = self
            && reason.trim().is_empty()
        {
            return Err(ChargeError::invalid_input("rejection reason must not be blank"));
        }
        Ok(())
    }
}

/// Why one charge in a bulk run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ChargeError> for BulkItemError {
    fn from(err: &ChargeError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome for one charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub id: ChargeId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BulkItemError>,
}

/// Result of a bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    /// Correlates log lines of one run.
    pub run_id: Uuid,
    pub operation: String,
    /// One entry per processed id, in request order.
    pub items: Vec<BulkItemResult>,
    pub succeeded: usize,
    pub failed: usize,
    /// Ids not processed because the run was cancelled.
    pub skipped: Vec<ChargeId>,
    pub cancelled: bool,
}

impl BulkReport {
    #[must_use]
    pub fn succeeded_ids(&self) -> Vec<ChargeId> {
        self.items
            .iter()
            .filter(|item| item.success)
            .map(|item| item.id)
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (ChargeId, &BulkItemError)> {
        self.items
            .iter()
            .filter_map(|item| item.error.as_ref().map(|err| (item.id, err)))
    }
}

/// Runs bulk operations against the ledger.
#[derive(Debug, Clone)]
pub struct BulkCoordinator {
    ledger: ChargeLedger,
    max_items: usize,
}

impl BulkCoordinator {
    #[must_use]
    pub const fn new(ledger: ChargeLedger) -> Self {
        Self {
            ledger,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    /// Coordinator capped at the configured `bulk_max_items`.
    #[must_use]
    pub const fn from_config(ledger: ChargeLedger, config: &ChargesConfig) -> Self {
        Self::new(ledger).with_max_items(config.bulk_max_items)
    }

    #[must_use]
    pub const fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Apply `operation` to every id, in order, skipping duplicates.
    ///
    /// # Errors
    ///
    /// Fails as a whole only when the request itself is invalid: more ids than
    /// the configured maximum, or a blank rejection reason. Per-charge errors
    /// are reported in the [`BulkReport`].
    #[instrument(
        skip(self, ids, cancel),
        fields(operation = operation.name(), requested = ids.len())
    )]
    pub async fn apply(
        &self,
        ids: &[ChargeId],
        operation: &BulkOperation,
        cancel: &CancellationToken,
    ) -> Result<BulkReport> {
        operation.validate()?;

        let mut seen = HashSet::with_capacity(ids.len());
        let ids: Vec<ChargeId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if ids.len() > self.max_items {
            return Err(ChargeError::invalid_input(format!(
                "bulk request has {} charges, the maximum is {}",
                ids.len(),
                self.max_items
            )));
        }

        let mut report = BulkReport {
            run_id: Uuid::new_v4(),
            operation: operation.name().to_string(),
            items: Vec::with_capacity(ids.len()),
            succeeded: 0,
            failed: 0,
            skipped: Vec::new(),
            cancelled: false,
        };

        for (position, id) in ids.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.skipped = ids.iter().skip(position).copied().collect();
                break;
            }

            match self.apply_one(*id, operation).await {
                Ok(()) => {
                    report.succeeded += 1;
                    report.items.push(BulkItemResult {
                        id: *id,
                        success: true,
                        error: None,
                    });
                }
                Err(err) => {
                    report.failed += 1;
                    report.items.push(BulkItemResult {
                        id: *id,
                        success: false,
                        error: Some(BulkItemError::from(&err)),
                    });
                }
            }
        }

        if report.failed > 0 || report.cancelled {
            warn!(
                run_id = %report.run_id,
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped.len(),
                "Bulk operation finished with failures"
            );
        } else {
            info!(run_id = %report.run_id, succeeded = report.succeeded, "Bulk operation finished");
        }
        Ok(report)
    }

    async fn apply_one(&self, id: ChargeId, operation: &BulkOperation) -> Result<()> {
        let event = match operation {
            BulkOperation::Delete => return self.ledger.delete(id).await,
            BulkOperation::Submit => ChargeEvent::Submit,
            BulkOperation::Approve { notes } => ChargeEvent::Approve {
                notes: notes.clone(),
            },
            BulkOperation::Reject { reason } => ChargeEvent::Reject {
                reason: reason.clone(),
            },
            BulkOperation::MarkPaid => ChargeEvent::MarkPaid,
        };
        self.ledger.apply(id, &event).await.map(|_| ())
    }
}
