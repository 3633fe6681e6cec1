//! Charge approval lifecycle.
//!
//! ```text
//! draft ──submit──▶ pending_approval ──approve──▶ approved ──mark_paid──▶ paid
//!                        ▲      │
//!                resubmit│      │reject
//!                        │      ▼
//!                       rejected
//! ```
//!
//! [`ChargeStatus::transition`] decides the next status, [`Charge::apply`]
//! records it on the entity, and [`ChargeLedger`] persists it with a
//! compare-and-swap on the status it read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use backoffice_core::{ChargeId, ChargeStatus, Currency};

use crate::calculators::CostEngine;
use crate::config::ChargesConfig;
use crate::db::ChargeRepository;
use crate::error::{ChargeError, Result};
use crate::fsm::Transition;
use crate::models::{Charge, ChargeRequest, NewCharge, StatusChange, UnsavedCharge};
use crate::query::{ChargeFilter, ChargeQuery, ChargeSummary, Page};

/// Something that happens to a charge during approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChargeEvent {
    Submit,
    Approve {
        #[serde(default)]
        notes: Option<String>,
    },
    Reject {
        reason: String,
    },
    Resubmit,
    MarkPaid,
}

impl ChargeEvent {
    /// Status this event leads to when legal.
    #[must_use]
    pub const fn target(&self) -> ChargeStatus {
        match self {
            Self::Submit | Self::Resubmit => ChargeStatus::PendingApproval,
            Self::Approve { .. } => ChargeStatus::Approved,
            Self::Reject { .. } => ChargeStatus::Rejected,
            Self::MarkPaid => ChargeStatus::Paid,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Resubmit => "resubmit",
            Self::MarkPaid => "mark_paid",
        }
    }

    /// Audit note carried by the event, trimmed, if any.
    fn note(&self) -> Option<String> {
        match self {
            Self::Approve { notes } => notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(ToString::to_string),
            Self::Reject { reason } => Some(reason.trim().to_string()),
            _ => None,
        }
    }
}

impl Transition<ChargeEvent> for ChargeStatus {
    fn transition(self, event: &ChargeEvent) -> Result<Self> {
        match (self, event) {
            (Self::Draft, ChargeEvent::Submit)
            | (Self::Rejected, ChargeEvent::Resubmit)
            | (Self::PendingApproval, ChargeEvent::Approve { .. } | ChargeEvent::Reject { .. })
            | (Self::Approved, ChargeEvent::MarkPaid) => Ok(event.target()),
            (current, event) => Err(ChargeError::transition(current, event.target())),
        }
    }
}

impl Charge {
    /// Apply an approval event to this charge.
    ///
    /// On success the status, `updated_at`, and history are updated, and
    /// approve/reject record their note in `approval_notes`. On failure the
    /// charge is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidInput` for a blank rejection reason and
    /// `ChargeError::InvalidStateTransition` when the event is illegal from
    /// the current status.
    pub fn apply(&mut self, event: &ChargeEvent, now: DateTime<Utc>) -> Result<()> {
        if let ChargeEvent::Reject { reason } = event
            && reason.trim().is_empty()
        {
            return Err(ChargeError::invalid_input("rejection reason must not be blank"));
        }

        let next = self.status.transition(event)?;
        let note = event.note();
        if matches!(event, ChargeEvent::Approve { .. } | ChargeEvent::Reject { .. }) {
            self.approval_notes.clone_from(&note);
        }

        self.history.push(StatusChange {
            from: self.status,
            to: next,
            note,
            at: now,
        });
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Creates, prices, and moves charges through approval.
#[derive(Clone)]
pub struct ChargeLedger {
    repo: Arc<dyn ChargeRepository>,
    engine: CostEngine,
    default_currency: Currency,
}

impl std::fmt::Debug for ChargeLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChargeLedger")
            .field("engine", &self.engine)
            .field("default_currency", &self.default_currency)
            .finish_non_exhaustive()
    }
}

impl ChargeLedger {
    #[must_use]
    pub fn new(repo: Arc<dyn ChargeRepository>, engine: CostEngine) -> Self {
        Self {
            repo,
            engine,
            default_currency: Currency::default(),
        }
    }

    /// Ledger billing in the configured default currency.
    #[must_use]
    pub fn from_config(
        repo: Arc<dyn ChargeRepository>,
        engine: CostEngine,
        config: &ChargesConfig,
    ) -> Self {
        Self::new(repo, engine).with_default_currency(config.default_currency)
    }

    /// Currency for new charges that do not name one.
    #[must_use]
    pub const fn with_default_currency(mut self, currency: Currency) -> Self {
        self.default_currency = currency;
        self
    }

    #[must_use]
    pub const fn engine(&self) -> &CostEngine {
        &self.engine
    }

    /// Price and store a new draft charge.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidInput` for blank header fields, any
    /// calculator error, or a repository error.
    #[instrument(
        skip(self, new),
        fields(company_id = %new.company_id, charge_type = %new.request.charge_type())
    )]
    pub async fn create(&self, new: NewCharge) -> Result<Charge> {
        new.validate()?;
        let details = self.engine.price(new.request.clone()).await?;
        let unsaved = UnsavedCharge::priced(new, details, self.default_currency, Utc::now())?;
        let charge = self.repo.insert(unsaved).await?;

        info!(charge_id = %charge.id, amount = %charge.money(), "Charge created");
        Ok(charge)
    }

    /// Load a charge.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::NotFound` if no charge has this id.
    pub async fn get(&self, id: ChargeId) -> Result<Charge> {
        self.repo
            .load(id)
            .await?
            .ok_or_else(|| ChargeError::NotFound(format!("charge {id}")))
    }

    /// Re-run the calculator with new input and rebook the amount.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidStateTransition` unless the charge is in
    /// draft or rejected, `ChargeError::InvalidInput` if the category would
    /// change, or any calculator or repository error.
    #[instrument(skip(self, request), fields(charge_id = %id))]
    pub async fn recalculate(&self, id: ChargeId, request: ChargeRequest) -> Result<Charge> {
        let mut charge = self.get(id).await?;
        let expected = charge.status;
        if !expected.is_editable() {
            return Err(ChargeError::transition(expected, "recalculate"));
        }

        let details = self.engine.price(request).await?;
        charge.replace_details(details, Utc::now())?;
        self.repo.update_details(&charge, expected).await?;

        info!(amount = %charge.money(), "Charge recalculated");
        Ok(charge)
    }

    /// Submit a draft for approval.
    ///
    /// # Errors
    ///
    /// See [`ChargeLedger::apply`].
    pub async fn submit(&self, id: ChargeId) -> Result<Charge> {
        self.apply(id, &ChargeEvent::Submit).await
    }

    /// Approve a pending charge.
    ///
    /// # Errors
    ///
    /// See [`ChargeLedger::apply`].
    pub async fn approve(&self, id: ChargeId, notes: Option<String>) -> Result<Charge> {
        self.apply(id, &ChargeEvent::Approve { notes }).await
    }

    /// Reject a pending charge with a reason.
    ///
    /// # Errors
    ///
    /// See [`ChargeLedger::apply`].
    pub async fn reject(&self, id: ChargeId, reason: impl Into<String>) -> Result<Charge> {
        self.apply(
            id,
            &ChargeEvent::Reject {
                reason: reason.into(),
            },
        )
        .await
    }

    /// Send a rejected charge back for approval.
    ///
    /// # Errors
    ///
    /// See [`ChargeLedger::apply`].
    pub async fn resubmit(&self, id: ChargeId) -> Result<Charge> {
        self.apply(id, &ChargeEvent::Resubmit).await
    }

    /// Record payment of an approved charge.
    ///
    /// # Errors
    ///
    /// See [`ChargeLedger::apply`].
    pub async fn mark_paid(&self, id: ChargeId) -> Result<Charge> {
        self.apply(id, &ChargeEvent::MarkPaid).await
    }

    /// Load, transition, and save a charge.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::NotFound` for an unknown id, any error from
    /// [`Charge::apply`], or `ChargeError::InvalidStateTransition` when another
    /// writer moved the charge between load and save.
    #[instrument(skip(self, event), fields(charge_id = %id, event = event.name()))]
    pub async fn apply(&self, id: ChargeId, event: &ChargeEvent) -> Result<Charge> {
        let mut charge = self.get(id).await?;
        let expected = charge.status;

        if let Err(err) = charge.apply(event, Utc::now()) {
            warn!(status = %expected, error = %err, "Charge transition rejected");
            return Err(err);
        }
        if let Err(err) = self.repo.save_transition(&charge, expected).await {
            let err = ChargeError::from(err);
            warn!(status = %expected, error = %err, "Charge transition not saved");
            return Err(err);
        }

        info!(from = %expected, to = %charge.status, "Charge transitioned");
        Ok(charge)
    }

    /// Delete a draft or rejected charge.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::ChargeNotDeletable` in any other status,
    /// `ChargeError::NotFound` for an unknown id, or
    /// `ChargeError::InvalidStateTransition` when another writer moved the
    /// charge first.
    #[instrument(skip(self), fields(charge_id = %id))]
    pub async fn delete(&self, id: ChargeId) -> Result<()> {
        let charge = self.get(id).await?;
        if !charge.status.is_deletable() {
            warn!(status = %charge.status, "Charge not deletable");
            return Err(ChargeError::ChargeNotDeletable {
                id,
                status: charge.status,
            });
        }
        self.repo.delete(id, charge.status).await?;

        info!("Charge deleted");
        Ok(())
    }

    /// Filter, sort, and paginate stored charges.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the charges cannot be loaded.
    pub async fn list(&self, query: &ChargeQuery) -> Result<Page<Charge>> {
        let charges = self.repo.list(query.filter.company_id).await?;
        Ok(query.apply(charges))
    }

    /// Totals over the charges matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the charges cannot be loaded.
    pub async fn summary(&self, filter: &ChargeFilter) -> Result<ChargeSummary> {
        let charges = self.repo.list(filter.company_id).await?;
        Ok(ChargeSummary::of(
            charges.iter().filter(|charge| filter.matches(charge)),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use rust_decimal_macros::dec;

    use backoffice_core::{CompanyId, Priority};

    use super::*;
    use crate::db::{InMemoryChargeRepository, StaticRateProvider};
    use crate::error::ErrorKind;
    use crate::models::ChargeDetails;

    #[test]
    fn test_transition_table() {
        use ChargeStatus::{Approved, Draft, Paid, PendingApproval, Rejected};

        let approve = ChargeEvent::Approve { notes: None };
        let reject = ChargeEvent::Reject {
            reason: "duplicate".to_string(),
        };

        assert_eq!(Draft.transition(&ChargeEvent::Submit).unwrap(), PendingApproval);
        assert_eq!(PendingApproval.transition(&approve).unwrap(), Approved);
        assert_eq!(PendingApproval.transition(&reject).unwrap(), Rejected);
        assert_eq!(Rejected.transition(&ChargeEvent::Resubmit).unwrap(), PendingApproval);
        assert_eq!(Approved.transition(&ChargeEvent::MarkPaid).unwrap(), Paid);

        assert!(!Draft.accepts(&approve));
        assert!(!Approved.accepts(&reject));
        assert!(!Rejected.accepts(&ChargeEvent::MarkPaid));
        for event in [
            ChargeEvent::Submit,
            approve,
            reject,
            ChargeEvent::Resubmit,
            ChargeEvent::MarkPaid,
        ] {
            assert!(!Paid.accepts(&event), "paid must be terminal");
        }
    }

    #[test]
    fn test_approve_from_draft_reports_both_statuses() {
        let err = ChargeStatus::Draft
            .transition(&ChargeEvent::Approve { notes: None })
            .unwrap_err();
        match err {
            ChargeError::InvalidStateTransition { current, requested } => {
                assert_eq!(current, "draft");
                assert_eq!(requested, "approved");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    fn draft() -> Charge {
        Charge::draft(
            ChargeId::new(1),
            UnsavedCharge {
                company_id: CompanyId::new(1),
                category: "rent".to_string(),
                title: "Warehouse rent".to_string(),
                amount: 100,
                currency: Currency::DZD,
                priority: Priority::Medium,
                tags: BTreeSet::new(),
                details: ChargeDetails::Generic {
                    amount: dec!(1),
                    description: None,
                },
                created_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_apply_records_history_and_notes() {
        let mut charge = draft();
        charge.apply(&ChargeEvent::Submit, Utc::now()).unwrap();
        charge
            .apply(
                &ChargeEvent::Reject {
                    reason: "  missing invoice ".to_string(),
                },
                Utc::now(),
            )
            .unwrap();

        assert_eq!(charge.status, ChargeStatus::Rejected);
        assert_eq!(charge.approval_notes.as_deref(), Some("missing invoice"));
        assert_eq!(charge.history.len(), 2);
        assert_eq!(charge.history[1].from, ChargeStatus::PendingApproval);
        assert_eq!(charge.history[1].to, ChargeStatus::Rejected);
    }

    #[test]
    fn test_blank_rejection_reason_leaves_charge_untouched() {
        let mut charge = draft();
        charge.apply(&ChargeEvent::Submit, Utc::now()).unwrap();
        let before = charge.clone();

        let err = charge
            .apply(
                &ChargeEvent::Reject {
                    reason: " ".to_string(),
                },
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(charge, before);
    }

    fn ledger() -> ChargeLedger {
        ChargeLedger::new(
            Arc::new(InMemoryChargeRepository::new()),
            CostEngine::new(Arc::new(StaticRateProvider::default())),
        )
    }

    fn rent(amount: rust_decimal::Decimal) -> NewCharge {
        NewCharge {
            company_id: CompanyId::new(1),
            category: "rent".to_string(),
            title: "Warehouse rent".to_string(),
            currency: Some(Currency::EUR),
            priority: Priority::High,
            tags: BTreeSet::new(),
            request: ChargeRequest::Generic {
                amount,
                description: None,
            },
        }
    }

    #[tokio::test]
    async fn test_ledger_happy_path() {
        let ledger = ledger();
        let charge = ledger.create(rent(dec!(950))).await.unwrap();
        assert_eq!(charge.amount, 95_000);
        assert_eq!(charge.currency, Currency::EUR);

        ledger.submit(charge.id).await.unwrap();
        ledger
            .approve(charge.id, Some("ok".to_string()))
            .await
            .unwrap();
        let paid = ledger.mark_paid(charge.id).await.unwrap();

        assert_eq!(paid.status, ChargeStatus::Paid);
        assert_eq!(paid.approval_notes.as_deref(), Some("ok"));
        assert_eq!(ledger.get(charge.id).await.unwrap().history.len(), 3);
    }

    #[tokio::test]
    async fn test_ledger_recalculate_only_when_editable() {
        let ledger = ledger();
        let charge = ledger.create(rent(dec!(10))).await.unwrap();

        let updated = ledger
            .recalculate(
                charge.id,
                ChargeRequest::Generic {
                    amount: dec!(12.5),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.amount, 1250);

        ledger.submit(charge.id).await.unwrap();
        let err = ledger
            .recalculate(
                charge.id,
                ChargeRequest::Generic {
                    amount: dec!(99),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(ledger.get(charge.id).await.unwrap().amount, 1250);
    }

    #[tokio::test]
    async fn test_ledger_delete_rules() {
        let ledger = ledger();
        let charge = ledger.create(rent(dec!(10))).await.unwrap();
        ledger.submit(charge.id).await.unwrap();

        let err = ledger.delete(charge.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChargeNotDeletable);

        ledger.reject(charge.id, "wrong amount").await.unwrap();
        ledger.delete(charge.id).await.unwrap();
        assert_eq!(
            ledger.get(charge.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_configured_default_currency() {
        let config = ChargesConfig {
            default_currency: Currency::EUR,
            ..ChargesConfig::default()
        };
        let ledger = ChargeLedger::from_config(
            Arc::new(InMemoryChargeRepository::new()),
            CostEngine::new(Arc::new(StaticRateProvider::default())),
            &config,
        );

        let mut new = NewCharge {
            company_id: CompanyId::new(1),
            category: "travel".to_string(),
            title: "Train to Oran".to_string(),
            currency: None,
            priority: Priority::Low,
            tags: BTreeSet::new(),
            request: ChargeRequest::Generic {
                amount: dec!(42),
                description: None,
            },
        };
        let charge = ledger.create(new.clone()).await.unwrap();
        assert_eq!(charge.currency, Currency::EUR);

        new.currency = Some(Currency::USD);
        assert_eq!(ledger.create(new).await.unwrap().currency, Currency::USD);
    }
}
