//! Persistence collaborators for charges, packaging batches, and carrier rates.
//!
//! Services only talk to the traits in this module. Two implementations ship
//! with the crate:
//!
//! - [`memory`]: `tokio::sync::RwLock` maps, used by tests and the CLI
//! - `postgres` (feature `postgres`): `sqlx` over the `charges` schema
//!
//! # Status writes
//!
//! Every write that depends on a status is a compare-and-swap on the status
//! the caller read. If another writer moved the record first the write fails
//! with [`RepositoryError::StaleState`] and nothing is changed.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use backoffice_core::{
    BatchStatus, ChargeId, ChargeStatus, CompanyId, PackagingBatchId, ShippingProviderId,
};

use crate::calculators::shipping::ShippingRate;
use crate::models::{Charge, NewPackagingBatch, PackagingBatch, UnsavedCharge};

pub use memory::{InMemoryBatchRepository, InMemoryChargeRepository, StaticRateProvider};
#[cfg(feature = "postgres")]
pub use postgres::{PgBatchRepository, PgChargeRepository, PgRateProvider, create_pool};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// The record is no longer in the status the write was based on.
    #[error("stale state: expected {expected}, found {current}")]
    StaleState {
        /// Status the caller read.
        expected: String,
        /// Status actually stored.
        current: String,
    },

    /// Constraint violation.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Storage for charges.
#[async_trait]
pub trait ChargeRepository: Send + Sync {
    /// Store a new charge and assign its id.
    async fn insert(&self, charge: UnsavedCharge) -> Result<Charge, RepositoryError>;

    /// Load a charge by id.
    async fn load(&self, id: ChargeId) -> Result<Option<Charge>, RepositoryError>;

    /// Persist a status transition, provided the stored status is still
    /// `expected`.
    async fn save_transition(
        &self,
        charge: &Charge,
        expected: ChargeStatus,
    ) -> Result<(), RepositoryError>;

    /// Persist recalculated details and amount, provided the stored status is
    /// still `expected`.
    async fn update_details(
        &self,
        charge: &Charge,
        expected: ChargeStatus,
    ) -> Result<(), RepositoryError>;

    /// Delete a charge, provided the stored status is still `expected`.
    async fn delete(&self, id: ChargeId, expected: ChargeStatus) -> Result<(), RepositoryError>;

    /// All charges, optionally restricted to one company, oldest first.
    async fn list(&self, company_id: Option<CompanyId>) -> Result<Vec<Charge>, RepositoryError>;
}

/// Storage for packaging batches.
#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// Store a new planned batch and assign its id.
    async fn insert(
        &self,
        batch: NewPackagingBatch,
        now: DateTime<Utc>,
    ) -> Result<PackagingBatch, RepositoryError>;

    /// Load a batch by id.
    async fn load(&self, id: PackagingBatchId) -> Result<Option<PackagingBatch>, RepositoryError>;

    /// Persist the batch, provided the stored status is still `expected` and
    /// the stored version is still `expected_version`.
    async fn save_transition(
        &self,
        batch: &PackagingBatch,
        expected: BatchStatus,
        expected_version: i64,
    ) -> Result<(), RepositoryError>;

    /// Link the boxing charge booked for a completed batch.
    ///
    /// Fails with [`RepositoryError::Conflict`] if a charge is already linked.
    async fn attach_charge(
        &self,
        id: PackagingBatchId,
        charge_id: ChargeId,
    ) -> Result<(), RepositoryError>;

    /// Clear the link to `charge_id`. A batch linked to another charge, or to
    /// none, is left as it is.
    async fn detach_charge(
        &self,
        id: PackagingBatchId,
        charge_id: ChargeId,
    ) -> Result<(), RepositoryError>;

    /// All batches, optionally restricted to one company, oldest first.
    async fn list(
        &self,
        company_id: Option<CompanyId>,
    ) -> Result<Vec<PackagingBatch>, RepositoryError>;
}

/// Source of carrier rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Rates serving the route, narrowed by the optional filters.
    async fn fetch_rates_for_route(
        &self,
        origin: &str,
        destination: &str,
        service_type: Option<&str>,
        provider_id: Option<ShippingProviderId>,
    ) -> Result<Vec<ShippingRate>, RepositoryError>;
}
