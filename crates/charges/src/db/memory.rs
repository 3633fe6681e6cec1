//! In-memory repositories.
//!
//! Each repository keeps its rows behind a single `tokio::sync::RwLock`, so a
//! compare-and-swap is one critical section.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use backoffice_core::{
    BatchStatus, ChargeId, ChargeStatus, CompanyId, PackagingBatchId, ShippingProviderId,
};

use super::{BatchRepository, ChargeRepository, RateProvider, RepositoryError};
use crate::calculators::shipping::ShippingRate;
use crate::models::{Charge, NewPackagingBatch, PackagingBatch, UnsavedCharge};

#[derive(Debug)]
struct Table<K, V> {
    last_id: i32,
    rows: BTreeMap<K, V>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            last_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<K, V> Table<K, V> {
    fn next_id(&mut self) -> Result<i32, RepositoryError> {
        self.last_id = self
            .last_id
            .checked_add(1)
            .ok_or_else(|| RepositoryError::Conflict("id sequence exhausted".to_string()))?;
        Ok(self.last_id)
    }
}

fn check_status<S: ToString + PartialEq>(stored: S, expected: S) -> Result<(), RepositoryError> {
    if stored == expected {
        Ok(())
    } else {
        Err(RepositoryError::StaleState {
            expected: expected.to_string(),
            current: stored.to_string(),
        })
    }
}

/// Charges held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryChargeRepository {
    table: RwLock<Table<ChargeId, Charge>>,
}

impl InMemoryChargeRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChargeRepository for InMemoryChargeRepository {
    async fn insert(&self, charge: UnsavedCharge) -> Result<Charge, RepositoryError> {
        let mut table = self.table.write().await;
        let id = ChargeId::new(table.next_id()?);
        let charge = Charge::draft(id, charge);
        table.rows.insert(id, charge.clone());
        Ok(charge)
    }

    async fn load(&self, id: ChargeId) -> Result<Option<Charge>, RepositoryError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn save_transition(
        &self,
        charge: &Charge,
        expected: ChargeStatus,
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.write().await;
        let stored = table
            .rows
            .get_mut(&charge.id)
            .ok_or(RepositoryError::NotFound)?;
        check_status(stored.status, expected)?;
        *stored = charge.clone();
        Ok(())
    }

    async fn update_details(
        &self,
        charge: &Charge,
        expected: ChargeStatus,
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.write().await;
        let stored = table
            .rows
            .get_mut(&charge.id)
            .ok_or(RepositoryError::NotFound)?;
        check_status(stored.status, expected)?;
        stored.details = charge.details.clone();
        stored.amount = charge.amount;
        stored.currency = charge.currency;
        stored.updated_at = charge.updated_at;
        Ok(())
    }

    async fn delete(&self, id: ChargeId, expected: ChargeStatus) -> Result<(), RepositoryError> {
        let mut table = self.table.write().await;
        let stored = table.rows.get(&id).ok_or(RepositoryError::NotFound)?;
        check_status(stored.status, expected)?;
        table.rows.remove(&id);
        Ok(())
    }

    async fn list(&self, company_id: Option<CompanyId>) -> Result<Vec<Charge>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|c| company_id.is_none_or(|company| c.company_id == company))
            .cloned()
            .collect())
    }
}

/// Packaging batches held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBatchRepository {
    table: RwLock<Table<PackagingBatchId, PackagingBatch>>,
}

impl InMemoryBatchRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchRepository for InMemoryBatchRepository {
    async fn insert(
        &self,
        batch: NewPackagingBatch,
        now: DateTime<Utc>,
    ) -> Result<PackagingBatch, RepositoryError> {
        let mut table = self.table.write().await;
        let id = PackagingBatchId::new(table.next_id()?);
        let batch = PackagingBatch::planned(id, batch, now);
        table.rows.insert(id, batch.clone());
        Ok(batch)
    }

    async fn load(&self, id: PackagingBatchId) -> Result<Option<PackagingBatch>, RepositoryError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn save_transition(
        &self,
        batch: &PackagingBatch,
        expected: BatchStatus,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.write().await;
        let stored = table
            .rows
            .get_mut(&batch.id)
            .ok_or(RepositoryError::NotFound)?;
        check_status(
            format!("{} v{}", stored.status, stored.version),
            format!("{expected} v{expected_version}"),
        )?;
        *stored = batch.clone();
        Ok(())
    }

    async fn attach_charge(
        &self,
        id: PackagingBatchId,
        charge_id: ChargeId,
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.write().await;
        let stored = table.rows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        check_status(stored.status, BatchStatus::Completed)?;
        if let Some(existing) = stored.charge_id {
            return Err(RepositoryError::Conflict(format!(
                "batch {id} already booked as charge {existing}"
            )));
        }
        stored.charge_id = Some(charge_id);
        stored.version = stored.version.saturating_add(1);
        Ok(())
    }

    async fn detach_charge(
        &self,
        id: PackagingBatchId,
        charge_id: ChargeId,
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.write().await;
        let stored = table.rows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if stored.charge_id == Some(charge_id) {
            stored.charge_id = None;
            stored.version = stored.version.saturating_add(1);
        }
        Ok(())
    }

    async fn list(
        &self,
        company_id: Option<CompanyId>,
    ) -> Result<Vec<PackagingBatch>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|b| company_id.is_none_or(|company| b.company_id == company))
            .cloned()
            .collect())
    }
}

/// A fixed list of carrier rates.
#[derive(Debug, Clone, Default)]
pub struct StaticRateProvider {
    rates: Vec<ShippingRate>,
}

impl StaticRateProvider {
    #[must_use]
    pub const fn new(rates: Vec<ShippingRate>) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl RateProvider for StaticRateProvider {
    async fn fetch_rates_for_route(
        &self,
        origin: &str,
        destination: &str,
        service_type: Option<&str>,
        provider_id: Option<ShippingProviderId>,
    ) -> Result<Vec<ShippingRate>, RepositoryError> {
        Ok(self
            .rates
            .iter()
            .filter(|rate| rate.serves(origin, destination, service_type, provider_id))
            .cloned()
            .collect())
    }
}
