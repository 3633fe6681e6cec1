//! `PostgreSQL` repositories over the `charges` schema.
//!
//! # Tables
//!
//! - `charges.charge` - Charges; details and audit history as JSONB
//! - `charges.packaging_batch` - Batches; product lines as JSONB
//! - `charges.shipping_rate` - Carrier rate cards
//!
//! # Migrations
//!
//! Migrations are stored in `crates/charges/migrations/` and run via:
//! ```bash
//! cargo run -p backoffice-cli --features postgres -- migrate
//! ```
//!
//! Queries are built at runtime so the crate compiles without a database.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use backoffice_core::{
    BatchStatus, ChargeId, ChargeStatus, CompanyId, EmployeeId, MaterialId, PackagingBatchId,
    ShippingProviderId,
};

use super::{BatchRepository, ChargeRepository, RateProvider, RepositoryError};
use crate::calculators::boxing::MaterialRequirement;
use crate::calculators::shipping::ShippingRate;
use crate::models::{
    BatchProduct, Charge, ChargeDetails, NewPackagingBatch, PackagingBatch, StatusChange,
    UnsavedCharge,
};

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

fn corrupt(err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(err.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, RepositoryError> {
    serde_json::to_value(value).map_err(corrupt)
}

// =============================================================================
// Legacy material rows
// =============================================================================

/// A packaging material as found in stored boxing details.
///
/// Rows written before the field was renamed carry `unit_cost`.
#[derive(Debug, Deserialize)]
struct StoredMaterial {
    material_id: MaterialId,
    #[serde(default)]
    name: Option<String>,
    quantity_per_item: Decimal,
    #[serde(alias = "unit_cost")]
    cost_per_unit: Decimal,
}

impl From<StoredMaterial> for MaterialRequirement {
    fn from(stored: StoredMaterial) -> Self {
        Self {
            material_id: stored.material_id,
            name: stored.name,
            quantity_per_item: stored.quantity_per_item,
            cost_per_unit: stored.cost_per_unit,
        }
    }
}

/// Rewrite legacy material entries of boxing details in place.
fn canonicalize_materials(details: &mut Value) -> Result<(), RepositoryError> {
    if details.get("type").and_then(Value::as_str) != Some("boxing") {
        return Ok(());
    }
    let Some(materials) = details
        .pointer_mut("/input/materials")
        .and_then(Value::as_array_mut)
    else {
        return Ok(());
    };
    for material in materials.iter_mut() {
        let stored: StoredMaterial = serde_json::from_value(material.take()).map_err(corrupt)?;
        *material = to_json(&MaterialRequirement::from(stored))?;
    }
    Ok(())
}

fn decode_details(mut details: Value) -> Result<ChargeDetails, RepositoryError> {
    canonicalize_materials(&mut details)?;
    serde_json::from_value(details).map_err(corrupt)
}

// =============================================================================
// Charges
// =============================================================================

const CHARGE_COLUMNS: &str = "id, company_id, category, title, amount, currency, status, \
     priority, tags, details, approval_notes, history, created_at, updated_at";

/// Internal row type for `PostgreSQL` charge queries.
#[derive(Debug, sqlx::FromRow)]
struct ChargeRow {
    id: i32,
    company_id: i32,
    category: String,
    title: String,
    amount: i64,
    currency: String,
    status: ChargeStatus,
    priority: String,
    tags: Vec<String>,
    details: Value,
    approval_notes: Option<String>,
    history: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ChargeRow> for Charge {
    type Error = RepositoryError;

    fn try_from(row: ChargeRow) -> Result<Self, Self::Error> {
        let history: Vec<StatusChange> = serde_json::from_value(row.history).map_err(corrupt)?;
        Ok(Self {
            id: ChargeId::new(row.id),
            company_id: CompanyId::new(row.company_id),
            category: row.category,
            title: row.title,
            amount: row.amount,
            currency: row.currency.parse().map_err(corrupt)?,
            status: row.status,
            priority: row.priority.parse().map_err(corrupt)?,
            tags: row.tags.into_iter().collect(),
            details: decode_details(row.details)?,
            approval_notes: row.approval_notes,
            history,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Charge storage backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgChargeRepository {
    pool: PgPool,
}

impl PgChargeRepository {
    /// Create a new charge repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Turn a missed compare-and-swap into the error explaining it.
    async fn stale(&self, id: ChargeId, expected: ChargeStatus) -> RepositoryError {
        let current = sqlx::query_scalar::<_, ChargeStatus>(
            "SELECT status FROM charges.charge WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await;

        match current {
            Ok(Some(current)) => RepositoryError::StaleState {
                expected: expected.to_string(),
                current: current.to_string(),
            },
            Ok(None) => RepositoryError::NotFound,
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl ChargeRepository for PgChargeRepository {
    async fn insert(&self, charge: UnsavedCharge) -> Result<Charge, RepositoryError> {
        let tags: Vec<String> = charge.tags.iter().cloned().collect();
        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO charges.charge
                (company_id, category, title, charge_type, amount, currency, status,
                 priority, tags, details, history, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, '[]'::jsonb, $11, $11)
            RETURNING id
            ",
        )
        .bind(charge.company_id.as_i32())
        .bind(&charge.category)
        .bind(&charge.title)
        .bind(charge.details.charge_type().as_str())
        .bind(charge.amount)
        .bind(charge.currency.code())
        .bind(ChargeStatus::Draft)
        .bind(charge.priority.as_str())
        .bind(tags)
        .bind(to_json(&charge.details)?)
        .bind(charge.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(Charge::draft(ChargeId::new(id), charge))
    }

    async fn load(&self, id: ChargeId) -> Result<Option<Charge>, RepositoryError> {
        let row = sqlx::query_as::<_, ChargeRow>(&format!(
            "SELECT {CHARGE_COLUMNS} FROM charges.charge WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn save_transition(
        &self,
        charge: &Charge,
        expected: ChargeStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE charges.charge
            SET status = $3, approval_notes = $4, history = $5, updated_at = $6
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(charge.id.as_i32())
        .bind(expected)
        .bind(charge.status)
        .bind(&charge.approval_notes)
        .bind(to_json(&charge.history)?)
        .bind(charge.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale(charge.id, expected).await);
        }
        Ok(())
    }

    async fn update_details(
        &self,
        charge: &Charge,
        expected: ChargeStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE charges.charge
            SET details = $3, amount = $4, currency = $5, updated_at = $6
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(charge.id.as_i32())
        .bind(expected)
        .bind(to_json(&charge.details)?)
        .bind(charge.amount)
        .bind(charge.currency.code())
        .bind(charge.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale(charge.id, expected).await);
        }
        Ok(())
    }

    async fn delete(&self, id: ChargeId, expected: ChargeStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM charges.charge WHERE id = $1 AND status = $2")
            .bind(id.as_i32())
            .bind(expected)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale(id, expected).await);
        }
        Ok(())
    }

    async fn list(&self, company_id: Option<CompanyId>) -> Result<Vec<Charge>, RepositoryError> {
        let rows = sqlx::query_as::<_, ChargeRow>(&format!(
            "SELECT {CHARGE_COLUMNS} FROM charges.charge \
             WHERE ($1::int IS NULL OR company_id = $1) ORDER BY id"
        ))
        .bind(company_id.map(|c| c.as_i32()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// =============================================================================
// Packaging batches
// =============================================================================

const BATCH_COLUMNS: &str = "id, company_id, batch_name, batch_date, status, planned_duration, \
     actual_duration, assigned_workers, products, defect_count, rework_count, \
     overall_quality_score, started_at, completed_at, cancellation_reason, charge_id, notes, \
     version, created_at, updated_at";

/// Internal row type for `PostgreSQL` packaging batch queries.
#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: i32,
    company_id: i32,
    batch_name: String,
    batch_date: NaiveDate,
    status: BatchStatus,
    planned_duration: i64,
    actual_duration: Option<i64>,
    assigned_workers: Vec<i32>,
    products: Value,
    defect_count: i32,
    rework_count: i32,
    overall_quality_score: Option<Decimal>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    charge_id: Option<i32>,
    notes: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for PackagingBatch {
    type Error = RepositoryError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        let products: Vec<BatchProduct> = serde_json::from_value(row.products).map_err(corrupt)?;
        Ok(Self {
            id: PackagingBatchId::new(row.id),
            company_id: CompanyId::new(row.company_id),
            batch_name: row.batch_name,
            batch_date: row.batch_date,
            status: row.status,
            planned_duration: row.planned_duration,
            actual_duration: row.actual_duration,
            assigned_workers: row.assigned_workers.into_iter().map(EmployeeId::new).collect(),
            products,
            defect_count: u32::try_from(row.defect_count).map_err(corrupt)?,
            rework_count: u32::try_from(row.rework_count).map_err(corrupt)?,
            overall_quality_score: row.overall_quality_score,
            started_at: row.started_at,
            completed_at: row.completed_at,
            cancellation_reason: row.cancellation_reason,
            charge_id: row.charge_id.map(ChargeId::new),
            notes: row.notes,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Stored status, linked charge, and version of one batch.
type BatchState = (BatchStatus, Option<i32>, i64);

fn counter(value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(corrupt)
}

/// Packaging batch storage backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgBatchRepository {
    pool: PgPool,
}

impl PgBatchRepository {
    /// Create a new batch repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_state(
        &self,
        id: PackagingBatchId,
    ) -> Result<Option<BatchState>, RepositoryError> {
        Ok(sqlx::query_as::<_, BatchState>(
            "SELECT status, charge_id, version FROM charges.packaging_batch WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl BatchRepository for PgBatchRepository {
    async fn insert(
        &self,
        batch: NewPackagingBatch,
        now: DateTime<Utc>,
    ) -> Result<PackagingBatch, RepositoryError> {
        let mut planned = PackagingBatch::planned(PackagingBatchId::new(0), batch, now);
        let workers: Vec<i32> = planned.assigned_workers.iter().map(EmployeeId::as_i32).collect();
        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO charges.packaging_batch
                (company_id, batch_name, batch_date, status, planned_duration,
                 assigned_workers, products, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING id
            ",
        )
        .bind(planned.company_id.as_i32())
        .bind(&planned.batch_name)
        .bind(planned.batch_date)
        .bind(planned.status)
        .bind(planned.planned_duration)
        .bind(workers)
        .bind(to_json(&planned.products)?)
        .bind(&planned.notes)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        planned.id = PackagingBatchId::new(id);
        Ok(planned)
    }

    async fn load(&self, id: PackagingBatchId) -> Result<Option<PackagingBatch>, RepositoryError> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM charges.packaging_batch WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn save_transition(
        &self,
        batch: &PackagingBatch,
        expected: BatchStatus,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE charges.packaging_batch
            SET status = $4, actual_duration = $5, products = $6, defect_count = $7,
                rework_count = $8, overall_quality_score = $9, started_at = $10,
                completed_at = $11, cancellation_reason = $12, notes = $13, updated_at = $14,
                version = $15
            WHERE id = $1 AND status = $2 AND version = $3
            ",
        )
        .bind(batch.id.as_i32())
        .bind(expected)
        .bind(expected_version)
        .bind(batch.status)
        .bind(batch.actual_duration)
        .bind(to_json(&batch.products)?)
        .bind(counter(batch.defect_count)?)
        .bind(counter(batch.rework_count)?)
        .bind(batch.overall_quality_score)
        .bind(batch.started_at)
        .bind(batch.completed_at)
        .bind(&batch.cancellation_reason)
        .bind(&batch.notes)
        .bind(batch.updated_at)
        .bind(batch.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.current_state(batch.id).await? {
                Some((current, _, version)) => Err(RepositoryError::StaleState {
                    expected: format!("{expected} v{expected_version}"),
                    current: format!("{current} v{version}"),
                }),
                None => Err(RepositoryError::NotFound),
            };
        }
        Ok(())
    }

    async fn attach_charge(
        &self,
        id: PackagingBatchId,
        charge_id: ChargeId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE charges.packaging_batch
            SET charge_id = $2, version = version + 1
            WHERE id = $1 AND status = $3 AND charge_id IS NULL
            ",
        )
        .bind(id.as_i32())
        .bind(charge_id.as_i32())
        .bind(BatchStatus::Completed)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        match self.current_state(id).await? {
            None => Err(RepositoryError::NotFound),
            Some((_, Some(existing), _)) => Err(RepositoryError::Conflict(format!(
                "batch {id} already booked as charge {existing}"
            ))),
            Some((current, None, _)) => Err(RepositoryError::StaleState {
                expected: BatchStatus::Completed.to_string(),
                current: current.to_string(),
            }),
        }
    }

    async fn detach_charge(
        &self,
        id: PackagingBatchId,
        charge_id: ChargeId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE charges.packaging_batch
            SET charge_id = NULL, version = version + 1
            WHERE id = $1 AND charge_id = $2
            ",
        )
        .bind(id.as_i32())
        .bind(charge_id.as_i32())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && self.current_state(id).await?.is_none() {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list(
        &self,
        company_id: Option<CompanyId>,
    ) -> Result<Vec<PackagingBatch>, RepositoryError> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM charges.packaging_batch \
             WHERE ($1::int IS NULL OR company_id = $1) ORDER BY id"
        ))
        .bind(company_id.map(|c| c.as_i32()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// =============================================================================
// Shipping rates
// =============================================================================

/// Internal row type for `PostgreSQL` shipping rate queries.
#[derive(Debug, sqlx::FromRow)]
struct ShippingRateRow {
    provider_id: i32,
    service_type: String,
    origin_zone: String,
    destination_zone: String,
    base_rate: Decimal,
    rate_per_kg: Decimal,
    minimum_charge: Decimal,
    fuel_surcharge_rate: Decimal,
    insurance_rate: Decimal,
    estimated_days: i32,
}

impl TryFrom<ShippingRateRow> for ShippingRate {
    type Error = RepositoryError;

    fn try_from(row: ShippingRateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            provider_id: ShippingProviderId::new(row.provider_id),
            service_type: row.service_type,
            origin_zone: row.origin_zone,
            destination_zone: row.destination_zone,
            base_rate: row.base_rate,
            rate_per_kg: row.rate_per_kg,
            minimum_charge: row.minimum_charge,
            fuel_surcharge_rate: row.fuel_surcharge_rate,
            insurance_rate: row.insurance_rate,
            estimated_days: u32::try_from(row.estimated_days).map_err(corrupt)?,
        })
    }
}

/// Carrier rates read from `charges.shipping_rate`.
#[derive(Debug, Clone)]
pub struct PgRateProvider {
    pool: PgPool,
}

impl PgRateProvider {
    /// Create a new rate provider.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateProvider for PgRateProvider {
    async fn fetch_rates_for_route(
        &self,
        origin: &str,
        destination: &str,
        service_type: Option<&str>,
        provider_id: Option<ShippingProviderId>,
    ) -> Result<Vec<ShippingRate>, RepositoryError> {
        let rows = sqlx::query_as::<_, ShippingRateRow>(
            r"
            SELECT provider_id, service_type, origin_zone, destination_zone, base_rate,
                   rate_per_kg, minimum_charge, fuel_surcharge_rate, insurance_rate,
                   estimated_days
            FROM charges.shipping_rate
            WHERE is_active
              AND lower(origin_zone) = lower($1)
              AND lower(destination_zone) = lower($2)
              AND ($3::text IS NULL OR lower(service_type) = lower($3))
              AND ($4::int IS NULL OR provider_id = $4)
            ORDER BY id
            ",
        )
        .bind(origin)
        .bind(destination)
        .bind(service_type)
        .bind(provider_id.map(|p| p.as_i32()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    fn boxing_details(materials: &Value) -> Value {
        json!({
            "type": "boxing",
            "input": {
                "batch_size": 100,
                "materials": materials,
                "labor_hours": "10",
                "labor_rate": "1500"
            },
            "cost": {
                "batch_size": 100,
                "materials": [],
                "material_cost": "7000",
                "labor_cost": "15000",
                "total_cost": "22000",
                "cost_per_unit_output": "220"
            }
        })
    }

    #[test]
    fn test_legacy_unit_cost_is_adapted() {
        let details = boxing_details(&json!([
            {"material_id": 1, "quantity_per_item": "1", "unit_cost": "50"},
            {"material_id": 2, "name": "tape", "quantity_per_item": "2", "cost_per_unit": "10"}
        ]));

        let ChargeDetails::Boxing { input, .. } = decode_details(details).unwrap() else {
            panic!("expected boxing details");
        };
        assert_eq!(input.materials[0].cost_per_unit, dec!(50));
        assert_eq!(input.materials[1].cost_per_unit, dec!(10));
        assert_eq!(input.materials[1].name.as_deref(), Some("tape"));
    }

    #[test]
    fn test_material_without_cost_is_corruption() {
        let details = boxing_details(&json!([{"material_id": 1, "quantity_per_item": "1"}]));
        assert!(matches!(
            decode_details(details),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_other_details_untouched() {
        let details = json!({"type": "generic", "amount": "12.50", "description": "taxi"});
        let decoded = decode_details(details).unwrap();
        assert_eq!(decoded.total_cost(), dec!(12.50));
        assert_eq!(decoded.description(), Some("taxi"));
    }
}
