//! Back-office charges engine.
//!
//! Prices operational costs (shipping, packaging, returns, payroll, currency
//! exchange), books them as charges, and walks each charge through its
//! approval lifecycle.
//!
//! # Architecture
//!
//! - Calculators are pure functions over `rust_decimal::Decimal`
//! - Lifecycles are explicit state machines ([`fsm::Transition`])
//! - Services ([`ChargeLedger`], [`BatchService`], [`BulkCoordinator`]) are
//!   async and talk to storage only through the traits in [`db`]
//!
//! # Modules
//!
//! - [`calculators`] - Cost calculators and the [`CostEngine`] dispatcher
//! - [`models`] - Charges, charge details, and packaging batches
//! - [`ledger`] - Charge approval state machine and service
//! - [`packaging`] - Packaging batch state machine and cost booking
//! - [`bulk`] - One operation applied to many charges
//! - [`query`] - Filtering, sorting, pagination, and summaries
//! - [`db`] - Repository traits with in-memory and `PostgreSQL` backends
//! - [`config`] - Environment configuration
//! - [`error`] - Domain error type

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod bulk;
pub mod calculators;
pub mod config;
pub mod db;
pub mod error;
pub mod fsm;
pub mod ledger;
pub mod models;
pub mod packaging;
pub mod query;

pub use bulk::{BulkCoordinator, BulkOperation, BulkReport};
pub use calculators::CostEngine;
pub use config::{ChargesConfig, ConfigError};
pub use error::{ChargeError, ErrorKind, Result};
pub use fsm::Transition;
pub use ledger::{ChargeEvent, ChargeLedger};
pub use models::{
    BatchProduct, Charge, ChargeDetails, ChargeRequest, NewCharge, NewPackagingBatch,
    PackagingBatch,
};
pub use packaging::{BatchCosting, BatchEvent, BatchService, ProgressUpdate};
pub use query::{ChargeFilter, ChargeQuery, ChargeSummary, Page};

/// Embedded migrations for the `charges` schema.
#[cfg(feature = "postgres")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
