//! Unified error handling for the charges engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use backoffice_core::{ChargeId, ChargeStatus};

use crate::db::RepositoryError;

/// Domain error returned by calculators, state machines, and services.
#[derive(Debug, Error)]
pub enum ChargeError {
    /// Malformed or out-of-range input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Illegal lifecycle move, or a transition based on a stale source state.
    #[error("Invalid state transition: cannot move from {current} to {requested}")]
    InvalidStateTransition {
        /// Status the entity is actually in.
        current: String,
        /// Status (or action) the caller asked for.
        requested: String,
    },

    /// No shipping rate matches the requested route and filters.
    #[error(
        "No shipping rate available from {origin} to {destination} (service: {service})",
        service = .service_type.as_deref().unwrap_or("any")
    )]
    NoRateAvailable {
        /// Origin zone.
        origin: String,
        /// Destination zone.
        destination: String,
        /// Requested service type, if any.
        service_type: Option<String>,
    },

    /// Exchange rate missing or not strictly positive.
    #[error("Invalid exchange rate: {0}")]
    InvalidExchangeRate(String),

    /// Charge is in a status that does not allow deletion.
    #[error("Charge {id} cannot be deleted while {status}")]
    ChargeNotDeletable {
        /// Charge that was targeted.
        id: ChargeId,
        /// Its current status.
        status: ChargeStatus,
    },

    /// Batch size is zero or negative (guards the per-unit division).
    #[error("Invalid batch size {0}: must be greater than zero")]
    InvalidBatchSize(i64),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write conflicts with existing data.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Persistence collaborator failed.
    #[error("Repository error: {0}")]
    Repository(#[source] RepositoryError),
}

/// Discriminant of a [`ChargeError`], for callers that branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidStateTransition,
    NoRateAvailable,
    InvalidExchangeRate,
    ChargeNotDeletable,
    InvalidBatchSize,
    NotFound,
    Conflict,
    Repository,
}

impl ChargeError {
    /// The kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            Self::NoRateAvailable { .. } => ErrorKind::NoRateAvailable,
            Self::InvalidExchangeRate(_) => ErrorKind::InvalidExchangeRate,
            Self::ChargeNotDeletable { .. } => ErrorKind::ChargeNotDeletable,
            Self::InvalidBatchSize(_) => ErrorKind::InvalidBatchSize,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Repository(_) => ErrorKind::Repository,
        }
    }

    /// Shorthand for an [`ChargeError::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Shorthand for an [`ChargeError::InvalidStateTransition`].
    pub fn transition(current: impl ToString, requested: impl ToString) -> Self {
        Self::InvalidStateTransition {
            current: current.to_string(),
            requested: requested.to_string(),
        }
    }
}

impl From<RepositoryError> for ChargeError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // Another writer moved the record first
            RepositoryError::StaleState { expected, current } => Self::InvalidStateTransition {
                current,
                requested: format!("a transition from {expected}"),
            },
            RepositoryError::NotFound => Self::NotFound("record not found".to_string()),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            other => Self::Repository(other),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = ChargeError> = std::result::Result<T, E>;
