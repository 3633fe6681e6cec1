//! Status and classification enums for charges and packaging batches.
//!
//! Only the vocabulary lives here. The legal moves between statuses are
//! enforced by the state machines in `backoffice-charges`.

use serde::{Deserialize, Serialize};

/// Approval status of a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "charges.charge_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    /// Being prepared; details may still be recalculated.
    #[default]
    Draft,
    /// Submitted and waiting for a decision.
    PendingApproval,
    /// Approved for payment.
    Approved,
    /// Rejected; may be corrected and resubmitted.
    Rejected,
    /// Paid out. Terminal.
    Paid,
}

impl ChargeStatus {
    /// Whether the charge may be deleted in this status.
    #[must_use]
    pub const fn is_deletable(self) -> bool {
        matches!(self, Self::Draft | Self::Rejected)
    }

    /// Whether the charge details may be recalculated in this status.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Rejected)
    }

    /// Whether no further transition can leave this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid)
    }

    /// Stable snake_case name, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Paid => "paid",
        }
    }
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChargeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "pending_approval" => Ok(Self::PendingApproval),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "paid" => Ok(Self::Paid),
            _ => Err(format!("invalid charge status: {s}")),
        }
    }
}

/// Category discriminant of a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    Shipping,
    Boxing,
    Salary,
    Exchange,
    Returns,
    Generic,
}

impl ChargeType {
    /// Stable snake_case name, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shipping => "shipping",
            Self::Boxing => "boxing",
            Self::Salary => "salary",
            Self::Exchange => "exchange",
            Self::Returns => "returns",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ChargeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChargeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shipping" => Ok(Self::Shipping),
            "boxing" => Ok(Self::Boxing),
            "salary" => Ok(Self::Salary),
            "exchange" => Ok(Self::Exchange),
            "returns" => Ok(Self::Returns),
            "generic" => Ok(Self::Generic),
            _ => Err(format!("invalid charge type: {s}")),
        }
    }
}

/// Handling priority of a charge or a batch line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Stable snake_case name, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("invalid priority: {s}")),
        }
    }
}

/// Execution status of a packaging batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "charges.batch_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Planned,
    InProgress,
    /// Finished with every unit packed. Terminal.
    Completed,
    /// Abandoned before completion. Terminal.
    Cancelled,
}

impl BatchStatus {
    /// Whether no further transition can leave this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Stable snake_case name, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
