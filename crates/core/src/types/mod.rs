//! Core types for the back-office.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;
pub mod status;

pub use id::*;
pub use money::{Currency, CurrencyError, MINOR_UNIT_SCALE, Money};
pub use status::*;
