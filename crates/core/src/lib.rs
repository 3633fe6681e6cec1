//! Back-office core - shared types library.
//!
//! This crate provides the vocabulary used across the back-office components:
//! - `charges` - Cost calculators, charge ledger, packaging batch execution
//! - `cli` - Command-line tools for quotes and migrations
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no
//! business rules. State machines and calculators live in `backoffice-charges`.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money and currency, and lifecycle status enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
