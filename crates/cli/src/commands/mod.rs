//! Command implementations.

#[cfg(feature = "postgres")]
pub mod migrate;
pub mod quote;
