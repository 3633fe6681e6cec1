//! Domain models for charges and packaging batches.

mod batch;
mod charge;

pub use batch::{BatchProduct, NewPackagingBatch, PackagingBatch};
pub use charge::{
    Charge, ChargeDetails, ChargeRequest, NewCharge, StatusChange, UnsavedCharge,
};
