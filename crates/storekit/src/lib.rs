//! Platform store boundary.
//!
//! The storefront never talks to the vendor framework directly: it consumes
//! the [`CatalogService`], [`PurchaseService`] and [`TransactionService`]
//! traits defined here. Verification happens on the platform side and arrives
//! as a [`VerificationResult`] tag; nothing in this workspace checks receipts.
//!
//! [`InMemoryStore`] implements all three for tests and local runs.

pub mod error;
pub mod in_memory;
pub mod result;
pub mod service;

pub use error::StoreError;
pub use in_memory::{InMemoryStore, PurchaseGate, tampered};
pub use result::{PurchaseOutcome, VerificationFailure, VerificationResult};
pub use service::{
    CatalogService, PurchaseService, StoreClient, TransactionService, TransactionUpdates,
};
