//! Errors surfaced to callers of the purchase store.

use std::path::PathBuf;

use thiserror::Error;

use storefront_core::{DomainError, ProductId, TransactionId};
use storefront_storekit::{StoreError, VerificationFailure};

/// The platform refused to vouch for a transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transaction {transaction_id} for {product_id} failed verification: {failure}")]
pub struct VerificationError {
    pub product_id: ProductId,
    pub transaction_id: TransactionId,
    pub failure: VerificationFailure,
}

/// Failure of `purchase` / `is_purchased`.
///
/// Every variant is terminal for the call that produced it; nothing retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    /// Another purchase is still in progress. Nothing was attempted.
    #[error("a purchase is already in progress")]
    InProgress,

    /// The store-level purchase call failed.
    #[error("purchase failed: {0}")]
    PurchaseFailed(#[from] StoreError),

    /// The store returned a transaction that failed verification.
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid product id in configuration: {0}")]
    InvalidProductId(#[from] DomainError),
}
