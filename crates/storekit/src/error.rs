use thiserror::Error;

use storefront_core::ProductId;

/// Failure reported by the platform store itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or is not set up on this device.
    #[error("store unavailable")]
    Unavailable,

    /// In-app purchases are disabled for this account/device.
    #[error("purchases not allowed")]
    NotAllowed,

    /// The store does not (or no longer) sells this product.
    #[error("product unavailable: {0}")]
    ProductUnavailable(ProductId),

    #[error("network error: {0}")]
    Network(String),

    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
