//! Store collaborator interfaces.
//!
//! These are the only seams between the storefront and the vendor framework.
//! Implementations wrap the platform SDK (or [`InMemoryStore`](crate::InMemoryStore)
//! in tests) and must be shareable across tasks.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::mpsc;

use storefront_core::{Product, ProductId, Transaction};

use crate::error::StoreError;
use crate::result::{PurchaseOutcome, VerificationResult};

/// Product catalog lookups.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Fetch catalog entries for `ids`.
    ///
    /// Unknown ids are silently left out, so the result may be shorter than
    /// the request (or empty).
    async fn request(&self, ids: &BTreeSet<ProductId>) -> Result<Vec<Product>, StoreError>;
}

/// Purchase initiation.
#[async_trait]
pub trait PurchaseService: Send + Sync {
    /// Ask the store to buy `product`. Resolves once the user and the store
    /// are done (which may take arbitrarily long; no timeout is applied).
    async fn purchase(&self, product: &Product) -> Result<PurchaseOutcome, StoreError>;
}

/// Transaction history, live updates and acknowledgement.
#[async_trait]
pub trait TransactionService: Send + Sync {
    /// Most recent transaction the store holds for `product_id`, if any.
    async fn latest_transaction(&self, product_id: &ProductId) -> Option<VerificationResult>;

    /// Open a stream of transactions delivered outside a foreground purchase
    /// (renewals, refunds, approvals of pending purchases, other devices).
    fn updates(&self) -> TransactionUpdates;

    /// Acknowledge delivery so the store stops re-sending the transaction.
    async fn finish(&self, transaction: &Transaction) -> Result<(), StoreError>;
}

/// Everything the purchase store needs from the platform.
pub trait StoreClient: CatalogService + PurchaseService + TransactionService {}

impl<T> StoreClient for T where T: CatalogService + PurchaseService + TransactionService {}

/// Live stream of verification results from the store.
///
/// Backed by an unbounded channel: the store adapter pushes, the transaction
/// listener drains. Ends when the adapter drops its sender.
#[derive(Debug)]
pub struct TransactionUpdates {
    receiver: mpsc::UnboundedReceiver<VerificationResult>,
}

impl TransactionUpdates {
    pub fn new(receiver: mpsc::UnboundedReceiver<VerificationResult>) -> Self {
        Self { receiver }
    }

    /// Create a connected sender/stream pair.
    pub fn channel() -> (mpsc::UnboundedSender<VerificationResult>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx))
    }

    /// Wait for the next result; `None` once the store side closed the stream.
    pub async fn next(&mut self) -> Option<VerificationResult> {
        self.receiver.recv().await
    }
}
