use serde::{Deserialize, Serialize};

use storefront_core::{ProductId, PurchaseState, TransactionId};

use crate::envelope::EventEnvelope;

/// A published event.
///
/// Events are facts: immutable, cheap to clone, safe to send across threads.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. `"entitlement.revoked"`).
    fn event_type(&self) -> &'static str;
}

/// Something the purchase store did or observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// The catalog request returned products.
    CatalogLoaded { product_count: usize },

    /// The catalog request failed or came back empty; the catalog stays empty.
    CatalogUnavailable { reason: String },

    /// The foreground purchase attempt moved to a new state.
    PurchaseStateChanged {
        product_id: ProductId,
        state: PurchaseState,
    },

    /// A product id joined the owned set.
    EntitlementGranted {
        product_id: ProductId,
        transaction_id: TransactionId,
    },

    /// A previously owned product id left the owned set after a revocation.
    EntitlementRevoked {
        product_id: ProductId,
        transaction_id: TransactionId,
    },

    /// The store reported a transaction that failed verification.
    TransactionRejected {
        product_id: ProductId,
        transaction_id: TransactionId,
        reason: String,
    },

    /// A verified transaction was acknowledged back to the store.
    TransactionFinished {
        product_id: ProductId,
        transaction_id: TransactionId,
    },
}

impl Event for StoreEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::CatalogLoaded { .. } => "catalog.loaded",
            StoreEvent::CatalogUnavailable { .. } => "catalog.unavailable",
            StoreEvent::PurchaseStateChanged { .. } => "purchase.state_changed",
            StoreEvent::EntitlementGranted { .. } => "entitlement.granted",
            StoreEvent::EntitlementRevoked { .. } => "entitlement.revoked",
            StoreEvent::TransactionRejected { .. } => "transaction.rejected",
            StoreEvent::TransactionFinished { .. } => "transaction.finished",
        }
    }
}

pub type StoreEventEnvelope = EventEnvelope<StoreEvent>;
