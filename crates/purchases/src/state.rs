//! Shared, observable store state.
//!
//! [`StoreState`] is the one object both the foreground [`PurchaseStore`](crate::PurchaseStore)
//! and the background [`TransactionListener`](crate::TransactionListener) hold.
//! Each piece of state sits in a `tokio::sync::watch` channel: observers call
//! `subscribe_*` and read on their own task, writers go through the watch
//! sender's modify functions, which serialize concurrent updates.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use storefront_core::{Product, ProductId, PurchaseState, Transaction};
use storefront_events::{EventBus, InMemoryEventBus, StoreEvent, StoreEventEnvelope, Subscription};

use crate::error::VerificationError;

/// Product ids the user currently has access to.
///
/// Only [`StoreState::reconcile_ownership`] mutates it. Membership reflects
/// verified, non-revoked transactions only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnedProducts(BTreeSet<ProductId>);

impl OwnedProducts {
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.0.contains(product_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductId> {
        self.0.iter()
    }

    fn insert(&mut self, product_id: ProductId) -> bool {
        self.0.insert(product_id)
    }

    fn remove(&mut self, product_id: &ProductId) -> bool {
        self.0.remove(product_id)
    }
}

impl<'a> IntoIterator for &'a OwnedProducts {
    type Item = &'a ProductId;
    type IntoIter = std::collections::btree_set::Iter<'a, ProductId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// What a reconciliation did to the owned set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipChange {
    Granted,
    Revoked,
    Unchanged,
}

/// Catalog, ownership and purchase state, plus the event bus they report on.
#[derive(Debug)]
pub struct StoreState {
    catalog: watch::Sender<Vec<Product>>,
    owned: watch::Sender<OwnedProducts>,
    purchase_state: watch::Sender<PurchaseState>,
    events: Arc<InMemoryEventBus<StoreEventEnvelope>>,
}

impl StoreState {
    pub fn new() -> Self {
        Self::with_bus(Arc::new(InMemoryEventBus::new()))
    }

    /// Report events on an existing bus (e.g. one shared with an audit log).
    pub fn with_bus(events: Arc<InMemoryEventBus<StoreEventEnvelope>>) -> Self {
        Self {
            catalog: watch::channel(Vec::new()).0,
            owned: watch::channel(OwnedProducts::default()).0,
            purchase_state: watch::channel(PurchaseState::default()).0,
            events,
        }
    }

    pub fn catalog(&self) -> Vec<Product> {
        self.catalog.borrow().clone()
    }

    /// Run `f` against the catalog without cloning it.
    pub fn with_catalog<R>(&self, f: impl FnOnce(&[Product]) -> R) -> R {
        f(self.catalog.borrow().as_slice())
    }

    pub fn owned_products(&self) -> OwnedProducts {
        self.owned.borrow().clone()
    }

    pub fn is_owned(&self, product_id: &ProductId) -> bool {
        self.owned.borrow().contains(product_id)
    }

    pub fn purchase_state(&self) -> PurchaseState {
        *self.purchase_state.borrow()
    }

    pub fn subscribe_catalog(&self) -> watch::Receiver<Vec<Product>> {
        self.catalog.subscribe()
    }

    pub fn subscribe_owned(&self) -> watch::Receiver<OwnedProducts> {
        self.owned.subscribe()
    }

    pub fn subscribe_purchase_state(&self) -> watch::Receiver<PurchaseState> {
        self.purchase_state.subscribe()
    }

    pub fn subscribe_events(&self) -> Subscription<StoreEventEnvelope> {
        self.events.subscribe()
    }

    /// Apply one verified transaction to the owned set.
    ///
    /// No revocation date: the product id is inserted (set semantics, so
    /// repeated application is a no-op). Revoked: the id is removed, and the
    /// revocation is logged and recorded if it was owned.
    ///
    /// The check, the mutation and the grant/revoke event all happen under
    /// the watch channel's write lock, so the listener and a foreground
    /// purchase can race here and event subscribers still see changes in the
    /// order they were applied.
    pub fn reconcile_ownership(&self, transaction: &Transaction) -> OwnershipChange {
        let product_id = &transaction.product_id;
        let mut change = OwnershipChange::Unchanged;

        self.owned.send_if_modified(|owned| {
            if transaction.revocation_date.is_none() {
                if owned.insert(product_id.clone()) {
                    change = OwnershipChange::Granted;
                    self.record(StoreEvent::EntitlementGranted {
                        product_id: product_id.clone(),
                        transaction_id: transaction.id,
                    });
                }
            } else if owned.remove(product_id) {
                change = OwnershipChange::Revoked;
                self.record(StoreEvent::EntitlementRevoked {
                    product_id: product_id.clone(),
                    transaction_id: transaction.id,
                });
            }
            change != OwnershipChange::Unchanged
        });

        match change {
            OwnershipChange::Granted => info!(
                product_id = %product_id,
                transaction_id = %transaction.id,
                "entitlement granted"
            ),
            OwnershipChange::Revoked => info!(
                product_id = %product_id,
                transaction_id = %transaction.id,
                revoked_at = ?transaction.revocation_date,
                "entitlement revoked"
            ),
            OwnershipChange::Unchanged => debug!(
                product_id = %product_id,
                transaction_id = %transaction.id,
                "ownership unchanged"
            ),
        }

        change
    }

    /// Log and record a transaction that failed verification. `context`
    /// names the path that saw it (purchase, entitlement check, update).
    pub(crate) fn reject_unverified(&self, err: &VerificationError, context: &'static str) {
        warn!(
            product_id = %err.product_id,
            transaction_id = %err.transaction_id,
            failure = %err.failure,
            context,
            "transaction failed verification"
        );
        self.record(StoreEvent::TransactionRejected {
            product_id: err.product_id.clone(),
            transaction_id: err.transaction_id,
            reason: err.failure.to_string(),
        });
    }

    pub(crate) fn replace_catalog(&self, products: Vec<Product>) {
        self.catalog.send_replace(products);
    }

    /// Atomically move to `InProgress` unless a purchase already is.
    pub(crate) fn try_begin_purchase(&self, product_id: &ProductId) -> bool {
        let began = self.purchase_state.send_if_modified(|state| {
            if state.is_in_progress() {
                false
            } else {
                *state = PurchaseState::InProgress;
                true
            }
        });

        if began {
            self.record(StoreEvent::PurchaseStateChanged {
                product_id: product_id.clone(),
                state: PurchaseState::InProgress,
            });
        }

        began
    }

    pub(crate) fn set_purchase_state(&self, product_id: &ProductId, state: PurchaseState) {
        self.purchase_state.send_replace(state);
        debug!(product_id = %product_id, %state, "purchase state changed");
        self.record(StoreEvent::PurchaseStateChanged {
            product_id: product_id.clone(),
            state,
        });
    }

    /// Publish an event; a failed publish is logged and otherwise ignored.
    pub(crate) fn record(&self, event: StoreEvent) {
        if let Err(err) = self.events.publish(StoreEventEnvelope::new(event)) {
            warn!(error = ?err, "failed to publish store event");
        }
    }
}

impl Default for StoreState {
    fn default() -> Self {
        Self::new()
    }
}
