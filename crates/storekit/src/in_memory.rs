//! In-memory platform store for tests/dev.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, mpsc};
use tracing::debug;

use storefront_core::{Product, ProductId, Transaction, TransactionId};

use crate::error::StoreError;
use crate::result::{PurchaseOutcome, VerificationFailure, VerificationResult};
use crate::service::{CatalogService, PurchaseService, TransactionService, TransactionUpdates};

#[derive(Debug, Default)]
struct Inner {
    catalog: Vec<Product>,
    catalog_down: bool,
    latest: HashMap<ProductId, VerificationResult>,
    scripted: VecDeque<Result<PurchaseOutcome, StoreError>>,
    finished: Vec<TransactionId>,
    next_transaction_id: u64,
}

impl Inner {
    fn next_transaction(&mut self, product: &Product) -> Transaction {
        self.next_transaction_id += 1;
        Transaction::new(
            TransactionId::new(self.next_transaction_id),
            product.id.clone(),
            product.kind,
            Utc::now(),
        )
    }
}

/// Holds purchases open until released.
///
/// Obtained from [`InMemoryStore::hold_purchases`]; each `release` lets one
/// waiting (or the next) purchase call through.
#[derive(Debug, Clone)]
pub struct PurchaseGate {
    notify: Arc<Notify>,
}

impl PurchaseGate {
    pub fn release(&self) {
        self.notify.notify_one();
    }
}

/// In-memory store implementing every store service.
///
/// Intended for tests/dev. Behaviour is scripted:
///
/// - the catalog is whatever [`with_products`](Self::with_products) seeded
/// - purchases consume [`script_purchase`](Self::script_purchase) outcomes in
///   order and otherwise succeed with a fresh verified transaction
/// - verified purchases become the product's latest transaction
/// - [`push_update`](Self::push_update) feeds every open update stream
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    update_senders: Mutex<Vec<mpsc::UnboundedSender<VerificationResult>>>,
    gate: Mutex<Option<PurchaseGate>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.write() {
            inner.catalog.extend(products);
        }
        store
    }

    /// Make catalog requests fail with [`StoreError::Unavailable`].
    pub fn set_catalog_unavailable(&self, down: bool) {
        if let Ok(mut inner) = self.inner.write() {
            inner.catalog_down = down;
        }
    }

    /// Queue the outcome of the next purchase call.
    pub fn script_purchase(&self, outcome: Result<PurchaseOutcome, StoreError>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.scripted.push_back(outcome);
        }
    }

    /// Record `result` as the latest transaction for its product.
    pub fn set_latest(&self, result: VerificationResult) {
        if let Ok(mut inner) = self.inner.write() {
            let product_id = result.transaction().product_id.clone();
            inner.latest.insert(product_id, result);
        }
    }

    /// Build a new transaction for `product` with the next store-assigned id.
    pub fn make_transaction(&self, product: &Product) -> Option<Transaction> {
        self.inner
            .write()
            .ok()
            .map(|mut inner| inner.next_transaction(product))
    }

    /// Deliver `result` to every open update stream and record it as latest.
    ///
    /// Returns how many streams received it.
    pub fn push_update(&self, result: VerificationResult) -> usize {
        self.set_latest(result.clone());
        let Ok(mut senders) = self.update_senders.lock() else {
            return 0;
        };
        senders.retain(|tx| tx.send(result.clone()).is_ok());
        senders.len()
    }

    /// Close every open update stream.
    pub fn close_updates(&self) {
        if let Ok(mut senders) = self.update_senders.lock() {
            senders.clear();
        }
    }

    /// Make purchase calls wait until the returned gate is released.
    pub fn hold_purchases(&self) -> PurchaseGate {
        let gate = PurchaseGate {
            notify: Arc::new(Notify::new()),
        };
        if let Ok(mut slot) = self.gate.lock() {
            *slot = Some(gate.clone());
        }
        gate
    }

    /// Let purchases complete immediately again.
    pub fn open_purchases(&self) {
        if let Ok(mut slot) = self.gate.lock() {
            *slot = None;
        }
    }

    /// Ids of every transaction acknowledged so far, in order.
    pub fn finished(&self) -> Vec<TransactionId> {
        self.inner
            .read()
            .map(|inner| inner.finished.clone())
            .unwrap_or_default()
    }

    fn current_gate(&self) -> Option<PurchaseGate> {
        self.gate.lock().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
impl CatalogService for InMemoryStore {
    async fn request(&self, ids: &BTreeSet<ProductId>) -> Result<Vec<Product>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::other("lock poisoned"))?;

        if inner.catalog_down {
            return Err(StoreError::Unavailable);
        }

        Ok(inner
            .catalog
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PurchaseService for InMemoryStore {
    async fn purchase(&self, product: &Product) -> Result<PurchaseOutcome, StoreError> {
        if let Some(gate) = self.current_gate() {
            debug!(product_id = %product.id, "purchase held at gate");
            gate.notify.notified().await;
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::other("lock poisoned"))?;

        if !inner.catalog.iter().any(|p| p.id == product.id) {
            return Err(StoreError::ProductUnavailable(product.id.clone()));
        }

        let outcome = match inner.scripted.pop_front() {
            Some(scripted) => scripted?,
            None => {
                let tx = inner.next_transaction(product);
                PurchaseOutcome::success(VerificationResult::verified(tx))
            }
        };

        if let PurchaseOutcome::Success { result } = &outcome {
            if result.is_verified() {
                inner
                    .latest
                    .insert(result.transaction().product_id.clone(), result.clone());
            }
        }

        Ok(outcome)
    }
}

#[async_trait]
impl TransactionService for InMemoryStore {
    async fn latest_transaction(&self, product_id: &ProductId) -> Option<VerificationResult> {
        self.inner.read().ok()?.latest.get(product_id).cloned()
    }

    fn updates(&self) -> TransactionUpdates {
        let (tx, updates) = TransactionUpdates::channel();
        if let Ok(mut senders) = self.update_senders.lock() {
            senders.push(tx);
        }
        updates
    }

    async fn finish(&self, transaction: &Transaction) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::other("lock poisoned"))?;
        inner.finished.push(transaction.id);
        Ok(())
    }
}

/// Convenience for tests: an unverified copy of `transaction`.
pub fn tampered(transaction: Transaction) -> VerificationResult {
    VerificationResult::unverified(transaction, VerificationFailure::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use storefront_core::ProductKind;

    use super::*;

    fn product(id: &str) -> Product {
        Product::new(
            ProductId::new(id).unwrap(),
            id,
            "test product",
            "$0.99",
            ProductKind::NonConsumable,
        )
    }

    fn ids(raw: &[&str]) -> BTreeSet<ProductId> {
        raw.iter().map(|s| ProductId::new(*s).unwrap()).collect()
    }

    #[tokio::test]
    async fn request_filters_to_known_ids() {
        let store = InMemoryStore::with_products([product("a"), product("b")]);

        let found = store.request(&ids(&["a", "zzz"])).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn request_fails_while_catalog_down() {
        let store = InMemoryStore::with_products([product("a")]);
        store.set_catalog_unavailable(true);

        let err = store.request(&ids(&["a"])).await.unwrap_err();

        assert_eq!(err, StoreError::Unavailable);
    }

    #[tokio::test]
    async fn default_purchase_succeeds_and_becomes_latest() {
        let store = InMemoryStore::with_products([product("a")]);
        let p = product("a");

        let outcome = store.purchase(&p).await.unwrap();

        let PurchaseOutcome::Success { result } = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert!(result.is_verified());
        assert_eq!(store.latest_transaction(&p.id).await, Some(result));
    }

    #[tokio::test]
    async fn scripted_outcomes_are_consumed_in_order() {
        let store = InMemoryStore::with_products([product("a")]);
        store.script_purchase(Ok(PurchaseOutcome::UserCancelled));
        store.script_purchase(Err(StoreError::NotAllowed));
        let p = product("a");

        assert_eq!(store.purchase(&p).await, Ok(PurchaseOutcome::UserCancelled));
        assert_eq!(store.purchase(&p).await, Err(StoreError::NotAllowed));
        assert!(matches!(
            store.purchase(&p).await,
            Ok(PurchaseOutcome::Success { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_product_cannot_be_purchased() {
        let store = InMemoryStore::new();

        let err = store.purchase(&product("ghost")).await.unwrap_err();

        assert!(matches!(err, StoreError::ProductUnavailable(_)));
    }

    #[tokio::test]
    async fn push_update_reaches_every_stream() {
        let store = InMemoryStore::with_products([product("a")]);
        let mut first = store.updates();
        let mut second = store.updates();
        let tx = store.make_transaction(&product("a")).unwrap();

        let delivered = store.push_update(VerificationResult::verified(tx.clone()));

        assert_eq!(delivered, 2);
        assert_eq!(first.next().await.unwrap().transaction(), &tx);
        assert_eq!(second.next().await.unwrap().transaction(), &tx);
    }

    #[tokio::test]
    async fn close_updates_ends_streams() {
        let store = InMemoryStore::new();
        let mut updates = store.updates();

        store.close_updates();

        assert!(updates.next().await.is_none());
    }

    #[tokio::test]
    async fn finish_records_transaction_ids() {
        let store = InMemoryStore::with_products([product("a")]);
        let tx = store.make_transaction(&product("a")).unwrap();

        store.finish(&tx).await.unwrap();

        assert_eq!(store.finished(), vec![tx.id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn held_purchase_waits_for_release() {
        let store = Arc::new(InMemoryStore::with_products([product("a")]));
        let gate = store.hold_purchases();

        let task = {
            let store = store.clone();
            tokio::spawn(async move { store.purchase(&product("a")).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        gate.release();
        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, PurchaseOutcome::Success { .. }));
    }
}
