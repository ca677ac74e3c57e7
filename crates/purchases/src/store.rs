//! The purchase store: single authority over catalog and ownership.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use storefront_core::{Entity, Product, ProductId, PurchaseState, Transaction};
use storefront_events::{StoreEvent, StoreEventEnvelope, Subscription};
use storefront_storekit::{PurchaseOutcome, StoreClient};

use crate::config::StoreConfig;
use crate::error::PurchaseError;
use crate::listener::{ListenerHandle, TransactionListener, finish_transaction};
use crate::state::{OwnedProducts, StoreState};
use crate::verification::into_verified;

/// Result of a purchase call that reached the store without failing.
pub type PurchaseResult = (Option<Transaction>, PurchaseState);

/// Catalog + ownership cache in front of the platform store.
///
/// Owns the [`TransactionListener`] for its whole lifetime: the listener is
/// spawned by [`new`](Self::new) and cancelled by [`shutdown`](Self::shutdown)
/// (or when the store is dropped).
pub struct PurchaseStore {
    client: Arc<dyn StoreClient>,
    state: Arc<StoreState>,
    listener: Option<ListenerHandle>,
}

impl core::fmt::Debug for PurchaseStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PurchaseStore")
            .field("state", &self.state)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl PurchaseStore {
    /// Build a store with fresh state and start listening for transaction
    /// updates. Must be called from within a tokio runtime.
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self::with_state(client, Arc::new(StoreState::new()))
    }

    /// Like [`new`](Self::new), reporting into existing state.
    pub fn with_state(client: Arc<dyn StoreClient>, state: Arc<StoreState>) -> Self {
        let listener = TransactionListener::spawn(client.clone(), state.clone());
        Self {
            client,
            state,
            listener: Some(listener),
        }
    }

    /// Build the store, load the configured catalog and work out what the
    /// user already owns.
    pub async fn start(client: Arc<dyn StoreClient>, config: &StoreConfig) -> Self {
        let store = Self::new(client);
        store.fetch_catalog(&config.product_ids).await;
        store.refresh_entitlements().await;
        store
    }

    /// Stop the transaction listener and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
    }

    pub fn state(&self) -> &Arc<StoreState> {
        &self.state
    }

    pub fn products(&self) -> Vec<Product> {
        self.state.catalog()
    }

    pub fn purchased_products(&self) -> OwnedProducts {
        self.state.owned_products()
    }

    pub fn purchase_state(&self) -> PurchaseState {
        self.state.purchase_state()
    }

    pub fn subscribe_products(&self) -> watch::Receiver<Vec<Product>> {
        self.state.subscribe_catalog()
    }

    pub fn subscribe_purchased_products(&self) -> watch::Receiver<OwnedProducts> {
        self.state.subscribe_owned()
    }

    pub fn subscribe_purchase_state(&self) -> watch::Receiver<PurchaseState> {
        self.state.subscribe_purchase_state()
    }

    pub fn events(&self) -> Subscription<StoreEventEnvelope> {
        self.state.subscribe_events()
    }

    /// Load catalog entries for `ids`.
    ///
    /// An empty answer or a store failure is not fatal: it is logged and
    /// recorded, the catalog is left empty and an empty list is returned.
    pub async fn fetch_catalog(&self, ids: &BTreeSet<ProductId>) -> Vec<Product> {
        let reason = match self.client.request(ids).await {
            Ok(products) if !products.is_empty() => {
                info!(
                    requested = ids.len(),
                    received = products.len(),
                    "catalog loaded"
                );
                self.state.replace_catalog(products.clone());
                self.state.record(StoreEvent::CatalogLoaded {
                    product_count: products.len(),
                });
                return products;
            }
            Ok(_) => "store returned no products".to_string(),
            Err(err) => err.to_string(),
        };

        warn!(requested = ids.len(), %reason, "catalog unavailable");
        self.state.replace_catalog(Vec::new());
        self.state.record(StoreEvent::CatalogUnavailable { reason });
        Vec::new()
    }

    /// Catalog entry for `id`.
    ///
    /// Ids are unique in a well-formed catalog; a duplicate is treated as a
    /// failed lookup.
    pub fn lookup_product(&self, id: &ProductId) -> Option<Product> {
        self.state.with_catalog(|catalog| {
            let mut matches = catalog.iter().filter(|p| p.id() == id);

            let found = matches.next()?;
            if matches.next().is_some() {
                warn!(product_id = %id, "catalog contains duplicate product id");
                return None;
            }
            Some(found.clone())
        })
    }

    /// Whether the user currently has access to `product_id`.
    ///
    /// Looks at the store's latest transaction for the product: none means
    /// not purchased, whatever the owned set says. A verified transaction is
    /// reconciled into the owned set; access requires it to be neither
    /// revoked nor upgraded away.
    ///
    /// # Errors
    ///
    /// [`PurchaseError::Verification`] if the latest transaction failed
    /// verification. The rejection is also recorded as a
    /// `TransactionRejected` event.
    pub async fn is_purchased(&self, product_id: &ProductId) -> Result<bool, PurchaseError> {
        let Some(result) = self.client.latest_transaction(product_id).await else {
            return Ok(false);
        };

        let transaction = into_verified(result).inspect_err(|err| {
            self.state.reject_unverified(err, "entitlement check");
        })?;
        self.state.reconcile_ownership(&transaction);

        Ok(transaction.grants_access())
    }

    /// Buy `product`.
    ///
    /// Only one purchase may be in flight: a call made while the state is
    /// `InProgress` fails with [`PurchaseError::InProgress`] without touching
    /// the store or the owned set.
    ///
    /// Cancelled, pending and unrecognised outcomes are not errors: they
    /// return `(None, state)`.
    ///
    /// # Errors
    ///
    /// * [`PurchaseError::InProgress`] -- another purchase is running.
    /// * [`PurchaseError::PurchaseFailed`] -- the store call failed; state becomes `Failed`.
    /// * [`PurchaseError::Verification`] -- the store's transaction failed
    ///   verification; state becomes `FailedVerification`.
    pub async fn purchase(&self, product: &Product) -> Result<PurchaseResult, PurchaseError> {
        if !self.state.try_begin_purchase(&product.id) {
            warn!(product_id = %product.id, "purchase rejected, another purchase is in progress");
            return Err(PurchaseError::InProgress);
        }
        let mut attempt = Attempt::new(&self.state, &product.id);

        info!(product_id = %product.id, "purchase started");

        let outcome = match self.client.purchase(product).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(product_id = %product.id, error = %err, "purchase failed");
                attempt.settle(PurchaseState::Failed);
                return Err(PurchaseError::PurchaseFailed(err));
            }
        };

        let result = match outcome {
            PurchaseOutcome::Success { result } => result,
            PurchaseOutcome::UserCancelled => {
                info!(product_id = %product.id, "purchase cancelled by user");
                return Ok((None, attempt.settle(PurchaseState::Cancelled)));
            }
            PurchaseOutcome::Pending => {
                info!(product_id = %product.id, "purchase pending approval");
                return Ok((None, attempt.settle(PurchaseState::Pending)));
            }
            PurchaseOutcome::Unknown => {
                warn!(product_id = %product.id, "purchase returned an unknown result");
                return Ok((None, attempt.settle(PurchaseState::Unknown)));
            }
        };

        let transaction = match into_verified(result) {
            Ok(transaction) => transaction,
            Err(err) => {
                self.state.reject_unverified(&err, "purchase");
                attempt.settle(PurchaseState::FailedVerification);
                return Err(err.into());
            }
        };

        self.state.reconcile_ownership(&transaction);
        finish_transaction(self.client.as_ref(), &self.state, &transaction).await;

        info!(
            product_id = %product.id,
            transaction_id = %transaction.id,
            "purchase complete"
        );
        let state = attempt.settle(PurchaseState::Complete);
        Ok((Some(transaction), state))
    }

    /// Re-check every catalog product against the store's latest
    /// transactions. Verification failures are logged, not surfaced.
    pub async fn refresh_entitlements(&self) -> OwnedProducts {
        for product in self.state.catalog() {
            if let Err(err) = self.is_purchased(&product.id).await {
                warn!(product_id = %product.id, error = %err, "could not refresh entitlement");
            }
        }
        self.state.owned_products()
    }
}

/// Keeps a purchase attempt from being stuck `InProgress`.
///
/// If the purchase future is dropped before it settles (caller gave up), the
/// state moves to `Unknown` so later purchases are not locked out.
struct Attempt<'a> {
    state: &'a StoreState,
    product_id: &'a ProductId,
    settled: bool,
}

impl<'a> Attempt<'a> {
    fn new(state: &'a StoreState, product_id: &'a ProductId) -> Self {
        Self {
            state,
            product_id,
            settled: false,
        }
    }

    fn settle(&mut self, outcome: PurchaseState) -> PurchaseState {
        self.settled = true;
        self.state.set_purchase_state(self.product_id, outcome);
        outcome
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(product_id = %self.product_id, "purchase abandoned before completion");
            self.state
                .set_purchase_state(self.product_id, PurchaseState::Unknown);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use storefront_core::ProductKind;
    use storefront_storekit::{
        InMemoryStore, StoreError, VerificationFailure, VerificationResult, tampered,
    };

    use super::*;

    fn product(id: &str) -> Product {
        Product::new(
            ProductId::new(id).unwrap(),
            id,
            "test product",
            "$4.99",
            ProductKind::NonConsumable,
        )
    }

    fn ids(raw: &[&str]) -> BTreeSet<ProductId> {
        raw.iter().map(|s| ProductId::new(*s).unwrap()).collect()
    }

    fn setup(products: &[&str]) -> (Arc<InMemoryStore>, PurchaseStore) {
        let fake = Arc::new(InMemoryStore::with_products(
            products.iter().map(|p| product(p)),
        ));
        let store = PurchaseStore::new(fake.clone());
        (fake, store)
    }

    #[tokio::test]
    async fn fetch_catalog_loads_products() {
        let (_fake, store) = setup(&["a", "b"]);

        let products = store.fetch_catalog(&ids(&["a", "b"])).await;

        assert_eq!(products.len(), 2);
        assert_eq!(store.products(), products);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn fetch_catalog_failure_leaves_catalog_empty() {
        let (fake, store) = setup(&["a"]);
        let events = store.events();
        store.fetch_catalog(&ids(&["a"])).await;
        fake.set_catalog_unavailable(true);

        let products = store.fetch_catalog(&ids(&["a"])).await;

        assert!(products.is_empty());
        assert!(store.products().is_empty());
        assert!(events.drain().iter().any(|e| matches!(
            e.payload(),
            StoreEvent::CatalogUnavailable { reason } if reason == "store unavailable"
        )));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn fetch_catalog_with_unknown_ids_is_empty() {
        let (_fake, store) = setup(&["a"]);

        let products = store.fetch_catalog(&ids(&["nope"])).await;

        assert!(products.is_empty());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn lookup_product_finds_single_match() {
        let (_fake, store) = setup(&["a", "b"]);
        store.fetch_catalog(&ids(&["a", "b"])).await;

        let found = store.lookup_product(&ProductId::new("b").unwrap());

        assert_eq!(found, Some(product("b")));
        assert_eq!(store.lookup_product(&ProductId::new("zzz").unwrap()), None);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn lookup_product_treats_duplicates_as_missing() {
        let (_fake, store) = setup(&[]);
        store
            .state()
            .replace_catalog(vec![product("dup"), product("dup")]);

        assert_eq!(store.lookup_product(&ProductId::new("dup").unwrap()), None);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn is_purchased_false_without_transaction() {
        let (_fake, store) = setup(&["P1"]);

        assert!(!store.is_purchased(&ProductId::new("P1").unwrap()).await.unwrap());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn is_purchased_ignores_owned_set_without_transaction() {
        let (fake, store) = setup(&["P1"]);
        let tx = fake.make_transaction(&product("P1")).unwrap();
        store.state().reconcile_ownership(&tx);
        assert!(store.purchased_products().contains(&tx.product_id));

        // The store holds no transaction for P1, so the owned set is not
        // consulted.
        assert_eq!(store.is_purchased(&tx.product_id).await, Ok(false));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn is_purchased_true_for_valid_transaction() {
        let (fake, store) = setup(&["P1"]);
        let tx = fake.make_transaction(&product("P1")).unwrap();
        fake.set_latest(VerificationResult::verified(tx.clone()));

        assert!(store.is_purchased(&tx.product_id).await.unwrap());
        assert_eq!(store.purchased_products().iter().collect::<Vec<_>>(), vec![&tx.product_id]);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn is_purchased_false_for_upgraded_subscription() {
        let (fake, store) = setup(&["P1"]);
        let tx = fake.make_transaction(&product("P1")).unwrap().upgraded();
        fake.set_latest(VerificationResult::verified(tx.clone()));

        assert!(!store.is_purchased(&tx.product_id).await.unwrap());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn is_purchased_fails_for_unverified_transaction() {
        let (fake, store) = setup(&["P1"]);
        let tx = fake.make_transaction(&product("P1")).unwrap();
        fake.set_latest(tampered(tx.clone()));
        let events = store.events();

        let err = store.is_purchased(&tx.product_id).await.unwrap_err();

        assert!(matches!(err, PurchaseError::Verification(ref v) if v.transaction_id == tx.id));
        assert!(store.purchased_products().is_empty());
        assert!(events.drain().iter().any(|e| matches!(
            e.payload(),
            StoreEvent::TransactionRejected { transaction_id, .. } if *transaction_id == tx.id
        )));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn is_purchased_removes_revoked_product() {
        let (fake, store) = setup(&["P1"]);
        let tx = fake.make_transaction(&product("P1")).unwrap();
        fake.set_latest(VerificationResult::verified(tx.clone()));
        assert!(store.is_purchased(&tx.product_id).await.unwrap());

        fake.set_latest(VerificationResult::verified(tx.clone().revoked_at(Utc::now())));

        assert!(!store.is_purchased(&tx.product_id).await.unwrap());
        assert!(store.purchased_products().is_empty());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn purchase_success_grants_and_finishes() {
        let (fake, store) = setup(&["P1"]);

        let (tx, state) = store.purchase(&product("P1")).await.unwrap();

        let tx = tx.unwrap();
        assert_eq!(state, PurchaseState::Complete);
        assert_eq!(store.purchase_state(), PurchaseState::Complete);
        assert!(store.purchased_products().contains(&tx.product_id));
        assert_eq!(fake.finished(), vec![tx.id]);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn purchase_user_cancelled_returns_cancelled() {
        let (fake, store) = setup(&["P1"]);
        fake.script_purchase(Ok(PurchaseOutcome::UserCancelled));

        let (tx, state) = store.purchase(&product("P1")).await.unwrap();

        assert!(tx.is_none());
        assert_eq!(state, PurchaseState::Cancelled);
        assert_eq!(store.purchase_state(), PurchaseState::Cancelled);
        assert!(store.purchased_products().is_empty());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn purchase_pending_and_unknown_map_to_states() {
        let (fake, store) = setup(&["P1"]);
        fake.script_purchase(Ok(PurchaseOutcome::Pending));
        fake.script_purchase(Ok(PurchaseOutcome::Unknown));

        assert_eq!(
            store.purchase(&product("P1")).await.unwrap(),
            (None, PurchaseState::Pending)
        );
        assert_eq!(
            store.purchase(&product("P1")).await.unwrap(),
            (None, PurchaseState::Unknown)
        );
        assert!(store.purchased_products().is_empty());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn purchase_unverified_fails_verification() {
        let (fake, store) = setup(&["P1"]);
        let tx = fake.make_transaction(&product("P1")).unwrap();
        fake.script_purchase(Ok(PurchaseOutcome::success(VerificationResult::unverified(
            tx.clone(),
            VerificationFailure::InvalidCertificateChain,
        ))));

        let err = store.purchase(&product("P1")).await.unwrap_err();

        assert!(matches!(err, PurchaseError::Verification(_)));
        assert_eq!(store.purchase_state(), PurchaseState::FailedVerification);
        assert!(store.purchased_products().is_empty());
        assert!(fake.finished().is_empty());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn purchase_store_failure_is_surfaced() {
        let (fake, store) = setup(&["P1"]);
        fake.script_purchase(Err(StoreError::NotAllowed));

        let err = store.purchase(&product("P1")).await.unwrap_err();

        assert_eq!(err, PurchaseError::PurchaseFailed(StoreError::NotAllowed));
        assert_eq!(store.purchase_state(), PurchaseState::Failed);
        store.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_purchase_is_rejected() {
        let (fake, store) = setup(&["P1", "P2"]);
        let store = Arc::new(store);
        let gate = fake.hold_purchases();
        let mut state_rx = store.subscribe_purchase_state();

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.purchase(&product("P1")).await })
        };
        state_rx
            .wait_for(|s| s.is_in_progress())
            .await
            .unwrap();

        let second = store.purchase(&product("P2")).await;

        assert_eq!(second, Err(PurchaseError::InProgress));
        assert!(store.purchased_products().is_empty());
        assert_eq!(store.purchase_state(), PurchaseState::InProgress);

        gate.release();
        let (tx, state) = first.await.unwrap().unwrap();
        assert_eq!(state, PurchaseState::Complete);
        assert_eq!(tx.unwrap().product_id.as_str(), "P1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_purchase_does_not_lock_out_later_ones() {
        let (fake, store) = setup(&["P1"]);
        let store = Arc::new(store);
        let _gate = fake.hold_purchases();
        let mut state_rx = store.subscribe_purchase_state();

        let stuck = {
            let store = store.clone();
            tokio::spawn(async move { store.purchase(&product("P1")).await })
        };
        state_rx
            .wait_for(|s| s.is_in_progress())
            .await
            .unwrap();
        stuck.abort();
        let _ = stuck.await;

        assert_eq!(store.purchase_state(), PurchaseState::Unknown);

        fake.open_purchases();
        let (_, state) = store.purchase(&product("P1")).await.unwrap();
        assert_eq!(state, PurchaseState::Complete);
    }

    #[tokio::test]
    async fn refresh_entitlements_skips_bad_transactions() {
        let (fake, store) = setup(&["good", "bad"]);
        store.fetch_catalog(&ids(&["good", "bad"])).await;
        let good = fake.make_transaction(&product("good")).unwrap();
        let bad = fake.make_transaction(&product("bad")).unwrap();
        fake.set_latest(VerificationResult::verified(good.clone()));
        fake.set_latest(tampered(bad));

        let owned = store.refresh_entitlements().await;

        assert_eq!(owned.iter().collect::<Vec<_>>(), vec![&good.product_id]);
        store.shutdown().await;
    }
}
