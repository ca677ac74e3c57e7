//! Background worker draining the store's transaction update stream.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use storefront_core::Transaction;
use storefront_events::StoreEvent;
use storefront_storekit::{StoreClient, TransactionUpdates, VerificationResult};

use crate::error::VerificationError;
use crate::state::StoreState;
use crate::verification::into_verified;

/// Handle to stop and join a running [`TransactionListener`].
///
/// `shutdown` consumes the handle, so the listener is cancelled at most once.
/// Dropping the handle without calling it still signals the worker to stop.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<Notify>,
    join: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Request shutdown and wait for the worker to stop.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                warn!(error = %err, "transaction listener task failed");
            }
        }
    }

    /// Whether the worker task is still running.
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.shutdown.notify_one();
        }
    }
}

/// Long-lived consumer of transactions delivered outside a foreground
/// purchase (renewals, refunds, approved "ask to buy" requests, purchases
/// made on other devices).
///
/// Per update: verify, then reconcile and finish, or log and record the
/// rejection. One bad transaction never stops the loop.
#[derive(Debug)]
pub struct TransactionListener;

impl TransactionListener {
    /// Subscribe to the client's update stream and spawn the worker on the
    /// current tokio runtime.
    ///
    /// The subscription is opened before spawning, so nothing delivered after
    /// this call returns is missed.
    pub fn spawn(client: Arc<dyn StoreClient>, state: Arc<StoreState>) -> ListenerHandle {
        let shutdown = Arc::new(Notify::new());
        let updates = client.updates();

        let join = tokio::spawn(listen(client, state, updates, shutdown.clone()));

        ListenerHandle {
            shutdown,
            join: Some(join),
        }
    }
}

async fn listen(
    client: Arc<dyn StoreClient>,
    state: Arc<StoreState>,
    mut updates: TransactionUpdates,
    shutdown: Arc<Notify>,
) {
    info!("transaction listener started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!("transaction listener received shutdown signal");
                break;
            }
            next = updates.next() => match next {
                Some(result) => {
                    // Failures are already logged and recorded.
                    let _ = handle_update(client.as_ref(), &state, result).await;
                }
                None => {
                    warn!("transaction update stream closed");
                    break;
                }
            }
        }
    }

    info!("transaction listener stopped");
}

/// Process one update: verify, reconcile, acknowledge.
pub(crate) async fn handle_update(
    client: &dyn StoreClient,
    state: &StoreState,
    result: VerificationResult,
) -> Result<Transaction, VerificationError> {
    let transaction = match into_verified(result) {
        Ok(transaction) => transaction,
        Err(err) => {
            state.reject_unverified(&err, "transaction update");
            return Err(err);
        }
    };

    state.reconcile_ownership(&transaction);
    finish_transaction(client, state, &transaction).await;

    Ok(transaction)
}

/// Acknowledge a verified transaction. A failed acknowledgement is logged;
/// the store redelivers unfinished transactions, and reconciliation is
/// idempotent.
pub(crate) async fn finish_transaction(
    client: &dyn StoreClient,
    state: &StoreState,
    transaction: &Transaction,
) {
    match client.finish(transaction).await {
        Ok(()) => state.record(StoreEvent::TransactionFinished {
            product_id: transaction.product_id.clone(),
            transaction_id: transaction.id,
        }),
        Err(err) => warn!(
            product_id = %transaction.product_id,
            transaction_id = %transaction.id,
            error = %err,
            "failed to finish transaction"
        ),
    }
}
