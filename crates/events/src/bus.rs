//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes [`StoreEvent`](crate::StoreEvent)s recorded by the
//! purchase store to any number of observers (presentation layer, audit log,
//! analytics).
//!
//! ## Delivery
//!
//! - **Best-effort fan-out**: every live subscription gets a copy of each message
//! - **No persistence**: events describe changes; the store's observable state
//!   is the source of truth, so a missed event never leaves an observer wrong
//!   for longer than its next state read
//! - **Ordering**: per publisher, messages arrive in publish order

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription receives its own copy of every message published after
/// it was created (broadcast semantics).
///
/// ## Usage Pattern
///
/// ```ignore
/// let subscription = store.events();
///
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(envelope) => render(envelope.payload()),
///         Err(RecvTimeoutError::Timeout) => continue,   // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // bus dropped
///     }
/// }
/// ```
///
/// Subscriptions are meant for a single consumer thread. Use
/// [`Subscription::drain`] from async code to pick up everything queued
/// without blocking.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Take every message currently queued, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// ```text
/// PurchaseStore / TransactionListener → EventBus (publish) → observers
/// ```
///
/// `publish()` can fail (e.g. poisoned lock, closed transport). Publishers
/// log the failure and carry on: events are notifications, not state.
///
/// Implementations must be `Send + Sync`; the foreground store and the
/// background listener publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
