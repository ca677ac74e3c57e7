//! Store events and their distribution.
//!
//! The purchase store records what happened (catalog loaded, entitlement
//! granted/revoked, transaction rejected, ...) as [`StoreEvent`]s and fans them
//! out over an [`EventBus`] to whoever presents or audits them.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::{Event, StoreEvent, StoreEventEnvelope};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
