//! Purchase store: catalog, ownership and purchase-state reconciliation.
//!
//! ```text
//! platform store ──updates──▶ TransactionListener ──┐
//!      ▲                                            ├──▶ StoreState ──▶ watch receivers
//!      └── purchase / latest / finish ── PurchaseStore ─┘          └──▶ StoreEvent bus
//! ```
//!
//! `StoreState` holds the catalog, the owned products and the purchase state.
//!
//! Verification is the platform's job; this crate trusts the
//! verified/unverified tag it is handed and only decides what the user owns.

pub mod config;
pub mod error;
pub mod listener;
pub mod state;
pub mod store;
pub mod verification;

pub use config::StoreConfig;
pub use error::{ConfigError, PurchaseError, VerificationError};
pub use listener::{ListenerHandle, TransactionListener};
pub use state::{OwnedProducts, OwnershipChange, StoreState};
pub use store::{PurchaseResult, PurchaseStore};
pub use verification::{VerificationStatus, check_verified, into_verified};
