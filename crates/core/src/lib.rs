//! Domain foundation for the storefront.
//!
//! This crate contains **pure domain** types (no store access, no async):
//! identifiers, catalog products, purchase transactions and the purchase
//! attempt lifecycle.

pub mod entity;
pub mod error;
pub mod id;
pub mod product;
pub mod purchase_state;
pub mod transaction;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ProductId, TransactionId};
pub use product::{Product, ProductKind};
pub use purchase_state::PurchaseState;
pub use transaction::Transaction;
