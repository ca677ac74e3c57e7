use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::id::{ProductId, TransactionId};
use crate::product::ProductKind;

/// A completed or historical purchase, as reported by the platform store.
///
/// Transactions are facts: they are consumed once and then acknowledged
/// ("finished") back to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub product_id: ProductId,
    pub product_kind: ProductKind,
    pub purchase_date: DateTime<Utc>,
    /// Set when the store retracted the entitlement (refund, family sharing
    /// removal, ...).
    pub revocation_date: Option<DateTime<Utc>>,
    /// Subscriptions only: the user moved to a higher tier in the same group.
    pub is_upgraded: bool,
}

impl Transaction {
    /// A fresh, non-revoked, non-upgraded transaction.
    pub fn new(
        id: TransactionId,
        product_id: ProductId,
        product_kind: ProductKind,
        purchase_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_id,
            product_kind,
            purchase_date,
            revocation_date: None,
            is_upgraded: false,
        }
    }

    pub fn revoked_at(mut self, at: DateTime<Utc>) -> Self {
        self.revocation_date = Some(at);
        self
    }

    pub fn upgraded(mut self) -> Self {
        self.is_upgraded = true;
        self
    }

    pub fn is_revoked(&self) -> bool {
        self.revocation_date.is_some()
    }

    /// Whether this transaction, on its own, grants access right now.
    pub fn grants_access(&self) -> bool {
        !self.is_revoked() && !self.is_upgraded
    }
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
