use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::id::ProductId;

/// Kind of purchasable product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// Used up once bought (e.g. fuel, coins). Never stays owned.
    Consumable,
    /// Bought once, owned forever unless revoked.
    NonConsumable,
    /// Renewing access; may be upgraded to another tier in the same group.
    Subscription,
}

impl ProductKind {
    pub fn is_subscription(&self) -> bool {
        matches!(self, ProductKind::Subscription)
    }
}

/// Catalog entry as returned by the platform store.
///
/// Immutable once fetched; the price is the store's localized display string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub display_name: String,
    pub description: String,
    pub display_price: String,
    pub kind: ProductKind,
}

impl Product {
    pub fn new(
        id: ProductId,
        display_name: impl Into<String>,
        description: impl Into<String>,
        display_price: impl Into<String>,
        kind: ProductKind,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            description: description.into(),
            display_price: display_price.into(),
            kind,
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
