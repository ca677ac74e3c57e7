//! Entity trait: things the store hands out with a stable identifier.

/// Anything the platform store identifies by id (products, transactions).
pub trait Entity {
    /// Strongly-typed identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the identifier assigned by the store.
    fn id(&self) -> &Self::Id;
}
