//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Inventory units and robots are both entities: their attributes change over time
/// but their identity never does.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
