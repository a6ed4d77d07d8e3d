//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Implemented by child records that live inside an aggregate but keep their
/// own identity (recipe lines, ledger rows).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// First child record with the given identity.
pub fn find_entity<'a, E: Entity>(entities: &'a [E], id: &E::Id) -> Option<&'a E> {
    entities.iter().find(|e| e.id() == id)
}

pub fn find_entity_mut<'a, E: Entity>(entities: &'a mut [E], id: &E::Id) -> Option<&'a mut E> {
    entities.iter_mut().find(|e| e.id() == id)
}
