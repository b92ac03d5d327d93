//! Entity identifiers, locations, and read handles.

use crate::archetype::ArchetypeId;
use crate::component::Component;
use crate::database::Database;

use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Monotonic entity identifier, starting at zero. Ids are never reused
/// within a database's lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityLocation
// ---------------------------------------------------------------------------

/// Where an entity lives: which archetype and which row within it.
///
/// The database's entity index maps each id to one of these; the record is
/// authoritative and changes only through swap-removes and structural moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// The archetype holding the entity's row.
    pub archetype_id: ArchetypeId,
    /// The row index within that archetype.
    pub row: usize,
}

// ---------------------------------------------------------------------------
// Entity handle
// ---------------------------------------------------------------------------

/// A short-lived read handle to one entity's row.
///
/// The handle borrows the [`Database`], so it cannot outlive a structural
/// mutation: every mutating operation takes `&mut Database`, which the
/// borrow checker rejects while any handle is alive. Retrieve handles just
/// before use rather than storing them.
#[derive(Clone, Copy)]
pub struct Entity<'a> {
    db: &'a Database,
    id: EntityId,
    location: EntityLocation,
}

impl<'a> Entity<'a> {
    pub(crate) fn new(db: &'a Database, id: EntityId, location: EntityLocation) -> Self {
        Self { db, id, location }
    }

    /// The entity's id.
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The id of the archetype holding this entity.
    #[inline]
    pub fn archetype_id(&self) -> ArchetypeId {
        self.location.archetype_id
    }

    /// The entity's row within its archetype.
    #[inline]
    pub fn row(&self) -> usize {
        self.location.row
    }

    /// Read the component of type `C`, or [`None`] if the entity does not
    /// have it. Zero-sized components have no addressable payload and always
    /// read as [`None`]; use [`has`](Self::has) to test for them.
    pub fn get<C: Component>(&self) -> Option<&'a C> {
        let archetype = self.db.archetype(self.location.archetype_id)?;
        let column = archetype.column(C::component_id())?;
        column.get(self.location.row).map(bytemuck::from_bytes)
    }

    /// Whether the entity has a component of type `C`.
    pub fn has<C: Component>(&self) -> bool {
        self.db
            .archetype(self.location.archetype_id)
            .is_some_and(|archetype| archetype.has_components(&[C::component_id()]))
    }

    /// Number of component types on this entity.
    pub fn component_count(&self) -> usize {
        self.db
            .archetype(self.location.archetype_id)
            .map_or(0, |archetype| archetype.component_set().len())
    }
}

impl fmt::Debug for Entity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("archetype_id", &self.location.archetype_id)
            .field("row", &self.location.row)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_round_trip() {
        let id = EntityId::from_raw(42);
        assert_eq!(id.to_raw(), 42);
        assert_eq!(EntityId::from_raw(id.to_raw()), id);
    }

    #[test]
    fn entity_id_formatting() {
        let id = EntityId::from_raw(7);
        assert_eq!(format!("{id}"), "7");
        assert_eq!(format!("{id:?}"), "EntityId(7)");
    }
}
