//! The [`Database`]: owner of all archetypes, the entity index, and the
//! structural-mutation protocol.
//!
//! Entities are stored one row per entity in the archetype matching their
//! exact component set. Adding or removing components moves the row: the
//! shared columns are copied into the target archetype, the new columns are
//! filled, and the source row is swap-removed with the displaced entity's
//! location fixed up. Archetypes left empty by a completed mutation are
//! pruned.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::archetype::{Archetype, ArchetypeId, ComponentSet};
use crate::component::{Component, ComponentBundle, ComponentId};
use crate::entity::{Entity, EntityId, EntityLocation};
use crate::query::{GroupByResult, QueryResult};
use crate::resources::Resources;
use crate::EcsError;

/// The top-level storage container.
///
/// Owns every archetype, the entity-location index, and a sibling
/// [`Resources`] registry. All access is single-threaded; handles and query
/// results borrow the database, so structural mutation while they are alive
/// is rejected at compile time.
#[derive(Default)]
pub struct Database {
    /// Archetypes in creation order; queries enumerate them in this order.
    archetypes: Vec<Archetype>,
    /// Archetype id -> index into `archetypes`.
    archetype_index: HashMap<ArchetypeId, usize>,
    /// Entity id -> authoritative location.
    entities: HashMap<EntityId, EntityLocation>,
    next_entity_id: u64,
    resources: Resources,
}

impl Database {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Hand out a fresh entity id without creating any storage. Used by
    /// transactions so callers receive a valid id synchronously.
    pub fn reserve_entity_id(&mut self) -> EntityId {
        let id = EntityId::from_raw(self.next_entity_id);
        self.next_entity_id += 1;
        id
    }

    /// Create an entity holding the bundle's components.
    ///
    /// # Errors
    ///
    /// [`EcsError::TypeMismatch`] if a raw payload length disagrees with its
    /// component's size.
    pub fn create_entity(&mut self, components: ComponentBundle) -> Result<EntityId, EcsError> {
        let id = self.reserve_entity_id();
        self.create_entity_with_id(id, components)?;
        Ok(id)
    }

    /// Create an entity under a pre-reserved id.
    ///
    /// # Errors
    ///
    /// Same as [`create_entity`](Self::create_entity). Reusing a live id is a
    /// caller bug and is caught by a debug assertion.
    pub fn create_entity_with_id(
        &mut self,
        id: EntityId,
        components: ComponentBundle,
    ) -> Result<(), EcsError> {
        debug_assert!(
            !self.entities.contains_key(&id),
            "entity id {id} is already live"
        );
        let set = components.component_set();
        let archetype_id = set.canonical_id();
        let idx = self.get_or_create_archetype(set);
        let row = match self.archetypes[idx].add_entity(id, &components) {
            Ok(row) => row,
            Err(err) => {
                self.prune_if_empty(archetype_id);
                return Err(err);
            }
        };
        self.entities
            .insert(id, EntityLocation { archetype_id, row });
        trace!(entity = %id, archetype = ?archetype_id, row, "created entity");
        Ok(())
    }

    /// Look up an entity, returning a read handle if it is live.
    pub fn get_entity(&self, id: EntityId) -> Option<Entity<'_>> {
        let location = *self.entities.get(&id)?;
        Some(Entity::new(self, id, location))
    }

    /// Remove an entity and all its components.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] if the id is not live.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<(), EcsError> {
        let location = *self
            .entities
            .get(&id)
            .ok_or(EcsError::EntityNotFound(id))?;
        let idx = self.archetype_position(location.archetype_id)?;
        let moved = self.archetypes[idx].remove_row_by_swap(location.row)?;
        if let Some(moved_entity) = moved {
            if let Some(moved_location) = self.entities.get_mut(&moved_entity) {
                moved_location.row = location.row;
            }
        }
        self.entities.remove(&id);
        self.prune_if_empty(location.archetype_id);
        trace!(entity = %id, "removed entity");
        Ok(())
    }

    // -- structural mutation ------------------------------------------------

    /// Add the bundle's components to an entity. Components the entity
    /// already has are overwritten in place; new components move the entity
    /// to the archetype of the union set. An empty bundle is a no-op.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] if the id is not live;
    /// [`EcsError::TypeMismatch`] on a raw payload length disagreement (the
    /// entity is left in its source archetype).
    pub fn add_components(
        &mut self,
        id: EntityId,
        components: ComponentBundle,
    ) -> Result<(), EcsError> {
        let location = *self
            .entities
            .get(&id)
            .ok_or(EcsError::EntityNotFound(id))?;
        let source_idx = self.archetype_position(location.archetype_id)?;
        let source_set = self.archetypes[source_idx].component_set().clone();
        let target_set = source_set.union(&components.component_set());
        let target_id = target_set.canonical_id();

        if target_id == location.archetype_id {
            // Every input id already has a column; overwrite the row in place.
            let archetype = &mut self.archetypes[source_idx];
            for entry in components.entries() {
                let column = archetype
                    .column_mut(entry.meta.id())
                    .expect("source archetype must contain every input component");
                column.set(location.row, &entry.bytes)?;
            }
            return Ok(());
        }

        let target_idx = self.get_or_create_archetype(target_set);
        self.move_entity_row(
            id,
            location,
            source_idx,
            target_idx,
            target_id,
            |source, target, row| {
                for entry in components.entries() {
                    let column = target
                        .column_mut(entry.meta.id())
                        .expect("target archetype must contain every input component");
                    if source.component_set().contains(entry.meta.id()) {
                        // The copy carried the old value; replace it.
                        column.set(row, &entry.bytes)?;
                    } else {
                        column.append(&entry.bytes)?;
                    }
                }
                Ok(())
            },
        )
    }

    /// Remove the listed component types from an entity. Ids the entity does
    /// not have are ignored; if none of them are present the call is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] if the id is not live;
    /// [`EcsError::CannotRemoveAllComponents`] if the removal would leave the
    /// entity with no components.
    pub fn remove_components(
        &mut self,
        id: EntityId,
        component_ids: &[ComponentId],
    ) -> Result<(), EcsError> {
        let location = *self
            .entities
            .get(&id)
            .ok_or(EcsError::EntityNotFound(id))?;
        let source_idx = self.archetype_position(location.archetype_id)?;
        let source_set = self.archetypes[source_idx].component_set().clone();
        let removal = ComponentSet::from_metas(
            source_set
                .metas()
                .iter()
                .copied()
                .filter(|meta| component_ids.contains(&meta.id())),
        );
        let target_set = source_set.difference(&removal);
        if target_set.is_empty() {
            return Err(EcsError::CannotRemoveAllComponents);
        }
        let target_id = target_set.canonical_id();
        if target_id == location.archetype_id {
            // The entity had none of the requested components.
            return Ok(());
        }

        let target_idx = self.get_or_create_archetype(target_set);
        // Only shared columns are copied; the removed components simply have
        // no destination column.
        self.move_entity_row(id, location, source_idx, target_idx, target_id, |_, _, _| {
            Ok(())
        })
    }

    /// Steps (b)-(f) of a structural move: copy the shared columns of the
    /// source row into the target archetype, run `fill` to complete the new
    /// row, then swap-remove the source row and fix the bookkeeping. On a
    /// failure before the source row is removed, the source stays
    /// authoritative and the orphan target row is taken back.
    fn move_entity_row(
        &mut self,
        id: EntityId,
        location: EntityLocation,
        source_idx: usize,
        target_idx: usize,
        target_id: ArchetypeId,
        fill: impl FnOnce(&Archetype, &mut Archetype, usize) -> Result<(), EcsError>,
    ) -> Result<(), EcsError> {
        let (source, target) = Self::pair_mut(&mut self.archetypes, source_idx, target_idx);

        let outcome = source.copy_row_to(location.row, target).and_then(|row| {
            fill(&*source, target, row)?;
            source
                .remove_row_by_swap(location.row)
                .map(|moved| (row, moved))
        });

        let (new_row, moved) = match outcome {
            Ok(pair) => pair,
            Err(err) => {
                target.discard_tail_row(id);
                self.prune_if_empty(target_id);
                return Err(err);
            }
        };

        if let Some(moved_entity) = moved {
            if let Some(moved_location) = self.entities.get_mut(&moved_entity) {
                moved_location.row = location.row;
            }
        }
        self.prune_if_empty(location.archetype_id);
        self.entities.insert(
            id,
            EntityLocation {
                archetype_id: target_id,
                row: new_row,
            },
        );
        trace!(
            entity = %id,
            from = ?location.archetype_id,
            to = ?target_id,
            row = new_row,
            "moved entity between archetypes"
        );
        Ok(())
    }

    fn pair_mut(
        archetypes: &mut [Archetype],
        a: usize,
        b: usize,
    ) -> (&mut Archetype, &mut Archetype) {
        debug_assert_ne!(a, b);
        if a < b {
            let (left, right) = archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    // -- archetype management -----------------------------------------------

    /// Find or create the archetype storing exactly `set`.
    fn get_or_create_archetype(&mut self, set: ComponentSet) -> usize {
        let id = set.canonical_id();
        if let Some(&idx) = self.archetype_index.get(&id) {
            return idx;
        }
        let idx = self.archetypes.len();
        debug!(archetype = ?id, components = set.len(), "created archetype");
        self.archetypes.push(Archetype::from_component_set(set));
        self.archetype_index.insert(id, idx);
        idx
    }

    /// Drop the archetype if it has no rows left.
    fn prune_if_empty(&mut self, id: ArchetypeId) {
        let Some(&idx) = self.archetype_index.get(&id) else {
            return;
        };
        if !self.archetypes[idx].is_empty() {
            return;
        }
        debug_assert!(
            self.archetypes[idx]
                .columns()
                .iter()
                .all(|column| column.is_empty()),
            "pruning an archetype with non-empty columns"
        );
        // Positional removal keeps the remaining archetypes in creation order.
        self.archetypes.remove(idx);
        self.archetype_index.remove(&id);
        for position in self.archetype_index.values_mut() {
            if *position > idx {
                *position -= 1;
            }
        }
        debug!(archetype = ?id, "pruned empty archetype");
    }

    /// Resolve a location's archetype; a miss means the entity index and the
    /// archetype map disagree.
    fn archetype_position(&self, id: ArchetypeId) -> Result<usize, EcsError> {
        match self.archetype_index.get(&id) {
            Some(&idx) => Ok(idx),
            None => {
                debug_assert!(false, "entity location refers to a missing archetype");
                Err(EcsError::ArchetypeNotFound(id))
            }
        }
    }

    /// The archetype with the given id, if present.
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetype_index
            .get(&id)
            .map(|&idx| &self.archetypes[idx])
    }

    /// All archetypes in creation order.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Number of archetypes currently stored.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // -- queries ------------------------------------------------------------

    /// Select every archetype containing all of `required`.
    pub fn query(&self, required: &[ComponentId]) -> QueryResult<'_> {
        self.query_filtered(required, &[])
    }

    /// Select every archetype containing all of `required` and none of
    /// `forbidden`.
    pub fn query_filtered(
        &self,
        required: &[ComponentId],
        forbidden: &[ComponentId],
    ) -> QueryResult<'_> {
        let matched = self
            .archetypes
            .iter()
            .filter(|archetype| {
                archetype.has_components(required) && !archetype.has_any(forbidden)
            })
            .map(Archetype::id)
            .collect();
        QueryResult::new(self, matched)
    }

    /// Group all archetypes by the given trait id. Archetypes whose set
    /// carries a grouped occurrence of the trait are assigned to that
    /// occurrence's key; groups iterate in ascending key order.
    pub fn group_by(&self, trait_id: ComponentId) -> GroupByResult<'_> {
        GroupByResult::from_trait_type(self, self.archetypes.iter().map(Archetype::id), trait_id)
    }

    // -- typed conveniences -------------------------------------------------

    /// Read a component directly by entity id.
    pub fn get_component<C: Component>(&self, id: EntityId) -> Option<&C> {
        self.get_entity(id)?.get::<C>()
    }

    /// Mutate a component directly by entity id. Zero-sized components have
    /// no payload to mutate and return [`None`].
    pub fn get_component_mut<C: Component>(&mut self, id: EntityId) -> Option<&mut C> {
        let location = *self.entities.get(&id)?;
        let idx = *self.archetype_index.get(&location.archetype_id)?;
        let column = self.archetypes[idx].column_mut(C::component_id())?;
        column.get_mut(location.row).map(bytemuck::from_bytes_mut)
    }

    /// Whether the entity is live and has a component of type `C`.
    pub fn has_component<C: Component>(&self, id: EntityId) -> bool {
        self.get_entity(id)
            .is_some_and(|entity| entity.has::<C>())
    }

    /// Add or overwrite a single component.
    ///
    /// # Errors
    ///
    /// Same as [`add_components`](Self::add_components).
    pub fn add_component<C: Component>(
        &mut self,
        id: EntityId,
        component: C,
    ) -> Result<(), EcsError> {
        let mut bundle = ComponentBundle::new();
        bundle.add(component);
        self.add_components(id, bundle)
    }

    /// Remove a single component type.
    ///
    /// # Errors
    ///
    /// Same as [`remove_components`](Self::remove_components).
    pub fn remove_component<C: Component>(&mut self, id: EntityId) -> Result<(), EcsError> {
        self.remove_components(id, &[C::component_id()])
    }

    // -- resources ----------------------------------------------------------

    /// The sibling resource registry.
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Mutable access to the sibling resource registry.
    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("entity_count", &self.entities.len())
            .field("archetype_count", &self.archetypes.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
