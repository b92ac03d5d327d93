//! Component sets and archetype tables.
//!
//! An [`Archetype`] stores all entities that share the exact same set of
//! component types. Data is laid out column-per-component, with a parallel
//! entity-id vector mapping each row back to its entity. The archetype's
//! identity is the canonical hash of its sorted component ids, so two sets
//! holding the same ids always name the same archetype.

use crate::column::ComponentArray;
use crate::component::{ComponentBundle, ComponentId, ComponentMeta};
use crate::entity::EntityId;
use crate::EcsError;

use const_fnv1a_hash::fnv1a_hash_64;
use std::fmt;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype: the canonical 64-bit hash of its sorted
/// component-id sequence.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u64);

impl ArchetypeId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({:#018x})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// A sorted, deduplicated sequence of [`ComponentMeta`]s.
///
/// Union and difference run as linear merges, and the canonical id hashes
/// only the ordered id sequence, so layout never affects identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentSet {
    /// Metas sorted strictly ascending by id, no duplicates.
    metas: Vec<ComponentMeta>,
}

impl ComponentSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self { metas: Vec::new() }
    }

    /// Build a set from any meta sequence; duplicates collapse.
    pub fn from_metas(metas: impl IntoIterator<Item = ComponentMeta>) -> Self {
        let mut set = Self::new();
        for meta in metas {
            set.insert(meta);
        }
        set
    }

    /// Insert a meta at its sorted position. If the id is already present the
    /// existing meta is kept.
    pub fn insert(&mut self, meta: ComponentMeta) {
        match self
            .metas
            .binary_search_by_key(&meta.id(), |existing| existing.id())
        {
            Ok(_) => {}
            Err(idx) => self.metas.insert(idx, meta),
        }
    }

    /// Whether the set contains the given component id.
    pub fn contains(&self, id: ComponentId) -> bool {
        self.metas
            .binary_search_by_key(&id, |meta| meta.id())
            .is_ok()
    }

    /// Number of component types in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    /// Whether the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    /// The metas in ascending id order.
    #[inline]
    pub fn metas(&self) -> &[ComponentMeta] {
        &self.metas
    }

    /// The component ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.metas.iter().map(ComponentMeta::id)
    }

    /// Linear merge of both sets. On an id present in both, the meta from
    /// `self` wins.
    pub fn union(&self, other: &Self) -> Self {
        let mut merged = Vec::with_capacity(self.metas.len() + other.metas.len());
        let mut left = self.metas.iter().peekable();
        let mut right = other.metas.iter().peekable();
        loop {
            match (left.peek(), right.peek()) {
                (Some(l), Some(r)) => {
                    if l.id() < r.id() {
                        merged.push(*left.next().unwrap());
                    } else if r.id() < l.id() {
                        merged.push(*right.next().unwrap());
                    } else {
                        merged.push(*left.next().unwrap());
                        right.next();
                    }
                }
                (Some(_), None) => merged.push(*left.next().unwrap()),
                (None, Some(_)) => merged.push(*right.next().unwrap()),
                (None, None) => break,
            }
        }
        Self { metas: merged }
    }

    /// Linear merge keeping the metas of `self` whose id is absent from
    /// `other`.
    pub fn difference(&self, other: &Self) -> Self {
        let mut kept = Vec::with_capacity(self.metas.len());
        let mut right = other.metas.iter().peekable();
        for meta in &self.metas {
            while right.peek().is_some_and(|r| r.id() < meta.id()) {
                right.next();
            }
            if right.peek().is_some_and(|r| r.id() == meta.id()) {
                continue;
            }
            kept.push(*meta);
        }
        Self { metas: kept }
    }

    /// The canonical 64-bit archetype id: a hash over the ordered id
    /// sequence. Equal sets always hash equally; layout is irrelevant.
    pub fn canonical_id(&self) -> ArchetypeId {
        let mut bytes = Vec::with_capacity(self.metas.len() * 8);
        for meta in &self.metas {
            bytes.extend_from_slice(&meta.id().to_raw().to_le_bytes());
        }
        ArchetypeId(fnv1a_hash_64(&bytes, None))
    }
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// A storage table: one [`ComponentArray`] per component type in the set,
/// parallel to a row-aligned entity-id vector.
///
/// Invariant: after every operation, each column's length equals
/// `entities.len()`.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    set: ComponentSet,
    /// Columns parallel to `set.metas()`.
    columns: Vec<ComponentArray>,
    entities: Vec<EntityId>,
}

impl Archetype {
    /// Build an empty table with one column per meta, in set order.
    pub fn from_component_set(set: ComponentSet) -> Self {
        let id = set.canonical_id();
        let columns = set
            .metas()
            .iter()
            .map(|meta| ComponentArray::new(*meta))
            .collect();
        Self {
            id,
            set,
            columns,
            entities: Vec::new(),
        }
    }

    /// The archetype's canonical id.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The component set defining this archetype.
    #[inline]
    pub fn component_set(&self) -> &ComponentSet {
        &self.set
    }

    /// The entity ids stored in this archetype, by row.
    #[inline]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// The columns, parallel to the component set.
    #[inline]
    pub fn columns(&self) -> &[ComponentArray] {
        &self.columns
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether every id in `required` has a column here.
    pub fn has_components(&self, required: &[ComponentId]) -> bool {
        required.iter().all(|id| self.set.contains(*id))
    }

    /// Whether at least one id in `forbidden` has a column here.
    pub fn has_any(&self, forbidden: &[ComponentId]) -> bool {
        forbidden.iter().any(|id| self.set.contains(*id))
    }

    /// Index of the column storing `id`. A linear scan; archetypes hold few
    /// columns.
    pub fn column_index(&self, id: ComponentId) -> Option<usize> {
        self.set.metas().iter().position(|meta| meta.id() == id)
    }

    /// The column storing `id`, if present.
    pub fn column(&self, id: ComponentId) -> Option<&ComponentArray> {
        self.column_index(id).map(|idx| &self.columns[idx])
    }

    /// Mutable access to the column storing `id`, if present.
    pub fn column_mut(&mut self, id: ComponentId) -> Option<&mut ComponentArray> {
        self.column_index(id).map(|idx| &mut self.columns[idx])
    }

    /// Append a full row for `entity`.
    ///
    /// The bundle's id set must equal this archetype's component set exactly.
    ///
    /// # Returns
    ///
    /// The new row index.
    ///
    /// # Errors
    ///
    /// [`EcsError::TypeMismatch`] if a payload length disagrees with its
    /// column; the partially written row is rolled back first.
    ///
    /// # Panics
    ///
    /// If the bundle's component ids do not match the archetype's set.
    pub fn add_entity(
        &mut self,
        entity: EntityId,
        components: &ComponentBundle,
    ) -> Result<usize, EcsError> {
        assert!(
            components.len() == self.columns.len()
                && components
                    .component_ids()
                    .zip(self.set.ids())
                    .all(|(bundle_id, set_id)| bundle_id == set_id),
            "component bundle does not match the archetype's component set"
        );

        let row = self.entities.len();
        for (idx, entry) in components.entries().iter().enumerate() {
            if let Err(err) = self.columns[idx].append(&entry.bytes) {
                for column in &mut self.columns[..idx] {
                    let last = column.len() - 1;
                    let _ = column.swap_remove(last);
                }
                return Err(err);
            }
        }
        self.entities.push(entity);
        Ok(row)
    }

    /// Copy the bytes of `src_row` into `target` for every column whose id
    /// also exists there, and append the source entity's id to the target's
    /// entity vector. Columns that exist only in the target are left for the
    /// caller to fill.
    ///
    /// # Returns
    ///
    /// The target row index.
    ///
    /// # Errors
    ///
    /// [`EcsError::IndexOutOfBounds`] if `src_row` is out of bounds. A
    /// failure mid-copy leaves a partial row in `target`; use
    /// [`discard_tail_row`](Self::discard_tail_row) to roll it back.
    pub fn copy_row_to(&self, src_row: usize, target: &mut Archetype) -> Result<usize, EcsError> {
        if src_row >= self.entities.len() {
            return Err(EcsError::IndexOutOfBounds {
                index: src_row,
                len: self.entities.len(),
            });
        }
        let dst_row = target.entities.len();
        for (meta, column) in self.set.metas().iter().zip(&self.columns) {
            if let Some(target_column) = target.column_mut(meta.id()) {
                target_column.append(column.get(src_row).unwrap_or(&[]))?;
            }
        }
        target.entities.push(self.entities[src_row]);
        Ok(dst_row)
    }

    /// Swap-remove `row` from the entity vector and every column.
    ///
    /// # Returns
    ///
    /// The entity that now occupies `row` (the previous last entity), or
    /// [`None`] if the removed row was the last one. The owner must update
    /// that entity's location record.
    ///
    /// # Errors
    ///
    /// [`EcsError::IndexOutOfBounds`] if `row` is out of bounds.
    pub fn remove_row_by_swap(&mut self, row: usize) -> Result<Option<EntityId>, EcsError> {
        if row >= self.entities.len() {
            return Err(EcsError::IndexOutOfBounds {
                index: row,
                len: self.entities.len(),
            });
        }
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        for column in &mut self.columns {
            column.swap_remove(row)?;
        }
        Ok(if row < last {
            Some(self.entities[row])
        } else {
            None
        })
    }

    /// Discard a partially appended row: drop the trailing entity id if it is
    /// `entity` and trim any column rows beyond the entity vector.
    pub(crate) fn discard_tail_row(&mut self, entity: EntityId) {
        if self.entities.last() == Some(&entity) {
            self.entities.pop();
        }
        let expected = self.entities.len();
        for column in &mut self.columns {
            while column.len() > expected {
                let last = column.len() - 1;
                let _ = column.swap_remove(last);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
