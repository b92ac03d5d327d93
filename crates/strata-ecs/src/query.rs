//! Query evaluation: archetype matching, entity iteration, and grouping.
//!
//! A [`QueryResult`] is the list of archetype ids matching a required /
//! forbidden component predicate, paired with a borrow of the database.
//! Iteration walks the matched archetypes in match order and yields
//! [`Entity`] handles row by row. Archetype ids that no longer resolve
//! (pruned since the query was built) are skipped silently.
//!
//! [`GroupByResult`] partitions archetypes by a trait key carried in
//! component metadata; groups always iterate in strictly ascending key
//! order regardless of insertion order.

use crate::archetype::{Archetype, ArchetypeId};
use crate::component::{ComponentId, TraitKind};
use crate::database::Database;
use crate::entity::{Entity, EntityLocation};

// ---------------------------------------------------------------------------
// QueryResult
// ---------------------------------------------------------------------------

/// The archetypes matching a query, in database insertion order.
#[derive(Debug)]
pub struct QueryResult<'a> {
    db: &'a Database,
    archetype_ids: Vec<ArchetypeId>,
}

impl<'a> QueryResult<'a> {
    pub(crate) fn new(db: &'a Database, archetype_ids: Vec<ArchetypeId>) -> Self {
        Self { db, archetype_ids }
    }

    /// The matched archetype ids.
    pub fn archetype_ids(&self) -> &[ArchetypeId] {
        &self.archetype_ids
    }

    /// Total number of entities across the matched archetypes.
    pub fn count(&self) -> usize {
        self.archetype_ids
            .iter()
            .filter_map(|id| self.db.archetype(*id))
            .map(Archetype::len)
            .sum()
    }

    /// Whether the query matched no entities.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The first entity yielded by iteration, if any.
    pub fn first(&self) -> Option<Entity<'a>> {
        self.iter().next()
    }

    /// Iterate every matched entity.
    pub fn iter(&self) -> EntityIter<'a> {
        EntityIter::new(self.db, self.archetype_ids.clone())
    }

    /// Group the matched archetypes by the given trait id.
    pub fn group_by(&self, trait_id: ComponentId) -> GroupByResult<'a> {
        GroupByResult::from_trait_type(self.db, self.archetype_ids.iter().copied(), trait_id)
    }
}

impl<'q, 'a> IntoIterator for &'q QueryResult<'a> {
    type Item = Entity<'a>;
    type IntoIter = EntityIter<'a>;

    fn into_iter(self) -> EntityIter<'a> {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// EntityIter
// ---------------------------------------------------------------------------

/// Iterator over the entities of a list of archetypes, walking
/// (archetype, row) pairs in order.
pub struct EntityIter<'a> {
    db: &'a Database,
    archetype_ids: Vec<ArchetypeId>,
    archetype_cursor: usize,
    row_cursor: usize,
}

impl<'a> EntityIter<'a> {
    pub(crate) fn new(db: &'a Database, archetype_ids: Vec<ArchetypeId>) -> Self {
        Self {
            db,
            archetype_ids,
            archetype_cursor: 0,
            row_cursor: 0,
        }
    }
}

impl<'a> Iterator for EntityIter<'a> {
    type Item = Entity<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let archetype_id = *self.archetype_ids.get(self.archetype_cursor)?;
            // Skip archetypes pruned since the id list was built.
            let Some(archetype) = self.db.archetype(archetype_id) else {
                self.archetype_cursor += 1;
                self.row_cursor = 0;
                continue;
            };
            if self.row_cursor < archetype.len() {
                let row = self.row_cursor;
                self.row_cursor += 1;
                let id = archetype.entities()[row];
                return Some(Entity::new(
                    self.db,
                    id,
                    EntityLocation { archetype_id, row },
                ));
            }
            self.archetype_cursor += 1;
            self.row_cursor = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// GroupByResult
// ---------------------------------------------------------------------------

/// Archetypes partitioned by the group key of a trait occurrence.
///
/// Built with a sorted-vector insert, so iteration is strictly ascending by
/// key no matter the order archetypes were encountered in.
#[derive(Debug)]
pub struct GroupByResult<'a> {
    db: &'a Database,
    groups: Vec<GroupEntry>,
}

#[derive(Debug)]
struct GroupEntry {
    key: i32,
    archetype_ids: Vec<ArchetypeId>,
}

impl<'a> GroupByResult<'a> {
    /// Partition `archetype_ids` by the grouped occurrences of `trait_id`.
    /// Archetypes without a grouped occurrence of the trait are left out.
    pub(crate) fn from_trait_type(
        db: &'a Database,
        archetype_ids: impl Iterator<Item = ArchetypeId>,
        trait_id: ComponentId,
    ) -> Self {
        let mut groups: Vec<GroupEntry> = Vec::new();
        for archetype_id in archetype_ids {
            let Some(archetype) = db.archetype(archetype_id) else {
                continue;
            };
            let Some(key) = grouped_key(archetype, trait_id) else {
                continue;
            };
            match groups.binary_search_by_key(&key, |group| group.key) {
                Ok(idx) => groups[idx].archetype_ids.push(archetype_id),
                Err(idx) => groups.insert(
                    idx,
                    GroupEntry {
                        key,
                        archetype_ids: vec![archetype_id],
                    },
                ),
            }
        }
        Self { db, groups }
    }

    /// Number of distinct group keys.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no archetype carried the trait.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The group keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.groups.iter().map(|group| group.key)
    }

    /// Look up the group with the given key.
    pub fn get(&self, key: i32) -> Option<Group<'_>> {
        let idx = self
            .groups
            .binary_search_by_key(&key, |group| group.key)
            .ok()?;
        Some(self.group_at(idx))
    }

    /// Iterate the groups in strictly ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = Group<'_>> + '_ {
        (0..self.groups.len()).map(|idx| self.group_at(idx))
    }

    fn group_at(&self, idx: usize) -> Group<'_> {
        let entry = &self.groups[idx];
        Group {
            db: self.db,
            key: entry.key,
            archetype_ids: &entry.archetype_ids,
        }
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// One group of archetypes sharing a trait key.
#[derive(Clone, Copy, Debug)]
pub struct Group<'a> {
    db: &'a Database,
    key: i32,
    archetype_ids: &'a [ArchetypeId],
}

impl<'a> Group<'a> {
    /// The group's key.
    #[inline]
    pub fn key(&self) -> i32 {
        self.key
    }

    /// Number of entities across the group's archetypes.
    pub fn count(&self) -> usize {
        self.archetype_ids
            .iter()
            .filter_map(|id| self.db.archetype(*id))
            .map(Archetype::len)
            .sum()
    }

    /// Iterate every entity in the group.
    pub fn iter(&self) -> EntityIter<'a> {
        EntityIter::new(self.db, self.archetype_ids.to_vec())
    }

    /// A sub-query restricted to this group's archetypes.
    pub fn query(&self, required: &[ComponentId]) -> QueryResult<'a> {
        let matched = self
            .archetype_ids
            .iter()
            .copied()
            .filter(|id| {
                self.db
                    .archetype(*id)
                    .is_some_and(|archetype| archetype.has_components(required))
            })
            .collect();
        QueryResult::new(self.db, matched)
    }
}

/// The group key of the first grouped occurrence of `trait_id` in the
/// archetype's set, if any.
fn grouped_key(archetype: &Archetype, trait_id: ComponentId) -> Option<i32> {
    archetype
        .component_set()
        .metas()
        .iter()
        .find_map(|meta| match meta.component_trait() {
            Some(component_trait) if component_trait.id() == trait_id => {
                match component_trait.kind() {
                    TraitKind::Grouped { key } => Some(key),
                    TraitKind::Marker => None,
                }
            }
            _ => None,
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::component::{Component, ComponentBundle, ComponentId, ComponentTrait};
    use crate::component_ids;
    use crate::database::Database;
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
    struct Pos {
        x: f32,
        y: f32,
    }

    impl Component for Pos {}

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    impl Component for Vel {}

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
    struct Frozen;

    impl Component for Frozen {}

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
    struct Circle {
        radius: f32,
    }

    impl Component for Circle {
        const TRAIT: Option<ComponentTrait> = Some(ComponentTrait::grouped("Shape", 2));
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
    struct Square {
        side: f32,
    }

    impl Component for Square {
        const TRAIT: Option<ComponentTrait> = Some(ComponentTrait::grouped("Shape", 1));
    }

    fn shape_trait() -> ComponentId {
        ComponentId::of_name("Shape")
    }

    fn spawn<C: Component>(db: &mut Database, component: C) -> crate::entity::EntityId {
        let mut bundle = ComponentBundle::new();
        bundle.add(component);
        db.create_entity(bundle).unwrap()
    }

    fn spawn2<A: Component, B: Component>(
        db: &mut Database,
        a: A,
        b: B,
    ) -> crate::entity::EntityId {
        let mut bundle = ComponentBundle::new();
        bundle.add(a);
        bundle.add(b);
        db.create_entity(bundle).unwrap()
    }

    #[test]
    fn query_matches_supersets_only() {
        let mut db = Database::new();
        let moving = spawn2(&mut db, Pos { x: 0.0, y: 0.0 }, Vel { dx: 1.0, dy: 0.0 });
        let _still = spawn(&mut db, Pos { x: 5.0, y: 5.0 });

        let result = db.query(&component_ids![Pos, Vel]);
        assert_eq!(result.count(), 1);
        assert_eq!(result.first().unwrap().id(), moving);

        let result = db.query(&component_ids![Pos]);
        assert_eq!(result.count(), 2);
    }

    #[test]
    fn empty_required_set_matches_everything() {
        let mut db = Database::new();
        spawn(&mut db, Pos { x: 0.0, y: 0.0 });
        spawn(&mut db, Vel { dx: 0.0, dy: 0.0 });

        assert_eq!(db.query(&[]).count(), 2);
    }

    #[test]
    fn forbidden_components_exclude_archetypes() {
        let mut db = Database::new();
        let plain = spawn(&mut db, Pos { x: 0.0, y: 0.0 });
        let _frozen = spawn2(&mut db, Pos { x: 1.0, y: 1.0 }, Frozen);

        let result = db.query_filtered(&component_ids![Pos], &component_ids![Frozen]);
        assert_eq!(result.count(), 1);
        assert_eq!(result.first().unwrap().id(), plain);
    }

    #[test]
    fn iteration_yields_usable_handles() {
        let mut db = Database::new();
        for i in 0..4 {
            spawn(
                &mut db,
                Pos {
                    x: i as f32,
                    y: 0.0,
                },
            );
        }

        let result = db.query(&component_ids![Pos]);
        let xs: Vec<f32> = result.iter().map(|entity| entity.get::<Pos>().unwrap().x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn first_on_empty_query_is_none() {
        let db = Database::new();
        let result = db.query(&component_ids![Pos]);
        assert!(result.first().is_none());
        assert!(result.is_empty());
    }

    #[test]
    fn groups_iterate_in_ascending_key_order() {
        let mut db = Database::new();
        // Circle (key 2) archetypes are created before Square (key 1).
        spawn(&mut db, Circle { radius: 1.0 });
        spawn(&mut db, Square { side: 1.0 });
        spawn(&mut db, Circle { radius: 2.0 });

        let groups = db.group_by(shape_trait());
        let keys: Vec<i32> = groups.keys().collect();
        assert_eq!(keys, vec![1, 2]);

        assert_eq!(groups.get(1).unwrap().count(), 1);
        assert_eq!(groups.get(2).unwrap().count(), 2);
        assert!(groups.get(3).is_none());
    }

    #[test]
    fn multiple_archetypes_can_share_a_group() {
        let mut db = Database::new();
        spawn(&mut db, Circle { radius: 1.0 });
        spawn2(&mut db, Circle { radius: 2.0 }, Pos { x: 0.0, y: 0.0 });

        let groups = db.group_by(shape_trait());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.get(2).unwrap().count(), 2);
    }

    #[test]
    fn archetypes_without_the_trait_are_left_out() {
        let mut db = Database::new();
        spawn(&mut db, Pos { x: 0.0, y: 0.0 });
        spawn(&mut db, Circle { radius: 1.0 });

        let groups = db.group_by(shape_trait());
        assert_eq!(groups.len(), 1);

        // Grouping by an unknown trait matches nothing.
        let none = db.group_by(ComponentId::of_name("Unknown"));
        assert!(none.is_empty());
    }

    #[test]
    fn group_sub_query_restricts_to_group_archetypes() {
        let mut db = Database::new();
        let positioned = spawn2(&mut db, Circle { radius: 2.0 }, Pos { x: 0.0, y: 0.0 });
        spawn(&mut db, Circle { radius: 1.0 });

        let groups = db.group_by(shape_trait());
        let group = groups.get(2).unwrap();
        let with_pos = group.query(&component_ids![Pos]);
        assert_eq!(with_pos.count(), 1);
        assert_eq!(with_pos.first().unwrap().id(), positioned);
    }

    #[test]
    fn query_group_by_only_sees_matched_archetypes() {
        let mut db = Database::new();
        spawn(&mut db, Circle { radius: 1.0 });
        spawn2(&mut db, Square { side: 1.0 }, Pos { x: 0.0, y: 0.0 });

        // Restricting to Pos drops the bare Circle archetype.
        let groups = db.query(&component_ids![Pos]).group_by(shape_trait());
        let keys: Vec<i32> = groups.keys().collect();
        assert_eq!(keys, vec![1]);
    }
}
