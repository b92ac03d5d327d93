//! Strata ECS -- archetype-based entity-component storage.
//!
//! Entities are stored in archetypes, one per unique set of component types,
//! with each component laid out in its own type-erased, aligned column.
//! Component types are plain old data ([`bytemuck::Pod`]); their identity is
//! a stable hash of the type name, so no registration step is needed.
//! Structural changes (adding or removing components) move an entity's row
//! between archetypes; a [`Transaction`](transaction::Transaction) defers
//! such changes and applies them in FIFO order.
//!
//! # Quick Start
//!
//! ```
//! use strata_ecs::prelude::*;
//! use bytemuck::{Pod, Zeroable};
//!
//! #[repr(C)]
//! #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
//! struct Position { x: f32, y: f32 }
//! impl Component for Position {}
//!
//! #[repr(C)]
//! #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
//! struct Velocity { dx: f32, dy: f32 }
//! impl Component for Velocity {}
//!
//! let mut db = Database::new();
//!
//! let mut bundle = ComponentBundle::new();
//! bundle.add(Position { x: 0.0, y: 0.0 });
//! bundle.add(Velocity { dx: 1.0, dy: 0.0 });
//! let entity = db.create_entity(bundle)?;
//!
//! assert_eq!(db.get_component::<Position>(entity), Some(&Position { x: 0.0, y: 0.0 }));
//! assert_eq!(db.query(&component_ids![Position, Velocity]).count(), 1);
//! # Ok::<(), strata_ecs::EcsError>(())
//! ```

#![deny(unsafe_code)]

pub mod archetype;
#[allow(unsafe_code)]
pub mod column;
pub mod component;
pub mod database;
pub mod entity;
pub mod query;
pub mod resources;
pub mod transaction;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by storage operations.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The entity id is not live in this database.
    #[error("entity {0} does not exist")]
    EntityNotFound(entity::EntityId),

    /// An entity location referred to an archetype that is not in the
    /// database; the entity index and archetype map disagree.
    #[error("archetype {0:?} is not present in the database")]
    ArchetypeNotFound(archetype::ArchetypeId),

    /// A row index was outside a column's bounds.
    #[error("row index {index} is out of bounds for length {len}")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// The length it was checked against.
        len: usize,
    },

    /// A component payload's byte length disagreed with the column's
    /// element size.
    #[error("payload is {actual} bytes but the column stores {expected}-byte elements")]
    TypeMismatch {
        /// The column's element size.
        expected: usize,
        /// The payload length that was supplied.
        actual: usize,
    },

    /// A component removal would have left the entity with no components.
    #[error("removing the requested components would leave the entity with none")]
    CannotRemoveAllComponents,

    /// `execute` was called on a transaction that already executed.
    #[error("transaction has already been executed")]
    TransactionAlreadyExecuted,
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId, ComponentSet};
    pub use crate::component::{
        Component, ComponentBundle, ComponentId, ComponentMeta, ComponentTrait, TraitKind,
    };
    pub use crate::component_ids;
    pub use crate::database::Database;
    pub use crate::entity::{Entity, EntityId, EntityLocation};
    pub use crate::query::{EntityIter, Group, GroupByResult, QueryResult};
    pub use crate::resources::Resources;
    pub use crate::transaction::{Command, Transaction};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use bytemuck::{Pod, Zeroable};

    // -- test component types -----------------------------------------------

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {}

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    impl Component for Velocity {}

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
    struct Health {
        current: u32,
        max: u32,
    }

    impl Component for Health {}

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
    struct Frozen;

    impl Component for Frozen {}

    // -- seed scenarios -----------------------------------------------------

    #[test]
    fn create_and_read_back() {
        let mut db = Database::new();
        let mut bundle = ComponentBundle::new();
        bundle.add(Position { x: 1.0, y: 2.0 });
        bundle.add(Velocity { dx: 3.0, dy: 4.0 });
        let entity = db.create_entity(bundle).unwrap();

        assert_eq!(entity.to_raw(), 0);
        let handle = db.get_entity(entity).unwrap();
        assert_eq!(handle.get::<Position>(), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(
            handle.get::<Velocity>(),
            Some(&Velocity { dx: 3.0, dy: 4.0 })
        );
        assert_eq!(handle.component_count(), 2);
        assert_eq!(db.archetype_count(), 1);
    }

    #[test]
    fn archetype_is_order_independent() {
        let mut db = Database::new();

        let mut forward = ComponentBundle::new();
        forward.add(Position { x: 0.0, y: 0.0 });
        forward.add(Health {
            current: 10,
            max: 10,
        });
        let a = db.create_entity(forward).unwrap();

        let mut reverse = ComponentBundle::new();
        reverse.add(Health {
            current: 20,
            max: 20,
        });
        reverse.add(Position { x: 1.0, y: 1.0 });
        let b = db.create_entity(reverse).unwrap();

        assert_eq!(db.archetype_count(), 1);
        assert_eq!(
            db.get_entity(a).unwrap().archetype_id(),
            db.get_entity(b).unwrap().archetype_id()
        );
    }

    #[test]
    fn structural_add_then_remove_preserves_identity() {
        let mut db = Database::new();
        let mut bundle = ComponentBundle::new();
        bundle.add(Position { x: 1.0, y: 2.0 });
        let entity = db.create_entity(bundle).unwrap();
        let original = db.get_entity(entity).unwrap().archetype_id();

        db.add_component(
            entity,
            Health {
                current: 100,
                max: 100,
            },
        )
        .unwrap();
        assert_ne!(db.get_entity(entity).unwrap().archetype_id(), original);

        db.remove_component::<Health>(entity).unwrap();
        assert_eq!(db.get_entity(entity).unwrap().archetype_id(), original);
        assert_eq!(
            db.get_component::<Position>(entity),
            Some(&Position { x: 1.0, y: 2.0 })
        );
    }

    #[test]
    fn swap_remove_fixes_up_moved_row() {
        let mut db = Database::new();
        let mut spawn = |x: f32| {
            let mut bundle = ComponentBundle::new();
            bundle.add(Position { x, y: 0.0 });
            db.create_entity(bundle).unwrap()
        };
        let a = spawn(0.0);
        let b = spawn(1.0);
        let c = spawn(2.0);

        db.remove_entity(a).unwrap();

        // C, previously at row 2, now occupies row 0; B stays at row 1.
        assert_eq!(db.get_entity(c).unwrap().row(), 0);
        assert_eq!(db.get_entity(b).unwrap().row(), 1);
        assert_eq!(db.get_component::<Position>(c), Some(&Position { x: 2.0, y: 0.0 }));
        assert_eq!(db.get_component::<Position>(b), Some(&Position { x: 1.0, y: 0.0 }));
    }

    #[test]
    fn groups_stay_sorted_under_arbitrary_insertion() {
        // Seven component types whose group keys arrive out of order.
        macro_rules! keyed_shape {
            ($name:ident, $key:literal) => {
                #[repr(C)]
                #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
                struct $name {
                    value: f32,
                }

                impl Component for $name {
                    const TRAIT: Option<ComponentTrait> =
                        Some(ComponentTrait::grouped("Layer", $key));
                }
            };
        }

        keyed_shape!(Layer5, 5);
        keyed_shape!(Layer3, 3);
        keyed_shape!(Layer8, 8);
        keyed_shape!(Layer1, 1);
        keyed_shape!(Layer9, 9);
        keyed_shape!(Layer2, 2);
        keyed_shape!(Layer7, 7);

        let mut db = Database::new();
        macro_rules! spawn_one {
            ($component:expr) => {{
                let mut bundle = ComponentBundle::new();
                bundle.add($component);
                db.create_entity(bundle).unwrap();
            }};
        }
        spawn_one!(Layer5 { value: 0.0 });
        spawn_one!(Layer3 { value: 0.0 });
        spawn_one!(Layer8 { value: 0.0 });
        spawn_one!(Layer1 { value: 0.0 });
        spawn_one!(Layer9 { value: 0.0 });
        spawn_one!(Layer2 { value: 0.0 });
        spawn_one!(Layer7 { value: 0.0 });

        let groups = db.group_by(ComponentId::of_name("Layer"));
        let keys: Vec<i32> = groups.iter().map(|group| group.key()).collect();
        assert_eq!(keys, vec![1, 2, 3, 5, 7, 8, 9]);
    }

    #[test]
    fn transaction_double_execute_is_an_error() {
        let mut db = Database::new();
        let mut tx = Transaction::new(&mut db);
        let mut bundle = ComponentBundle::new();
        bundle.add(Position { x: 0.0, y: 0.0 });
        let entity = tx.create_entity(bundle);

        assert!(tx.execute().is_ok());
        assert_eq!(tx.execute(), Err(EcsError::TransactionAlreadyExecuted));
        drop(tx);

        assert_eq!(db.get_component::<Position>(entity), Some(&Position { x: 0.0, y: 0.0 }));
    }

    // -- broader integration ------------------------------------------------

    #[test]
    fn deferred_mutations_become_visible_on_execute() {
        let mut db = Database::new();
        let mut bundle = ComponentBundle::new();
        bundle.add(Position { x: 0.0, y: 0.0 });
        let existing = db.create_entity(bundle).unwrap();

        let mut tx = Transaction::new(&mut db);
        let mut vel = ComponentBundle::new();
        vel.add(Velocity { dx: 1.0, dy: 1.0 });
        tx.add_components(existing, vel);
        tx.remove_entity(existing);

        // Passthrough reads see the pre-transaction state.
        assert!(tx.get_entity(existing).is_some());
        assert_eq!(tx.query(&component_ids![Velocity]).count(), 0);

        tx.execute().unwrap();
        assert!(db.get_entity(existing).is_none());
        assert_eq!(db.entity_count(), 0);
    }

    #[test]
    fn query_with_forbidden_component() {
        let mut db = Database::new();
        let mut plain = ComponentBundle::new();
        plain.add(Position { x: 0.0, y: 0.0 });
        let wanted = db.create_entity(plain).unwrap();

        let mut frozen = ComponentBundle::new();
        frozen.add(Position { x: 1.0, y: 1.0 });
        frozen.add(Frozen);
        db.create_entity(frozen).unwrap();

        let result = db.query_filtered(&component_ids![Position], &component_ids![Frozen]);
        assert_eq!(result.count(), 1);
        assert_eq!(result.first().unwrap().id(), wanted);
    }

    #[test]
    fn zero_sized_components_participate_in_archetypes() {
        let mut db = Database::new();
        let mut bundle = ComponentBundle::new();
        bundle.add(Position { x: 0.0, y: 0.0 });
        bundle.add(Frozen);
        let entity = db.create_entity(bundle).unwrap();

        let handle = db.get_entity(entity).unwrap();
        assert!(handle.has::<Frozen>());
        // Zero-sized payloads have no addressable bytes.
        assert!(handle.get::<Frozen>().is_none());

        db.remove_component::<Frozen>(entity).unwrap();
        assert!(!db.has_component::<Frozen>(entity));
        assert_eq!(
            db.get_component::<Position>(entity),
            Some(&Position { x: 0.0, y: 0.0 })
        );
    }

    #[test]
    fn migration_between_populated_archetypes() {
        let mut db = Database::new();
        let mut spawn = |x: f32, with_velocity: bool| {
            let mut bundle = ComponentBundle::new();
            bundle.add(Position { x, y: 0.0 });
            if with_velocity {
                bundle.add(Velocity { dx: x, dy: 0.0 });
            }
            db.create_entity(bundle).unwrap()
        };
        let a = spawn(1.0, false);
        let b = spawn(2.0, false);
        let c = spawn(3.0, true);

        // Move `a` into the populated {Position, Velocity} archetype.
        db.add_component(a, Velocity { dx: 9.0, dy: 9.0 }).unwrap();

        assert_eq!(db.get_component::<Position>(a), Some(&Position { x: 1.0, y: 0.0 }));
        assert_eq!(
            db.get_component::<Velocity>(a),
            Some(&Velocity { dx: 9.0, dy: 9.0 })
        );
        assert_eq!(db.get_component::<Position>(b), Some(&Position { x: 2.0, y: 0.0 }));
        assert_eq!(db.get_component::<Position>(c), Some(&Position { x: 3.0, y: 0.0 }));
        assert_eq!(db.query(&component_ids![Position, Velocity]).count(), 2);
    }

    #[test]
    fn group_sub_queries_and_entity_iteration() {
        #[repr(C)]
        #[derive(Clone, Copy, Debug, PartialEq, Zeroable, Pod)]
        struct Sprite {
            layer_alpha: f32,
        }

        impl Component for Sprite {
            const TRAIT: Option<ComponentTrait> = Some(ComponentTrait::grouped("Drawable", 4));
        }

        let mut db = Database::new();
        let mut bundle = ComponentBundle::new();
        bundle.add(Sprite { layer_alpha: 1.0 });
        bundle.add(Position { x: 0.0, y: 0.0 });
        let positioned = db.create_entity(bundle).unwrap();

        let mut bundle = ComponentBundle::new();
        bundle.add(Sprite { layer_alpha: 0.5 });
        let bare = db.create_entity(bundle).unwrap();

        let groups = db.group_by(ComponentId::of_name("Drawable"));
        let group = groups.get(4).unwrap();
        assert_eq!(group.count(), 2);

        let ids: Vec<EntityId> = group.iter().map(|entity| entity.id()).collect();
        assert!(ids.contains(&positioned));
        assert!(ids.contains(&bare));

        let sub = group.query(&component_ids![Position]);
        assert_eq!(sub.count(), 1);
        assert_eq!(sub.first().unwrap().id(), positioned);
    }

    #[test]
    fn resources_live_beside_entity_storage() {
        #[derive(Debug, PartialEq)]
        struct TickRate(u32);

        let mut db = Database::new();
        db.resources_mut().insert(TickRate(60));

        let mut bundle = ComponentBundle::new();
        bundle.add(Position { x: 0.0, y: 0.0 });
        db.create_entity(bundle).unwrap();

        assert_eq!(db.resources().get::<TickRate>(), Some(&TickRate(60)));
        assert_eq!(db.resources_mut().remove::<TickRate>(), Some(TickRate(60)));
    }

    #[test]
    fn column_parity_and_location_round_trip_after_churn() {
        let mut db = Database::new();
        let mut entities = Vec::new();
        for i in 0..12u32 {
            let mut bundle = ComponentBundle::new();
            bundle.add(Position {
                x: i as f32,
                y: 0.0,
            });
            if i % 2 == 0 {
                bundle.add(Velocity {
                    dx: i as f32,
                    dy: 0.0,
                });
            }
            entities.push(db.create_entity(bundle).unwrap());
        }
        for (i, &entity) in entities.iter().enumerate() {
            if i % 3 == 0 {
                db.remove_entity(entity).unwrap();
            } else if i % 3 == 1 {
                db.add_component(entity, Health { current: 1, max: 1 }).unwrap();
            }
        }

        for archetype in db.archetypes() {
            // Column parity.
            for column in archetype.columns() {
                assert_eq!(column.len(), archetype.entities().len());
            }
            // Location round-trip.
            for (row, &entity) in archetype.entities().iter().enumerate() {
                let handle = db.get_entity(entity).unwrap();
                assert_eq!(handle.archetype_id(), archetype.id());
                assert_eq!(handle.row(), row);
            }
            // No empty archetypes survive a completed mutation.
            assert!(!archetype.is_empty());
        }
    }
}
