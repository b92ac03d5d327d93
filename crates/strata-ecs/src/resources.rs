//! Typed singleton registry keyed by component-type id.
//!
//! Resources are one-per-type heap values owned by the database, addressed
//! with the same type-name hash as components but without the `Pod`
//! requirement. The registry's lifetime matches the database's.

use crate::component::ComponentId;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// A map from component-type id to one owned value of that type.
#[derive(Default)]
pub struct Resources {
    map: HashMap<ComponentId, Box<dyn Any>>,
}

impl Resources {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a resource, returning the previously stored value of the same
    /// type, if any.
    pub fn insert<R: 'static>(&mut self, resource: R) -> Option<R> {
        self.map
            .insert(ComponentId::of::<R>(), Box::new(resource))
            .and_then(|previous| previous.downcast().ok())
            .map(|previous| *previous)
    }

    /// Read the resource of type `R`.
    pub fn get<R: 'static>(&self) -> Option<&R> {
        self.map.get(&ComponentId::of::<R>())?.downcast_ref()
    }

    /// Mutate the resource of type `R`.
    pub fn get_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.map.get_mut(&ComponentId::of::<R>())?.downcast_mut()
    }

    /// Whether a resource of type `R` is stored.
    pub fn contains<R: 'static>(&self) -> bool {
        self.map.contains_key(&ComponentId::of::<R>())
    }

    /// Take the resource of type `R` out of the registry.
    pub fn remove<R: 'static>(&mut self) -> Option<R> {
        self.map
            .remove(&ComponentId::of::<R>())
            .and_then(|resource| resource.downcast().ok())
            .map(|resource| *resource)
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resources")
            .field("len", &self.map.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
