//! Component identity, layout metadata, and payload bundles.
//!
//! A type participates in the engine by implementing [`Component`], which
//! requires [`Pod`]: components are plain value types whose size and
//! alignment are statically known and whose bytes can be copied freely.
//! Identity is derived from the type's fully qualified name with a stable
//! FNV-1a hash, so the same type maps to the same [`ComponentId`] at every
//! call site within a process -- no registry is needed.

use bytemuck::Pod;
use const_fnv1a_hash::fnv1a_hash_str_64;
use std::any;
use std::fmt;
use std::mem;

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// Stable 64-bit identifier for a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Derive the id of any `'static` type from its fully qualified name.
    pub fn of<T: 'static>() -> Self {
        Self(fnv1a_hash_str_64(any::type_name::<T>()))
    }

    /// Derive an id from an explicit name. Usable in const context; this is
    /// how virtual trait components get their identity.
    pub const fn of_name(name: &str) -> Self {
        Self(fnv1a_hash_str_64(name))
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({:#018x})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentTrait
// ---------------------------------------------------------------------------

/// How a component participates in a virtual trait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraitKind {
    /// Plain participation with no ordering key.
    Marker,
    /// Participation with a group key; [`group_by`](crate::database::Database::group_by)
    /// iterates groups in ascending key order.
    Grouped {
        /// Signed key the owning archetype is grouped under.
        key: i32,
    },
}

/// A virtual component id that several real component types may declare,
/// enabling grouping across types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentTrait {
    id: ComponentId,
    kind: TraitKind,
}

impl ComponentTrait {
    /// Declare plain participation in the named trait.
    pub const fn marker(name: &str) -> Self {
        Self {
            id: ComponentId::of_name(name),
            kind: TraitKind::Marker,
        }
    }

    /// Declare grouped participation in the named trait under `key`.
    pub const fn grouped(name: &str, key: i32) -> Self {
        Self {
            id: ComponentId::of_name(name),
            kind: TraitKind::Grouped { key },
        }
    }

    /// The trait's own component id.
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The participation kind.
    #[inline]
    pub fn kind(&self) -> TraitKind {
        self.kind
    }

    /// The group key, if this occurrence is grouped.
    pub fn group_key(&self) -> Option<i32> {
        match self.kind {
            TraitKind::Grouped { key } => Some(key),
            TraitKind::Marker => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentMeta
// ---------------------------------------------------------------------------

/// Identity and layout of one component type: id, size, alignment, stride,
/// and optional trait participation.
///
/// `stride` is `size` rounded up to `align` (zero for zero-sized types) and
/// is the byte distance between consecutive elements in a column.
#[derive(Clone, Copy, Debug)]
pub struct ComponentMeta {
    id: ComponentId,
    size: usize,
    align: usize,
    stride: usize,
    component_trait: Option<ComponentTrait>,
}

impl ComponentMeta {
    /// Materialize the meta describing component type `C`.
    pub fn of<C: Component>() -> Self {
        let size = mem::size_of::<C>();
        let align = mem::align_of::<C>();
        Self {
            id: ComponentId::of::<C>(),
            size,
            align,
            stride: if size > 0 { align_up(size, align) } else { 0 },
            component_trait: C::TRAIT,
        }
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Trait participation carried by the component type, if any.
    #[inline]
    pub fn component_trait(&self) -> Option<ComponentTrait> {
        self.component_trait
    }
}

// Meta equality is layout identity; trait participation does not take part.
impl PartialEq for ComponentMeta {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.size == other.size
            && self.align == other.align
            && self.stride == other.stride
    }
}

impl Eq for ComponentMeta {}

/// Round `size` up to the next multiple of `align` (a power of two).
pub(crate) const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A component: plain old data attachable to an entity.
///
/// Implemented with an empty `impl` block for any [`Pod`] type:
///
/// ```
/// use bytemuck::{Pod, Zeroable};
/// use strata_ecs::component::Component;
///
/// #[repr(C)]
/// #[derive(Clone, Copy, Zeroable, Pod)]
/// struct Velocity { dx: f32, dy: f32 }
///
/// impl Component for Velocity {}
/// ```
///
/// Override [`TRAIT`](Self::TRAIT) to participate in a virtual trait:
///
/// ```
/// # use bytemuck::{Pod, Zeroable};
/// use strata_ecs::component::{Component, ComponentTrait};
///
/// # #[repr(C)]
/// # #[derive(Clone, Copy, Zeroable, Pod)]
/// # struct Circle { radius: f32 }
/// impl Component for Circle {
///     const TRAIT: Option<ComponentTrait> = Some(ComponentTrait::grouped("Shape", 2));
/// }
/// ```
pub trait Component: Pod {
    /// Optional virtual-trait participation for this component type.
    const TRAIT: Option<ComponentTrait> = None;

    /// The stable id of this component type.
    fn component_id() -> ComponentId {
        ComponentId::of::<Self>()
    }

    /// The layout metadata of this component type.
    fn meta() -> ComponentMeta {
        ComponentMeta::of::<Self>()
    }
}

/// Expands to a `[ComponentId; N]` array for the listed component types.
///
/// ```
/// # use bytemuck::{Pod, Zeroable};
/// # use strata_ecs::component::Component;
/// use strata_ecs::component_ids;
///
/// # #[repr(C)]
/// # #[derive(Clone, Copy, Zeroable, Pod)]
/// # struct Position { x: f32, y: f32 }
/// # impl Component for Position {}
/// let required = component_ids![Position];
/// ```
#[macro_export]
macro_rules! component_ids {
    ($($component:ty),* $(,)?) => {
        [$(<$component as $crate::component::Component>::component_id()),*]
    };
}

// ---------------------------------------------------------------------------
// ComponentBundle
// ---------------------------------------------------------------------------

/// An ordered, deduplicated set of component values handed to the database
/// when creating an entity or adding components.
///
/// Entries are kept sorted ascending by [`ComponentId`] with at most one
/// entry per id; adding the same type twice replaces the earlier payload.
#[derive(Clone, Debug, Default)]
pub struct ComponentBundle {
    entries: Vec<BundleEntry>,
}

#[derive(Clone, Debug)]
pub(crate) struct BundleEntry {
    pub(crate) meta: ComponentMeta,
    pub(crate) bytes: Vec<u8>,
}

impl ComponentBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a component value to the bundle.
    pub fn add<C: Component>(&mut self, component: C) {
        self.add_raw(C::meta(), bytemuck::bytes_of(&component).to_vec());
    }

    /// Add a pre-encoded payload. `bytes` must be exactly `meta.size()` long;
    /// the size is validated again when the payload reaches a column.
    pub(crate) fn add_raw(&mut self, meta: ComponentMeta, bytes: Vec<u8>) {
        match self
            .entries
            .binary_search_by_key(&meta.id(), |entry| entry.meta.id())
        {
            Ok(idx) => self.entries[idx].bytes = bytes,
            Err(idx) => self.entries.insert(idx, BundleEntry { meta, bytes }),
        }
    }

    /// Number of distinct component types in the bundle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bundle holds no components.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the bundle contains the given component type.
    pub fn contains(&self, id: ComponentId) -> bool {
        self.entries
            .binary_search_by_key(&id, |entry| entry.meta.id())
            .is_ok()
    }

    /// The component ids in the bundle, ascending.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.entries.iter().map(|entry| entry.meta.id())
    }

    /// The [`ComponentSet`](crate::archetype::ComponentSet) this bundle spans.
    pub fn component_set(&self) -> crate::archetype::ComponentSet {
        crate::archetype::ComponentSet::from_metas(self.entries.iter().map(|entry| entry.meta))
    }

    pub(crate) fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
