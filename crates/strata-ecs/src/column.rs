//! Type-erased columnar storage for one component type.
//!
//! A [`ComponentArray`] is a manually managed byte buffer whose base pointer
//! is aligned to the component's alignment and whose element `i` lives at
//! byte offset `i * stride`. Zero-sized component types never allocate;
//! their length and capacity are still tracked for row accounting.
//!
//! # Safety
//!
//! This is the only module that touches raw allocation. Soundness rests on
//! two invariants maintained by every method: the buffer layout is always
//! `Layout::from_size_align(stride * capacity, align)`, and byte-level reads
//! and writes stay within `len` elements.

use crate::component::ComponentMeta;
use crate::EcsError;

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr;
use std::slice;

/// Capacity floor for the first occupied allocation.
const MIN_OCCUPIED: usize = 8;

/// A type-erased, aligned, growable column of one component type.
pub struct ComponentArray {
    meta: ComponentMeta,
    /// Null whenever nothing is allocated (empty or zero-stride column).
    data: *mut u8,
    len: usize,
    capacity: usize,
}

// The column stores raw bytes of `Pod` component values only.
unsafe impl Send for ComponentArray {}
unsafe impl Sync for ComponentArray {}

impl ComponentArray {
    /// Create an empty column. No allocation happens until the first element.
    pub fn new(meta: ComponentMeta) -> Self {
        Self {
            meta,
            data: ptr::null_mut(),
            len: 0,
            capacity: 0,
        }
    }

    /// Create a column containing exactly one element.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::TypeMismatch`] if `bytes` is not exactly
    /// `meta.size()` long.
    pub fn with_value(meta: ComponentMeta, bytes: &[u8]) -> Result<Self, EcsError> {
        let mut column = Self::new(meta);
        column.append(bytes)?;
        Ok(column)
    }

    /// The component layout this column stores.
    #[inline]
    pub fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    /// Number of stored elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the column is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements that fit in the current allocation.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // -- internal helpers ---------------------------------------------------

    fn layout_for(&self, capacity: usize) -> Layout {
        Layout::from_size_align(
            self.meta.stride().checked_mul(capacity).expect("column layout overflow"),
            self.meta.align(),
        )
        .expect("invalid column layout")
    }

    #[inline]
    fn byte_offset(&self, index: usize) -> usize {
        index * self.meta.stride()
    }

    fn check_payload(&self, bytes: &[u8]) -> Result<(), EcsError> {
        if bytes.len() != self.meta.size() {
            return Err(EcsError::TypeMismatch {
                expected: self.meta.size(),
                actual: bytes.len(),
            });
        }
        Ok(())
    }

    // -- element access -----------------------------------------------------

    /// The bytes of element `index`, aligned to the component's alignment.
    ///
    /// Returns [`None`] when `index` is out of bounds or the component is
    /// zero-sized (there is no addressable payload).
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        if index >= self.len || self.meta.size() == 0 {
            return None;
        }
        unsafe {
            Some(slice::from_raw_parts(
                self.data.add(self.byte_offset(index)),
                self.meta.size(),
            ))
        }
    }

    /// Mutable bytes of element `index`; same bounds and zero-size rules as
    /// [`get`](Self::get).
    pub fn get_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        if index >= self.len || self.meta.size() == 0 {
            return None;
        }
        unsafe {
            Some(slice::from_raw_parts_mut(
                self.data.add(self.byte_offset(index)),
                self.meta.size(),
            ))
        }
    }

    /// Overwrite element `index` with `bytes`.
    ///
    /// # Errors
    ///
    /// [`EcsError::TypeMismatch`] on a payload length disagreement,
    /// [`EcsError::IndexOutOfBounds`] if `index >= len`.
    pub fn set(&mut self, index: usize, bytes: &[u8]) -> Result<(), EcsError> {
        self.check_payload(bytes)?;
        if index >= self.len {
            return Err(EcsError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        if self.meta.size() > 0 {
            unsafe {
                ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    self.data.add(self.byte_offset(index)),
                    self.meta.size(),
                );
            }
        }
        Ok(())
    }

    /// Append `bytes` as a new element, growing the allocation if needed.
    ///
    /// # Errors
    ///
    /// [`EcsError::TypeMismatch`] on a payload length disagreement.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), EcsError> {
        self.check_payload(bytes)?;
        self.ensure_capacity(self.len + 1);
        if self.meta.size() > 0 {
            unsafe {
                ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    self.data.add(self.byte_offset(self.len)),
                    self.meta.size(),
                );
            }
        }
        self.len += 1;
        Ok(())
    }

    /// Insert `bytes` at `index`, shifting elements `[index, len)` one slot
    /// to the right. `index` may equal `len`.
    ///
    /// # Errors
    ///
    /// [`EcsError::TypeMismatch`] on a payload length disagreement,
    /// [`EcsError::IndexOutOfBounds`] if `index > len`.
    pub fn insert(&mut self, index: usize, bytes: &[u8]) -> Result<(), EcsError> {
        self.check_payload(bytes)?;
        if index > self.len {
            return Err(EcsError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        self.ensure_capacity(self.len + 1);
        if self.meta.size() > 0 {
            let stride = self.meta.stride();
            unsafe {
                let slot = self.data.add(self.byte_offset(index));
                // The shifted regions overlap; `ptr::copy` handles that.
                ptr::copy(slot, slot.add(stride), (self.len - index) * stride);
                ptr::copy_nonoverlapping(bytes.as_ptr(), slot, self.meta.size());
            }
        }
        self.len += 1;
        Ok(())
    }

    /// Remove element `index`, shifting elements `(index, len)` one slot to
    /// the left. Preserves element order.
    ///
    /// # Errors
    ///
    /// [`EcsError::IndexOutOfBounds`] if `index >= len`.
    pub fn shift_remove(&mut self, index: usize) -> Result<(), EcsError> {
        if index >= self.len {
            return Err(EcsError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        if self.meta.size() > 0 && index + 1 < self.len {
            let stride = self.meta.stride();
            unsafe {
                let slot = self.data.add(self.byte_offset(index));
                ptr::copy(slot.add(stride), slot, (self.len - index - 1) * stride);
            }
        }
        self.len -= 1;
        Ok(())
    }

    /// Remove element `index` by copying the last element over it. O(1) and
    /// the canonical removal primitive; destroys element order.
    ///
    /// # Errors
    ///
    /// [`EcsError::IndexOutOfBounds`] if `index >= len`.
    pub fn swap_remove(&mut self, index: usize) -> Result<(), EcsError> {
        if index >= self.len {
            return Err(EcsError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        let last = self.len - 1;
        if self.meta.size() > 0 && index != last {
            unsafe {
                ptr::copy_nonoverlapping(
                    self.data.add(self.byte_offset(last)),
                    self.data.add(self.byte_offset(index)),
                    self.meta.size(),
                );
            }
        }
        self.len -= 1;
        Ok(())
    }

    // -- capacity management ------------------------------------------------

    /// Make room for at least `wanted` elements. No-op if the capacity is
    /// already sufficient.
    pub fn ensure_capacity(&mut self, wanted: usize) {
        if self.capacity >= wanted {
            return;
        }
        self.ensure_total_capacity(wanted);
    }

    /// Grow the allocation to `max(capacity * 3/2, max(wanted, MIN_OCCUPIED))`
    /// so that repeated appends are amortized.
    pub fn ensure_total_capacity(&mut self, wanted: usize) {
        let new_capacity = (self.capacity + self.capacity / 2).max(wanted.max(MIN_OCCUPIED));
        if new_capacity <= self.capacity {
            return;
        }
        if self.meta.stride() == 0 {
            self.capacity = new_capacity;
            return;
        }
        let new_layout = self.layout_for(new_capacity);
        unsafe {
            let new_data = if self.capacity == 0 {
                alloc::alloc(new_layout)
            } else {
                alloc::realloc(self.data, self.layout_for(self.capacity), new_layout.size())
            };
            if new_data.is_null() {
                alloc::handle_alloc_error(new_layout);
            }
            self.data = new_data;
        }
        self.capacity = new_capacity;
    }

    /// Shrink the capacity to `max(wanted, len)`, freeing the allocation
    /// entirely when that is zero.
    pub fn shrink_and_free(&mut self, wanted: usize) {
        let new_capacity = wanted.max(self.len);
        if new_capacity >= self.capacity {
            return;
        }
        if self.meta.stride() == 0 {
            self.capacity = new_capacity;
            return;
        }
        if new_capacity == 0 {
            unsafe {
                alloc::dealloc(self.data, self.layout_for(self.capacity));
            }
            self.data = ptr::null_mut();
            self.capacity = 0;
            return;
        }
        let new_layout = self.layout_for(new_capacity);
        unsafe {
            let new_data =
                alloc::realloc(self.data, self.layout_for(self.capacity), new_layout.size());
            if new_data.is_null() {
                alloc::handle_alloc_error(new_layout);
            }
            self.data = new_data;
        }
        self.capacity = new_capacity;
    }

    /// Forget all elements without releasing the allocation.
    pub fn clear_retaining_capacity(&mut self) {
        self.len = 0;
    }
}

impl Drop for ComponentArray {
    fn drop(&mut self) {
        if self.meta.stride() > 0 && self.capacity > 0 {
            unsafe {
                alloc::dealloc(self.data, self.layout_for(self.capacity));
            }
        }
    }
}

impl fmt::Debug for ComponentArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentArray")
            .field("meta", &self.meta)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
