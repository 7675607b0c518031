//! Managed object header
//!
//! Every heap object starts with a header recording its runtime type and
//! payload size; the payload follows immediately.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ ObjectHeader (16 bytes, 8-byte aligned) │
//! │  - ty: TypeHandle (8 bytes)             │
//! │  - payload_size: usize (8 bytes)        │
//! ├─────────────────────────────────────────┤
//! │ Payload (payload_size bytes)            │
//! └─────────────────────────────────────────┘
//! ```

use std::alloc::Layout;
use std::mem;

use crate::error::HeapError;
use crate::types::{align_up, TypeHandle};

/// Alignment of every allocation and of every payload
pub const OBJECT_ALIGN: usize = 8;

/// Header stored before each object payload
#[repr(C, align(8))]
pub struct ObjectHeader {
    ty: TypeHandle,
    payload_size: usize,
}

/// Size of [`ObjectHeader`] in bytes
pub const HEADER_SIZE: usize = mem::size_of::<ObjectHeader>();

impl ObjectHeader {
    pub(crate) fn new(ty: TypeHandle, payload_size: usize) -> Self {
        Self { ty, payload_size }
    }

    /// Runtime type of the object
    #[inline]
    pub fn ty(&self) -> &TypeHandle {
        &self.ty
    }

    /// Payload capacity in bytes
    #[inline]
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Total allocation size (header plus payload)
    #[inline]
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.payload_size
    }
}

/// Payload capacity reserved for a payload of `size` bytes.
///
/// Never zero, so every object has a distinct address range that interior
/// pointers can fall into.
pub(crate) fn payload_capacity(size: usize) -> usize {
    align_up(size.max(1), OBJECT_ALIGN)
}

/// Layout of an object with the smallest payload
pub(crate) const MIN_OBJECT_LAYOUT: Layout =
    match Layout::from_size_align(HEADER_SIZE + OBJECT_ALIGN, OBJECT_ALIGN) {
        Ok(layout) => layout,
        Err(_) => panic!("invalid minimum object layout"),
    };

/// Allocation layout for an object with the given payload capacity
pub(crate) fn object_layout(payload_size: usize) -> Result<Layout, HeapError> {
    let total = HEADER_SIZE
        .checked_add(payload_size)
        .ok_or(HeapError::LayoutOverflow(payload_size))?;
    Layout::from_size_align(total, OBJECT_ALIGN).map_err(|_| HeapError::LayoutOverflow(total))
}
