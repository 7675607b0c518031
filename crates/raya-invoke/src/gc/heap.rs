//! Heap allocator for managed objects
//!
//! Objects are individually allocated blocks (header plus zeroed payload).
//! Allocation never triggers a collection; collections run only through the
//! explicit, unsafe [`Heap::collect`].

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::cell::Cell;
use std::mem::{self, MaybeUninit};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use parking_lot::Mutex;

use super::collector::{self, GcStats};
use super::header::{object_layout, payload_capacity, ObjectHeader, MIN_OBJECT_LAYOUT};
use super::object::ObjectRef;
use super::roots::{RegistrationHandle, RootKind, RootRegistrar, RootSet};
use crate::error::HeapError;
use crate::types::{PrimitiveValue, TypeHandle, TypeKind, TypeRegistry};

/// Mutable heap bookkeeping, guarded by the heap lock
pub(super) struct HeapState {
    pub(super) objects: Vec<NonNull<ObjectHeader>>,
    pub(super) roots: RootSet,
    pub(super) allocated_bytes: usize,
    pub(super) max_heap_bytes: usize,
    pub(super) stats: GcStats,
}

/// Managed heap
pub struct Heap {
    types: Arc<TypeRegistry>,
    state: Mutex<HeapState>,
    /// Permanently rooted slot holding the `Missing` sentinel
    missing: Box<Cell<ObjectRef>>,
}

// The state is only touched under the lock. The sentinel slot is written
// solely by `collect`, whose contract excludes concurrent access.
unsafe impl Send for Heap {}
unsafe impl Sync for Heap {}

impl Heap {
    /// Create an unbounded heap
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self::with_limit(types, 0)
    }

    /// Create a heap limited to `max_heap_bytes` (0 = unlimited)
    pub fn with_limit(types: Arc<TypeRegistry>, max_heap_bytes: usize) -> Self {
        let mut state = HeapState {
            objects: Vec::new(),
            roots: RootSet::new(),
            allocated_bytes: 0,
            max_heap_bytes,
            stats: GcStats::default(),
        };

        // The sentinel is allocated outside the limit.
        let sentinel = raw_allocate(&mut state, types.missing().clone(), MIN_OBJECT_LAYOUT);
        let missing = Box::new(Cell::new(ObjectRef::from_header(sentinel)));
        state
            .roots
            .add_region(missing.as_ptr() as *const u8, 1, RootKind::Object);

        Self {
            types,
            state: Mutex::new(state),
            missing,
        }
    }

    /// Type registry backing this heap
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Set maximum heap size (0 = unlimited)
    pub fn set_max_heap_size(&self, bytes: usize) {
        self.state.lock().max_heap_bytes = bytes;
    }

    /// Allocate a zero-initialized instance of `ty`.
    ///
    /// Classes get a zeroed field block; value types get a zeroed box;
    /// pointer types get a box holding a null pointer.
    pub fn allocate(&self, ty: &TypeHandle) -> Result<ObjectRef, HeapError> {
        if ty.is_void() || ty.is_by_ref() {
            return Err(HeapError::NotAllocatable(ty.name().to_string()));
        }

        let payload = payload_capacity(ty.size());
        let layout = object_layout(payload)?;

        let mut state = self.state.lock();
        if state.max_heap_bytes > 0 && state.allocated_bytes + layout.size() > state.max_heap_bytes {
            return Err(HeapError::LimitExceeded {
                requested: layout.size(),
                limit: state.max_heap_bytes,
            });
        }
        Ok(ObjectRef::from_header(raw_allocate(&mut state, ty.clone(), layout)))
    }

    /// Allocate a zeroed box for a value type
    pub fn allocate_boxed(&self, ty: &TypeHandle) -> Result<ObjectRef, HeapError> {
        if !ty.is_value_type() && !ty.is_pointer() {
            return Err(HeapError::NotAllocatable(ty.name().to_string()));
        }
        self.allocate(ty)
    }

    /// Default instance of `ty` as an object: a zeroed box for value types,
    /// null for reference types
    pub fn allocate_default(&self, ty: &TypeHandle) -> Result<ObjectRef, HeapError> {
        if ty.is_value_type() || ty.is_pointer() {
            self.allocate(ty)
        } else {
            Ok(ObjectRef::null())
        }
    }

    /// Box a Rust value of a registered value type
    pub fn box_value<T: Copy + 'static>(&self, value: T) -> Result<ObjectRef, HeapError> {
        let ty = self
            .types
            .of::<T>()
            .ok_or(HeapError::UnregisteredType(std::any::type_name::<T>()))?;
        if !ty.is_value_type() {
            return Err(HeapError::NotAllocatable(ty.name().to_string()));
        }
        let obj = self.allocate(&ty)?;
        // SAFETY: fresh box of `T`'s runtime type, payload is 8-byte aligned
        // and at least `size_of::<T>()` bytes.
        unsafe { ptr::write(obj.payload() as *mut T, value) };
        Ok(obj)
    }

    /// Box a primitive value
    pub fn box_primitive(&self, value: PrimitiveValue) -> Result<ObjectRef, HeapError> {
        let obj = self.allocate(self.types.primitive(value.kind()))?;
        // SAFETY: payload sized and aligned for the primitive.
        unsafe { value.write(obj.payload()) };
        Ok(obj)
    }

    /// Box the bytes of a value with the given type
    pub(crate) fn box_bytes(&self, ty: &TypeHandle, bytes: &[MaybeUninit<u8>]) -> Result<ObjectRef, HeapError> {
        let obj = self.allocate(ty)?;
        let len = bytes.len().min(ty.size());
        // SAFETY: the payload holds at least `ty.size()` bytes.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr() as *const u8, obj.payload(), len) };
        Ok(obj)
    }

    /// Copy a value box
    pub fn clone_box(&self, obj: ObjectRef) -> Result<ObjectRef, HeapError> {
        let Some(ty) = obj.runtime_type() else {
            return Ok(ObjectRef::null());
        };
        if !ty.is_value_type() && !ty.is_pointer() {
            return Ok(obj);
        }
        let copy = self.allocate(&ty)?;
        // SAFETY: both payloads hold `ty.size()` bytes and do not overlap.
        unsafe { ptr::copy_nonoverlapping(obj.payload(), copy.payload(), ty.size()) };
        Ok(copy)
    }

    /// Produce an object view of the storage at `addr`, which holds a value of `ty`.
    ///
    /// Value types are copied into a new box, nullable storage is reboxed
    /// (null when empty), reference storage yields the stored reference, and
    /// pointer storage is boxed as `IntPtr`.
    ///
    /// # Safety
    ///
    /// `addr` must point to valid, aligned storage for a value of `ty`.
    pub unsafe fn box_from_address(&self, ty: &TypeHandle, addr: *const u8) -> Result<ObjectRef, HeapError> {
        match ty.kind() {
            TypeKind::Class => Ok(ptr::read(addr as *const ObjectRef)),
            TypeKind::Primitive(_) | TypeKind::Struct => {
                let obj = self.allocate(ty)?;
                ptr::copy_nonoverlapping(addr, obj.payload(), ty.size());
                Ok(obj)
            }
            TypeKind::Nullable(elem) => {
                if *addr == 0 {
                    return Ok(ObjectRef::null());
                }
                let offset = ty.nullable_value_offset().unwrap_or(0);
                self.box_from_address(elem, addr.add(offset))
            }
            TypeKind::Pointer(_) => {
                let value = ptr::read(addr as *const isize);
                self.box_primitive(PrimitiveValue::IntPtr(value))
            }
            TypeKind::Void | TypeKind::ByRef(_) => Err(HeapError::NotAllocatable(ty.name().to_string())),
        }
    }

    /// Write `value` (a box of the underlying type, or null) into nullable storage.
    ///
    /// # Safety
    ///
    /// `dest` must point to valid storage for `nullable`, and `value` must be
    /// null or a box of the nullable's element type.
    pub(crate) unsafe fn store_nullable(&self, nullable: &TypeHandle, dest: *mut u8, value: ObjectRef) {
        ptr::write_bytes(dest, 0, nullable.size());
        if value.is_null() {
            return;
        }
        let Some(elem) = nullable.element_type() else {
            return;
        };
        let offset = nullable.nullable_value_offset().unwrap_or(0);
        *dest = 1;
        ptr::copy_nonoverlapping(value.payload(), dest.add(offset), elem.size());
    }

    /// The "argument omitted" sentinel
    pub fn missing(&self) -> ObjectRef {
        self.missing.get()
    }

    /// Whether `obj` is the "argument omitted" sentinel
    pub fn is_missing(&self, obj: ObjectRef) -> bool {
        obj.type_id() == Some(self.types.missing().id())
    }

    /// Keep `obj` alive (and its reference up to date) until the handle is dropped
    pub fn root(&self, obj: ObjectRef) -> Root<'_> {
        let slot = Box::new(Cell::new(obj));
        let handle = self
            .state
            .lock()
            .roots
            .add_region(slot.as_ptr() as *const u8, 1, RootKind::Object);
        Root {
            heap: self,
            slot,
            handle,
        }
    }

    /// Run a full, relocating collection.
    ///
    /// Every live object moves. Registered root slots and traced fields are
    /// updated; anything else is dangling afterwards.
    ///
    /// # Safety
    ///
    /// No other thread may touch managed memory during the collection, every
    /// registered region must still be valid, and the caller must not use any
    /// `ObjectRef` or payload address obtained before the call unless it was
    /// read back from a registered location.
    pub unsafe fn collect(&self) {
        let mut state = self.state.lock();
        collector::collect(&mut state);
    }

    /// Collection statistics
    pub fn stats(&self) -> GcStats {
        self.state.lock().stats.clone()
    }

    /// Number of live allocations (including the sentinel)
    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Bytes currently allocated
    pub fn allocated_bytes(&self) -> usize {
        self.state.lock().allocated_bytes
    }

    /// Number of registered root regions (including the sentinel's)
    pub fn root_region_count(&self) -> usize {
        self.state.lock().roots.len()
    }

    /// Whether `obj` is a live allocation of this heap
    pub fn contains(&self, obj: ObjectRef) -> bool {
        let state = self.state.lock();
        state.objects.iter().any(|o| o.as_ptr() == obj.header_ptr())
    }
}

impl RootRegistrar for Heap {
    unsafe fn register_root_region(&self, base: *const u8, slot_count: usize, kind: RootKind) -> RegistrationHandle {
        let handle = self.state.lock().roots.add_region(base, slot_count, kind);
        tracing::trace!(handle = handle.as_u64(), slot_count, ?kind, "gc: root region registered");
        handle
    }

    fn unregister_root_region(&self, handle: RegistrationHandle) {
        let removed = self.state.lock().roots.remove_region(handle);
        if !removed {
            tracing::warn!(handle = handle.as_u64(), "gc: unknown root region released");
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for object in state.objects.drain(..) {
            // SAFETY: every tracked object is a live allocation owned by this heap.
            unsafe {
                let layout = Layout::from_size_align_unchecked(object.as_ref().total_size(), mem::align_of::<ObjectHeader>());
                ptr::drop_in_place(object.as_ptr());
                dealloc(object.as_ptr() as *mut u8, layout);
            }
        }
    }
}

/// Allocate and register a zeroed object without limit checks
fn raw_allocate(state: &mut HeapState, ty: TypeHandle, layout: Layout) -> NonNull<ObjectHeader> {
    // SAFETY: `layout` has a non-zero size (it always includes the header).
    let raw = unsafe { alloc_zeroed(layout) };
    let Some(header) = NonNull::new(raw as *mut ObjectHeader) else {
        handle_alloc_error(layout);
    };
    let payload_size = layout.size() - mem::size_of::<ObjectHeader>();
    // SAFETY: fresh allocation, aligned for the header.
    unsafe { header.as_ptr().write(ObjectHeader::new(ty, payload_size)) };
    state.objects.push(header);
    state.allocated_bytes += layout.size();
    header
}

/// A rooted reference, updated in place when the object moves
pub struct Root<'h> {
    heap: &'h Heap,
    slot: Box<Cell<ObjectRef>>,
    handle: RegistrationHandle,
}

impl Root<'_> {
    /// Current reference
    pub fn get(&self) -> ObjectRef {
        self.slot.get()
    }

    /// Replace the rooted reference
    pub fn set(&self, obj: ObjectRef) {
        self.slot.set(obj);
    }
}

impl Drop for Root<'_> {
    fn drop(&mut self) {
        self.heap.unregister_root_region(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveKind;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn heap() -> Heap {
        let types = Arc::new(TypeRegistry::new());
        types.register_value_type::<Point>("Point").unwrap();
        Heap::new(types)
    }

    #[test]
    fn test_box_and_unbox() {
        let heap = heap();
        let obj = heap.box_value(42i32).unwrap();
        assert_eq!(obj.unbox::<i32>(), Some(42));
        assert_eq!(obj.unbox::<i64>(), None);

        let p = heap.box_value(Point { x: 1, y: 2 }).unwrap();
        assert_eq!(p.unbox::<Point>(), Some(Point { x: 1, y: 2 }));
        assert_eq!(p.type_name(), "Point");
    }

    #[test]
    fn test_box_unregistered_type() {
        #[derive(Clone, Copy)]
        struct Unknown;
        let heap = heap();
        assert!(matches!(heap.box_value(Unknown), Err(HeapError::UnregisteredType(_))));
    }

    #[test]
    fn test_allocate_default() {
        let heap = heap();
        let int32 = heap.types().primitive(PrimitiveKind::Int32).clone();
        assert_eq!(heap.allocate_default(&int32).unwrap().unbox::<i32>(), Some(0));
        assert!(heap.allocate_default(heap.types().object()).unwrap().is_null());
        assert!(heap.allocate(heap.types().void()).is_err());
    }

    #[test]
    fn test_heap_limit() {
        let heap = heap();
        heap.set_max_heap_size(heap.allocated_bytes() + 24);
        assert!(heap.box_value(1i64).is_ok());
        assert!(matches!(heap.box_value(2i64), Err(HeapError::LimitExceeded { .. })));
    }

    #[test]
    fn test_nullable_storage_roundtrip() {
        let heap = heap();
        let int32 = heap.types().primitive(PrimitiveKind::Int32).clone();
        let nullable = heap.types().nullable_of(&int32).unwrap();
        let storage = heap.allocate(&nullable).unwrap();

        unsafe {
            heap.store_nullable(&nullable, storage.payload(), heap.box_value(9i32).unwrap());
            let boxed = heap.box_from_address(&nullable, storage.payload()).unwrap();
            assert_eq!(boxed.unbox::<i32>(), Some(9));

            heap.store_nullable(&nullable, storage.payload(), ObjectRef::null());
            assert!(heap.box_from_address(&nullable, storage.payload()).unwrap().is_null());
        }
    }

    #[test]
    fn test_missing_sentinel() {
        let heap = heap();
        assert!(heap.is_missing(heap.missing()));
        assert!(!heap.is_missing(ObjectRef::null()));
        assert!(!heap.is_missing(heap.box_value(1i32).unwrap()));
    }

    #[test]
    fn test_collect_relocates_rooted_objects() {
        let heap = heap();
        let root = heap.root(heap.box_value(7i32).unwrap());
        let _garbage = heap.box_value(8i32).unwrap();
        let before = root.get();

        unsafe { heap.collect() };

        let after = root.get();
        assert_ne!(before, after);
        assert_eq!(after.unbox::<i32>(), Some(7));
        assert!(heap.contains(after));
        // sentinel + rooted box
        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.stats().last_freed_count, 1);
        assert!(heap.is_missing(heap.missing()));
    }

    #[test]
    fn test_collect_traces_class_fields() {
        let heap = heap();
        let int32 = heap.types().primitive(PrimitiveKind::Int32).clone();
        let object = heap.types().object().clone();
        let node = heap
            .types()
            .register_class("Node", None, &[("value", &int32), ("next", &object)])
            .unwrap();

        let head = heap.allocate(&node).unwrap();
        let tail = heap.allocate(&node).unwrap();
        assert!(head.set_field("value", 1i32));
        assert!(tail.set_field("value", 2i32));
        assert!(head.set_field_object("next", tail));

        let root = heap.root(head);
        unsafe { heap.collect() };

        let head = root.get();
        let tail = head.field_object("next").unwrap();
        assert_eq!(head.field::<i32>("value"), Some(1));
        assert_eq!(tail.field::<i32>("value"), Some(2));
        assert_eq!(heap.object_count(), 3);
    }

    #[test]
    fn test_root_handle_unregisters() {
        let heap = heap();
        let baseline = heap.root_region_count();
        {
            let _root = heap.root(ObjectRef::null());
            assert_eq!(heap.root_region_count(), baseline + 1);
        }
        assert_eq!(heap.root_region_count(), baseline);
    }
}
