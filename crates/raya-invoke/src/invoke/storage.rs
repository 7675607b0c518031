//! Argument slot storage
//!
//! Two parallel slot arrays: object slots (boxed values or references) and
//! address slots (where the callee reads or writes each value). The last two
//! indices of each array belong to the target and the return value, so one
//! root registration per array covers everything a call touches.
//!
//! Calls with up to [`MAX_INLINE_ARGS`] arguments keep their slots inline;
//! larger calls spill to boxed slices.

use std::cell::{Cell, RefCell};
use std::ptr;

use crate::gc::ObjectRef;
use crate::types::TypeHandle;

/// Largest argument count that does not allocate slot storage
pub const MAX_INLINE_ARGS: usize = 4;

/// Target and return slots after the arguments
const RESERVED_SLOTS: usize = 2;
const INLINE_SLOTS: usize = MAX_INLINE_ARGS + RESERVED_SLOTS;

/// A slot position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Argument by index
    Argument(usize),
    /// `this`
    Target,
    /// Return value
    Return,
}

/// How a slot is currently bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding {
    /// Nothing bound yet
    #[default]
    Unset,
    /// The object slot holds the value; the address points at its payload
    /// (value types) or at the object slot itself (references)
    Object,
    /// The address slot points at caller-provided storage of the recorded type
    Address,
}

/// Which array the callee reads slot addresses from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Derive addresses from the object slots
    Boxed,
    /// Use the address slots
    ByRef,
}

struct Slots<O, A, B, T> {
    objects: O,
    addresses: A,
    bindings: B,
    types: T,
}

type InlineSlots = Slots<
    [Cell<ObjectRef>; INLINE_SLOTS],
    [Cell<*mut u8>; INLINE_SLOTS],
    [Cell<Binding>; INLINE_SLOTS],
    [RefCell<Option<TypeHandle>>; INLINE_SLOTS],
>;

type SpilledSlots = Slots<
    Box<[Cell<ObjectRef>]>,
    Box<[Cell<*mut u8>]>,
    Box<[Cell<Binding>]>,
    Box<[RefCell<Option<TypeHandle>>]>,
>;

enum Repr {
    Inline(InlineSlots),
    Spilled(SpilledSlots),
}

/// Slot storage for one call
///
/// Owned by a single invocation context and never shared between threads.
pub struct ArgumentStorage {
    arg_count: usize,
    repr: Repr,
}

impl ArgumentStorage {
    /// Storage for `arg_count` arguments plus target and return
    pub fn new(arg_count: usize) -> Self {
        let repr = if arg_count <= MAX_INLINE_ARGS {
            Repr::Inline(Slots {
                objects: std::array::from_fn(|_| Cell::new(ObjectRef::null())),
                addresses: std::array::from_fn(|_| Cell::new(ptr::null_mut())),
                bindings: std::array::from_fn(|_| Cell::new(Binding::Unset)),
                types: std::array::from_fn(|_| RefCell::new(None)),
            })
        } else {
            let len = arg_count + RESERVED_SLOTS;
            Repr::Spilled(Slots {
                objects: (0..len).map(|_| Cell::new(ObjectRef::null())).collect(),
                addresses: (0..len).map(|_| Cell::new(ptr::null_mut())).collect(),
                bindings: (0..len).map(|_| Cell::new(Binding::Unset)).collect(),
                types: (0..len).map(|_| RefCell::new(None)).collect(),
            })
        };
        Self { arg_count, repr }
    }

    /// Number of argument slots
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    /// Whether the slots live inline
    pub fn is_inline(&self) -> bool {
        matches!(self.repr, Repr::Inline(_))
    }

    /// View over the slots in use
    pub fn slots(&self) -> FrameSlots<'_> {
        let len = self.arg_count + RESERVED_SLOTS;
        match &self.repr {
            Repr::Inline(s) => FrameSlots {
                objects: &s.objects[..len],
                addresses: &s.addresses[..len],
                bindings: &s.bindings[..len],
                types: &s.types[..len],
                arg_count: self.arg_count,
            },
            Repr::Spilled(s) => FrameSlots {
                objects: &s.objects[..],
                addresses: &s.addresses[..],
                bindings: &s.bindings[..],
                types: &s.types[..],
                arg_count: self.arg_count,
            },
        }
    }
}

/// Borrowed view of a call's slots
///
/// Shared with method bodies and compiled trampolines.
#[derive(Clone, Copy)]
pub struct FrameSlots<'a> {
    objects: &'a [Cell<ObjectRef>],
    addresses: &'a [Cell<*mut u8>],
    bindings: &'a [Cell<Binding>],
    types: &'a [RefCell<Option<TypeHandle>>],
    arg_count: usize,
}

impl<'a> FrameSlots<'a> {
    /// Number of argument slots
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    #[inline]
    fn index(&self, slot: Slot) -> usize {
        match slot {
            Slot::Argument(i) => i,
            Slot::Target => self.arg_count,
            Slot::Return => self.arg_count + 1,
        }
    }

    /// Object slot contents
    #[inline]
    pub fn object(&self, slot: Slot) -> ObjectRef {
        self.objects[self.index(slot)].get()
    }

    /// Address slot contents
    #[inline]
    pub fn address(&self, slot: Slot) -> *mut u8 {
        self.addresses[self.index(slot)].get()
    }

    /// Address of the object slot itself
    #[inline]
    pub fn object_slot_address(&self, slot: Slot) -> *mut u8 {
        self.objects[self.index(slot)].as_ptr() as *mut u8
    }

    /// Address the callee should use for `slot` under `mode`.
    ///
    /// In boxed mode, value-typed slots resolve to the payload of the boxed
    /// object and reference slots to the object slot.
    #[inline]
    pub fn resolve(&self, slot: Slot, mode: FrameMode, value_type: bool) -> *mut u8 {
        match mode {
            FrameMode::ByRef => self.address(slot),
            FrameMode::Boxed if value_type => self.object(slot).payload(),
            FrameMode::Boxed => self.object_slot_address(slot),
        }
    }

    /// Current binding
    pub fn binding(&self, slot: Slot) -> Binding {
        self.bindings[self.index(slot)].get()
    }

    /// Runtime type recorded at bind time
    pub fn recorded_type(&self, slot: Slot) -> Option<TypeHandle> {
        self.types[self.index(slot)].borrow().clone()
    }

    pub(crate) fn set_address(&self, slot: Slot, addr: *mut u8) {
        self.addresses[self.index(slot)].set(addr);
    }

    pub(crate) fn set_recorded_type(&self, slot: Slot, ty: Option<TypeHandle>) {
        *self.types[self.index(slot)].borrow_mut() = ty;
    }

    /// Bind an object, addressing its payload when `payload` is set and
    /// the object slot otherwise
    pub(crate) fn bind_object_as(&self, slot: Slot, obj: ObjectRef, ty: Option<TypeHandle>, payload: bool) {
        let i = self.index(slot);
        self.objects[i].set(obj);
        let addr = if payload {
            obj.payload()
        } else {
            self.objects[i].as_ptr() as *mut u8
        };
        self.addresses[i].set(addr);
        self.bindings[i].set(Binding::Object);
        *self.types[i].borrow_mut() = ty;
    }

    /// Bind an object, deciding payload vs slot addressing from its runtime type
    pub(crate) fn bind_object(&self, slot: Slot, obj: ObjectRef) {
        let ty = obj.runtime_type();
        let payload = ty.as_ref().map(|t| t.is_value_type() || t.is_pointer()).unwrap_or(false);
        self.bind_object_as(slot, obj, ty, payload);
    }

    /// Bind caller-provided storage holding a value of `ty`
    pub(crate) fn bind_address(&self, slot: Slot, addr: *mut u8, ty: TypeHandle) {
        let i = self.index(slot);
        self.objects[i].set(ObjectRef::null());
        self.addresses[i].set(addr);
        self.bindings[i].set(Binding::Address);
        *self.types[i].borrow_mut() = Some(ty);
    }

    /// Mark the current address as caller-visible storage of `ty`, keeping
    /// the object slot so a box behind the address stays rooted
    pub(crate) fn rebind_as_address(&self, slot: Slot, ty: TypeHandle) {
        let i = self.index(slot);
        self.bindings[i].set(Binding::Address);
        *self.types[i].borrow_mut() = Some(ty);
    }

    /// Return a slot to the unset state
    pub(crate) fn clear(&self, slot: Slot) {
        let i = self.index(slot);
        self.objects[i].set(ObjectRef::null());
        self.addresses[i].set(ptr::null_mut());
        self.bindings[i].set(Binding::Unset);
        *self.types[i].borrow_mut() = None;
    }

    /// Reset every slot
    pub(crate) fn reset(&self) {
        for i in 0..self.objects.len() {
            self.objects[i].set(ObjectRef::null());
            self.addresses[i].set(ptr::null_mut());
            self.bindings[i].set(Binding::Unset);
            *self.types[i].borrow_mut() = None;
        }
    }

    /// Start and length of the object slot array
    pub(crate) fn object_region(&self) -> (*const u8, usize) {
        (self.objects.as_ptr() as *const u8, self.objects.len())
    }

    /// Start and length of the address slot array
    pub(crate) fn address_region(&self) -> (*const u8, usize) {
        (self.addresses.as_ptr() as *const u8, self.addresses.len())
    }
}
