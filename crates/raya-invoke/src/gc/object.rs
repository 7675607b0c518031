//! Managed object references

use std::fmt;
use std::ptr::{self, NonNull};

use super::header::{ObjectHeader, HEADER_SIZE};
use crate::types::{TypeHandle, TypeId};

/// A reference to a heap object, or null.
///
/// `ObjectRef` is a plain address. It stays valid until the next collection
/// unless the location holding it is registered as a root, in which case the
/// collector rewrites it when the object moves.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(*mut ObjectHeader);

// Object references are shared between threads the same way managed
// references are; the heap guards its own bookkeeping.
unsafe impl Send for ObjectRef {}
unsafe impl Sync for ObjectRef {}

impl ObjectRef {
    /// The null reference
    pub const fn null() -> Self {
        Self(ptr::null_mut())
    }

    pub(crate) fn from_header(header: NonNull<ObjectHeader>) -> Self {
        Self(header.as_ptr())
    }

    pub(crate) fn header_ptr(&self) -> *mut ObjectHeader {
        self.0
    }

    /// Whether this is the null reference
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Object address, 0 for null
    #[inline]
    pub fn addr(&self) -> usize {
        self.0 as usize
    }

    fn header(&self) -> Option<&ObjectHeader> {
        // SAFETY: non-null references point at live headers until the next
        // collection, see `Heap::collect`.
        unsafe { self.0.as_ref() }
    }

    /// Runtime type of the object, `None` for null
    pub fn runtime_type(&self) -> Option<TypeHandle> {
        self.header().map(|h| h.ty().clone())
    }

    /// Runtime type id of the object, `None` for null
    pub fn type_id(&self) -> Option<TypeId> {
        self.header().map(|h| h.ty().id())
    }

    /// Runtime type name, `"null"` for null
    pub fn type_name(&self) -> String {
        self.header()
            .map(|h| h.ty().name().to_string())
            .unwrap_or_else(|| "null".to_string())
    }

    /// Address of the payload, null for null
    #[inline]
    pub fn payload(&self) -> *mut u8 {
        if self.is_null() {
            return ptr::null_mut();
        }
        // SAFETY: the payload directly follows the header in the same allocation.
        unsafe { (self.0 as *mut u8).add(HEADER_SIZE) }
    }

    /// Payload capacity in bytes, 0 for null
    pub fn payload_size(&self) -> usize {
        self.header().map(|h| h.payload_size()).unwrap_or(0)
    }

    /// Whether `addr` falls inside this object's payload
    pub fn contains_address(&self, addr: *const u8) -> bool {
        let start = self.payload() as usize;
        !self.is_null() && (addr as usize) >= start && (addr as usize) < start + self.payload_size()
    }

    /// Read a boxed value of Rust type `T`.
    ///
    /// Returns `None` for null or when the runtime type is not `T`.
    pub fn unbox<T: Copy + 'static>(&self) -> Option<T> {
        let header = self.header()?;
        if !header.ty().is_rust_type::<T>() {
            return None;
        }
        // SAFETY: the runtime type was registered from `T`, so the payload
        // holds a valid, aligned `T`.
        Some(unsafe { ptr::read(self.payload() as *const T) })
    }

    /// Read a value-typed field of a class instance
    pub fn field<T: Copy + 'static>(&self, name: &str) -> Option<T> {
        let header = self.header()?;
        let field = header.ty().field(name)?;
        if !field.ty().is_rust_type::<T>() {
            return None;
        }
        // SAFETY: field offsets lie within the payload and match the field type.
        Some(unsafe { ptr::read(self.payload().add(field.offset()) as *const T) })
    }

    /// Write a value-typed field of a class instance; false if the field is
    /// missing or not of type `T`
    pub fn set_field<T: Copy + 'static>(&self, name: &str, value: T) -> bool {
        let Some(header) = self.header() else {
            return false;
        };
        let Some(field) = header.ty().field(name) else {
            return false;
        };
        if !field.ty().is_rust_type::<T>() {
            return false;
        }
        // SAFETY: see `field`.
        unsafe { ptr::write(self.payload().add(field.offset()) as *mut T, value) };
        true
    }

    /// Read a reference-typed field of a class instance
    pub fn field_object(&self, name: &str) -> Option<ObjectRef> {
        let header = self.header()?;
        let field = header.ty().field(name)?;
        if !field.ty().is_reference_type() {
            return None;
        }
        // SAFETY: reference fields hold an `ObjectRef` at their offset.
        Some(unsafe { ptr::read(self.payload().add(field.offset()) as *const ObjectRef) })
    }

    /// Write a reference-typed field of a class instance; false if the field is
    /// missing, not a reference, or `value` is not assignable to it
    pub fn set_field_object(&self, name: &str, value: ObjectRef) -> bool {
        let Some(header) = self.header() else {
            return false;
        };
        let Some(field) = header.ty().field(name) else {
            return false;
        };
        if !field.ty().is_reference_type() {
            return false;
        }
        if let Some(ty) = value.runtime_type() {
            if !field.ty().is_assignable_from(&ty) {
                return false;
            }
        }
        // SAFETY: see `field_object`.
        unsafe { ptr::write(self.payload().add(field.offset()) as *mut ObjectRef, value) };
        true
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("ObjectRef(null)")
        } else {
            write!(f, "ObjectRef({:p}: {})", self.0, self.type_name())
        }
    }
}
