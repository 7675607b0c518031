//! Runtime type descriptors
//!
//! A [`TypeDescriptor`] carries just enough metadata for the invocation engine
//! to marshal values: the type's kind, its payload layout, its element type
//! for derived types, and the offsets of managed references inside class
//! instances so the collector can trace them.

use std::any::TypeId as RustTypeId;
use std::fmt;
use std::sync::Arc;

use super::primitive::PrimitiveKind;

/// Shared handle to a registered type
pub type TypeHandle = Arc<TypeDescriptor>;

/// Unique type identifier, assigned by the registry in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub(crate) const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw numeric id
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// What shape of type a descriptor describes
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// The `Void` return type
    Void,
    /// A primitive value type
    Primitive(PrimitiveKind),
    /// A user value type registered from a Rust struct
    Struct,
    /// A reference type (`Object`, `Missing`, user classes)
    Class,
    /// `Nullable<T>` over a non-nullable value type
    Nullable(TypeHandle),
    /// A by-reference type `T&`
    ByRef(TypeHandle),
    /// An unmanaged pointer type `T*`
    Pointer(TypeHandle),
}

/// A named field of a class
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub(crate) name: String,
    pub(crate) ty: TypeHandle,
    pub(crate) offset: usize,
}

impl FieldInfo {
    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared field type
    pub fn ty(&self) -> &TypeHandle {
        &self.ty
    }

    /// Byte offset inside the instance payload
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Runtime type metadata
pub struct TypeDescriptor {
    pub(crate) id: TypeId,
    pub(crate) name: String,
    pub(crate) kind: TypeKind,
    pub(crate) size: usize,
    pub(crate) align: usize,
    pub(crate) rust_type: Option<RustTypeId>,
    pub(crate) base: Option<TypeHandle>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) ref_offsets: Vec<usize>,
}

impl TypeDescriptor {
    /// Type id
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Type name (`Int32`, `Point`, `Int32&`, `Nullable<Int32>`, ...)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type kind
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Payload size in bytes. For classes this is the instance field block.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Payload alignment in bytes
    pub fn align(&self) -> usize {
        self.align
    }

    /// Value types are stored inline and boxed when viewed as objects
    pub fn is_value_type(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Primitive(_) | TypeKind::Struct | TypeKind::Nullable(_)
        )
    }

    /// Reference (class) types
    pub fn is_reference_type(&self) -> bool {
        matches!(self.kind, TypeKind::Class)
    }

    /// `T&`
    pub fn is_by_ref(&self) -> bool {
        matches!(self.kind, TypeKind::ByRef(_))
    }

    /// `T*`
    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer(_))
    }

    /// `Nullable<T>`
    pub fn is_nullable(&self) -> bool {
        matches!(self.kind, TypeKind::Nullable(_))
    }

    /// `Void`
    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    /// The primitive kind, if this is a primitive
    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self.kind {
            TypeKind::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    /// Whether this is `IntPtr` or `UIntPtr`
    pub fn is_native_int(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Primitive(PrimitiveKind::IntPtr) | TypeKind::Primitive(PrimitiveKind::UIntPtr)
        )
    }

    /// Element type of a by-ref, pointer, or nullable type
    pub fn element_type(&self) -> Option<&TypeHandle> {
        match &self.kind {
            TypeKind::ByRef(elem) | TypeKind::Pointer(elem) | TypeKind::Nullable(elem) => Some(elem),
            _ => None,
        }
    }

    /// Base class, if any
    pub fn base_type(&self) -> Option<&TypeHandle> {
        self.base.as_ref()
    }

    /// Instance fields, base class fields first
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Payload offsets holding managed references (classes only)
    pub fn ref_offsets(&self) -> &[usize] {
        &self.ref_offsets
    }

    /// Whether values of this type have the in-memory representation of `T`
    pub fn is_rust_type<T: 'static>(&self) -> bool {
        self.rust_type == Some(RustTypeId::of::<T>())
    }

    /// Offset of the value inside `Nullable<T>` storage.
    ///
    /// Nullable storage is a `has_value` byte at offset 0 followed by the
    /// underlying value at its natural alignment.
    pub fn nullable_value_offset(&self) -> Option<usize> {
        match &self.kind {
            TypeKind::Nullable(elem) => Some(super::align_up(1, elem.align)),
            _ => None,
        }
    }

    /// Identity comparison
    pub fn same_as(&self, other: &TypeDescriptor) -> bool {
        self.id == other.id
    }

    /// Whether a value of type `other` may be stored in a location of this type.
    ///
    /// Every type is assignable to `Object` (value types by boxing). Class
    /// types are assignable along the base-class chain.
    pub fn is_assignable_from(&self, other: &TypeDescriptor) -> bool {
        if self.same_as(other) {
            return true;
        }
        if self.is_object_root() {
            return !other.is_void() && !other.is_by_ref();
        }
        if !self.is_reference_type() {
            return false;
        }
        let mut current = other.base.as_ref();
        while let Some(base) = current {
            if base.same_as(self) {
                return true;
            }
            current = base.base.as_ref();
        }
        false
    }

    fn is_object_root(&self) -> bool {
        self.id == super::registry::OBJECT_TYPE_ID
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
