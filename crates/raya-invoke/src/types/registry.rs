//! Type registry
//!
//! Owns every [`TypeDescriptor`] known to a runtime. Builtins are created
//! eagerly; user value types and classes are registered explicitly; derived
//! `T&`, `T*` and `Nullable<T>` types are created on demand and cached per
//! element type.

use std::any::TypeId as RustTypeId;
use std::mem;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::descriptor::{FieldInfo, TypeDescriptor, TypeHandle, TypeId, TypeKind};
use super::primitive::{Char16, PrimitiveKind};
use super::{align_up, REFERENCE_SIZE};
use crate::error::TypeError;
use crate::method::MethodBuilder;

pub(crate) const OBJECT_TYPE_ID: TypeId = TypeId::new(0);
const MAX_VALUE_ALIGN: usize = 8;

/// Registry of runtime types
pub struct TypeRegistry {
    builtins: Builtins,
    inner: RwLock<RegistryInner>,
}

struct Builtins {
    object: TypeHandle,
    void: TypeHandle,
    missing: TypeHandle,
    primitives: Vec<TypeHandle>,
}

#[derive(Default)]
struct RegistryInner {
    types: Vec<TypeHandle>,
    by_name: FxHashMap<String, TypeHandle>,
    by_rust: FxHashMap<RustTypeId, TypeHandle>,
    by_refs: FxHashMap<TypeId, TypeHandle>,
    pointers: FxHashMap<TypeId, TypeHandle>,
    nullables: FxHashMap<TypeId, TypeHandle>,
}

impl RegistryInner {
    fn next_id(&self) -> TypeId {
        TypeId::new(self.types.len() as u32)
    }

    fn insert(&mut self, descriptor: TypeDescriptor) -> TypeHandle {
        let handle = Arc::new(descriptor);
        self.types.push(handle.clone());
        self.by_name.insert(handle.name.clone(), handle.clone());
        if let Some(rust) = handle.rust_type {
            self.by_rust.insert(rust, handle.clone());
        }
        handle
    }
}

fn primitive_rust_type(kind: PrimitiveKind) -> RustTypeId {
    match kind {
        PrimitiveKind::Boolean => RustTypeId::of::<bool>(),
        PrimitiveKind::Char => RustTypeId::of::<Char16>(),
        PrimitiveKind::SByte => RustTypeId::of::<i8>(),
        PrimitiveKind::Byte => RustTypeId::of::<u8>(),
        PrimitiveKind::Int16 => RustTypeId::of::<i16>(),
        PrimitiveKind::UInt16 => RustTypeId::of::<u16>(),
        PrimitiveKind::Int32 => RustTypeId::of::<i32>(),
        PrimitiveKind::UInt32 => RustTypeId::of::<u32>(),
        PrimitiveKind::Int64 => RustTypeId::of::<i64>(),
        PrimitiveKind::UInt64 => RustTypeId::of::<u64>(),
        PrimitiveKind::Single => RustTypeId::of::<f32>(),
        PrimitiveKind::Double => RustTypeId::of::<f64>(),
        PrimitiveKind::IntPtr => RustTypeId::of::<isize>(),
        PrimitiveKind::UIntPtr => RustTypeId::of::<usize>(),
    }
}

fn class_descriptor(id: TypeId, name: &str, base: Option<TypeHandle>) -> TypeDescriptor {
    TypeDescriptor {
        id,
        name: name.to_string(),
        kind: TypeKind::Class,
        size: 0,
        align: REFERENCE_SIZE,
        rust_type: None,
        base,
        fields: Vec::new(),
        ref_offsets: Vec::new(),
    }
}

impl TypeRegistry {
    /// Create a registry holding the builtin types
    pub fn new() -> Self {
        let mut inner = RegistryInner::default();

        let object = inner.insert(class_descriptor(OBJECT_TYPE_ID, "Object", None));
        let void = inner.insert(TypeDescriptor {
            id: inner.next_id(),
            name: "Void".to_string(),
            kind: TypeKind::Void,
            size: 0,
            align: 1,
            rust_type: Some(RustTypeId::of::<()>()),
            base: None,
            fields: Vec::new(),
            ref_offsets: Vec::new(),
        });
        let missing_id = inner.next_id();
        let missing = inner.insert(class_descriptor(missing_id, "Missing", Some(object.clone())));

        let primitives = PrimitiveKind::ALL
            .iter()
            .map(|&kind| {
                let descriptor = TypeDescriptor {
                    id: inner.next_id(),
                    name: kind.name().to_string(),
                    kind: TypeKind::Primitive(kind),
                    size: kind.size(),
                    align: kind.size(),
                    rust_type: Some(primitive_rust_type(kind)),
                    base: Some(object.clone()),
                    fields: Vec::new(),
                    ref_offsets: Vec::new(),
                };
                inner.insert(descriptor)
            })
            .collect();

        Self {
            builtins: Builtins {
                object,
                void,
                missing,
                primitives,
            },
            inner: RwLock::new(inner),
        }
    }

    /// `Object`, the root of the class hierarchy
    pub fn object(&self) -> &TypeHandle {
        &self.builtins.object
    }

    /// `Void`
    pub fn void(&self) -> &TypeHandle {
        &self.builtins.void
    }

    /// The type of the "argument omitted" sentinel
    pub fn missing(&self) -> &TypeHandle {
        &self.builtins.missing
    }

    /// A builtin primitive type
    pub fn primitive(&self, kind: PrimitiveKind) -> &TypeHandle {
        let index = PrimitiveKind::ALL
            .iter()
            .position(|&k| k == kind)
            .unwrap_or_default();
        &self.builtins.primitives[index]
    }

    /// The type registered for Rust type `T`, if any
    pub fn of<T: 'static>(&self) -> Option<TypeHandle> {
        self.inner.read().by_rust.get(&RustTypeId::of::<T>()).cloned()
    }

    /// Look up a type by name
    pub fn get(&self, name: &str) -> Option<TypeHandle> {
        self.inner.read().by_name.get(name).cloned()
    }

    /// Look up a type by id
    pub fn get_by_id(&self, id: TypeId) -> Option<TypeHandle> {
        self.inner.read().types.get(id.as_u32() as usize).cloned()
    }

    /// Number of registered types, including builtins and derived types
    pub fn len(&self) -> usize {
        self.inner.read().types.len()
    }

    /// Always false: builtins are registered at construction
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Register a user value type whose payload is the Rust type `T`.
    ///
    /// `T` must be plain data (`#[repr(C)]` or primitive-only). Value types
    /// never hold managed references.
    pub fn register_value_type<T: Copy + 'static>(&self, name: &str) -> Result<TypeHandle, TypeError> {
        let align = mem::align_of::<T>();
        if align > MAX_VALUE_ALIGN {
            return Err(TypeError::UnsupportedAlignment {
                name: name.to_string(),
                align,
            });
        }

        let mut inner = self.inner.write();
        if inner.by_name.contains_key(name) {
            return Err(TypeError::DuplicateName(name.to_string()));
        }
        if inner.by_rust.contains_key(&RustTypeId::of::<T>()) {
            return Err(TypeError::DuplicateRustType(std::any::type_name::<T>()));
        }

        let descriptor = TypeDescriptor {
            id: inner.next_id(),
            name: name.to_string(),
            kind: TypeKind::Struct,
            size: mem::size_of::<T>(),
            align,
            rust_type: Some(RustTypeId::of::<T>()),
            base: Some(self.builtins.object.clone()),
            fields: Vec::new(),
            ref_offsets: Vec::new(),
        };
        Ok(inner.insert(descriptor))
    }

    /// Register a class with the given fields.
    ///
    /// Base class fields come first; new fields are laid out in declaration
    /// order at their natural alignment. Reference-typed fields are recorded
    /// so the collector can trace them.
    pub fn register_class(
        &self,
        name: &str,
        base: Option<&TypeHandle>,
        fields: &[(&str, &TypeHandle)],
    ) -> Result<TypeHandle, TypeError> {
        let base = base.unwrap_or(&self.builtins.object).clone();
        if !base.is_reference_type() {
            return Err(TypeError::InvalidBaseType {
                name: name.to_string(),
                base: base.name.clone(),
            });
        }

        let mut layout = base.fields.clone();
        let mut ref_offsets = base.ref_offsets.clone();
        let mut offset = base.size;
        let mut align = base.align.max(REFERENCE_SIZE);

        for &(field_name, ty) in fields {
            let (size, field_align) = if ty.is_reference_type() {
                (REFERENCE_SIZE, REFERENCE_SIZE)
            } else if ty.is_value_type() || ty.is_pointer() {
                (ty.size, ty.align)
            } else {
                return Err(TypeError::InvalidFieldType {
                    field: field_name.to_string(),
                    type_name: ty.name.clone(),
                });
            };

            offset = align_up(offset, field_align);
            if ty.is_reference_type() {
                ref_offsets.push(offset);
            }
            layout.push(FieldInfo {
                name: field_name.to_string(),
                ty: ty.clone(),
                offset,
            });
            offset += size;
            align = align.max(field_align);
        }

        let mut inner = self.inner.write();
        if inner.by_name.contains_key(name) {
            return Err(TypeError::DuplicateName(name.to_string()));
        }
        let descriptor = TypeDescriptor {
            id: inner.next_id(),
            name: name.to_string(),
            kind: TypeKind::Class,
            size: align_up(offset, align),
            align,
            rust_type: None,
            base: Some(base),
            fields: layout,
            ref_offsets,
        };
        Ok(inner.insert(descriptor))
    }

    /// Start building a method declared on `declaring_type`
    pub fn method(&self, name: impl Into<String>, declaring_type: &TypeHandle) -> MethodBuilder {
        MethodBuilder::new(name, declaring_type, self)
    }

    /// `T&` for the given element type
    pub fn by_ref_of(&self, element: &TypeHandle) -> Result<TypeHandle, TypeError> {
        if element.is_void() || element.is_by_ref() {
            return Err(TypeError::InvalidElementType {
                derived: "by-ref",
                type_name: element.name.clone(),
            });
        }
        self.derived(element, DerivedKind::ByRef)
    }

    /// `T*` for the given element type
    pub fn pointer_of(&self, element: &TypeHandle) -> Result<TypeHandle, TypeError> {
        if element.is_by_ref() || element.is_reference_type() {
            return Err(TypeError::InvalidElementType {
                derived: "pointer",
                type_name: element.name.clone(),
            });
        }
        self.derived(element, DerivedKind::Pointer)
    }

    /// `Nullable<T>` for a non-nullable value type
    pub fn nullable_of(&self, element: &TypeHandle) -> Result<TypeHandle, TypeError> {
        if !element.is_value_type() || element.is_nullable() {
            return Err(TypeError::InvalidElementType {
                derived: "nullable",
                type_name: element.name.clone(),
            });
        }
        self.derived(element, DerivedKind::Nullable)
    }

    fn derived(&self, element: &TypeHandle, derived: DerivedKind) -> Result<TypeHandle, TypeError> {
        let cached = {
            let inner = self.inner.read();
            derived.cache(&inner).get(&element.id).cloned()
        };
        if let Some(handle) = cached {
            return Ok(handle);
        }

        let mut inner = self.inner.write();
        // Another thread may have won the race between the two locks.
        if let Some(handle) = derived.cache(&inner).get(&element.id) {
            return Ok(handle.clone());
        }

        let (name, kind, size, align) = match derived {
            DerivedKind::ByRef => (
                format!("{}&", element.name),
                TypeKind::ByRef(element.clone()),
                REFERENCE_SIZE,
                REFERENCE_SIZE,
            ),
            DerivedKind::Pointer => (
                format!("{}*", element.name),
                TypeKind::Pointer(element.clone()),
                REFERENCE_SIZE,
                REFERENCE_SIZE,
            ),
            DerivedKind::Nullable => {
                let align = element.align.max(1);
                let value_offset = align_up(1, align);
                (
                    format!("Nullable<{}>", element.name),
                    TypeKind::Nullable(element.clone()),
                    align_up(value_offset + element.size, align),
                    align,
                )
            }
        };

        let descriptor = TypeDescriptor {
            id: inner.next_id(),
            name,
            kind,
            size,
            align,
            rust_type: None,
            base: None,
            fields: Vec::new(),
            ref_offsets: Vec::new(),
        };
        let handle = inner.insert(descriptor);
        derived.cache_mut(&mut inner).insert(element.id, handle.clone());
        Ok(handle)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
enum DerivedKind {
    ByRef,
    Pointer,
    Nullable,
}

impl DerivedKind {
    fn cache<'a>(&self, inner: &'a RegistryInner) -> &'a FxHashMap<TypeId, TypeHandle> {
        match self {
            DerivedKind::ByRef => &inner.by_refs,
            DerivedKind::Pointer => &inner.pointers,
            DerivedKind::Nullable => &inner.nullables,
        }
    }

    fn cache_mut<'a>(&self, inner: &'a mut RegistryInner) -> &'a mut FxHashMap<TypeId, TypeHandle> {
        match self {
            DerivedKind::ByRef => &mut inner.by_refs,
            DerivedKind::Pointer => &mut inner.pointers,
            DerivedKind::Nullable => &mut inner.nullables,
        }
    }
}
