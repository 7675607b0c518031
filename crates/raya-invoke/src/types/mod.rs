//! Runtime type system
//!
//! A deliberately small type model: primitives, user value types backed by
//! Rust structs, classes with fields, and the derived by-ref, pointer and
//! nullable types the invocation engine has to marshal.

mod descriptor;
mod kind;
mod primitive;
mod registry;

pub use descriptor::{FieldInfo, TypeDescriptor, TypeHandle, TypeId, TypeKind};
pub use kind::{ParameterKind, SlotKind};
pub use primitive::{Char16, PrimitiveKind, PrimitiveValue};
pub use registry::TypeRegistry;

/// Size of a managed reference slot
pub const REFERENCE_SIZE: usize = std::mem::size_of::<usize>();

/// Round `n` up to a multiple of `align` (a power of two, or zero/one for no-op)
pub(crate) fn align_up(n: usize, align: usize) -> usize {
    if align <= 1 {
        return n;
    }
    (n + align - 1) & !(align - 1)
}
