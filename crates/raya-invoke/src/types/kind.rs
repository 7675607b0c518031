//! Per-parameter marshaling kinds
//!
//! Classifying a parameter type once up front lets the invoker and the
//! compiled trampolines pick the right slot access without re-inspecting
//! type metadata on every call.

use super::descriptor::{TypeDescriptor, TypeKind};

/// How the referenced storage of a by-ref or pointer parameter is shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// A non-nullable value type
    Value,
    /// `Nullable<T>` storage
    Nullable,
    /// A managed reference
    Reference,
}

impl SlotKind {
    fn of(ty: &TypeDescriptor) -> Self {
        match ty.kind() {
            TypeKind::Nullable(_) => SlotKind::Nullable,
            TypeKind::Class => SlotKind::Reference,
            _ => SlotKind::Value,
        }
    }
}

/// Marshaling kind of a parameter or return type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// Value type passed by value
    Value,
    /// `Nullable<T>` passed by value
    Nullable,
    /// Managed reference passed by value
    Reference,
    /// `T&`
    ByRef(SlotKind),
    /// `T*`
    Pointer(SlotKind),
}

impl ParameterKind {
    /// Classify a parameter type. `Void` classifies as `Value`; use
    /// [`ParameterKind::classify_return`] for return types.
    pub fn classify(ty: &TypeDescriptor) -> Self {
        match ty.kind() {
            TypeKind::ByRef(elem) => ParameterKind::ByRef(SlotKind::of(elem)),
            TypeKind::Pointer(elem) => ParameterKind::Pointer(SlotKind::of(elem)),
            TypeKind::Nullable(_) => ParameterKind::Nullable,
            TypeKind::Class => ParameterKind::Reference,
            TypeKind::Void | TypeKind::Primitive(_) | TypeKind::Struct => ParameterKind::Value,
        }
    }

    /// Classify a return type; `None` for `Void`
    pub fn classify_return(ty: &TypeDescriptor) -> Option<Self> {
        if ty.is_void() {
            None
        } else {
            Some(Self::classify(ty))
        }
    }

    /// Whether this kind forces the raw-address calling shape
    pub fn needs_by_ref(&self) -> bool {
        !matches!(self, ParameterKind::Value | ParameterKind::Reference)
    }

    /// Whether the final value must be written back to the caller after the call
    pub fn needs_copy_back(&self) -> bool {
        matches!(self, ParameterKind::ByRef(_))
    }

    /// Whether the storage behind the slot is a value type
    pub fn is_value_type(&self) -> bool {
        !matches!(
            self,
            ParameterKind::Reference | ParameterKind::ByRef(SlotKind::Reference)
        )
    }

    /// Shape of the storage the slot address points at
    pub fn slot_kind(&self) -> SlotKind {
        match self {
            ParameterKind::Value => SlotKind::Value,
            ParameterKind::Nullable => SlotKind::Nullable,
            ParameterKind::Reference => SlotKind::Reference,
            ParameterKind::ByRef(kind) | ParameterKind::Pointer(kind) => *kind,
        }
    }
}
