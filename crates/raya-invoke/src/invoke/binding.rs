//! Argument binding for the array-based entry point
//!
//! Turns the caller's `ObjectRef` arguments into slot bindings: omitted
//! arguments take their declared defaults, primitives widen to the
//! parameter type unless exact binding is requested, and by-ref value
//! arguments are copied so the caller's box only changes via copy-back.

use std::cell::Cell;
use std::ops::BitOr;

use super::context::{storage_type, InvokeContext};
use super::invoker::MethodInvoker;
use crate::error::{InvokeError, InvokeResult};
use crate::gc::{Heap, ObjectRef};
use crate::method::{DefaultValue, ParameterInfo};
use crate::types::{ParameterKind, PrimitiveValue, SlotKind, TypeHandle};

/// Invocation option flags (bitflags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BindingFlags(u32);

impl BindingFlags {
    /// Coerce arguments and wrap thrown exceptions
    pub const DEFAULT: Self = Self(0x00);
    /// Surface exceptions thrown by the method as [`InvokeError::Thrown`]
    pub const DO_NOT_WRAP_EXCEPTIONS: Self = Self(0x01);
    /// Require argument types to match exactly (no primitive widening)
    pub const EXACT_BINDING: Self = Self(0x02);

    /// Create from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Get raw bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if all flags in `other` are set
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of flags
    pub const fn union(&self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for BindingFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

fn mismatch(index: usize, expected: &TypeHandle, actual: &str) -> InvokeError {
    InvokeError::ArgumentTypeMismatch {
        index,
        expected: expected.name().to_string(),
        actual: actual.to_string(),
    }
}

/// Underlying value type for nullable storage, the type itself otherwise
fn value_type_of(ty: &TypeHandle) -> &TypeHandle {
    match ty.element_type() {
        Some(elem) if ty.is_nullable() => elem,
        _ => ty,
    }
}

/// Object to bind for an omitted argument
fn default_argument(heap: &Heap, index: usize, param: &ParameterInfo, kind: ParameterKind) -> InvokeResult<ObjectRef> {
    let Some(default) = param.default_value() else {
        return Err(InvokeError::MissingArgument {
            index,
            name: param.name().to_string(),
        });
    };
    let ty = storage_type(param.ty(), kind);
    match default {
        DefaultValue::Null if ty.is_nullable() || matches!(kind, ParameterKind::Pointer(_)) => Ok(ObjectRef::null()),
        DefaultValue::Null => Ok(heap.allocate_default(ty)?),
        DefaultValue::Value(bytes) => Ok(heap.box_bytes(value_type_of(ty), bytes)?),
    }
}

fn coerce_argument(
    heap: &Heap,
    index: usize,
    param: &ParameterInfo,
    kind: ParameterKind,
    arg: ObjectRef,
    flags: BindingFlags,
) -> InvokeResult<ObjectRef> {
    let Some(actual) = arg.runtime_type() else {
        // Null binds as-is; value slots fall back to their default.
        return Ok(arg);
    };
    let ty = storage_type(param.ty(), kind);

    match kind {
        ParameterKind::Reference | ParameterKind::ByRef(SlotKind::Reference) => {
            if ty.is_assignable_from(&actual) {
                Ok(arg)
            } else {
                Err(mismatch(index, ty, actual.name()))
            }
        }
        ParameterKind::Pointer(_) => {
            if actual.is_native_int() || actual.is_pointer() {
                Ok(arg)
            } else {
                Err(mismatch(index, ty, actual.name()))
            }
        }
        ParameterKind::Value | ParameterKind::Nullable | ParameterKind::ByRef(_) => {
            let target = value_type_of(ty);
            if actual.same_as(target) {
                return match kind {
                    ParameterKind::ByRef(_) => Ok(heap.clone_box(arg)?),
                    _ => Ok(arg),
                };
            }
            if flags.contains(BindingFlags::EXACT_BINDING) {
                return Err(mismatch(index, ty, actual.name()));
            }
            let widened = match (actual.primitive(), target.primitive()) {
                (Some(from), Some(to)) if from.can_widen_to(to) => {
                    // SAFETY: `arg` is a live box of the primitive `from`.
                    let value = unsafe { PrimitiveValue::read(from, arg.payload()) };
                    value.widen(to)
                }
                _ => None,
            };
            match widened {
                Some(value) => Ok(heap.box_primitive(value)?),
                None => Err(mismatch(index, ty, actual.name())),
            }
        }
    }
}

/// Coerce `args` and bind them into `ctx`. Omitted arguments are replaced in
/// `args` by the default that was bound.
pub(crate) fn bind_arguments(
    invoker: &MethodInvoker,
    ctx: &InvokeContext<'_>,
    args: &[Cell<ObjectRef>],
    flags: BindingFlags,
) -> InvokeResult<()> {
    let heap = ctx.heap();
    let params = invoker.method().parameters();
    for (index, (param, &kind)) in params.iter().zip(invoker.parameter_kinds()).enumerate() {
        let arg = args[index].get();
        let value = if heap.is_missing(arg) {
            let value = default_argument(heap, index, param, kind)?;
            args[index].set(value);
            value
        } else {
            coerce_argument(heap, index, param, kind, arg, flags)?
        };
        ctx.set_argument(index, value)?;
    }
    Ok(())
}

/// Write the final value of every by-ref argument back into `args`
pub(crate) fn copy_back(invoker: &MethodInvoker, ctx: &InvokeContext<'_>, args: &[Cell<ObjectRef>]) -> InvokeResult<()> {
    for (index, kind) in invoker.parameter_kinds().iter().enumerate() {
        if kind.needs_copy_back() {
            args[index].set(ctx.get_argument(index)?);
        }
    }
    Ok(())
}
