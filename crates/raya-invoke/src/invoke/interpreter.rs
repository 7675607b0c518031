//! Interpreted dispatch
//!
//! The slow path: classifies every parameter on each call, then runs the
//! body over a fresh frame. Used for the first call of every invoker and
//! whenever compilation is unavailable.

use smallvec::SmallVec;

use super::storage::{FrameMode, FrameSlots};
use crate::error::Exception;
use crate::gc::Heap;
use crate::method::{CallFrame, MethodDescriptor};
use crate::types::ParameterKind;

/// Run `method` over prepared `slots`
pub(crate) fn invoke_method(
    heap: &Heap,
    method: &MethodDescriptor,
    slots: FrameSlots<'_>,
    mode: FrameMode,
) -> Result<(), Exception> {
    let kinds: SmallVec<[ParameterKind; 8]> = method.parameter_kinds().collect();
    let return_kind = ParameterKind::classify_return(method.return_type());
    let mut frame = CallFrame::new(heap, method, &kinds, return_kind, slots, mode);
    (method.body())(&mut frame)
}
