//! Closure-specialized trampolines
//!
//! Classifies a method's parameters once at compile time and captures the
//! result, so each call skips straight to the body with a ready frame.
//! Always available, which makes it the default compiler and the fallback
//! for methods the native-thunk compiler cannot handle.

use std::sync::Arc;

use super::traits::*;
use crate::error::Exception;
use crate::gc::Heap;
use crate::invoke::{FrameMode, FrameSlots};
use crate::method::{CallFrame, MethodDescriptor};
use crate::types::ParameterKind;

/// A method with its marshaling kinds precomputed
struct CallPlan {
    method: Arc<MethodDescriptor>,
    kinds: Arc<[ParameterKind]>,
    return_kind: Option<ParameterKind>,
}

impl CallPlan {
    fn new(method: &Arc<MethodDescriptor>) -> Self {
        Self {
            method: method.clone(),
            kinds: method.parameter_kinds().collect(),
            return_kind: ParameterKind::classify_return(method.return_type()),
        }
    }

    #[inline]
    fn run(&self, heap: &Heap, slots: FrameSlots<'_>, mode: FrameMode) -> Result<(), Exception> {
        let mut frame = CallFrame::new(heap, &self.method, &self.kinds, self.return_kind, slots, mode);
        (self.method.body())(&mut frame)
    }
}

/// Compiles trampolines as specialized closures
#[derive(Debug, Default, Clone, Copy)]
pub struct SpecializingCompiler;

impl InvokerCompiler for SpecializingCompiler {
    fn name(&self) -> &str {
        "specialized"
    }

    fn compile(&self, method: &Arc<MethodDescriptor>, shape: TrampolineShape) -> Result<CompiledInvoker, CompileError> {
        let plan = CallPlan::new(method);
        tracing::trace!(method = %method, ?shape, "jit: specialized trampoline built");
        let mode = shape.frame_mode();
        Ok(CompiledInvoker::new(
            shape,
            Arc::new(move |heap, slots| plan.run(heap, slots, mode)),
        ))
    }
}
