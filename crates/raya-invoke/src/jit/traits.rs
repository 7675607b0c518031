//! Compiler capability for invoker trampolines
//!
//! An [`InvokerCompiler`] turns a method into a [`CompiledInvoker`]: a
//! trampoline specialized to the method's parameter kinds that reads and
//! writes the prepared slots directly. Compilers are pluggable; the invoker
//! falls back to interpretation whenever compilation is unavailable.

use std::fmt;
use std::sync::Arc;

use crate::error::Exception;
use crate::gc::Heap;
use crate::invoke::{FrameMode, FrameSlots};
use crate::method::MethodDescriptor;

/// Calling shape a trampoline is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrampolineShape {
    /// Values passed as boxed objects; returns the boxed result
    Boxed,
    /// Values passed through raw slot addresses
    ByRef,
}

impl TrampolineShape {
    /// Both shapes
    pub const ALL: [TrampolineShape; 2] = [TrampolineShape::Boxed, TrampolineShape::ByRef];

    /// Slot addressing used by this shape
    pub fn frame_mode(self) -> FrameMode {
        match self {
            TrampolineShape::Boxed => FrameMode::Boxed,
            TrampolineShape::ByRef => FrameMode::ByRef,
        }
    }

    /// Stable index (0 or 1)
    pub fn index(self) -> usize {
        match self {
            TrampolineShape::Boxed => 0,
            TrampolineShape::ByRef => 1,
        }
    }
}

/// Trampoline body. Results are left in the prepared return slot.
pub type Trampoline = Arc<dyn Fn(&Heap, FrameSlots<'_>) -> Result<(), Exception> + Send + Sync>;

/// A compiled trampoline for one calling shape
#[derive(Clone)]
pub struct CompiledInvoker {
    shape: TrampolineShape,
    code: Trampoline,
}

impl CompiledInvoker {
    /// Wrap `code` compiled for `shape`
    pub fn new(shape: TrampolineShape, code: Trampoline) -> Self {
        Self { shape, code }
    }

    /// Shape this trampoline was compiled for
    pub fn shape(&self) -> TrampolineShape {
        self.shape
    }

    /// Run the trampoline over prepared slots
    pub fn call(&self, heap: &Heap, slots: FrameSlots<'_>) -> Result<(), Exception> {
        (self.code)(heap, slots)
    }
}

impl fmt::Debug for CompiledInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompiledInvoker::{:?}", self.shape())
    }
}

/// Error during trampoline compilation
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CompileError {
    /// Dynamic code generation is unavailable
    #[error("Dynamic code generation is not supported: {0}")]
    Unsupported(String),
    /// The method cannot be compiled in the requested shape
    #[error("Method '{method}' cannot be compiled for the {shape:?} shape")]
    UnsupportedShape {
        /// Method name
        method: String,
        /// Requested shape
        shape: TrampolineShape,
    },
    /// The code generator failed
    #[error("Backend error: {0}")]
    Backend(String),
}

impl CompileError {
    /// Whether this error only means "no compiler here", as opposed to a
    /// failure worth reporting
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CompileError::Unsupported(_))
    }
}

/// Pluggable trampoline compiler
pub trait InvokerCompiler: Send + Sync {
    /// Compiler name (for diagnostics)
    fn name(&self) -> &str;

    /// Compile a trampoline for `method` in `shape`
    fn compile(&self, method: &Arc<MethodDescriptor>, shape: TrampolineShape) -> Result<CompiledInvoker, CompileError>;
}
