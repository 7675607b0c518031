//! Raya Late-Bound Method Invocation
//!
//! Invokes methods through reflection metadata without compile-time knowledge
//! of their signatures:
//! - **Invoker**: one reusable [`MethodInvoker`] per method; the first call runs
//!   interpreted, later calls switch to a compiled trampoline when available
//!   (`invoke` module)
//! - **Context**: [`InvokeContext`] binds target, arguments and return
//!   location over GC-visible slot arrays (`invoke` module)
//! - **Compilers**: specialized closures, Cranelift native thunks, or none
//!   (`jit` module)
//! - **Heap**: managed objects with a relocating collector and scoped root
//!   registration (`gc` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use raya_invoke::{BindingFlags, Runtime};
//!
//! let runtime = Runtime::new();
//! let types = runtime.types();
//! let int32 = types.primitive(PrimitiveKind::Int32).clone();
//!
//! let add = types
//!     .method("Add", types.object())
//!     .param("a", &int32)
//!     .param("b", &int32)
//!     .returns(&int32)
//!     .body(|frame| {
//!         let sum = frame.arg::<i32>(0)? + frame.arg::<i32>(1)?;
//!         frame.set_return(sum)
//!     })
//!     .build()?;
//!
//! let heap = runtime.heap();
//! let invoker = runtime.get_invoker(&add);
//! let mut args = [heap.box_value(2i32)?, heap.box_value(3i32)?];
//! let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT)?;
//! assert_eq!(result.unbox::<i32>(), Some(5));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Configuration: `[invoke]` TOML table and `RAYA_INVOKE_*` overrides
pub mod config;

/// Error types: invocation, heap, type and configuration errors
pub mod error;

/// Managed heap, relocating collector and root registration
pub mod gc;

/// Invokers, invocation contexts and argument storage
pub mod invoke;

/// Trampoline compilers
pub mod jit;

/// Method descriptors and call frames
pub mod method;

/// Runtime bundling heap, types, compiler and invokers
pub mod runtime;

/// Type descriptors and registry
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{InvokeConfig, StrategyOverride};
pub use error::{ConfigError, ErrorCategory, Exception, ExceptionKind, HeapError, InvokeError, InvokeResult, TypeError};
pub use gc::{Heap, ObjectRef, RootKind, RootScope};
pub use invoke::{ArgumentStorage, BindingFlags, InvokeContext, InvokerRegistry, MethodInvoker, Strategy};
pub use jit::{CompileError, InvokerCompiler, SpecializingCompiler, StubCompiler, TrampolineShape};
pub use method::{CallFrame, MethodBuilder, MethodDescriptor, MethodId, NativeEntry};
pub use runtime::Runtime;
pub use types::{ParameterKind, PrimitiveKind, PrimitiveValue, TypeHandle, TypeRegistry};
