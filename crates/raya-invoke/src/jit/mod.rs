//! Trampoline compilers
//!
//! - [`SpecializingCompiler`]: closures specialized per method (always available)
//! - [`CraneliftCompiler`]: native call thunks for methods with a native entry
//!   (requires the `jit` feature)
//! - [`StubCompiler`]: no dynamic code; every invoker stays interpreted

pub mod specialized;
pub mod stub;
pub mod traits;

#[cfg(feature = "jit")]
pub mod cranelift;

pub use specialized::SpecializingCompiler;
pub use stub::StubCompiler;
pub use traits::{CompileError, CompiledInvoker, InvokerCompiler, Trampoline, TrampolineShape};

#[cfg(feature = "jit")]
pub use cranelift::CraneliftCompiler;

use std::sync::Arc;

/// Default compiler for this build: native thunks when the `jit` feature is
/// enabled and the host ISA is usable, specialized closures otherwise
pub fn default_compiler() -> Arc<dyn InvokerCompiler> {
    #[cfg(feature = "jit")]
    {
        match CraneliftCompiler::host() {
            Ok(compiler) => return Arc::new(compiler),
            Err(e) => tracing::warn!(error = %e, "jit: native thunks unavailable, using specialized trampolines"),
        }
    }
    Arc::new(SpecializingCompiler)
}
