//! Stub compiler for hosts without dynamic code generation
//!
//! Every compilation reports [`CompileError::Unsupported`], so invokers
//! settle on interpretation after their second call.

use std::sync::Arc;

use super::traits::*;
use crate::method::MethodDescriptor;

/// A compiler that never produces code
pub struct StubCompiler;

impl InvokerCompiler for StubCompiler {
    fn name(&self) -> &str {
        "stub"
    }

    fn compile(&self, method: &Arc<MethodDescriptor>, _shape: TrampolineShape) -> Result<CompiledInvoker, CompileError> {
        Err(CompileError::Unsupported(format!(
            "dynamic code is disabled (method '{}')",
            method.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRegistry;

    #[test]
    fn test_stub_is_unsupported() {
        let types = TypeRegistry::new();
        let method = types.method("Noop", types.object()).body(|_| Ok(())).build().unwrap();
        let err = StubCompiler.compile(&method, TrampolineShape::Boxed).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(StubCompiler.name(), "stub");
    }
}
