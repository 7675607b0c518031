//! Invocation runtime
//!
//! Bundles a type registry, a heap, the compiler and the shared invoker
//! registry under one configuration.

use std::sync::Arc;

use crate::config::InvokeConfig;
use crate::error::ConfigError;
use crate::gc::Heap;
use crate::invoke::{InvokerRegistry, MethodInvoker};
use crate::jit::{self, InvokerCompiler, StubCompiler};
use crate::method::{MethodDescriptor, MethodId};
use crate::types::TypeRegistry;

/// Scoped owner of everything an invocation needs
pub struct Runtime {
    types: Arc<TypeRegistry>,
    heap: Arc<Heap>,
    compiler: Arc<dyn InvokerCompiler>,
    invokers: InvokerRegistry,
    config: InvokeConfig,
}

impl Runtime {
    /// Create a runtime with the default configuration
    pub fn new() -> Self {
        Self::with_config(InvokeConfig::default())
    }

    /// Create a runtime from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::with_config(InvokeConfig::from_env()?))
    }

    /// Create a runtime with `config`.
    ///
    /// With `dynamic_code` off every invoker stays interpreted.
    pub fn with_config(config: InvokeConfig) -> Self {
        let compiler: Arc<dyn InvokerCompiler> = if config.dynamic_code {
            jit::default_compiler()
        } else {
            Arc::new(StubCompiler)
        };
        Self::with_compiler(config, compiler)
    }

    /// Create a runtime with an explicit compiler
    pub fn with_compiler(config: InvokeConfig, compiler: Arc<dyn InvokerCompiler>) -> Self {
        let types = Arc::new(TypeRegistry::new());
        let heap = Arc::new(Heap::with_limit(types.clone(), config.max_heap_bytes));
        let policy = config.strategy_override();
        let invokers = InvokerRegistry::new(heap.clone(), compiler.clone(), policy);

        tracing::debug!(
            compiler = compiler.name(),
            ?policy,
            max_heap_bytes = config.max_heap_bytes,
            "invoke runtime created"
        );

        Self {
            types,
            heap,
            compiler,
            invokers,
            config,
        }
    }

    /// Type registry
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Managed heap
    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    /// Trampoline compiler
    pub fn compiler(&self) -> &Arc<dyn InvokerCompiler> {
        &self.compiler
    }

    /// Shared invoker registry
    pub fn invokers(&self) -> &InvokerRegistry {
        &self.invokers
    }

    /// Active configuration
    pub fn config(&self) -> &InvokeConfig {
        &self.config
    }

    /// Shared invoker for `method`
    pub fn get_invoker(&self, method: &Arc<MethodDescriptor>) -> Arc<MethodInvoker> {
        self.invokers.get_invoker(method)
    }

    /// Existing invoker for a method id
    pub fn invoker(&self, id: MethodId) -> Option<Arc<MethodInvoker>> {
        self.invokers.get(id)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("compiler", &self.compiler.name())
            .field("invokers", &self.invokers.count())
            .field("config", &self.config)
            .finish()
    }
}
