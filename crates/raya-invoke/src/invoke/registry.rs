//! Shared registry of method invokers
//!
//! Hands out one [`MethodInvoker`] per method so the strategy state and
//! compiled trampolines are shared by every caller.

use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use super::invoker::MethodInvoker;
use crate::config::StrategyOverride;
use crate::gc::Heap;
use crate::jit::InvokerCompiler;
use crate::method::{MethodDescriptor, MethodId};

/// Registry of invokers keyed by method id. Append-only: an invoker lives
/// as long as the registry.
pub struct InvokerRegistry {
    invokers: DashMap<MethodId, Arc<MethodInvoker>, FxBuildHasher>,
    heap: Arc<Heap>,
    compiler: Arc<dyn InvokerCompiler>,
    policy: StrategyOverride,
}

impl InvokerRegistry {
    /// Create an empty registry whose invokers use `heap` and `compiler`
    pub fn new(heap: Arc<Heap>, compiler: Arc<dyn InvokerCompiler>, policy: StrategyOverride) -> Self {
        Self {
            invokers: DashMap::with_hasher(FxBuildHasher),
            heap,
            compiler,
            policy,
        }
    }

    /// Invoker for `method`, created on first request
    pub fn get_invoker(&self, method: &Arc<MethodDescriptor>) -> Arc<MethodInvoker> {
        self.invokers
            .entry(method.id())
            .or_insert_with(|| {
                Arc::new(MethodInvoker::new(
                    method.clone(),
                    self.heap.clone(),
                    self.compiler.clone(),
                    self.policy,
                ))
            })
            .clone()
    }

    /// Get an existing invoker by method id
    pub fn get(&self, id: MethodId) -> Option<Arc<MethodInvoker>> {
        self.invokers.get(&id).map(|entry| entry.clone())
    }

    /// Number of registered invokers
    pub fn count(&self) -> usize {
        self.invokers.len()
    }

    /// Strategy override applied to new invokers
    pub fn policy(&self) -> StrategyOverride {
        self.policy
    }
}
