//! Late-bound method invocation
//!
//! - [`ArgumentStorage`] / [`FrameSlots`]: per-call slot arrays, GC-visible
//! - [`InvokeContext`]: caller-managed bindings over the slots
//! - [`MethodInvoker`]: reusable invoker with an interpreted-to-compiled switch
//! - [`InvokerRegistry`]: one shared invoker per method

mod binding;
mod context;
mod interpreter;
mod invoker;
mod registry;
mod storage;
mod strategy;

pub use binding::BindingFlags;
pub use context::InvokeContext;
pub use invoker::MethodInvoker;
pub use registry::InvokerRegistry;
pub use storage::{ArgumentStorage, Binding, FrameMode, FrameSlots, Slot, MAX_INLINE_ARGS};
pub use strategy::{Strategy, StrategyState};
