//! Invocable methods
//!
//! A [`MethodDescriptor`] pairs a signature with a Rust closure body. The
//! body sees its arguments through a [`CallFrame`], which reads every value
//! through the registered slot storage of the current invocation.

mod descriptor;
mod frame;

pub use descriptor::{
    DefaultValue, MethodBody, MethodBuilder, MethodDescriptor, MethodId, MethodKind, NativeEntry, ParameterInfo,
};
pub use frame::CallFrame;
