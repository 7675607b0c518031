//! Managed heap and garbage collection
//!
//! The heap hands out [`ObjectRef`]s to header-prefixed allocations. Roots
//! are reported as regions of slots through the [`RootRegistrar`]
//! capability; the collector relocates every live object and rewrites both
//! object slots and interior pointers found in those regions.

mod collector;
mod header;
mod heap;
mod object;
mod roots;

pub use collector::GcStats;
pub use header::{ObjectHeader, HEADER_SIZE, OBJECT_ALIGN};
pub use heap::{Heap, Root};
pub use object::ObjectRef;
pub use roots::{RegistrationHandle, RootKind, RootRegion, RootRegistrar, RootScope, RootSet};
