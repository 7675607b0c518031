//! GC root tracking
//!
//! Roots are contiguous regions of pointer-sized slots living outside the
//! heap (argument storage, handles, the caller's argument array). Each region
//! is either a run of object references or a run of interior pointers into
//! object payloads. The collector rewrites both kinds when objects move.

use smallvec::SmallVec;

/// What the slots of a root region hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// Each slot is an `ObjectRef` (object start or null)
    Object,
    /// Each slot is an arbitrary address; addresses inside a payload are
    /// interior pointers and move with their object, others are ignored
    Interior,
}

/// Identifies one registered root region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle(u64);

impl RegistrationHandle {
    /// Raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A registered root region
#[derive(Debug, Clone, Copy)]
pub struct RootRegion {
    pub(crate) base: usize,
    pub(crate) slot_count: usize,
    pub(crate) kind: RootKind,
}

impl RootRegion {
    /// Start address of the region
    pub fn base(&self) -> *const u8 {
        self.base as *const u8
    }

    /// Number of pointer-sized slots
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Slot contents
    pub fn kind(&self) -> RootKind {
        self.kind
    }
}

/// GC capability: report slot regions to the collector
pub trait RootRegistrar: Send + Sync {
    /// Report `slot_count` pointer-sized slots starting at `base`.
    ///
    /// # Safety
    ///
    /// The region must stay valid, and must only be written through
    /// interior-mutable or raw access, until it is unregistered.
    unsafe fn register_root_region(
        &self,
        base: *const u8,
        slot_count: usize,
        kind: RootKind,
    ) -> RegistrationHandle;

    /// Stop reporting a region. Regions are released in reverse order of
    /// registration on any one thread.
    fn unregister_root_region(&self, handle: RegistrationHandle);
}

/// Root set for garbage collection
///
/// Registration order is preserved; release is expected to be LIFO but any
/// order is accepted.
#[derive(Debug, Default)]
pub struct RootSet {
    regions: Vec<(RegistrationHandle, RootRegion)>,
    next_handle: u64,
}

impl RootSet {
    /// Create an empty root set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region and return its handle
    pub fn add_region(&mut self, base: *const u8, slot_count: usize, kind: RootKind) -> RegistrationHandle {
        let handle = RegistrationHandle(self.next_handle);
        self.next_handle += 1;
        self.regions.push((
            handle,
            RootRegion {
                base: base as usize,
                slot_count,
                kind,
            },
        ));
        handle
    }

    /// Remove a region; returns false if the handle is unknown
    pub fn remove_region(&mut self, handle: RegistrationHandle) -> bool {
        // Scoped registrations are released LIFO, so search from the back.
        match self.regions.iter().rposition(|(h, _)| *h == handle) {
            Some(index) => {
                self.regions.remove(index);
                true
            }
            None => false,
        }
    }

    /// Iterate over all regions
    pub fn iter(&self) -> impl Iterator<Item = &RootRegion> + '_ {
        self.regions.iter().map(|(_, region)| region)
    }

    /// Number of registered regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Scoped root registration.
///
/// Regions registered through a scope are released in reverse order when the
/// scope is dropped, on every exit path.
pub struct RootScope<'a> {
    registrar: &'a dyn RootRegistrar,
    handles: SmallVec<[RegistrationHandle; 2]>,
}

impl<'a> RootScope<'a> {
    /// Create an empty scope
    pub fn new(registrar: &'a dyn RootRegistrar) -> Self {
        Self {
            registrar,
            handles: SmallVec::new(),
        }
    }

    /// Register a region for the lifetime of this scope.
    ///
    /// # Safety
    ///
    /// Same contract as [`RootRegistrar::register_root_region`], for at least
    /// as long as the scope lives.
    pub unsafe fn register(&mut self, base: *const u8, slot_count: usize, kind: RootKind) {
        let handle = self.registrar.register_root_region(base, slot_count, kind);
        self.handles.push(handle);
    }

    /// Number of regions held by this scope
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for RootScope<'_> {
    fn drop(&mut self) {
        while let Some(handle) = self.handles.pop() {
            self.registrar.unregister_root_region(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        roots: Mutex<RootSet>,
        released: Mutex<Vec<RegistrationHandle>>,
    }

    impl RootRegistrar for Recorder {
        unsafe fn register_root_region(
            &self,
            base: *const u8,
            slot_count: usize,
            kind: RootKind,
        ) -> RegistrationHandle {
            self.roots.lock().add_region(base, slot_count, kind)
        }

        fn unregister_root_region(&self, handle: RegistrationHandle) {
            self.roots.lock().remove_region(handle);
            self.released.lock().push(handle);
        }
    }

    #[test]
    fn test_root_set_add_remove() {
        let mut roots = RootSet::new();
        assert!(roots.is_empty());

        let slots = [0usize; 3];
        let a = roots.add_region(slots.as_ptr() as *const u8, 3, RootKind::Object);
        let b = roots.add_region(slots.as_ptr() as *const u8, 1, RootKind::Interior);
        assert_eq!(roots.len(), 2);

        assert!(roots.remove_region(b));
        assert!(!roots.remove_region(b));
        assert!(roots.remove_region(a));
        assert!(roots.is_empty());
    }

    #[test]
    fn test_scope_releases_lifo() {
        let recorder = Recorder::default();
        let slots = [0usize; 4];
        let registered = {
            let mut scope = RootScope::new(&recorder);
            unsafe {
                scope.register(slots.as_ptr() as *const u8, 2, RootKind::Object);
                scope.register(slots[2..].as_ptr() as *const u8, 2, RootKind::Interior);
            }
            assert_eq!(scope.len(), 2);
            assert_eq!(recorder.roots.lock().len(), 2);
            let handles = recorder
                .roots
                .lock()
                .regions
                .iter()
                .map(|(h, _)| *h)
                .collect::<Vec<_>>();
            handles
        };

        assert!(recorder.roots.lock().is_empty());
        let released = recorder.released.lock().clone();
        assert_eq!(released, vec![registered[1], registered[0]]);
    }
}
