//! Copying garbage collector
//!
//! Every collection evacuates all reachable objects to fresh allocations,
//! so any address the engine holds into a payload is invalidated unless it
//! lives in a registered root region. Reachability starts at the root regions
//! and follows the reference fields of class instances.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::collections::BTreeMap;
use std::ptr::{self, NonNull};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::header::{ObjectHeader, HEADER_SIZE, OBJECT_ALIGN};
use super::heap::HeapState;
use super::roots::RootKind;

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total bytes freed
    pub bytes_freed: usize,

    /// Total objects moved to new addresses
    pub objects_relocated: usize,

    /// Total pause time across all collections
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,

    /// Objects relocated in last collection
    pub last_relocated_count: usize,

    /// Objects freed in last collection
    pub last_freed_count: usize,

    /// Live objects after last collection
    pub live_objects: usize,

    /// Live bytes after last collection
    pub live_bytes: usize,
}

impl GcStats {
    fn update(&mut self, pause_time: Duration, relocated: usize, freed: usize, freed_bytes: usize, live_bytes: usize) {
        self.collections += 1;
        self.objects_freed += freed;
        self.bytes_freed += freed_bytes;
        self.objects_relocated += relocated;
        self.total_pause_time += pause_time;
        self.last_pause_time = pause_time;
        self.last_relocated_count = relocated;
        self.last_freed_count = freed;
        self.live_objects = relocated;
        self.live_bytes = live_bytes;
    }
}

/// Layout of an existing allocation.
///
/// # Safety
///
/// `header` must be a live allocation made by the heap.
unsafe fn allocation_layout(header: NonNull<ObjectHeader>) -> Layout {
    // SAFETY: the same size/alignment pair was validated when the object was
    // first allocated.
    Layout::from_size_align_unchecked(header.as_ref().total_size(), OBJECT_ALIGN)
}

struct Evacuation {
    /// Old objects by start address, for interior-pointer lookup
    index: BTreeMap<usize, NonNull<ObjectHeader>>,
    /// Old address to new header
    forwarded: FxHashMap<usize, NonNull<ObjectHeader>>,
    survivors: Vec<NonNull<ObjectHeader>>,
    worklist: Vec<NonNull<ObjectHeader>>,
    survivor_bytes: usize,
}

impl Evacuation {
    fn new(objects: &[NonNull<ObjectHeader>]) -> Self {
        Self {
            index: objects.iter().map(|o| (o.as_ptr() as usize, *o)).collect(),
            forwarded: FxHashMap::default(),
            survivors: Vec::with_capacity(objects.len()),
            worklist: Vec::new(),
            survivor_bytes: 0,
        }
    }

    /// Find the object whose payload contains `addr`
    unsafe fn containing(&self, addr: usize) -> Option<NonNull<ObjectHeader>> {
        let (&start, &object) = self.index.range(..=addr).next_back()?;
        let header = object.as_ref();
        let payload_start = start + HEADER_SIZE;
        (addr >= payload_start && addr < payload_start + header.payload_size()).then_some(object)
    }

    /// New location of `old`, copying it on first visit
    unsafe fn evacuate(&mut self, old: NonNull<ObjectHeader>) -> NonNull<ObjectHeader> {
        let key = old.as_ptr() as usize;
        if let Some(&new) = self.forwarded.get(&key) {
            return new;
        }

        let layout = allocation_layout(old);
        let raw = alloc(layout);
        if raw.is_null() {
            handle_alloc_error(layout);
        }
        // Bitwise move: the type handle now lives in the copy, the old
        // allocation is released without running its destructor.
        ptr::copy_nonoverlapping(old.as_ptr() as *const u8, raw, layout.size());
        let new = NonNull::new_unchecked(raw as *mut ObjectHeader);

        self.forwarded.insert(key, new);
        self.survivors.push(new);
        self.worklist.push(new);
        self.survivor_bytes += layout.size();
        new
    }

    /// Rewrite an object-reference slot
    unsafe fn update_object_slot(&mut self, slot: *mut *mut ObjectHeader) {
        let old = *slot;
        if old.is_null() {
            return;
        }
        if let Some(&object) = self.index.get(&(old as usize)) {
            *slot = self.evacuate(object).as_ptr();
        }
    }

    /// Rewrite an interior-pointer slot; addresses outside the heap are left alone
    unsafe fn update_interior_slot(&mut self, slot: *mut usize) {
        let addr = *slot;
        if addr == 0 {
            return;
        }
        if let Some(object) = self.containing(addr) {
            let offset = addr - object.as_ptr() as usize;
            *slot = self.evacuate(object).as_ptr() as usize + offset;
        }
    }

    /// Trace reference fields of every evacuated object
    unsafe fn scan(&mut self) {
        while let Some(object) = self.worklist.pop() {
            let ty = object.as_ref().ty().clone();
            let payload = (object.as_ptr() as *mut u8).add(HEADER_SIZE);
            for &offset in ty.ref_offsets() {
                self.update_object_slot(payload.add(offset) as *mut *mut ObjectHeader);
            }
        }
    }
}

/// Evacuate all live objects and free the rest.
///
/// # Safety
///
/// Every root region in `state` must be valid, and no other thread may be
/// reading or writing managed memory or unregistered references.
pub(super) unsafe fn collect(state: &mut HeapState) {
    let start = Instant::now();
    let mut evacuation = Evacuation::new(&state.objects);

    for region in state.roots.iter() {
        for i in 0..region.slot_count {
            match region.kind {
                RootKind::Object => {
                    let slot = (region.base as *mut *mut ObjectHeader).add(i);
                    evacuation.update_object_slot(slot);
                }
                RootKind::Interior => {
                    let slot = (region.base as *mut usize).add(i);
                    evacuation.update_interior_slot(slot);
                }
            }
        }
    }
    evacuation.scan();

    let mut freed = 0;
    let mut freed_bytes = 0;
    for &object in &state.objects {
        let layout = allocation_layout(object);
        if !evacuation.forwarded.contains_key(&(object.as_ptr() as usize)) {
            ptr::drop_in_place(object.as_ptr());
            freed += 1;
            freed_bytes += layout.size();
        }
        dealloc(object.as_ptr() as *mut u8, layout);
    }

    let relocated = evacuation.survivors.len();
    let live_bytes = evacuation.survivor_bytes;
    state.objects = evacuation.survivors;
    state.allocated_bytes = live_bytes;

    let pause = start.elapsed();
    state.stats.update(pause, relocated, freed, freed_bytes, live_bytes);
    tracing::debug!(
        relocated,
        freed,
        freed_bytes,
        live_bytes,
        pause_us = pause.as_micros() as u64,
        "gc: collection finished"
    );
}
