//! Collector Core - Cycle Management and Shared State
//!
//! One `Collector` serves one mutator thread (`thread_local!`, no locks).
//! It owns the two generation lists, the remembered set, the
//! under-construction stack, the deferred-unref queue, the per-type class
//! registry, and the pluggable allocator hooks.
//!
//! Collection is stop-the-mutator but incremental across cycles: one call
//! performs exactly one cycle over the selected generation(s).
//!
//! # Young cycle
//!
//! 1. drain the deferred root-unref queue;
//! 2. mark from young roots (headers with a positive root count), stopping
//!    at the old-generation boundary;
//! 3. mark young targets reachable through remembered-set owners;
//! 4. sweep the young list: survivors turn white and age (promotion at the
//!    threshold), the rest are unlinked and destroyed.
//!
//! # Full cycle
//!
//! Marks from the roots of both generations, traverses freely, sweeps both
//! lists. No promotion; the remembered set is not used as a root source.
//!
//! Destructors run with no collector borrow held, so they may allocate,
//! request collection (deferred), or look up the object being destroyed.

pub mod gen_list;

use crate::alloc::{AllocFn, DeallocFn};
use crate::config::GcConfig;
use crate::error::{GcError, Result};
use crate::object::class_meta::{ClassMeta, MAX_ALIGN};
use crate::object::enumerator::PtrEnumerator;
use crate::object::meta::{Color, ObjMeta};
use crate::stats::{GcStats, GcSummary};
use crate::trace::Trace;
use gen_list::GenList;
use indexmap::IndexSet;
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;

thread_local! {
    static COLLECTOR: RefCell<Collector> = RefCell::new(Collector::new());
}

/// Run `f` against this thread's collector.
///
/// Panics if the collector is already borrowed; internal callers are
/// structured so user code never runs under the borrow.
pub(crate) fn with<R>(f: impl FnOnce(&mut Collector) -> R) -> R {
    COLLECTOR.with(|cell| f(&mut cell.borrow_mut()))
}

/// Like [`with`], but degrades to `None` during reentrant calls and thread
/// teardown. Used by handle drops and barrier bookkeeping.
pub(crate) fn try_with<R>(f: impl FnOnce(&mut Collector) -> R) -> Option<R> {
    COLLECTOR
        .try_with(|cell| cell.try_borrow_mut().ok().map(|mut c| f(&mut c)))
        .ok()
        .flatten()
}

/// The collector singleton for one mutator thread
pub struct Collector {
    /// Freshly allocated headers
    new_gen: GenList,
    /// Promoted headers
    old_gen: GenList,
    /// Remembered set: old-generation owners that may hold young edges
    intergen: IndexSet<NonNull<ObjMeta>>,
    /// Owners that gained an edge while still under construction
    delayed_intergen: IndexSet<NonNull<ObjMeta>>,
    /// Under-construction stack; the top is the innermost allocation
    creating: Vec<*mut ObjMeta>,
    /// Headers that lost their last root since the previous cycle.
    /// Barrier decrements are eager; the queue is drained, never followed.
    unrefs: Vec<*mut ObjMeta>,
    /// Headers unlinked by the current sweep, still visible to
    /// `find_owner_meta` while their destructors run
    sweeping: Vec<*mut ObjMeta>,
    /// Per-type class descriptors; boxed for address stability
    classes: HashMap<TypeId, Box<ClassMeta>>,
    config: GcConfig,
    stats: GcStats,
    /// Allocations since the last automatic collection
    alloc_counter: usize,
    /// A cycle is in progress (destructors included)
    collecting: bool,
    alloc_fn: Option<AllocFn>,
    dealloc_fn: Option<DeallocFn>,
}

impl Collector {
    fn new() -> Collector {
        Collector {
            new_gen: GenList::new(),
            old_gen: GenList::new(),
            intergen: IndexSet::new(),
            delayed_intergen: IndexSet::new(),
            creating: Vec::new(),
            unrefs: Vec::new(),
            sweeping: Vec::new(),
            classes: HashMap::new(),
            config: GcConfig::default(),
            stats: GcStats::new(),
            alloc_counter: 0,
            collecting: false,
            alloc_fn: None,
            dealloc_fn: None,
        }
    }

    // ========================================================================
    // Class registry
    // ========================================================================

    /// The per-type singleton descriptor for `T`
    pub(crate) fn class_meta<T: Trace + 'static>(&mut self) -> NonNull<ClassMeta> {
        let entry = self
            .classes
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ClassMeta::of::<T>()));
        NonNull::from(&**entry)
    }

    // ========================================================================
    // Barrier bookkeeping
    // ========================================================================

    pub(crate) fn note_unref(&mut self, meta: *mut ObjMeta) {
        self.unrefs.push(meta);
    }

    pub(crate) fn intergen_insert(&mut self, owner: NonNull<ObjMeta>) {
        self.intergen.insert(owner);
    }

    pub(crate) fn delayed_intergen_insert(&mut self, owner: NonNull<ObjMeta>) {
        self.delayed_intergen.insert(owner);
    }

    // ========================================================================
    // Header lookup
    // ========================================================================

    /// Find the unique header whose payload interval contains `p`.
    ///
    /// Searches in-flight allocations innermost first (so nested
    /// construction attributes to the nearest owner), then both
    /// generations, then the headers currently being swept (so destructors
    /// can look up the dying object).
    pub(crate) fn find_owner_meta(&self, p: *const u8) -> Option<*mut ObjMeta> {
        unsafe {
            for &meta in self.creating.iter().rev() {
                if (*meta).contains(p) {
                    return Some(meta);
                }
            }
            for meta in self.new_gen.iter() {
                if (*meta).contains(p) {
                    return Some(meta);
                }
            }
            for meta in self.old_gen.iter() {
                if (*meta).contains(p) {
                    return Some(meta);
                }
            }
            for &meta in self.sweeping.iter() {
                if (*meta).contains(p) {
                    return Some(meta);
                }
            }
        }
        None
    }

    // ========================================================================
    // Allocation support (driven by crate::alloc)
    // ========================================================================

    /// True when the allocation counter crossed the young-cycle threshold
    /// and a collection can safely start. Resets the counter when firing.
    pub(crate) fn take_collect_trigger(&mut self) -> bool {
        if self.collecting || !self.creating.is_empty() {
            return false;
        }
        if self.alloc_counter >= self.config.new_gen_obj_cnt_to_gc {
            self.alloc_counter = 0;
            return true;
        }
        false
    }

    /// Allocate raw bytes and install a header for `n` elements of `klass`.
    /// The header is linked into the young generation and pushed onto the
    /// under-construction stack; element construction follows outside any
    /// collector borrow.
    pub(crate) fn begin_alloc(
        &mut self,
        klass: NonNull<ClassMeta>,
        n: usize,
    ) -> Result<*mut ObjMeta> {
        let k = unsafe { klass.as_ref() };
        let total = k.payload_offset + n * k.size;
        let raw = unsafe { self.alloc_raw(total) };
        if raw.is_null() {
            return Err(GcError::AllocFailure { requested: total });
        }

        let meta = raw as *mut ObjMeta;
        unsafe {
            meta.write(ObjMeta::new(klass, n));
            (*meta).set_creating(true);
            self.new_gen.push_back(meta);
        }
        self.creating.push(meta);
        Ok(meta)
    }

    /// Attribute one freshly constructed element's embedded handles to the
    /// allocation that now owns them, releasing the temporary root counts
    /// they acquired while the element was built. Runs as soon as the
    /// element is written, so handles of earlier elements are owner-marked
    /// while later elements (or nested allocations) are still building -
    /// which is what routes their re-points through the delayed set.
    pub(crate) fn attribute_element(&mut self, meta: *mut ObjMeta, index: usize) {
        unsafe {
            let mut sink = Vec::new();
            ((*meta).klass().collect_element)(meta, index, &mut sink);
            for child in sink {
                let ch = &mut *child.as_ptr();
                if ch.owner.is_null() {
                    if let Some(m) = ch.meta.as_mut() {
                        m.dec_root_refs();
                    }
                    ch.owner = meta;
                }
            }
        }
    }

    /// Successful construction: pop the stack, harvest offsets on the first
    /// construction of the type, and drain this header's delayed
    /// remembered-set entries now that its generation is known.
    pub(crate) fn end_alloc(&mut self, meta: *mut ObjMeta) {
        let top = self.creating.pop();
        debug_assert_eq!(top, Some(meta), "allocation completions must nest");

        unsafe {
            (*meta).set_creating(false);
            (*meta).klass().discover_offsets(meta);

            // Drain: only an old owner needs a main-set entry. A freshly
            // constructed header is young, so entries normally dissolve
            // here; the write barrier re-records the owner if it is still
            // holding young edges when it is promoted.
            let owner = NonNull::new_unchecked(meta);
            if self.delayed_intergen.swap_remove(&owner) && (*meta).is_old() {
                self.intergen.insert(owner);
            }
        }

        self.alloc_counter += 1;
        if self.config.stats_enabled {
            self.stats.record_alloc();
        }
    }

    /// Failed construction: unlink, roll back discovery, release the raw
    /// bytes. The caller has already destroyed the constructed prefix.
    pub(crate) fn abort_alloc(&mut self, meta: *mut ObjMeta) {
        let top = self.creating.pop();
        debug_assert_eq!(top, Some(meta), "allocation failures must nest");

        unsafe {
            (*meta).klass().abort_discovery();
            self.delayed_intergen.swap_remove(&NonNull::new_unchecked(meta));
            let total = (*meta).total_size();
            self.new_gen.remove(meta);
            self.dealloc_raw(meta as *mut u8, total);
        }
    }

    unsafe fn alloc_raw(&self, size: usize) -> *mut u8 {
        match self.alloc_fn {
            Some(f) => f(size),
            None => {
                let layout = std::alloc::Layout::from_size_align_unchecked(size, MAX_ALIGN);
                std::alloc::alloc(layout)
            }
        }
    }

    unsafe fn dealloc_raw(&self, ptr: *mut u8, size: usize) {
        match self.dealloc_fn {
            Some(f) => f(ptr, size),
            None => {
                let layout = std::alloc::Layout::from_size_align_unchecked(size, MAX_ALIGN);
                std::alloc::dealloc(ptr, layout);
            }
        }
    }

    pub(crate) fn set_allocator(&mut self, alloc: Option<AllocFn>, dealloc: Option<DeallocFn>) {
        self.alloc_fn = alloc;
        self.dealloc_fn = dealloc;
    }

    // ========================================================================
    // Cycle phases
    // ========================================================================

    /// Mark and unlink one cycle's garbage. Returns the doomed headers, or
    /// `None` when a cycle is already running or an allocation is
    /// mid-construction.
    fn begin_cycle(&mut self, full: bool) -> Option<Vec<*mut ObjMeta>> {
        if self.collecting || !self.creating.is_empty() {
            return None;
        }
        self.collecting = true;

        if self.config.trace {
            log::debug!(
                "gc: {} cycle start (young {}, old {}, remembered {})",
                if full { "full" } else { "young" },
                self.new_gen.len(),
                self.old_gen.len(),
                self.intergen.len(),
            );
        }

        self.handle_unrefs();

        let doomed = unsafe {
            if full {
                self.mark_full();
                let mut doomed = Vec::new();
                self.sweep_no_promote(Generation::Young, &mut doomed);
                self.sweep_no_promote(Generation::Old, &mut doomed);
                doomed
            } else {
                self.mark_young();
                self.sweep_young()
            }
        };

        self.sweeping = doomed.clone();
        Some(doomed)
    }

    /// Free the cycle's raw bytes and fix up collector state.
    fn end_cycle(&mut self, doomed: &[*mut ObjMeta], full: bool) {
        let freed: IndexSet<*mut ObjMeta> = doomed.iter().copied().collect();
        self.intergen.retain(|p| !freed.contains(&p.as_ptr()));
        self.delayed_intergen.retain(|p| !freed.contains(&p.as_ptr()));

        for &meta in doomed {
            unsafe {
                let total = (*meta).total_size();
                self.dealloc_raw(meta as *mut u8, total);
            }
        }
        self.sweeping.clear();

        if self.config.stats_enabled {
            self.stats.record_cycle(full, doomed.len());
        }
        if self.config.trace {
            log::debug!(
                "gc: {} cycle end (freed {}, young {}, old {})",
                if full { "full" } else { "young" },
                doomed.len(),
                self.new_gen.len(),
                self.old_gen.len(),
            );
        }
        self.collecting = false;
    }

    /// Deferred root-unref queue, drained at cycle entry. Decrements were applied by
    /// the barrier when they happened; headers re-rooted in the interim
    /// were re-incremented the same way. Nothing is dereferenced here.
    fn handle_unrefs(&mut self) {
        if self.config.trace && !self.unrefs.is_empty() {
            log::trace!("gc: {} deferred root unrefs", self.unrefs.len());
        }
        self.unrefs.clear();
    }

    unsafe fn mark_young(&mut self) {
        for meta in self.new_gen.iter() {
            if (*meta).is_root() {
                self.mark(meta, true);
            }
        }

        // Remembered-set owners are scanned, not marked: their own liveness
        // is the full cycle's business. Owners found to hold no young edge
        // any more drop out of the set; the barrier re-adds them on the
        // next old-to-young write.
        let owners: Vec<*mut ObjMeta> = self.intergen.iter().map(|p| p.as_ptr()).collect();
        for owner in owners {
            let mut has_young_edge = false;
            if !(*owner).is_destroyed() {
                for child in PtrEnumerator::over(owner) {
                    let ch = &mut *child.as_ptr();
                    if ch.meta.is_null() {
                        continue;
                    }
                    let target = &mut *ch.meta;
                    if target.is_destroyed() {
                        ch.meta = std::ptr::null_mut();
                        continue;
                    }
                    if !target.is_old() {
                        has_young_edge = true;
                        self.mark(ch.meta, true);
                    }
                }
            }
            if !has_young_edge {
                self.intergen.swap_remove(&NonNull::new_unchecked(owner));
            }
        }
    }

    unsafe fn mark_full(&mut self) {
        for meta in self.new_gen.iter() {
            if (*meta).is_root() {
                self.mark(meta, false);
            }
        }
        for meta in self.old_gen.iter() {
            if (*meta).is_root() {
                self.mark(meta, false);
            }
        }
    }

    /// Depth-first: white headers turn black, then their children follow.
    /// Young cycles stop at the old-generation boundary; those edges are
    /// the remembered set's responsibility.
    unsafe fn mark(&mut self, meta: *mut ObjMeta, young_only: bool) {
        let m = &mut *meta;
        if m.color() != Color::White {
            return;
        }
        m.set_color(Color::Black);
        self.mark_children(meta, young_only);
    }

    unsafe fn mark_children(&mut self, meta: *mut ObjMeta, young_only: bool) {
        for child in PtrEnumerator::over(meta) {
            let ch = &mut *child.as_ptr();
            if ch.meta.is_null() {
                continue;
            }
            let target = &mut *ch.meta;
            if target.is_destroyed() {
                // The referent was explicitly deleted; purge the dangling
                // edge so the header can be reclaimed.
                ch.meta = std::ptr::null_mut();
                continue;
            }
            if young_only && target.is_old() {
                continue;
            }
            self.mark(ch.meta, young_only);
        }
    }

    /// Young sweep with aging and promotion.
    unsafe fn sweep_young(&mut self) -> Vec<*mut ObjMeta> {
        let mut doomed = Vec::new();
        let threshold = self.config.scan_count_to_old_gen;

        let mut cursor = self.new_gen.head();
        while !cursor.is_null() {
            let next = (*cursor).next;
            let m = &mut *cursor;
            if m.color() == Color::Black {
                m.set_color(Color::White);
                if m.inc_scan_count() >= threshold {
                    m.reset_scan_count();
                    self.new_gen.remove(cursor);
                    self.promote(cursor);
                }
            } else {
                self.new_gen.remove(cursor);
                doomed.push(cursor);
            }
            cursor = next;
        }
        doomed
    }

    unsafe fn sweep_no_promote(&mut self, gen: Generation, doomed: &mut Vec<*mut ObjMeta>) {
        let list = match gen {
            Generation::Young => &mut self.new_gen,
            Generation::Old => &mut self.old_gen,
        };
        let mut cursor = list.head();
        while !cursor.is_null() {
            let next = (*cursor).next;
            let m = &mut *cursor;
            if m.color() == Color::Black {
                m.set_color(Color::White);
            } else {
                list.remove(cursor);
                doomed.push(cursor);
            }
            cursor = next;
        }
    }

    /// Move a surviving header to the old generation. Its address does not
    /// change. The header joins the remembered set so any young edge it
    /// already holds stays covered; entries that *targeted* it are now
    /// old-to-old and fall out at the next purge.
    unsafe fn promote(&mut self, meta: *mut ObjMeta) {
        (*meta).set_old();
        self.old_gen.push_back(meta);
        self.intergen.insert(NonNull::new_unchecked(meta));
        if self.config.stats_enabled {
            self.stats.record_promotion();
        }
        if self.config.trace {
            log::trace!("gc: promoted {} at {:p}", (*meta).klass().type_name, meta);
        }
    }

    // ========================================================================
    // Facade support
    // ========================================================================

    fn needs_full_cycle(&self) -> bool {
        !self.collecting && self.old_gen.len() > self.config.old_gen_obj_cnt_to_full_gc
    }

    fn summary(&self) -> GcSummary {
        let mut live = 0;
        unsafe {
            for meta in self.new_gen.iter() {
                if !(*meta).is_destroyed() {
                    live += 1;
                }
            }
            for meta in self.old_gen.iter() {
                if !(*meta).is_destroyed() {
                    live += 1;
                }
            }
        }
        GcSummary {
            young_gen_len: self.new_gen.len(),
            old_gen_len: self.old_gen.len(),
            live_objects: live,
            young_cycles: self.stats.young_cycles,
            full_cycles: self.stats.full_cycles,
            remembered_set_len: self.intergen.len(),
            delayed_remembered_len: self.delayed_intergen.len(),
            freed_last_cycle: self.stats.freed_last_cycle,
            total_allocs: self.stats.total_allocs,
        }
    }

    fn reserve(&mut self, n: usize) {
        self.intergen.reserve(n);
        self.delayed_intergen.reserve(n);
        self.unrefs.reserve(n);
        self.sweeping.reserve(n);
    }

    fn configure(&mut self, config: GcConfig) -> Result<()> {
        config
            .validate()
            .map_err(|e| GcError::Configuration(e.to_string()))?;
        self.config = config;
        Ok(())
    }

    pub(crate) fn config(&self) -> &GcConfig {
        &self.config
    }
}

#[derive(Clone, Copy)]
enum Generation {
    Young,
    Old,
}

impl Drop for Collector {
    /// Destroy and free every remaining header. Destructors that touch the
    /// collector during thread teardown degrade to no-ops through
    /// [`try_with`].
    fn drop(&mut self) {
        let mut all: Vec<*mut ObjMeta> = self.new_gen.iter().collect();
        all.extend(self.old_gen.iter());

        unsafe {
            for &meta in &all {
                (*meta).destroy();
            }
            for &meta in &all {
                let total = (*meta).total_size();
                self.new_gen_or_old_remove(meta);
                self.dealloc_raw(meta as *mut u8, total);
            }
        }
    }
}

impl Collector {
    unsafe fn new_gen_or_old_remove(&mut self, meta: *mut ObjMeta) {
        if (*meta).is_old() {
            self.old_gen.remove(meta);
        } else {
            self.new_gen.remove(meta);
        }
    }
}

// ============================================================================
// Public facade
// ============================================================================

/// Run one young-generation cycle; follow with a full cycle when the old
/// generation has grown past its threshold.
///
/// No-op while a cycle is already running or an allocation is
/// mid-construction.
pub fn collect() {
    run_collection(false);
    if with(|c| c.needs_full_cycle()) {
        run_collection(true);
    }
}

/// Run one full cycle over both generations.
pub fn full_collect() {
    run_collection(true);
}

fn run_collection(full: bool) {
    // Phase 1 (collector borrowed): drain unrefs, mark, unlink garbage.
    let doomed = match with(|c| c.begin_cycle(full)) {
        Some(d) => d,
        None => return,
    };

    // Phase 2 (no borrow): destructors may allocate, request collection,
    // or look up the dying objects.
    for &meta in &doomed {
        unsafe { (*meta).destroy() };
    }

    // Phase 3 (collector borrowed): free raw bytes, purge the remembered
    // set, record stats.
    with(|c| c.end_cycle(&doomed, full));
}

/// Snapshot of collector counters and list lengths
pub fn stats() -> GcSummary {
    with(|c| c.summary())
}

/// Print collector state to stdout in a human-readable block
pub fn dump_stats() {
    let s = stats();
    println!("========= [gc] =========");
    println!("[young-gen headers ] {:4}", s.young_gen_len);
    println!("[old-gen headers   ] {:4}", s.old_gen_len);
    println!("[live objects      ] {:4}", s.live_objects);
    println!("[young cycles      ] {:4}", s.young_cycles);
    println!("[full cycles       ] {:4}", s.full_cycles);
    println!("[remembered owners ] {:4}", s.remembered_set_len);
    println!("[freed last cycle  ] {:4}", s.freed_last_cycle);
    println!("========================");
}

/// Pre-size the collector's side tables for `n` objects
pub fn reserve(n: usize) {
    with(|c| c.reserve(n));
}

/// Reset the young/full cycle counters
pub fn reset_counters() {
    with(|c| c.stats.reset_cycle_counts());
}

/// Replace this thread's collector configuration
pub fn configure(config: GcConfig) -> Result<()> {
    with(|c| c.configure(config))
}

/// Current configuration of this thread's collector
pub fn current_config() -> GcConfig {
    with(|c| c.config().clone())
}
