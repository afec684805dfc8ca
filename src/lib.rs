//! # IGC - Incremental Generational Garbage Collector
//!
//! IGC is a library-level tracing garbage collector: managed [`Gc`] handles
//! whose referents are reclaimed by an incremental, generational
//! mark-and-sweep collector - including referents that form reference
//! cycles, which no reference-counting scheme can reclaim.
//!
//! ## Overview
//!
//! - **Two-word handles**: a [`Gc<T>`] carries the referent header and the
//!   header that owns it as an embedded field. Every re-point runs a write
//!   barrier keeping root counts and the remembered set exact.
//! - **Two generations**: fresh allocations enter the young generation;
//!   headers surviving `scan_count_to_old_gen` young cycles are promoted.
//!   Old-to-young edges are remembered so young cycles stay small.
//! - **Non-moving**: objects have stable addresses for their whole life.
//! - **Automatic layout discovery**: the first construction of a type
//!   harvests the byte offsets of its embedded handles through its
//!   [`Trace`] impl; later traversals walk offsets without touching user
//!   code. Container referents are traced live instead.
//! - **In-place construction**: elements are built inside the payload, so
//!   an initializer given the slot ([`gc_new_in_place`]) can look up the
//!   object it is constructing and store self-references before the
//!   allocation completes.
//! - **Single-threaded**: one collector per mutator thread, no locks. All
//!   operations - allocation, handle mutation, collection - happen on the
//!   owning thread.
//!
//! ## Quick Start
//!
//! ```rust
//! use igc::{gc_new, Gc, Trace, Tracer};
//!
//! struct Node {
//!     next: Gc<Node>,
//!     name: String,
//! }
//!
//! impl Trace for Node {
//!     fn trace(&self, tracer: &mut Tracer) {
//!         tracer.visit(&self.next);
//!     }
//! }
//!
//! fn main() -> Result<(), igc::GcError> {
//!     // Build a two-node cycle.
//!     let mut a = gc_new(|| Node { next: Gc::null(), name: "a".into() })?;
//!     let b = gc_new(|| Node { next: a.clone(), name: "b".into() })?;
//!     a.get_mut().next.set(&b);
//!
//!     // Drop the roots; the cycle is unreachable now.
//!     drop(a);
//!     drop(b);
//!
//!     // One young cycle reclaims both nodes.
//!     igc::collect();
//!     assert_eq!(igc::stats().total_headers(), 0);
//!     Ok(())
//! }
//! ```
//!
//! ## Collection cadence
//!
//! Allocation is the only implicit trigger: every
//! [`GcConfig::new_gen_obj_cnt_to_gc`] allocations, the next allocation
//! entry point runs a young cycle first. [`collect`] runs one young cycle
//! on demand (following up with a full cycle when the old generation has
//! grown past its threshold); [`full_collect`] walks both generations.
//!
//! ## Safety
//!
//! IGC uses `unsafe` internally but keeps the mutator surface safe, under
//! two documented contracts:
//!
//! 1. **Trace honestly**: a [`Trace`] impl must visit every embedded
//!    handle and must not allocate or mutate collector state.
//! 2. **Mutate through the API**: handles stored inside managed referents
//!    are re-pointed with [`Gc::set`] / [`Gc::clear`] (or the container
//!    wrapper methods), never by overwriting the struct field with a move.
//!
//! ## Modules
//!
//! - [`config`]: collector tuning parameters and validation
//! - [`error`]: error types for all operations
//! - [`object`]: header, class descriptor, and field enumeration
//! - [`collector`]: cycle management and the per-thread singleton
//! - [`containers`]: managed container wrappers and their trace impls
//! - [`function`]: managed type-erased callable
//! - [`stats`]: collector counters and snapshots

pub mod config;
pub mod error;

pub mod alloc;
pub mod handle;
pub mod object;
pub mod trace;

pub mod collector;
pub mod containers;
pub mod function;
pub mod stats;

pub use alloc::{
    gc_new, gc_new_array, gc_new_array_in_place, gc_new_in_place, gc_try_new, gc_try_new_array,
    reset_allocator, set_allocator, AllocFn, DeallocFn,
};
pub use collector::{
    collect, configure, current_config, dump_stats, full_collect, reserve, reset_counters, stats,
};
pub use config::GcConfig;
pub use containers::{
    gc_new_deque, gc_new_hash_map, gc_new_list, gc_new_map, gc_new_set, gc_new_vec, GcBTreeMap,
    GcBTreeSet, GcDeque, GcHashMap, GcLinkedList, GcVec,
};
pub use error::{GcError, Result};
pub use function::GcFunction;
pub use handle::{gc_delete, handle_from, Gc};
pub use stats::GcSummary;
pub use trace::{Trace, Tracer};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(GcConfig::default().validate().is_ok());
    }
}
