//! Edge Case Tests - Failure Paths, Explicit Deletion, Lookup, Casts
//!
//! These tests verify:
//! - constructor failure unwinds the constructed prefix, leaks nothing, and
//!   leaves the type able to discover its layout on a later success
//! - explicit deletion destroys immediately, never twice, and dangling
//!   edges are purged by the next traversal that sees them
//! - header lookup from raw referent pointers, including from inside a
//!   running destructor
//! - downcast helper behavior and allocator hook plumbing

mod common;

use common::{assert_headers, assert_root_refs, manual_gc, DropCounter, Leaf, Node};
use igc::{
    full_collect, gc_delete, gc_new, gc_new_array, gc_new_array_in_place, gc_new_in_place,
    gc_try_new_array, handle_from, Gc, GcConfig, GcError,
};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The third element constructor fails; the first two are
/// destroyed, nothing leaks, the panic propagates, and a later allocation
/// of the same type still discovers its field offsets.
#[test]
fn test_constructor_panic_unwinds_prefix() {
    manual_gc();
    let drops = DropCounter::new();

    struct Fragile {
        child: Gc<Leaf>,
        counter: DropCounter,
    }

    impl igc::Trace for Fragile {
        fn trace(&self, tracer: &mut igc::Tracer) {
            tracer.visit(&self.child);
        }
    }

    impl Drop for Fragile {
        fn drop(&mut self) {
            self.counter.bump();
        }
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        gc_new_array::<Fragile>(3, |i| {
            if i == 2 {
                panic!("third construction fails");
            }
            Fragile {
                child: Gc::null(),
                counter: drops.clone(),
            }
        })
    }));
    assert!(result.is_err(), "the failure must propagate");
    assert_eq!(drops.count(), 2, "the constructed prefix is destroyed");
    assert_headers(0, "the failed allocation leaves no header");

    // Discovery state was rolled back; a successful construction must
    // still learn the offsets - observable through owner attribution.
    let leaf = gc_new(|| Leaf::new(5, &drops)).unwrap();
    let ok = gc_new(|| Fragile {
        child: leaf.clone(),
        counter: drops.clone(),
    })
    .unwrap();
    assert_root_refs(&leaf, 1, "embedded copy was attributed to its owner");

    drop(leaf);
    igc::collect();
    assert_eq!(drops.count(), 2, "leaf reachable through the object");

    drop(ok);
    igc::collect();
    assert_eq!(drops.count(), 4, "object and leaf reclaimed");
}

#[test]
fn test_result_factory_failure() {
    manual_gc();
    let drops = DropCounter::new();

    let result = gc_try_new_array::<Leaf, &str>(3, |i| {
        if i == 2 {
            Err("no third element")
        } else {
            Ok(Leaf::new(i as i32, &drops))
        }
    });

    match result {
        Err(GcError::ConstructorFailure { index, count }) => {
            assert_eq!((index, count), (2, 3));
        }
        other => panic!("expected ConstructorFailure, got {other:?}"),
    }
    assert_eq!(drops.count(), 2, "prefix destroyed in the failure path");
    assert_headers(0, "no header recorded");
}

/// Explicit deletion destroys now; later cycles purge other
/// handles to the freed referent without re-destroying it.
#[test]
fn test_explicit_delete_and_dangling_purge() {
    manual_gc();
    let drops = DropCounter::new();

    let mut victim = gc_new(|| Node::new(&drops)).unwrap();
    let witness = victim.clone();
    let parent = gc_new(|| {
        let mut n = Node::new(&drops);
        n.next = victim.clone();
        n
    })
    .unwrap();

    gc_delete(&mut victim);
    assert!(victim.is_null(), "the deleted handle is nulled");
    assert_eq!(drops.count(), 1, "destructor runs immediately");
    assert!(
        witness.try_get().is_err(),
        "other handles see a destroyed referent"
    );

    igc::collect();
    assert_eq!(drops.count(), 1, "no second destruction");
    assert!(
        parent.get().next.is_null(),
        "the parent's dangling edge is purged"
    );

    drop(witness);
    igc::collect();
    let s = igc::stats();
    assert_eq!(s.total_headers(), 1, "only the parent's header remains");
    assert_eq!(s.live_objects, 1, "and it is the only live object");
}

#[test]
fn test_double_delete_is_safe() {
    manual_gc();
    let drops = DropCounter::new();

    let mut h = gc_new(|| Node::new(&drops)).unwrap();
    let mut again = h.clone();

    gc_delete(&mut h);
    gc_delete(&mut again);
    assert_eq!(drops.count(), 1, "destructors run once per referent");

    igc::collect();
    assert_headers(0, "the zombie header is reclaimed");
}

/// Property 5: `handle_from` round-trips any live referent pointer.
#[test]
fn test_handle_from_roundtrip() {
    manual_gc();
    let drops = DropCounter::new();

    let node = gc_new(|| Node::new(&drops)).unwrap();
    let again = handle_from(&*node).expect("live referent must resolve");
    assert!(again.ptr_eq(&node));
    assert_root_refs(&node, 2, "lookup returns a fresh root handle");
}

#[test]
fn test_handle_from_array_interior() {
    manual_gc();

    let arr = gc_new_array::<i32>(5, |i| i as i32).unwrap();
    assert_eq!(arr.len(), 5);
    assert_eq!(arr.as_slice(), &[0, 1, 2, 3, 4]);

    // Any element resolves to the covering allocation.
    let third = handle_from(&arr.as_slice()[3]).expect("interior pointer resolves");
    assert!(third.ptr_eq(&arr));
}

#[test]
fn test_handle_from_unmanaged_fails() {
    manual_gc();
    let drops = DropCounter::new();

    let local = Leaf::new(9, &drops);
    match handle_from(&local) {
        Err(GcError::MissingHeader { .. }) => {}
        other => panic!("expected MissingHeader, got {other:?}"),
    }
}

/// In-place construction exposes the referent at its final address before
/// the allocation completes, so an initializer can look itself up and wire
/// a self-reference - the "handle-from-this" pattern.
#[test]
fn test_handle_from_inside_initializer() {
    manual_gc();
    let drops = DropCounter::new();

    let node = gc_new_in_place(|slot| {
        let this = slot.write(Node::new(&drops));
        let me = handle_from(&*this).expect("in-construction lookup must resolve");
        this.next.set(&me);
    })
    .unwrap();

    assert!(
        node.get().next.ptr_eq(&node),
        "the self-reference wired during construction survives"
    );
    assert_root_refs(&node, 1, "only the returned handle is a root");

    drop(node);
    igc::collect();
    assert_eq!(drops.count(), 1, "the self-cycle is reclaimed");
    assert_headers(0, "nothing left");
}

/// Re-pointing an already-attributed handle while its owner is still
/// under construction routes through the delayed remembered set, which
/// drains when the owner's allocation completes.
#[test]
fn test_delayed_remembered_set_records_and_drains() {
    manual_gc();
    let drops = DropCounter::new();

    let target = gc_new(|| Node::new(&drops)).unwrap();
    let mut delayed_seen = 0usize;

    // Element 0 is written and owner-attributed before element 1 builds;
    // element 1's initializer reaches back through the covering allocation
    // and re-points element 0's handle mid-construction.
    let arr = gc_new_array_in_place::<Node>(2, |i, slot| {
        let this = slot.write(Node::new(&drops));
        if i == 1 {
            let mut whole = handle_from(&*this).expect("covering allocation resolves");
            whole.get_mut().next.set(&target);
            delayed_seen = igc::stats().delayed_remembered_len;
        }
    })
    .unwrap();

    assert_eq!(delayed_seen, 1, "the mid-construction re-point was delayed");
    let s = igc::stats();
    assert_eq!(s.delayed_remembered_len, 0, "completion drains the delayed set");
    assert_eq!(
        s.remembered_set_len, 0,
        "a young owner needs no main-set entry"
    );

    assert!(arr.get().next.ptr_eq(&target), "the re-pointed edge stuck");
    drop(target);
    igc::collect();
    assert_eq!(drops.count(), 0, "the target stays reachable through the array");

    drop(arr);
    igc::collect();
    assert_eq!(drops.count(), 3, "array elements and target reclaimed");
    assert_headers(0, "nothing left");
}

/// A destructor may re-obtain a handle to the object
/// being destroyed; the lookup must still resolve mid-sweep.
#[test]
fn test_handle_from_inside_destructor() {
    manual_gc();
    let resolved = Rc::new(Cell::new(false));

    struct SelfLookup {
        resolved: Rc<Cell<bool>>,
    }

    impl igc::Trace for SelfLookup {
        fn trace(&self, _tracer: &mut igc::Tracer) {}
    }

    impl Drop for SelfLookup {
        fn drop(&mut self) {
            if let Ok(h) = handle_from(&*self) {
                self.resolved.set(!h.is_null());
            }
        }
    }

    {
        let _h = gc_new(|| SelfLookup {
            resolved: resolved.clone(),
        })
        .unwrap();
    }
    igc::collect();
    assert!(
        resolved.get(),
        "destructor-time lookup of the dying object must resolve"
    );
}

#[test]
fn test_downcast() {
    manual_gc();
    let drops = DropCounter::new();

    let node = gc_new(|| Node::new(&drops)).unwrap();

    let same = node.downcast::<Node>();
    assert!(same.ptr_eq(&node), "matching type resolves to the same header");

    let wrong = node.downcast::<Leaf>();
    assert!(wrong.is_null(), "mismatched type yields a null handle");
}

#[test]
fn test_zero_length_array_rejected() {
    manual_gc();
    match gc_new_array::<i32>(0, |_| 0) {
        Err(GcError::InvalidArgument(_)) => {}
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
}

static HOOK_ALLOCS: AtomicUsize = AtomicUsize::new(0);
static HOOK_FREES: AtomicUsize = AtomicUsize::new(0);

unsafe fn counting_alloc(size: usize) -> *mut u8 {
    HOOK_ALLOCS.fetch_add(1, Ordering::SeqCst);
    std::alloc::alloc(std::alloc::Layout::from_size_align_unchecked(size, 16))
}

unsafe fn counting_dealloc(ptr: *mut u8, size: usize) {
    HOOK_FREES.fetch_add(1, Ordering::SeqCst);
    std::alloc::dealloc(ptr, std::alloc::Layout::from_size_align_unchecked(size, 16));
}

#[test]
fn test_allocator_hooks_consulted() {
    manual_gc();
    let drops = DropCounter::new();

    igc::set_allocator(counting_alloc, counting_dealloc);
    {
        let _a = gc_new(|| Leaf::new(1, &drops)).unwrap();
        let _b = gc_new(|| Leaf::new(2, &drops)).unwrap();
        let _c = gc_new(|| Leaf::new(3, &drops)).unwrap();
    }
    full_collect();
    igc::reset_allocator();

    assert!(HOOK_ALLOCS.load(Ordering::SeqCst) >= 3, "hook saw the allocations");
    assert!(HOOK_FREES.load(Ordering::SeqCst) >= 3, "hook saw the frees");
    assert_eq!(drops.count(), 3);
    assert_headers(0, "hooked allocations fully reclaimed");
}

#[test]
fn test_allocation_counter_triggers_young_cycle() {
    igc::configure(GcConfig {
        new_gen_obj_cnt_to_gc: 8,
        old_gen_obj_cnt_to_full_gc: 1 << 20,
        ..Default::default()
    })
    .unwrap();
    let drops = DropCounter::new();

    for i in 0..40 {
        let _garbage = gc_new(|| Leaf::new(i, &drops)).unwrap();
    }

    let s = igc::stats();
    assert!(
        s.young_cycles >= 1,
        "allocation pressure must trigger young cycles"
    );
    assert!(
        drops.count() >= 8,
        "triggered cycles reclaim the dropped garbage"
    );
}

#[test]
fn test_reserve_and_reconfigure() {
    manual_gc();
    igc::reserve(256);

    let invalid = igc::configure(GcConfig {
        scan_count_to_old_gen: 0,
        ..Default::default()
    });
    assert!(matches!(invalid, Err(GcError::Configuration(_))));

    // The previous valid configuration stays in force.
    let cfg = igc::current_config();
    assert!(cfg.scan_count_to_old_gen > 0);
}
