//! Test Utilities for the IGC Test Suite
//!
//! Shared fixture types and strict assertion helpers. Each test runs on its
//! own thread and therefore against its own collector instance, so tests
//! can assert absolute header counts.

#![allow(dead_code)]

use igc::{Gc, GcConfig, Trace, Tracer};
use std::cell::Cell;
use std::rc::Rc;

/// Configure this test's collector with automatic triggers pushed far out,
/// so cycles run only when a test asks for them.
pub fn manual_gc() {
    igc::configure(GcConfig {
        new_gen_obj_cnt_to_gc: 1 << 20,
        old_gen_obj_cnt_to_full_gc: 1 << 20,
        ..Default::default()
    })
    .expect("test configuration must validate");
}

/// Shared destruction counter observed from outside the managed heap
#[derive(Clone, Default)]
pub struct DropCounter(Rc<Cell<usize>>);

impl DropCounter {
    pub fn new() -> DropCounter {
        DropCounter::default()
    }

    pub fn count(&self) -> usize {
        self.0.get()
    }

    pub fn bump(&self) {
        self.0.set(self.0.get() + 1);
    }
}

/// List node with one managed edge; counts its destructions
pub struct Node {
    pub next: Gc<Node>,
    counter: DropCounter,
}

impl Node {
    pub fn new(counter: &DropCounter) -> Node {
        Node {
            next: Gc::null(),
            counter: counter.clone(),
        }
    }
}

impl Trace for Node {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.visit(&self.next);
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.counter.bump();
    }
}

/// Leaf value with no managed edges; counts its destructions
pub struct Leaf {
    pub value: i32,
    counter: DropCounter,
}

impl Leaf {
    pub fn new(value: i32, counter: &DropCounter) -> Leaf {
        Leaf {
            value,
            counter: counter.clone(),
        }
    }
}

impl Trace for Leaf {
    fn trace(&self, _tracer: &mut Tracer) {}
}

impl Drop for Leaf {
    fn drop(&mut self) {
        self.counter.bump();
    }
}

impl PartialEq for Leaf {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Leaf {}

impl PartialOrd for Leaf {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Leaf {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

/// Assert the total header count across both generations.
///
/// **Bug this finds:** leaked headers, over-eager sweeps.
#[track_caller]
pub fn assert_headers(expected: usize, context: &str) {
    let s = igc::stats();
    assert_eq!(
        s.total_headers(),
        expected,
        "{}: expected {} headers, found {} (young {}, old {})",
        context,
        expected,
        s.total_headers(),
        s.young_gen_len,
        s.old_gen_len
    );
}

/// Assert how many objects the previous cycle freed.
///
/// **Bug this finds:** sweeps freeing reachable objects, or none at all.
#[track_caller]
pub fn assert_freed_last_cycle(expected: usize, context: &str) {
    let s = igc::stats();
    assert_eq!(
        s.freed_last_cycle, expected,
        "{}: expected the last cycle to free {}, it freed {}",
        context, expected, s.freed_last_cycle
    );
}

/// Assert a handle's current root-handle count.
///
/// **Bug this finds:** write-barrier accounting drift (the root count must
/// equal the number of root handles referencing the header).
#[track_caller]
pub fn assert_root_refs<T>(handle: &Gc<T>, expected: u16, context: &str) {
    assert_eq!(
        handle.root_refs(),
        expected,
        "{}: expected root count {}, found {}",
        context,
        expected,
        handle.root_refs()
    );
}
