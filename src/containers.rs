//! Container Adapters - Tracing Through Aggregate Referents
//!
//! The unspecialized enumerator cannot see into an opaque container, so
//! each supported container family contributes two pieces:
//!
//! - a [`Trace`] impl with `INDIRECT = true` that yields the handle values
//!   the container currently stores (sequence elements; mapped values of
//!   the associative families — keys are plain data and are never traced);
//! - a thin wrapper (`GcVec`, `GcBTreeMap`, ...) over a handle to the
//!   container referent whose mutation methods attribute stored handles to
//!   the container's header and run the write barrier, keeping the
//!   remembered set correct when an old container gains a young element.
//!
//! Managed keys in associative containers are unsupported.

use crate::alloc::gc_new;
use crate::error::Result;
use crate::handle::{gc_delete, Gc, RawHandle};
use crate::trace::{Trace, Tracer};
use std::collections::{BTreeMap, BTreeSet, HashMap, LinkedList, VecDeque};
use std::hash::Hash;

// ============================================================================
// Trace impls for the std container shapes
// ============================================================================

impl<T: Trace> Trace for Vec<T> {
    const INDIRECT: bool = true;

    fn trace(&self, tracer: &mut Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for VecDeque<T> {
    const INDIRECT: bool = true;

    fn trace(&self, tracer: &mut Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for LinkedList<T> {
    const INDIRECT: bool = true;

    fn trace(&self, tracer: &mut Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

/// Keys are plain data; only the mapped values are traced.
impl<K: Ord, V: Trace> Trace for BTreeMap<K, V> {
    const INDIRECT: bool = true;

    fn trace(&self, tracer: &mut Tracer) {
        for value in self.values() {
            value.trace(tracer);
        }
    }
}

/// Keys are plain data; only the mapped values are traced.
impl<K: Eq + Hash, V: Trace> Trace for HashMap<K, V> {
    const INDIRECT: bool = true;

    fn trace(&self, tracer: &mut Tracer) {
        for value in self.values() {
            value.trace(tracer);
        }
    }
}

impl<T: Trace + Ord> Trace for BTreeSet<T> {
    const INDIRECT: bool = true;

    fn trace(&self, tracer: &mut Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

// ============================================================================
// Wrapper plumbing
// ============================================================================

/// Build a handle owned by `owner_of` pointing where `v` points.
fn owned_copy<T>(v: &Gc<T>, owner_of: &RawHandle) -> Gc<T> {
    Gc::from_raw(RawHandle::new_owned(v.raw().meta_ptr(), owner_of.meta_ptr()))
}

macro_rules! wrapper_common {
    ($name:ident) => {
        /// The underlying container handle
        pub fn handle(&self) -> &Gc<<Self as WrappedContainer>::Referent> {
            &self.inner
        }

        pub fn is_null(&self) -> bool {
            self.inner.is_null()
        }

        /// Re-point this wrapper at `other`'s container, in place.
        /// Required when the wrapper lives inside a managed referent.
        pub fn set(&mut self, other: &Self) {
            self.inner.set(&other.inner);
        }

        /// Null-assign the wrapper's handle (the container referent stays
        /// until unreachable)
        pub fn clear_handle(&mut self) {
            self.inner.clear();
        }

        pub fn len(&self) -> usize {
            self.inner.get().len()
        }

        pub fn is_empty(&self) -> bool {
            self.inner.get().is_empty()
        }
    };
}

/// Internal association between a wrapper and its referent shape
pub trait WrappedContainer {
    type Referent;
}

// ============================================================================
// Vector
// ============================================================================

/// Managed vector of handles
pub struct GcVec<T: 'static> {
    inner: Gc<Vec<Gc<T>>>,
}

impl<T: 'static> WrappedContainer for GcVec<T> {
    type Referent = Vec<Gc<T>>;
}

/// Allocate an empty managed vector
pub fn gc_new_vec<T: 'static>() -> Result<GcVec<T>> {
    Ok(GcVec {
        inner: gc_new(Vec::new)?,
    })
}

impl<T: 'static> GcVec<T> {
    wrapper_common!(GcVec);

    /// Null wrapper; allocate with [`gc_new_vec`]
    pub fn null() -> GcVec<T> {
        GcVec { inner: Gc::null() }
    }

    /// Append a handle to `v`'s referent
    pub fn push(&mut self, v: &Gc<T>) {
        let owned = owned_copy(v, self.inner.raw());
        self.inner.get_mut().push(owned);
    }

    /// Root handle to the element at `index`; panics when out of bounds
    pub fn at(&self, index: usize) -> Gc<T> {
        self.inner.get()[index].clone()
    }

    /// Re-point the element at `index`; panics when out of bounds
    pub fn set_at(&mut self, index: usize, v: &Gc<T>) {
        self.inner.get_mut()[index].set(v);
    }

    /// Remove and return the last element as a root handle
    pub fn pop(&mut self) -> Option<Gc<T>> {
        self.inner.get_mut().pop().map(|owned| owned.clone())
    }

    /// Drop all stored handles (their referents stay until unreachable)
    pub fn clear(&mut self) {
        self.inner.get_mut().clear();
    }

    /// Destroy every stored referent immediately, then clear
    pub fn delete_elements(&mut self) {
        for h in self.inner.get_mut().iter_mut() {
            gc_delete(h);
        }
        self.inner.get_mut().clear();
    }
}

impl<T: 'static> Trace for GcVec<T> {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.visit(&self.inner);
    }
}

impl<T: 'static> Clone for GcVec<T> {
    fn clone(&self) -> Self {
        GcVec {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for GcVec<T> {
    fn default() -> Self {
        GcVec::null()
    }
}

// ============================================================================
// Deque
// ============================================================================

/// Managed double-ended queue of handles
pub struct GcDeque<T: 'static> {
    inner: Gc<VecDeque<Gc<T>>>,
}

impl<T: 'static> WrappedContainer for GcDeque<T> {
    type Referent = VecDeque<Gc<T>>;
}

/// Allocate an empty managed deque
pub fn gc_new_deque<T: 'static>() -> Result<GcDeque<T>> {
    Ok(GcDeque {
        inner: gc_new(VecDeque::new)?,
    })
}

impl<T: 'static> GcDeque<T> {
    wrapper_common!(GcDeque);

    pub fn null() -> GcDeque<T> {
        GcDeque { inner: Gc::null() }
    }

    pub fn push_back(&mut self, v: &Gc<T>) {
        let owned = owned_copy(v, self.inner.raw());
        self.inner.get_mut().push_back(owned);
    }

    pub fn push_front(&mut self, v: &Gc<T>) {
        let owned = owned_copy(v, self.inner.raw());
        self.inner.get_mut().push_front(owned);
    }

    pub fn pop_back(&mut self) -> Option<Gc<T>> {
        self.inner.get_mut().pop_back().map(|owned| owned.clone())
    }

    pub fn pop_front(&mut self) -> Option<Gc<T>> {
        self.inner.get_mut().pop_front().map(|owned| owned.clone())
    }

    pub fn back(&self) -> Option<Gc<T>> {
        self.inner.get().back().cloned()
    }

    pub fn front(&self) -> Option<Gc<T>> {
        self.inner.get().front().cloned()
    }

    pub fn clear(&mut self) {
        self.inner.get_mut().clear();
    }

    pub fn delete_elements(&mut self) {
        for h in self.inner.get_mut().iter_mut() {
            gc_delete(h);
        }
        self.inner.get_mut().clear();
    }
}

impl<T: 'static> Trace for GcDeque<T> {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.visit(&self.inner);
    }
}

impl<T: 'static> Clone for GcDeque<T> {
    fn clone(&self) -> Self {
        GcDeque {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for GcDeque<T> {
    fn default() -> Self {
        GcDeque::null()
    }
}

// ============================================================================
// Linked list
// ============================================================================

/// Managed linked list of handles
pub struct GcLinkedList<T: 'static> {
    inner: Gc<LinkedList<Gc<T>>>,
}

impl<T: 'static> WrappedContainer for GcLinkedList<T> {
    type Referent = LinkedList<Gc<T>>;
}

/// Allocate an empty managed list
pub fn gc_new_list<T: 'static>() -> Result<GcLinkedList<T>> {
    Ok(GcLinkedList {
        inner: gc_new(LinkedList::new)?,
    })
}

impl<T: 'static> GcLinkedList<T> {
    wrapper_common!(GcLinkedList);

    pub fn null() -> GcLinkedList<T> {
        GcLinkedList { inner: Gc::null() }
    }

    pub fn push_back(&mut self, v: &Gc<T>) {
        let owned = owned_copy(v, self.inner.raw());
        self.inner.get_mut().push_back(owned);
    }

    pub fn push_front(&mut self, v: &Gc<T>) {
        let owned = owned_copy(v, self.inner.raw());
        self.inner.get_mut().push_front(owned);
    }

    pub fn pop_back(&mut self) -> Option<Gc<T>> {
        self.inner.get_mut().pop_back().map(|owned| owned.clone())
    }

    pub fn pop_front(&mut self) -> Option<Gc<T>> {
        self.inner.get_mut().pop_front().map(|owned| owned.clone())
    }

    pub fn back(&self) -> Option<Gc<T>> {
        self.inner.get().back().cloned()
    }

    pub fn front(&self) -> Option<Gc<T>> {
        self.inner.get().front().cloned()
    }

    pub fn clear(&mut self) {
        self.inner.get_mut().clear();
    }

    pub fn delete_elements(&mut self) {
        for h in self.inner.get_mut().iter_mut() {
            gc_delete(h);
        }
        self.inner.get_mut().clear();
    }
}

impl<T: 'static> Trace for GcLinkedList<T> {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.visit(&self.inner);
    }
}

impl<T: 'static> Clone for GcLinkedList<T> {
    fn clone(&self) -> Self {
        GcLinkedList {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for GcLinkedList<T> {
    fn default() -> Self {
        GcLinkedList::null()
    }
}

// ============================================================================
// Ordered map
// ============================================================================

/// Managed ordered map; keys are plain data, values are handles
pub struct GcBTreeMap<K: Ord + 'static, V: 'static> {
    inner: Gc<BTreeMap<K, Gc<V>>>,
}

impl<K: Ord + 'static, V: 'static> WrappedContainer for GcBTreeMap<K, V> {
    type Referent = BTreeMap<K, Gc<V>>;
}

/// Allocate an empty managed ordered map
pub fn gc_new_map<K: Ord + 'static, V: 'static>() -> Result<GcBTreeMap<K, V>> {
    Ok(GcBTreeMap {
        inner: gc_new(BTreeMap::new)?,
    })
}

impl<K: Ord + 'static, V: 'static> GcBTreeMap<K, V> {
    wrapper_common!(GcBTreeMap);

    pub fn null() -> GcBTreeMap<K, V> {
        GcBTreeMap { inner: Gc::null() }
    }

    /// Map `key` to `v`'s referent; an existing entry is re-pointed in place
    pub fn insert(&mut self, key: K, v: &Gc<V>) {
        let raw = self.inner.raw().meta_ptr();
        match self.inner.get_mut().entry(key) {
            std::collections::btree_map::Entry::Occupied(mut e) => {
                e.get_mut().set(v);
            }
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(Gc::from_raw(RawHandle::new_owned(v.raw().meta_ptr(), raw)));
            }
        }
    }

    /// Root handle to the value at `key`
    pub fn get(&self, key: &K) -> Option<Gc<V>> {
        self.inner.get().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.get().contains_key(key)
    }

    /// Remove the entry and return its value as a root handle
    pub fn remove(&mut self, key: &K) -> Option<Gc<V>> {
        self.inner.get_mut().remove(key).map(|owned| owned.clone())
    }

    pub fn clear(&mut self) {
        self.inner.get_mut().clear();
    }

    /// Destroy every stored value referent immediately, then clear
    pub fn delete_elements(&mut self) {
        for h in self.inner.get_mut().values_mut() {
            gc_delete(h);
        }
        self.inner.get_mut().clear();
    }
}

impl<K: Ord + 'static, V: 'static> Trace for GcBTreeMap<K, V> {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.visit(&self.inner);
    }
}

impl<K: Ord + 'static, V: 'static> Clone for GcBTreeMap<K, V> {
    fn clone(&self) -> Self {
        GcBTreeMap {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Ord + 'static, V: 'static> Default for GcBTreeMap<K, V> {
    fn default() -> Self {
        GcBTreeMap::null()
    }
}

// ============================================================================
// Hash map
// ============================================================================

/// Managed hash map; keys are plain data, values are handles
pub struct GcHashMap<K: Eq + Hash + 'static, V: 'static> {
    inner: Gc<HashMap<K, Gc<V>>>,
}

impl<K: Eq + Hash + 'static, V: 'static> WrappedContainer for GcHashMap<K, V> {
    type Referent = HashMap<K, Gc<V>>;
}

/// Allocate an empty managed hash map
pub fn gc_new_hash_map<K: Eq + Hash + 'static, V: 'static>() -> Result<GcHashMap<K, V>> {
    Ok(GcHashMap {
        inner: gc_new(HashMap::new)?,
    })
}

impl<K: Eq + Hash + 'static, V: 'static> GcHashMap<K, V> {
    wrapper_common!(GcHashMap);

    pub fn null() -> GcHashMap<K, V> {
        GcHashMap { inner: Gc::null() }
    }

    pub fn insert(&mut self, key: K, v: &Gc<V>) {
        let raw = self.inner.raw().meta_ptr();
        match self.inner.get_mut().entry(key) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                e.get_mut().set(v);
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(Gc::from_raw(RawHandle::new_owned(v.raw().meta_ptr(), raw)));
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<Gc<V>> {
        self.inner.get().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.get().contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<Gc<V>> {
        self.inner.get_mut().remove(key).map(|owned| owned.clone())
    }

    pub fn clear(&mut self) {
        self.inner.get_mut().clear();
    }

    pub fn delete_elements(&mut self) {
        for h in self.inner.get_mut().values_mut() {
            gc_delete(h);
        }
        self.inner.get_mut().clear();
    }
}

impl<K: Eq + Hash + 'static, V: 'static> Trace for GcHashMap<K, V> {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.visit(&self.inner);
    }
}

impl<K: Eq + Hash + 'static, V: 'static> Clone for GcHashMap<K, V> {
    fn clone(&self) -> Self {
        GcHashMap {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Eq + Hash + 'static, V: 'static> Default for GcHashMap<K, V> {
    fn default() -> Self {
        GcHashMap::null()
    }
}

// ============================================================================
// Ordered set
// ============================================================================

/// Managed ordered set of handles; ordering delegates to the referents
pub struct GcBTreeSet<T: Ord + 'static> {
    inner: Gc<BTreeSet<Gc<T>>>,
}

impl<T: Ord + 'static> WrappedContainer for GcBTreeSet<T> {
    type Referent = BTreeSet<Gc<T>>;
}

/// Allocate an empty managed ordered set
pub fn gc_new_set<T: Ord + 'static>() -> Result<GcBTreeSet<T>> {
    Ok(GcBTreeSet {
        inner: gc_new(BTreeSet::new)?,
    })
}

impl<T: Ord + 'static> GcBTreeSet<T> {
    wrapper_common!(GcBTreeSet);

    pub fn null() -> GcBTreeSet<T> {
        GcBTreeSet { inner: Gc::null() }
    }

    /// Insert `v`'s referent; returns false when an equal referent exists
    pub fn insert(&mut self, v: &Gc<T>) -> bool {
        let owned = owned_copy(v, self.inner.raw());
        self.inner.get_mut().insert(owned)
    }

    /// Membership by referent ordering
    pub fn contains(&self, v: &Gc<T>) -> bool {
        self.inner.get().contains(v)
    }

    pub fn remove(&mut self, v: &Gc<T>) -> bool {
        self.inner.get_mut().remove(v)
    }

    pub fn clear(&mut self) {
        self.inner.get_mut().clear();
    }

    pub fn delete_elements(&mut self) {
        let items = std::mem::take(self.inner.get_mut());
        for mut h in items {
            gc_delete(&mut h);
        }
    }
}

impl<T: Ord + 'static> Trace for GcBTreeSet<T> {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.visit(&self.inner);
    }
}

impl<T: Ord + 'static> Clone for GcBTreeSet<T> {
    fn clone(&self) -> Self {
        GcBTreeSet {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Ord + 'static> Default for GcBTreeSet<T> {
    fn default() -> Self {
        GcBTreeSet::null()
    }
}
