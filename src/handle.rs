//! Handle - The Managed Smart Pointer
//!
//! [`Gc<T>`] is a two-word value: the header it references and the header
//! that owns it as an embedded field (null for handles living on a root
//! frame). Every re-point runs the write barrier, which keeps the root
//! reference counts and the remembered set consistent.
//!
//! Handles are obtained from [`crate::gc_new`] / [`crate::gc_new_array`],
//! by cloning, or by [`handle_from`] lookup over a raw referent reference.
//! Mutating a handle that lives inside a managed object goes through
//! [`Gc::set`] / [`Gc::clear`], which re-point in place and preserve the
//! owner word.

use crate::collector;
use crate::error::{GcError, Result};
use crate::object::meta::ObjMeta;
use crate::trace::Trace;
use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

/// Untyped base of every handle: referent header + owning header.
///
/// Layout is part of the tracing contract: enumerators read handles
/// directly out of payload memory at discovered offsets.
#[repr(C)]
pub struct RawHandle {
    pub(crate) meta: *mut ObjMeta,
    pub(crate) owner: *mut ObjMeta,
}

impl RawHandle {
    /// Null handle on a root frame
    #[inline]
    pub const fn null() -> RawHandle {
        RawHandle {
            meta: std::ptr::null_mut(),
            owner: std::ptr::null_mut(),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.meta.is_null()
    }

    #[inline]
    pub(crate) fn meta_ptr(&self) -> *mut ObjMeta {
        self.meta
    }

    /// Build a handle owned by `owner`, pointing at `meta`, running the
    /// barrier's generational rules. Used by container adapters when they
    /// store a handle inside their payload-owned storage.
    pub(crate) fn new_owned(meta: *mut ObjMeta, owner: *mut ObjMeta) -> RawHandle {
        let mut h = RawHandle {
            meta: std::ptr::null_mut(),
            owner,
        };
        h.rebind(meta);
        h
    }

    /// Re-point this handle and run the write barrier.
    #[inline]
    pub(crate) fn rebind(&mut self, new_meta: *mut ObjMeta) {
        let old = self.meta;
        self.meta = new_meta;
        self.write_barrier(old);
    }

    /// The write barrier, run on every write to `meta`.
    ///
    /// 1. root handle, new referent non-null: increment its root count;
    /// 2. root handle, previous referent non-null: decrement; on zero,
    ///    record the header in the deferred-unref queue;
    /// 3. owned handle in an old owner, young target: remember the owner;
    /// 4. owned handle in a still-constructing owner: delay the decision
    ///    until the owner's allocation completes.
    ///
    /// Idempotent under repeated writes of the same value.
    pub(crate) fn write_barrier(&mut self, old_meta: *mut ObjMeta) {
        unsafe {
            if self.owner.is_null() {
                if let Some(m) = self.meta.as_mut() {
                    m.inc_root_refs();
                }
                if let Some(o) = old_meta.as_mut() {
                    if o.dec_root_refs() == 0 {
                        let ptr = old_meta;
                        let _ = collector::try_with(|c| c.note_unref(ptr));
                    }
                }
            } else {
                let owner = &*self.owner;
                let owner_nn = NonNull::new_unchecked(self.owner);
                if owner.is_creating() {
                    let _ = collector::try_with(|c| c.delayed_intergen_insert(owner_nn));
                } else if owner.is_old() {
                    if let Some(m) = self.meta.as_ref() {
                        if !m.is_old() {
                            let _ = collector::try_with(|c| c.intergen_insert(owner_nn));
                        }
                    }
                }
            }
        }
    }

    /// A root copy of this handle (used by `Clone` and the cast helpers).
    pub(crate) fn clone_as_root(&self) -> RawHandle {
        let mut h = RawHandle::null();
        h.rebind(self.meta);
        h
    }

    /// Payload address, or null
    #[inline]
    pub(crate) fn payload(&self) -> *mut u8 {
        unsafe {
            match self.meta.as_ref() {
                Some(m) if !m.is_destroyed() => m.payload(),
                _ => std::ptr::null_mut(),
            }
        }
    }
}

impl Drop for RawHandle {
    fn drop(&mut self) {
        // Owned handles carry no root count; their liveness is the tracer's
        // business. Root handles release their count here.
        if self.owner.is_null() && !self.meta.is_null() {
            let meta = self.meta;
            let _ = collector::try_with(|c| unsafe {
                let m = &mut *meta;
                if m.dec_root_refs() == 0 {
                    c.note_unref(meta);
                }
            });
        }
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.meta.is_null() {
            write!(f, "RawHandle(null)")
        } else {
            write!(f, "RawHandle({:p})", self.meta)
        }
    }
}

/// Managed smart-pointer handle to a referent of type `T`.
///
/// Two pointer-sized words; cheap to clone. A cloned or default handle is a
/// *root* (it lives outside any managed object); handles embedded inside
/// managed referents are attributed to their owner when the owning
/// allocation completes.
#[repr(transparent)]
pub struct Gc<T> {
    raw: RawHandle,
    _marker: PhantomData<*mut T>,
}

impl<T> Gc<T> {
    /// Null handle
    #[inline]
    pub const fn null() -> Gc<T> {
        Gc {
            raw: RawHandle::null(),
            _marker: PhantomData,
        }
    }

    /// Wrap a header as a fresh root handle (allocation return path).
    pub(crate) fn from_meta(meta: *mut ObjMeta) -> Gc<T> {
        let mut raw = RawHandle::null();
        raw.rebind(meta);
        Gc {
            raw,
            _marker: PhantomData,
        }
    }

    /// Wrap an already-accounted raw handle.
    pub(crate) fn from_raw(raw: RawHandle) -> Gc<T> {
        Gc {
            raw,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    #[inline]
    pub fn raw(&self) -> &RawHandle {
        &self.raw
    }

    #[inline]
    pub(crate) fn meta_ptr(&self) -> *mut ObjMeta {
        self.raw.meta
    }

    /// Number of elements behind this handle (1 for scalar allocations)
    pub fn len(&self) -> usize {
        unsafe { self.raw.meta.as_ref().map_or(0, |m| m.array_len()) }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Referent access; fails on null and on explicitly destroyed referents
    pub fn try_get(&self) -> Result<&T> {
        let p = self.raw.payload();
        if p.is_null() {
            return Err(GcError::NullDeref);
        }
        Ok(unsafe { &*(p as *const T) })
    }

    /// Referent access; panics on null
    #[inline]
    pub fn get(&self) -> &T {
        match self.try_get() {
            Ok(r) => r,
            Err(e) => panic!("{e}"),
        }
    }

    /// Mutable referent access; panics on null.
    ///
    /// The collector is single-threaded and handles may alias; the caller
    /// keeps the usual exclusive-access discipline between clones.
    pub fn get_mut(&mut self) -> &mut T {
        let p = self.raw.payload();
        if p.is_null() {
            panic!("{}", GcError::NullDeref);
        }
        unsafe { &mut *(p as *mut T) }
    }

    /// All elements of an array allocation
    pub fn as_slice(&self) -> &[T] {
        let p = self.raw.payload();
        if p.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(p as *const T, self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let p = self.raw.payload();
        if p.is_null() {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(p as *mut T, self.len()) }
    }

    /// Re-point this handle at `other`'s referent, in place.
    ///
    /// This is the assignment operator of the handle: it preserves the
    /// owner word and runs the write barrier, so it is the required way to
    /// update a handle stored inside a managed referent.
    pub fn set(&mut self, other: &Gc<T>) {
        self.raw.rebind(other.raw.meta);
    }

    /// Null-assign, releasing the root count if this handle is a root
    pub fn clear(&mut self) {
        self.raw.rebind(std::ptr::null_mut());
    }

    /// Same referent test (payload address equality)
    #[inline]
    pub fn ptr_eq(&self, other: &Gc<T>) -> bool {
        self.raw.meta == other.raw.meta
    }

    /// True once the referent has been promoted to the old generation
    pub fn in_old_gen(&self) -> bool {
        unsafe { self.raw.meta.as_ref().is_some_and(|m| m.is_old()) }
    }

    /// Current root-handle count of the referent (0 for null handles)
    pub fn root_refs(&self) -> u16 {
        unsafe { self.raw.meta.as_ref().map_or(0, |m| m.root_refs()) }
    }

    /// Static-cast analog: reinterpret the referent type. Both handles
    /// denote the same header.
    ///
    /// # Safety
    /// `U` must be layout- and destruction-compatible with the allocated
    /// referent type.
    pub unsafe fn cast_unchecked<U>(&self) -> Gc<U> {
        Gc::from_raw(self.raw.clone_as_root())
    }

    /// Dynamic-cast analog: returns a handle to the same header when the
    /// allocation was made with referent type `U`, a null handle otherwise.
    pub fn downcast<U: Trace + 'static>(&self) -> Gc<U> {
        unsafe {
            match self.raw.meta.as_ref() {
                Some(m) if m.klass().type_id == TypeId::of::<U>() => {
                    Gc::from_raw(self.raw.clone_as_root())
                }
                _ => Gc::null(),
            }
        }
    }
}

impl<T> Default for Gc<T> {
    fn default() -> Self {
        Gc::null()
    }
}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        Gc::from_raw(self.raw.clone_as_root())
    }
}

impl<T> Deref for Gc<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
    }
}

impl<T> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for Gc<T> {}

/// Ordering delegates to the referent, as required for ordered-set
/// elements. Panics on null handles.
impl<T: Ord> PartialOrd for Gc<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for Gc<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.get().cmp(other.get())
    }
}

impl<T> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw.meta.is_null() {
            write!(f, "Gc<{}>(null)", std::any::type_name::<T>())
        } else {
            write!(f, "Gc<{}>({:p})", std::any::type_name::<T>(), self.raw.meta)
        }
    }
}

/// Look up the handle for a raw referent reference.
///
/// Searches the generation lists (plus in-flight allocations and headers
/// currently being swept, so destructors may look themselves up) for the
/// unique header whose payload interval contains `r`, and verifies the
/// allocation's referent type. Fails with [`GcError::MissingHeader`] when
/// no covering header of the right type exists.
pub fn handle_from<T: Trace + 'static>(r: &T) -> Result<Gc<T>> {
    let addr = r as *const T as *const u8;
    let meta = collector::try_with(|c| c.find_owner_meta(addr))
        .ok_or_else(|| GcError::Internal("collector unavailable".into()))?
        .ok_or(GcError::MissingHeader {
            address: addr as usize,
        })?;

    unsafe {
        if (*meta).klass().type_id != TypeId::of::<T>() {
            return Err(GcError::MissingHeader {
                address: addr as usize,
            });
        }
    }
    Ok(Gc::from_meta(meta))
}

/// Destroy a handle's referent immediately.
///
/// Element destructors run now, exactly once; the header itself is
/// reclaimed by the next sweep that finds it unreachable, and any other
/// handle still pointing at it is purged (nulled) when a later traversal
/// visits its parent. The passed handle is nulled with the usual root
/// accounting.
pub fn gc_delete<T>(handle: &mut Gc<T>) {
    let meta = handle.meta_ptr();
    if meta.is_null() {
        return;
    }
    // Destructors run outside any collector borrow; they may allocate or
    // look up the dying object.
    unsafe { (*meta).destroy() };
    handle.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_two_words() {
        assert_eq!(
            std::mem::size_of::<Gc<u64>>(),
            2 * std::mem::size_of::<usize>()
        );
        assert_eq!(
            std::mem::size_of::<RawHandle>(),
            std::mem::size_of::<Gc<u64>>()
        );
    }

    #[test]
    fn test_null_handle_is_inert() {
        let h: Gc<i32> = Gc::null();
        assert!(h.is_null());
        assert_eq!(h.len(), 0);
        assert!(h.try_get().is_err());
        assert_eq!(h.root_refs(), 0);

        let h2 = h.clone();
        assert!(h2.ptr_eq(&h));
    }

    #[test]
    fn test_null_clear_is_noop() {
        let mut h: Gc<i32> = Gc::null();
        h.clear();
        assert!(h.is_null());
    }

    #[test]
    #[should_panic(expected = "Null dereference")]
    fn test_null_deref_panics() {
        let h: Gc<i32> = Gc::null();
        let _ = *h;
    }
}
