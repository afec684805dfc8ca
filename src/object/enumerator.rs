//! Field Enumerator - Iterating the Handles Embedded in a Referent
//!
//! For a given header, yields a pointer to every handle stored inside the
//! referent. Plain referents are walked by the frozen offset list, one pass
//! per array element; container referents (indirect classes) are traced
//! live, yielding the handles the container currently stores.

use crate::handle::RawHandle;
use crate::object::meta::ObjMeta;
use std::ptr::NonNull;

/// Iterator over the embedded handles of one header. Finite, not
/// restartable; build a fresh one per traversal.
pub enum PtrEnumerator {
    /// Destroyed payloads and handle-free types yield nothing
    Empty,
    /// Offset walk: `array_len` elements x frozen offsets
    Fields {
        meta: NonNull<ObjMeta>,
        elem: usize,
        idx: usize,
    },
    /// Snapshot of a live trace over an indirect (container) referent
    Dynamic(std::vec::IntoIter<NonNull<RawHandle>>),
}

impl PtrEnumerator {
    /// Build the enumerator for `meta`.
    ///
    /// # Safety
    /// `meta` must point to a header whose payload is fully constructed
    /// (or already destroyed, which yields an empty enumerator).
    pub unsafe fn over(meta: *mut ObjMeta) -> PtrEnumerator {
        let m = &*meta;
        if m.is_being_destroyed() || m.array_len() == 0 {
            return PtrEnumerator::Empty;
        }
        let klass = m.klass();
        if klass.is_indirect() {
            let mut sink = Vec::new();
            (klass.collect_handles)(meta, &mut sink);
            PtrEnumerator::Dynamic(sink.into_iter())
        } else if klass.offsets().is_empty() {
            PtrEnumerator::Empty
        } else {
            PtrEnumerator::Fields {
                meta: NonNull::new_unchecked(meta),
                elem: 0,
                idx: 0,
            }
        }
    }
}

impl Iterator for PtrEnumerator {
    type Item = NonNull<RawHandle>;

    fn next(&mut self) -> Option<NonNull<RawHandle>> {
        match self {
            PtrEnumerator::Empty => None,
            PtrEnumerator::Dynamic(iter) => iter.next(),
            PtrEnumerator::Fields { meta, elem, idx } => {
                let m = unsafe { meta.as_ref() };
                let klass = m.klass();
                let offsets = klass.offsets();
                loop {
                    if *elem >= m.array_len() {
                        return None;
                    }
                    if *idx >= offsets.len() {
                        *idx = 0;
                        *elem += 1;
                        continue;
                    }
                    let off = offsets[*idx] as usize;
                    *idx += 1;
                    let addr = unsafe { m.payload().add(*elem * klass.size + off) };
                    return Some(unsafe { NonNull::new_unchecked(addr as *mut RawHandle) });
                }
            }
        }
    }
}
