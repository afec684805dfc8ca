//! Class Descriptor - Per-Type Metadata and Trampolines
//!
//! One `ClassMeta` exists per distinct referent type, obtained through the
//! collector's `TypeId`-keyed registry. It carries the element layout, the
//! byte offsets of embedded handles (discovered at the first construction of
//! the type and frozen afterwards), the referent `TypeId` used by the
//! downcast helper, and the type-erased trampolines for destroying elements
//! and enumerating embedded handles.

use crate::handle::RawHandle;
use crate::object::meta::ObjMeta;
use crate::trace::{Trace, Tracer};
use std::any::TypeId;
use std::cell::{Cell, UnsafeCell};
use std::ptr::NonNull;

/// Maximum alignment the default allocation path supports
pub const MAX_ALIGN: usize = 16;

/// Offset-discovery state; `Registered` freezes the offset list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryState {
    /// No successful construction of the type yet
    Unregistered,
    /// Offsets harvested and frozen
    Registered,
}

/// Per-type singleton describing one referent type
pub struct ClassMeta {
    /// Byte size of one element
    pub size: usize,
    /// Alignment of one element
    pub align: usize,
    /// Distance from the header start to the payload start
    pub payload_offset: usize,
    /// Referent type identity, consulted by the downcast helper
    pub type_id: TypeId,
    /// Referent type name, for logging
    pub type_name: &'static str,
    /// True when offsets cannot describe the type's handles and the live
    /// value must be traced at each enumeration
    indirect: Cell<bool>,
    /// Whether `INDIRECT` was declared by the type (survives rollback)
    declared_indirect: bool,
    state: Cell<DiscoveryState>,
    /// Byte offsets of embedded handles within one element.
    /// Written exactly once (first successful construction), read-only after.
    sub_ptr_offsets: UnsafeCell<Vec<u16>>,
    /// Destroy all elements of a header
    pub drop_elems: unsafe fn(*mut ObjMeta),
    /// Trace the live payload, pushing every embedded handle
    pub collect_handles: unsafe fn(*mut ObjMeta, &mut Vec<NonNull<RawHandle>>),
    /// Trace one element only; used to attribute a freshly constructed
    /// element's handles to their owner while later elements still build
    pub collect_element: unsafe fn(*mut ObjMeta, usize, &mut Vec<NonNull<RawHandle>>),
}

impl ClassMeta {
    /// Build the descriptor for `T`. Called once per type by the registry.
    pub fn of<T: Trace + 'static>() -> ClassMeta {
        let align = std::mem::align_of::<T>();
        let header = std::mem::size_of::<ObjMeta>();
        let payload_offset = round_up(header, align.max(std::mem::align_of::<usize>()));

        ClassMeta {
            size: std::mem::size_of::<T>(),
            align,
            payload_offset,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            indirect: Cell::new(T::INDIRECT),
            declared_indirect: T::INDIRECT,
            state: Cell::new(DiscoveryState::Unregistered),
            sub_ptr_offsets: UnsafeCell::new(Vec::new()),
            drop_elems: drop_elems_impl::<T>,
            collect_handles: collect_handles_impl::<T>,
            collect_element: collect_element_impl::<T>,
        }
    }

    #[inline]
    pub fn state(&self) -> DiscoveryState {
        self.state.get()
    }

    #[inline]
    pub fn is_indirect(&self) -> bool {
        self.indirect.get()
    }

    /// The frozen offset list. Empty until the first successful
    /// construction of the type.
    #[inline]
    pub fn offsets(&self) -> &[u16] {
        // Written once under discover_offsets, read-only afterwards; the
        // collector is single-threaded.
        unsafe { &*self.sub_ptr_offsets.get() }
    }

    /// Harvest embedded-handle offsets from a freshly constructed payload.
    ///
    /// Runs once per type, right after the first allocation of the type
    /// finishes constructing its elements. Visited handles inside the first
    /// element yield offsets; a handle outside the payload extent means the
    /// type keeps handles behind an indirection it did not declare, and the
    /// class falls back to dynamic enumeration.
    ///
    /// # Safety
    /// `meta` must be a fully constructed, not-yet-destroyed allocation of
    /// this class.
    pub unsafe fn discover_offsets(&self, meta: *mut ObjMeta) {
        if self.state.get() == DiscoveryState::Registered {
            return;
        }
        if self.indirect.get() {
            self.state.set(DiscoveryState::Registered);
            return;
        }

        let mut sink = Vec::new();
        (self.collect_handles)(meta, &mut sink);

        let m = &*meta;
        let payload = m.payload() as usize;
        let payload_end = payload + m.payload_size();
        let elem_end = payload + self.size;

        let offsets = &mut *self.sub_ptr_offsets.get();
        offsets.clear();
        for handle in sink {
            let addr = handle.as_ptr() as usize;
            if addr < payload || addr >= payload_end {
                // Undeclared indirection; offsets cannot cover it.
                offsets.clear();
                self.indirect.set(true);
                self.state.set(DiscoveryState::Registered);
                return;
            }
            if addr >= elem_end {
                // Later array elements repeat the first element's offsets.
                continue;
            }
            let off = addr - payload;
            if off > u16::MAX as usize {
                offsets.clear();
                self.indirect.set(true);
                self.state.set(DiscoveryState::Registered);
                return;
            }
            // Monotonic append; trace visiting a handle twice is an
            // implementation error of the referent, not fatal here.
            if offsets.last().map_or(true, |&last| (last as usize) < off) {
                offsets.push(off as u16);
            }
        }
        self.state.set(DiscoveryState::Registered);
    }

    /// Roll discovery back after a failed first construction so a later
    /// successful construction retries with a clean slate.
    pub fn abort_discovery(&self) {
        if self.state.get() == DiscoveryState::Unregistered {
            unsafe { (*self.sub_ptr_offsets.get()).clear() };
            self.indirect.set(self.declared_indirect);
        }
    }
}

unsafe fn drop_elems_impl<T>(meta: *mut ObjMeta) {
    let m = &*meta;
    let p = m.payload() as *mut T;
    for i in 0..m.array_len() {
        std::ptr::drop_in_place(p.add(i));
    }
}

unsafe fn collect_handles_impl<T: Trace>(meta: *mut ObjMeta, sink: &mut Vec<NonNull<RawHandle>>) {
    let m = &*meta;
    if m.is_being_destroyed() {
        return;
    }
    let p = m.payload() as *const T;
    let mut tracer = Tracer::new(sink);
    for i in 0..m.array_len() {
        (*p.add(i)).trace(&mut tracer);
    }
}

unsafe fn collect_element_impl<T: Trace>(
    meta: *mut ObjMeta,
    index: usize,
    sink: &mut Vec<NonNull<RawHandle>>,
) {
    let m = &*meta;
    if m.is_being_destroyed() || index >= m.array_len() {
        return;
    }
    let p = (m.payload() as *const T).add(index);
    let mut tracer = Tracer::new(sink);
    (*p).trace(&mut tracer);
}

#[inline]
pub(crate) fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(40, 8), 40);
        assert_eq!(round_up(41, 8), 48);
        assert_eq!(round_up(40, 16), 48);
    }

    #[test]
    fn test_payload_offset_respects_alignment() {
        let cls = ClassMeta::of::<u128>();
        assert_eq!(cls.payload_offset % std::mem::align_of::<u128>(), 0);
        assert!(cls.payload_offset >= std::mem::size_of::<ObjMeta>());
    }

    #[test]
    fn test_fresh_class_is_unregistered() {
        let cls = ClassMeta::of::<i64>();
        assert_eq!(cls.state(), DiscoveryState::Unregistered);
        assert!(cls.offsets().is_empty());
        assert!(!cls.is_indirect());
    }

    #[test]
    fn test_declared_indirection_survives_rollback() {
        let cls = ClassMeta::of::<Option<i32>>();
        assert!(cls.is_indirect());
        cls.abort_discovery();
        assert!(cls.is_indirect());
    }
}
