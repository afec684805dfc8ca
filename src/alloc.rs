//! Allocation - Creating Managed Objects
//!
//! `gc_new` / `gc_new_array` allocate header + payload in one block, link
//! the header into the young generation, and build the elements directly
//! inside the payload. As soon as an element is written, its embedded
//! handles are attributed to the new owner (offset discovery for the type
//! happens once, when the first allocation of that type completes).
//!
//! Because elements are constructed in place, initializer code can see the
//! object's final address while construction is still running:
//! [`gc_new_in_place`] / [`gc_new_array_in_place`] hand the initializer the
//! payload slot itself, so it may call [`crate::handle_from`] on the value
//! it has just written and wire up self-references before the allocation
//! completes.
//!
//! A panicking initializer is the constructor-failure path: the
//! constructed prefix is destroyed in reverse order, the header is
//! unlinked and its bytes released, per-type discovery state is rolled
//! back, and the panic resumes. `gc_try_new` / `gc_try_new_array` offer
//! the same unwinding for factories that report failure through `Result`.
//!
//! Allocation is the collector's only implicit trigger: when the
//! allocation counter crosses `new_gen_obj_cnt_to_gc`, the next entry
//! point runs a young cycle before installing its header.

use crate::collector;
use crate::error::{GcError, Result};
use crate::handle::Gc;
use crate::object::class_meta::MAX_ALIGN;
use crate::trace::Trace;
use std::mem::MaybeUninit;

/// Allocation hook: asked for `size` bytes, returns a 16-byte aligned
/// block or null
pub type AllocFn = unsafe fn(usize) -> *mut u8;
/// Deallocation hook: releases a block returned by the paired [`AllocFn`]
pub type DeallocFn = unsafe fn(*mut u8, usize);

/// Install the allocator hook pair consulted by all managed allocations.
pub fn set_allocator(alloc: AllocFn, dealloc: DeallocFn) {
    collector::with(|c| c.set_allocator(Some(alloc), Some(dealloc)));
}

/// Return to the host allocator.
pub fn reset_allocator() {
    collector::with(|c| c.set_allocator(None, None));
}

/// Allocate one managed `T` built by `init`.
///
/// # Examples
///
/// ```rust
/// use igc::{gc_new, Gc, Trace, Tracer};
///
/// struct Node {
///     next: Gc<Node>,
///     value: i32,
/// }
///
/// impl Trace for Node {
///     fn trace(&self, tracer: &mut Tracer) {
///         tracer.visit(&self.next);
///     }
/// }
///
/// let node = gc_new(|| Node { next: Gc::null(), value: 7 })?;
/// assert_eq!(node.value, 7);
/// # Ok::<(), igc::GcError>(())
/// ```
pub fn gc_new<T: Trace + 'static>(init: impl FnOnce() -> T) -> Result<Gc<T>> {
    let mut init = Some(init);
    new_meta(1, move |_, slot| match init.take() {
        Some(f) => {
            slot.write(f());
            Ok(())
        }
        None => Err(GcError::Internal("single-element factory reran".into())),
    })
}

/// Allocate `n` contiguous managed elements; `init` runs once per index.
pub fn gc_new_array<T: Trace + 'static>(
    n: usize,
    mut init: impl FnMut(usize) -> T,
) -> Result<Gc<T>> {
    new_meta(n, move |i, slot| {
        slot.write(init(i));
        Ok(())
    })
}

/// Allocate one managed `T`, constructing it in place.
///
/// The initializer receives the payload slot and must fully initialize it
/// before returning. Once it has written the value, the returned `&mut T`
/// is the referent at its final address, so the initializer may look the
/// object up and store a handle to it inside itself:
///
/// ```rust
/// use igc::{gc_new_in_place, handle_from, Gc, Trace, Tracer};
///
/// struct Node {
///     next: Gc<Node>,
/// }
///
/// impl Trace for Node {
///     fn trace(&self, tracer: &mut Tracer) {
///         tracer.visit(&self.next);
///     }
/// }
///
/// let node = gc_new_in_place(|slot| {
///     let this = slot.write(Node { next: Gc::null() });
///     let me = handle_from(&*this).expect("resolvable during construction");
///     this.next.set(&me);
/// })?;
/// assert!(node.get().next.ptr_eq(&node));
/// # Ok::<(), igc::GcError>(())
/// ```
///
/// An initializer that returns without writing the slot leaves the
/// referent uninitialized, which later tracing or destruction will read;
/// writing the slot exactly once is the caller's obligation. A panicking
/// initializer forfeits whatever it wrote into its own slot (earlier
/// elements are destroyed normally).
pub fn gc_new_in_place<T: Trace + 'static>(
    init: impl FnOnce(&mut MaybeUninit<T>),
) -> Result<Gc<T>> {
    let mut init = Some(init);
    new_meta(1, move |_, slot| match init.take() {
        Some(f) => {
            f(slot);
            Ok(())
        }
        None => Err(GcError::Internal("single-element factory reran".into())),
    })
}

/// Like [`gc_new_in_place`] for `n` contiguous elements; `init` must fully
/// initialize each slot it is given. Earlier elements are already
/// owner-attributed while later slots build, so an initializer may reach
/// back (through [`crate::handle_from`]) and re-point their handles.
pub fn gc_new_array_in_place<T: Trace + 'static>(
    n: usize,
    mut init: impl FnMut(usize, &mut MaybeUninit<T>),
) -> Result<Gc<T>> {
    new_meta(n, move |i, slot| {
        init(i, slot);
        Ok(())
    })
}

/// Like [`gc_new`], for factories that fail through `Result`.
pub fn gc_try_new<T: Trace + 'static, E>(
    init: impl FnOnce() -> std::result::Result<T, E>,
) -> Result<Gc<T>> {
    let mut init = Some(init);
    new_meta(1, move |i, slot| match init.take() {
        Some(f) => match f() {
            Ok(v) => {
                slot.write(v);
                Ok(())
            }
            Err(_) => Err(GcError::ConstructorFailure { index: i, count: 1 }),
        },
        None => Err(GcError::Internal("single-element factory reran".into())),
    })
}

/// Like [`gc_new_array`], for factories that fail through `Result`.
pub fn gc_try_new_array<T: Trace + 'static, E>(
    n: usize,
    mut init: impl FnMut(usize) -> std::result::Result<T, E>,
) -> Result<Gc<T>> {
    new_meta(n, move |i, slot| match init(i) {
        Ok(v) => {
            slot.write(v);
            Ok(())
        }
        Err(_) => Err(GcError::ConstructorFailure { index: i, count: n }),
    })
}

/// Shared allocation path. `init` must leave its slot fully initialized
/// whenever it returns `Ok(())`.
fn new_meta<T: Trace + 'static>(
    n: usize,
    mut init: impl FnMut(usize, &mut MaybeUninit<T>) -> Result<()>,
) -> Result<Gc<T>> {
    if n == 0 {
        return Err(GcError::InvalidArgument(
            "managed arrays hold at least one element".into(),
        ));
    }
    if std::mem::align_of::<T>() > MAX_ALIGN {
        return Err(GcError::InvalidArgument(format!(
            "alignment of {} exceeds the supported maximum of {}",
            std::any::type_name::<T>(),
            MAX_ALIGN,
        )));
    }
    if std::mem::size_of::<T>().checked_mul(n).is_none() {
        return Err(GcError::AllocFailure {
            requested: usize::MAX,
        });
    }

    // Safe point: allocation-triggered young cycle runs before the new
    // header exists.
    if collector::with(|c| c.take_collect_trigger()) {
        collector::collect();
    }

    let meta = collector::with(|c| {
        let klass = c.class_meta::<T>();
        c.begin_alloc(klass, n)
    })?;

    // Initializers run with no collector borrow held; they may allocate,
    // clone handles, or look up live objects - including the one being
    // built, which is already reachable by payload address. Each element
    // is attributed to its owner the moment it is written.
    let payload = unsafe { (*meta).payload() as *mut MaybeUninit<T> };
    let mut constructed = 0usize;
    let mut failure: Option<GcError> = None;

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        while constructed < n {
            let slot = unsafe { &mut *payload.add(constructed) };
            match init(constructed, slot) {
                Ok(()) => {
                    constructed += 1;
                    collector::with(|c| c.attribute_element(meta, constructed - 1));
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
    }));

    match (outcome, failure) {
        (Ok(()), None) => {
            collector::with(|c| c.end_alloc(meta));
            Ok(Gc::from_meta(meta))
        }
        (Ok(()), Some(err)) => {
            unwind_partial(payload as *mut T, constructed, meta);
            Err(err)
        }
        (Err(panic_payload), _) => {
            unwind_partial(payload as *mut T, constructed, meta);
            std::panic::resume_unwind(panic_payload);
        }
    }
}

/// Destroy the constructed prefix in reverse order, then unlink and free
/// the header with discovery state rolled back.
fn unwind_partial<T>(payload: *mut T, constructed: usize, meta: *mut crate::object::ObjMeta) {
    unsafe {
        for i in (0..constructed).rev() {
            std::ptr::drop_in_place(payload.add(i));
        }
    }
    collector::with(|c| c.abort_alloc(meta));
}
