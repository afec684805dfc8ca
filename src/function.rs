//! Managed Callable - Type-Erased Invocable Behind a Handle
//!
//! `GcFunction<A, R>` stores a traced environment as a managed object and
//! erases its type behind an untyped handle plus a monomorphized call
//! thunk. The environment participates in collection like any referent:
//! handles it captures stay alive while the callable is reachable.
//!
//! `A` is the argument pack (use a tuple for multiple arguments), `R` the
//! return type.

use crate::alloc::gc_new;
use crate::error::{GcError, Result};
use crate::handle::{Gc, RawHandle};
use crate::trace::{Trace, Tracer};
use std::fmt;
use std::marker::PhantomData;

/// Managed environment: captured state plus the call entry point
struct FnEnv<E, A, R> {
    env: E,
    call: fn(&E, A) -> R,
}

impl<E: Trace, A: 'static, R: 'static> Trace for FnEnv<E, A, R> {
    const INDIRECT: bool = E::INDIRECT;

    fn trace(&self, tracer: &mut Tracer) {
        self.env.trace(tracer);
    }
}

/// Managed type-erased callable
pub struct GcFunction<A, R> {
    target: RawHandle,
    invoke: Option<unsafe fn(*const u8, A) -> R>,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A: 'static, R: 'static> GcFunction<A, R> {
    /// Null callable; calling it fails
    pub fn null() -> GcFunction<A, R> {
        GcFunction {
            target: RawHandle::null(),
            invoke: None,
            _marker: PhantomData,
        }
    }

    /// Allocate a callable from a traced environment and its entry point.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use igc::{gc_new, Gc, GcFunction};
    ///
    /// let captured = gc_new(|| 41i32)?;
    /// let f = GcFunction::new(captured, |v: &Gc<i32>, add: i32| **v + add)?;
    /// assert_eq!(f.call(1), 42);
    /// # Ok::<(), igc::GcError>(())
    /// ```
    pub fn new<E: Trace + 'static>(env: E, call: fn(&E, A) -> R) -> Result<GcFunction<A, R>> {
        let handle: Gc<FnEnv<E, A, R>> = gc_new(move || FnEnv { env, call })?;
        let target = handle.raw().clone_as_root();
        Ok(GcFunction {
            target,
            invoke: Some(invoke_impl::<E, A, R>),
            _marker: PhantomData,
        })
    }

    pub fn is_null(&self) -> bool {
        self.target.is_null()
    }

    /// Invoke the callable; panics on a null callable
    pub fn call(&self, args: A) -> R {
        match self.try_call(args) {
            Ok(r) => r,
            Err(e) => panic!("{e}"),
        }
    }

    /// Invoke the callable, failing on null instead of panicking
    pub fn try_call(&self, args: A) -> Result<R> {
        let payload = self.target.payload();
        match (self.invoke, payload.is_null()) {
            (Some(f), false) => Ok(unsafe { f(payload as *const u8, args) }),
            _ => Err(GcError::NullDeref),
        }
    }
}

unsafe fn invoke_impl<E: Trace, A, R>(payload: *const u8, args: A) -> R {
    let env = &*(payload as *const FnEnv<E, A, R>);
    (env.call)(&env.env, args)
}

impl<A: 'static, R: 'static> Trace for GcFunction<A, R> {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.visit_raw(&self.target);
    }
}

impl<A, R> Clone for GcFunction<A, R> {
    fn clone(&self) -> Self {
        GcFunction {
            target: self.target.clone_as_root(),
            invoke: self.invoke,
            _marker: PhantomData,
        }
    }
}

impl<A, R> PartialEq for GcFunction<A, R> {
    /// Two callables are equal when they share the same environment object
    fn eq(&self, other: &Self) -> bool {
        self.target.meta_ptr() == other.target.meta_ptr()
    }
}

impl<A, R> Eq for GcFunction<A, R> {}

impl<A, R> fmt::Debug for GcFunction<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.target.is_null() {
            write!(f, "GcFunction(null)")
        } else {
            write!(f, "GcFunction({:p})", self.target.meta_ptr())
        }
    }
}

impl<A: 'static, R: 'static> Default for GcFunction<A, R> {
    fn default() -> Self {
        GcFunction::null()
    }
}
