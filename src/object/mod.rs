//! Object Model - Headers, Class Descriptors, Enumeration
//!
//! - [`meta`]: the per-allocation header preceding every referent
//! - [`class_meta`]: the per-type descriptor with layout, offsets, trampolines
//! - [`enumerator`]: iteration over the handles embedded in one referent

pub mod class_meta;
pub mod enumerator;
pub mod meta;

pub use class_meta::{ClassMeta, DiscoveryState};
pub use enumerator::PtrEnumerator;
pub use meta::{Color, ObjMeta};
