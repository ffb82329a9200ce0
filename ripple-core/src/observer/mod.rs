//! Observer Layer
//!
//! This module wraps plain value trees so that reads and writes pass through
//! dependency tracking.
//!
//! - [`Value`], [`Object`] and [`Array`] are the dynamic data model.
//! - [`observe`] attaches an [`Observer`] to a container, converting every
//!   object property into a tracked slot and recursing into children.
//! - [`set`] and [`del`] are the structural entry points for keys that no
//!   existing slot covers.
//!
//! Direct element access on arrays cannot be intercepted. Arrays are
//! observed through the slot that holds them and through their observer's
//! dep, which every mutating method notifies.

mod array;
mod object;
mod observe;
mod slot;
mod value;

pub use array::Array;
pub use object::{Accessor, AccessorGet, AccessorSet, Object};
pub use observe::{del, observe, set, Key, Observer};
pub use slot::{define_slot, slot_dep, CustomSetter};
pub use value::Value;
