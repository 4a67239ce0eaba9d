//! Core types for the Ivy runtime.
//!
//! This crate contains the building blocks that are independent of the runtime:
//! - `ObjectId` - Generation-checked handle to a heap slot
//! - `capacity` - Saturating growth arithmetic shared by the runtime's arrays
//! - `hash` - Fast hashing helpers and map aliases

pub mod capacity;
pub mod gc;
pub mod hash;

pub use capacity::{CapacityError, grow_capacity, max_capacity};
pub use gc::ObjectId;
pub use hash::{FastHashMap, fast_map_new};
