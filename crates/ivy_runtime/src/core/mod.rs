//! Core runtime infrastructure.
//!
//! This module contains the object model the collector manages:
//! - `Value` - The tagged runtime value
//! - `Heap` - Arena of heap objects plus the marking machinery
//! - `TypeRegistry` and `DispatchTable` - Single-inheritance type lattice
//! - `List`, `Map`, `Str` - Built-in heap collections

pub mod dispatch;
pub mod heap;
pub mod list;
pub mod map;
pub mod string;
pub mod types;
pub mod value;

pub use value::{NativeFn, Value, ValueTag};
