//! Ivy runtime: tagged values, the type/dispatch system, the tracing
//! collector and its root sets.

#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::type_complexity)]

pub mod core;
pub mod errors;
pub mod vm;
mod runtime;

// Re-exports from core/
pub use core::dispatch::{DispatchTable, Method, SLOT_MATERIALIZE, SLOT_UNMATERIALIZE};
pub use core::heap::{Color, Heap, HeapObject, HeapStats, Instance, ObjectBody, Tracer, WeakCell};
pub use core::list::List;
pub use core::map::{Map, MapKey};
pub use core::string::Str;
pub use core::types::{TypeDescriptor, TypeId, TypeRegistry, TypeSpec};
pub use core::value::{NativeFn, Value, ValueTag};

// Re-exports from vm/
pub use vm::locks::{MAX_INITIAL_BUCKETS, MAX_PIN_COUNT, PinEntry, PinTable};
pub use vm::stack::Stack;

pub use errors::{Result, RuntimeError, Status};
pub use ivy_core::ObjectId;

pub use runtime::{
    CollectionReport, GcPhase, GcStats, RootReport, Runtime, RuntimeConfig, ShutdownReport,
};
