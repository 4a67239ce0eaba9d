//! Runtime module - the embedding handle.
//!
//! This module contains the Runtime struct and its operations, split into:
//! - core: construction, the stack and pin roots, calls and recovery points
//! - objects: allocation and typed access to heap objects
//! - gc: collection cycles, statistics and shutdown

mod config;
mod gc;
mod objects;

pub use config::RuntimeConfig;
pub use gc::{CollectionReport, GcPhase, GcStats, RootReport, ShutdownReport};

mod core;
pub use self::core::Runtime;
