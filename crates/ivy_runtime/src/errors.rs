//! Runtime error taxonomy.
//!
//! Recoverable failures travel as `RuntimeError` up to the nearest protected
//! call; broken internal invariants panic instead.

use ivy_core::CapacityError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Status code recorded on the runtime by the last protected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Ok,
    InvalidArgument,
    AllocationFailed,
    InvalidOperation,
}

impl RuntimeError {
    pub fn status(&self) -> Status {
        match self {
            RuntimeError::InvalidArgument(_) => Status::InvalidArgument,
            RuntimeError::AllocationFailed(_) => Status::AllocationFailed,
            RuntimeError::InvalidOperation(_) => Status::InvalidOperation,
        }
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        RuntimeError::InvalidArgument(msg.into())
    }

    pub(crate) fn allocation_failed(msg: impl Into<String>) -> Self {
        RuntimeError::AllocationFailed(msg.into())
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        RuntimeError::InvalidOperation(msg.into())
    }
}

impl From<CapacityError> for RuntimeError {
    fn from(e: CapacityError) -> Self {
        RuntimeError::AllocationFailed(e.to_string())
    }
}

impl From<std::collections::TryReserveError> for RuntimeError {
    fn from(e: std::collections::TryReserveError) -> Self {
        RuntimeError::AllocationFailed(e.to_string())
    }
}

pub mod messages {
    pub const NOT_AN_OBJECT: &str = "Not an object";
    pub const NOT_A_LIST: &str = "Not a list";
    pub const NOT_A_MAP: &str = "Not a map";
    pub const NOT_A_STRING: &str = "Not a string";
    pub const NOT_A_WEAK_REF: &str = "Not a weak reference";
    pub const NOT_A_REFERENCE: &str = "Not a heap reference";
    pub const NOT_CALLABLE: &str = "Value is not callable";
    pub const STALE_HANDLE: &str = "Object was garbage collected";
    pub const UNKNOWN_TYPE: &str = "Unknown type";
    pub const FINAL_TYPE: &str = "Built-in collection types cannot be instantiated or extended";
    pub const INDEX_OUT_OF_BOUNDS: &str = "Index out of bounds";
    pub const STACK_UNDERFLOW: &str = "Stack underflow";
    pub const STACK_EXHAUSTED: &str = "Stack reached its maximum capacity";
    pub const VOID_KEY: &str = "Map keys cannot be void";
    pub const NOT_LOCKED: &str = "Object has no outstanding lock";
    pub const LOCK_OVERFLOW: &str = "Lock count overflow";
    pub const HEAP_EXHAUSTED: &str = "Heap object limit reached";
}
