//! Operand stack shared by native call frames.
//!
//! Slots `0..size` are live and are scanned as roots. Popping only moves the
//! size down; stale slots above it keep their old contents until a later
//! push overwrites them, and are never scanned.

use crate::core::value::Value;
use crate::errors::{Result, RuntimeError, messages};
use ivy_core::{grow_capacity, max_capacity};

const MIN_STACK_CAPACITY: usize = 8;

pub struct Stack {
    slots: Vec<Value>,
    size: usize,
    capacity: usize,
    initial: usize,
    max: usize,
}

impl Stack {
    pub fn new() -> Self {
        Self::with_limit(0, max_capacity::<Value>())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_limit(capacity, max_capacity::<Value>())
    }

    /// The initial capacity is reserved by the first push, so an oversized
    /// request fails there as an allocation error.
    pub(crate) fn with_limit(initial: usize, max: usize) -> Self {
        Self {
            slots: Vec::new(),
            size: 0,
            capacity: 0,
            initial: initial.min(max),
            max,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.max
    }

    pub fn push(&mut self, value: Value) -> Result<()> {
        if self.size == self.capacity {
            self.grow()?;
        }
        if self.size < self.slots.len() {
            self.slots[self.size] = value;
        } else {
            self.slots.push(value);
        }
        self.size += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value> {
        if self.size == 0 {
            return Err(RuntimeError::invalid_operation(messages::STACK_UNDERFLOW));
        }
        self.size -= 1;
        Ok(self.slots[self.size])
    }

    /// Value `index` slots below the top (`0` is the most recent push).
    pub fn get(&self, index: usize) -> Result<Value> {
        if index >= self.size {
            return Err(RuntimeError::invalid_argument(format!(
                "{}: stack index {index} (size {})",
                messages::INDEX_OUT_OF_BOUNDS,
                self.size
            )));
        }
        Ok(self.slots[self.size - 1 - index])
    }

    /// Drop everything above `size`. Larger sizes are ignored.
    pub fn truncate(&mut self, size: usize) {
        self.size = self.size.min(size);
    }

    /// The live slots, bottom first.
    #[inline]
    pub fn live(&self) -> &[Value] {
        &self.slots[..self.size]
    }

    fn grow(&mut self) -> Result<()> {
        let next = if self.capacity == 0 && self.initial > 0 {
            self.initial
        } else {
            grow_capacity(self.capacity, MIN_STACK_CAPACITY, self.max).map_err(|e| {
                RuntimeError::allocation_failed(format!("{}: {e}", messages::STACK_EXHAUSTED))
            })?
        };
        self.slots.try_reserve_exact(next - self.slots.len())?;
        self.capacity = next;
        Ok(())
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}
