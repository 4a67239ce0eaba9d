//! Growable list of values.

use crate::core::heap::Tracer;
use crate::core::value::Value;
use crate::errors::{Result, RuntimeError, messages::INDEX_OUT_OF_BOUNDS};
use ivy_core::{grow_capacity, max_capacity};

const MIN_LIST_CAPACITY: usize = 4;

/// List object body.
///
/// Capacity follows the runtime's doubling-with-saturation policy rather than
/// `Vec`'s own, so the ceiling is the same one the stack obeys.
#[derive(Clone, Debug, Default)]
pub struct List {
    items: Vec<Value>,
    capacity: usize,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let max = max_capacity::<Value>();
        if capacity > max {
            return Err(RuntimeError::allocation_failed(format!(
                "list capacity {capacity} exceeds the maximum of {max}"
            )));
        }
        let mut items = Vec::new();
        items.try_reserve_exact(capacity)?;
        Ok(Self { items, capacity })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// Element at `index`, or void when out of range.
    #[inline]
    pub fn get(&self, index: usize) -> Value {
        self.items.get(index).copied().unwrap_or(Value::Void)
    }

    /// Insert before `index` (`index == len` appends). Void values are not stored.
    pub fn insert(&mut self, index: usize, value: Value) -> Result<()> {
        if value.is_void() {
            return Ok(());
        }
        if index > self.items.len() {
            return Err(RuntimeError::invalid_argument(format!(
                "{INDEX_OUT_OF_BOUNDS}: insert at {index} (length {})",
                self.items.len()
            )));
        }
        self.reserve_one()?;
        self.items.insert(index, value);
        Ok(())
    }

    pub fn append(&mut self, value: Value) -> Result<()> {
        self.insert(self.items.len(), value)
    }

    pub fn prepend(&mut self, value: Value) -> Result<()> {
        self.insert(0, value)
    }

    /// Overwrite an existing element. Void values are not stored.
    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        if value.is_void() {
            return Ok(());
        }
        let len = self.items.len();
        match self.items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::invalid_argument(format!(
                "{INDEX_OUT_OF_BOUNDS}: set at {index} (length {len})"
            ))),
        }
    }

    /// Remove and return the element at `index`, or void when out of range.
    pub fn remove(&mut self, index: usize) -> Value {
        if index < self.items.len() {
            self.items.remove(index)
        } else {
            Value::Void
        }
    }

    fn reserve_one(&mut self) -> Result<()> {
        if self.items.len() < self.capacity {
            return Ok(());
        }
        let next = grow_capacity(self.capacity, MIN_LIST_CAPACITY, max_capacity::<Value>())?;
        self.items.try_reserve_exact(next - self.items.len())?;
        self.capacity = next;
        Ok(())
    }

    /// Drop the backing buffer. Referents are left to the collector.
    pub(crate) fn release(&mut self) {
        self.items = Vec::new();
        self.capacity = 0;
    }

    pub(crate) fn trace(&self, tracer: &mut Tracer<'_>) {
        tracer.visit_all(&self.items);
    }

    pub(crate) fn estimated_bytes(&self) -> usize {
        self.capacity * std::mem::size_of::<Value>()
    }
}
