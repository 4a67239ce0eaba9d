//! Per-type dispatch tables.
//!
//! A type's table starts as a copy of its parent's table, widened to the
//! type's own slot count, and is then handed to the type's initializer to
//! fill in new slots or override inherited ones. Tables are built on first
//! use and cached by the registry.

use crate::Runtime;
use crate::core::types::TypeId;
use crate::core::value::Value;
use crate::errors::Result;
use std::fmt;

/// A virtual method. The receiver is passed explicitly; any further
/// arguments and results travel through the runtime stack.
pub type Method = fn(&mut Runtime, Value) -> Result<()>;

/// Called by collaborator code to build native resources for an object.
pub const SLOT_MATERIALIZE: usize = 0;
/// Called by collaborator code to release native resources for an object.
pub const SLOT_UNMATERIALIZE: usize = 1;

pub(crate) const ROOT_DISPATCH_SIZE: usize = 2;

#[derive(Clone)]
pub struct DispatchTable {
    owner: TypeId,
    slots: Vec<Option<Method>>,
}

impl DispatchTable {
    pub(crate) fn new(owner: TypeId, size: usize) -> Self {
        Self {
            owner,
            slots: vec![None; size],
        }
    }

    /// Reuse an inherited table for `owner`, widening it to `size` slots.
    pub(crate) fn inherit(mut self, owner: TypeId, size: usize) -> Self {
        self.owner = owner;
        if size > self.slots.len() {
            self.slots.resize(size, None);
        }
        self
    }

    /// The type this table was built for.
    #[inline]
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Install `method` in `slot`. Writing past the declared table size is a
    /// registration bug and panics.
    #[track_caller]
    pub fn set(&mut self, slot: usize, method: Method) {
        let len = self.slots.len();
        assert!(
            slot < len,
            "dispatch slot {slot} out of range for a table of {len} slots"
        );
        self.slots[slot] = Some(method);
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<Method> {
        self.slots.get(slot).copied().flatten()
    }

    #[inline]
    pub fn is_set(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set: Vec<usize> = (0..self.slots.len()).filter(|&s| self.is_set(s)).collect();
        f.debug_struct("DispatchTable")
            .field("owner", &self.owner)
            .field("len", &self.slots.len())
            .field("set", &set)
            .finish()
    }
}

#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn unset_slot(type_name: &str, slot: usize) -> ! {
    panic!("call through unset dispatch slot {slot} of type `{type_name}`")
}

fn noop(_: &mut Runtime, _: Value) -> Result<()> {
    Ok(())
}

pub(crate) fn init_root(table: &mut DispatchTable) {
    table.set(SLOT_MATERIALIZE, noop);
    table.set(SLOT_UNMATERIALIZE, noop);
}
