use std::rc::Rc;

use crate::core::dispatch::{DispatchTable, SLOT_MATERIALIZE, SLOT_UNMATERIALIZE, unset_slot};
use crate::core::heap::Heap;
use crate::core::types::{TypeId, TypeRegistry, TypeSpec};
use crate::core::value::{NativeFn, Value};
use crate::errors::{Result, RuntimeError, Status, messages};
use crate::vm::locks::PinTable;
use crate::vm::stack::Stack;

use super::config::RuntimeConfig;
use super::gc::GcState;

/// One runtime instance: heap, type registry, and the two root sources.
///
/// Runtimes are independent of each other; values must never be carried
/// from one runtime to another.
pub struct Runtime {
    pub(crate) heap: Heap,
    pub(crate) types: TypeRegistry,
    pub(crate) stack: Stack,
    pub(crate) pins: PinTable,
    pub(crate) gc: GcState,
    pub(crate) config: RuntimeConfig,
    status: Status,
    recovery_depth: usize,
    pub(crate) shut_down: bool,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            heap: Heap::new(),
            types: TypeRegistry::new(),
            stack: Stack::with_capacity(config.initial_stack_capacity),
            pins: PinTable::new(config.pin_buckets),
            gc: GcState::new(config.gc_threshold),
            config,
            status: Status::Ok,
            recovery_depth: 0,
            shut_down: false,
        }
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[inline]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn register_type(&mut self, spec: TypeSpec) -> Result<TypeId> {
        self.types.register(spec)
    }

    pub fn dispatch_table(&mut self, ty: TypeId) -> Result<Rc<DispatchTable>> {
        if self.types.descriptor(ty).is_none() {
            return Err(RuntimeError::invalid_argument(format!(
                "{}: {ty:?}",
                messages::UNKNOWN_TYPE
            )));
        }
        Ok(self.types.dispatch_table(ty))
    }

    // ==================== Stack ====================

    #[inline]
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn push(&mut self, value: Value) -> Result<()> {
        self.stack.push(value)
    }

    pub fn pop(&mut self) -> Result<Value> {
        self.stack.pop()
    }

    /// Value `index` slots below the top of the stack.
    pub fn peek(&self, index: usize) -> Result<Value> {
        self.stack.get(index)
    }

    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack.size()
    }

    /// Current stack size, for a recovery handler to restore later.
    #[inline]
    pub fn stack_mark(&self) -> usize {
        self.stack.size()
    }

    pub fn truncate_stack(&mut self, mark: usize) {
        self.stack.truncate(mark);
    }

    // ==================== Pins ====================

    #[inline]
    pub fn pins(&self) -> &PinTable {
        &self.pins
    }

    /// Keep `value`'s referent alive regardless of the stack. Returns the
    /// new lock count.
    pub fn lock(&mut self, value: Value) -> Result<u32> {
        self.check_live(value)?;
        self.pins.lock(value)
    }

    /// Release one lock taken by [`Runtime::lock`]. Returns the remaining count.
    pub fn unlock(&mut self, value: Value) -> Result<u32> {
        self.pins.unlock(value)
    }

    pub fn pin_count(&self, value: Value) -> u32 {
        value.ref_id().map_or(0, |id| self.pins.count(id))
    }

    // ==================== Calls ====================

    /// Call a native function value. Arguments and results travel through
    /// the stack.
    pub fn call(&mut self, callee: Value) -> Result<()> {
        match callee {
            Value::Native(f) => self.call_native(f),
            other => Err(RuntimeError::invalid_argument(format!(
                "{}: {}",
                messages::NOT_CALLABLE,
                other.tag()
            ))),
        }
    }

    #[inline]
    pub fn call_native(&mut self, f: NativeFn) -> Result<()> {
        f(self)
    }

    /// Call dispatch slot `slot` of `receiver`'s type. Calling an unset slot
    /// is a type construction bug and panics.
    #[track_caller]
    pub fn invoke(&mut self, receiver: Value, slot: usize) -> Result<()> {
        let ty = self.type_of(receiver)?;
        let table = self.types.dispatch_table(ty);
        match table.get(slot) {
            Some(method) => method(self, receiver),
            None => unset_slot(self.types.get(ty).name(), slot),
        }
    }

    /// Ask `receiver`'s type to build its native resources.
    pub fn materialize(&mut self, receiver: Value) -> Result<()> {
        self.invoke(receiver, SLOT_MATERIALIZE)
    }

    /// Ask `receiver`'s type to release its native resources.
    pub fn unmaterialize(&mut self, receiver: Value) -> Result<()> {
        self.invoke(receiver, SLOT_UNMATERIALIZE)
    }

    // ==================== Recovery points ====================

    /// Run `f` under a recovery point. An error raised anywhere inside `f`
    /// ends it early and its status is recorded on the runtime. The stack
    /// and pins are left as `f` left them.
    pub fn protect<T>(&mut self, f: impl FnOnce(&mut Runtime) -> Result<T>) -> Result<T> {
        self.recovery_depth += 1;
        let result = f(self);
        self.recovery_depth -= 1;
        self.status = match &result {
            Ok(_) => Status::Ok,
            Err(e) => {
                log::debug!(
                    "recovered at depth {}: {e}",
                    self.recovery_depth + 1
                );
                e.status()
            }
        };
        result
    }

    /// Status recorded by the most recent protected call.
    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Number of recovery points currently established.
    #[inline]
    pub fn recovery_depth(&self) -> usize {
        self.recovery_depth
    }

    // ==================== Type queries ====================

    pub fn type_of(&self, value: Value) -> Result<TypeId> {
        let Some(id) = value.ref_id() else {
            return Err(RuntimeError::invalid_argument(format!(
                "{}: {}",
                messages::NOT_A_REFERENCE,
                value.tag()
            )));
        };
        self.heap
            .get(id)
            .map(|obj| obj.type_id())
            .ok_or_else(|| RuntimeError::invalid_argument(format!("{}: {id:?}", messages::STALE_HANDLE)))
    }

    pub fn is_instance_of(&self, value: Value, ty: TypeId) -> bool {
        self.type_of(value)
            .is_ok_and(|actual| self.types.is_subtype(actual, ty))
    }

    /// Whether `value` refers to an object that has not been reclaimed.
    pub fn is_live(&self, value: Value) -> bool {
        value.ref_id().is_some_and(|id| self.heap.contains(id))
    }

    pub(crate) fn check_live(&self, value: Value) -> Result<()> {
        self.type_of(value).map(|_| ())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
