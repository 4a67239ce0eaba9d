//! Allocation and typed access to heap objects.
//!
//! A value returned by an allocating call is not yet a root. Callers push it
//! on the stack, lock it, or store it into a rooted object before the next
//! allocation, which may collect.

use std::any::Any;

use crate::core::heap::{HeapObject, Instance, ObjectBody, WeakCell};
use crate::core::list::List;
use crate::core::map::{Map, MapKey};
use crate::core::string::Str;
use crate::core::types::TypeId;
use crate::core::value::Value;
use crate::errors::{Result, RuntimeError, messages};
use crate::Runtime;
use ivy_core::ObjectId;

fn stale(id: ObjectId) -> RuntimeError {
    RuntimeError::invalid_argument(format!("{}: {id:?}", messages::STALE_HANDLE))
}

fn wrong_kind(expected: &str, found: Value) -> RuntimeError {
    RuntimeError::invalid_argument(format!("{expected}: {}", found.tag()))
}

impl Runtime {
    // ==================== Allocation ====================

    /// Place a new object on the heap, collecting first when the allocation
    /// budget is spent. `extra_roots` are kept alive across that collection.
    pub(crate) fn allocate(
        &mut self,
        type_id: TypeId,
        body: ObjectBody,
        extra_roots: &[Value],
    ) -> Result<ObjectId> {
        if self.should_collect() {
            self.collect_with_roots(extra_roots);
        }
        if let Some(max) = self.config.max_objects {
            if self.heap.len() >= max && self.config.auto_collect {
                self.collect_with_roots(extra_roots);
            }
            if self.heap.len() >= max {
                return Err(RuntimeError::allocation_failed(format!(
                    "{}: {max} live objects",
                    messages::HEAP_EXHAUSTED
                )));
            }
        }
        let id = self.heap.alloc(HeapObject::new(type_id, body))?;
        self.gc.record_allocation(self.heap.len());
        self.shut_down = false;
        Ok(id)
    }

    /// Allocate an instance of a registered object type with all fields void.
    pub fn new_object(&mut self, ty: TypeId) -> Result<Value> {
        let Some(desc) = self.types.descriptor(ty) else {
            return Err(RuntimeError::invalid_argument(format!(
                "{}: {ty:?}",
                messages::UNKNOWN_TYPE
            )));
        };
        if ty.is_builtin_collection() {
            return Err(RuntimeError::invalid_argument(format!(
                "{}: `{}`",
                messages::FINAL_TYPE,
                desc.name()
            )));
        }
        let instance = Instance::new(desc.instance_size());
        let id = self.allocate(ty, ObjectBody::Instance(instance), &[])?;
        Ok(Value::Object(id))
    }

    pub fn new_list(&mut self) -> Result<Value> {
        let id = self.allocate(TypeId::LIST, ObjectBody::List(List::new()), &[])?;
        Ok(Value::List(id))
    }

    pub fn new_list_with_capacity(&mut self, capacity: usize) -> Result<Value> {
        let list = List::with_capacity(capacity)?;
        let id = self.allocate(TypeId::LIST, ObjectBody::List(list), &[])?;
        Ok(Value::List(id))
    }

    pub fn new_map(&mut self) -> Result<Value> {
        let id = self.allocate(TypeId::MAP, ObjectBody::Map(Map::new()), &[])?;
        Ok(Value::Map(id))
    }

    pub fn new_string(&mut self, text: &str) -> Result<Value> {
        let id = self.allocate(TypeId::STRING, ObjectBody::Str(Str::new(text)), &[])?;
        Ok(Value::Str(id))
    }

    /// Allocate a weak reference to `target`. The target is kept alive for
    /// the duration of this call only.
    pub fn new_weak(&mut self, target: Value) -> Result<Value> {
        self.check_live(target)?;
        let cell = WeakCell::new(target);
        let id = self.allocate(TypeId::WEAK, ObjectBody::Weak(cell), &[target])?;
        Ok(Value::Weak(id))
    }

    // ==================== Typed access ====================

    fn instance(&self, value: Value) -> Result<&Instance> {
        let Value::Object(id) = value else {
            return Err(wrong_kind(messages::NOT_AN_OBJECT, value));
        };
        let obj = self.heap.get(id).ok_or_else(|| stale(id))?;
        obj.as_instance()
            .ok_or_else(|| wrong_kind(messages::NOT_AN_OBJECT, value))
    }

    fn instance_mut(&mut self, value: Value) -> Result<&mut Instance> {
        let Value::Object(id) = value else {
            return Err(wrong_kind(messages::NOT_AN_OBJECT, value));
        };
        let obj = self.heap.get_mut(id).ok_or_else(|| stale(id))?;
        obj.as_instance_mut()
            .ok_or_else(|| wrong_kind(messages::NOT_AN_OBJECT, value))
    }

    pub fn list(&self, value: Value) -> Result<&List> {
        let Value::List(id) = value else {
            return Err(wrong_kind(messages::NOT_A_LIST, value));
        };
        let obj = self.heap.get(id).ok_or_else(|| stale(id))?;
        obj.as_list().ok_or_else(|| wrong_kind(messages::NOT_A_LIST, value))
    }

    fn list_mut(&mut self, value: Value) -> Result<&mut List> {
        let Value::List(id) = value else {
            return Err(wrong_kind(messages::NOT_A_LIST, value));
        };
        let obj = self.heap.get_mut(id).ok_or_else(|| stale(id))?;
        obj.as_list_mut()
            .ok_or_else(|| wrong_kind(messages::NOT_A_LIST, value))
    }

    pub fn map(&self, value: Value) -> Result<&Map> {
        let Value::Map(id) = value else {
            return Err(wrong_kind(messages::NOT_A_MAP, value));
        };
        let obj = self.heap.get(id).ok_or_else(|| stale(id))?;
        obj.as_map().ok_or_else(|| wrong_kind(messages::NOT_A_MAP, value))
    }

    fn map_mut(&mut self, value: Value) -> Result<&mut Map> {
        let Value::Map(id) = value else {
            return Err(wrong_kind(messages::NOT_A_MAP, value));
        };
        let obj = self.heap.get_mut(id).ok_or_else(|| stale(id))?;
        obj.as_map_mut().ok_or_else(|| wrong_kind(messages::NOT_A_MAP, value))
    }

    pub fn string(&self, value: Value) -> Result<&Str> {
        let Value::Str(id) = value else {
            return Err(wrong_kind(messages::NOT_A_STRING, value));
        };
        let obj = self.heap.get(id).ok_or_else(|| stale(id))?;
        obj.as_str().ok_or_else(|| wrong_kind(messages::NOT_A_STRING, value))
    }

    // ==================== Instances ====================

    pub fn get_field(&self, object: Value, index: usize) -> Result<Value> {
        let instance = self.instance(object)?;
        instance.field(index).ok_or_else(|| {
            RuntimeError::invalid_argument(format!(
                "{}: field {index} of {}",
                messages::INDEX_OUT_OF_BOUNDS,
                instance.fields().len()
            ))
        })
    }

    pub fn set_field(&mut self, object: Value, index: usize, value: Value) -> Result<()> {
        let instance = self.instance_mut(object)?;
        let count = instance.fields().len();
        match instance.fields_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::invalid_argument(format!(
                "{}: field {index} of {count}",
                messages::INDEX_OUT_OF_BOUNDS
            ))),
        }
    }

    /// Attach a native payload to an instance, replacing any previous one.
    pub fn set_native<T: Any>(&mut self, object: Value, payload: T) -> Result<()> {
        self.instance_mut(object)?.set_native(Box::new(payload));
        Ok(())
    }

    /// The instance's native payload, if it has one of type `T`.
    pub fn native<T: Any>(&self, object: Value) -> Result<Option<&T>> {
        Ok(self.instance(object)?.native::<T>())
    }

    pub fn native_mut<T: Any>(&mut self, object: Value) -> Result<Option<&mut T>> {
        Ok(self.instance_mut(object)?.native_mut::<T>())
    }

    pub fn take_native(&mut self, object: Value) -> Result<Option<Box<dyn Any>>> {
        Ok(self.instance_mut(object)?.take_native())
    }

    // ==================== Lists ====================

    pub fn list_len(&self, list: Value) -> Result<usize> {
        Ok(self.list(list)?.len())
    }

    /// Element at `index`, or void when out of range.
    pub fn list_get(&self, list: Value, index: usize) -> Result<Value> {
        Ok(self.list(list)?.get(index))
    }

    pub fn list_insert(&mut self, list: Value, index: usize, value: Value) -> Result<()> {
        self.list_mut(list)?.insert(index, value)
    }

    pub fn list_append(&mut self, list: Value, value: Value) -> Result<()> {
        self.list_mut(list)?.append(value)
    }

    pub fn list_prepend(&mut self, list: Value, value: Value) -> Result<()> {
        self.list_mut(list)?.prepend(value)
    }

    pub fn list_set(&mut self, list: Value, index: usize, value: Value) -> Result<()> {
        self.list_mut(list)?.set(index, value)
    }

    /// Remove the element at `index`, returning it (void when out of range).
    pub fn list_remove(&mut self, list: Value, index: usize) -> Result<Value> {
        Ok(self.list_mut(list)?.remove(index))
    }

    pub fn list_values(&self, list: Value) -> Result<Vec<Value>> {
        Ok(self.list(list)?.as_slice().to_vec())
    }

    // ==================== Maps ====================

    fn map_key(&self, key: Value) -> Result<MapKey> {
        match key {
            Value::Void => Err(RuntimeError::invalid_argument(messages::VOID_KEY)),
            Value::Str(_) => {
                let s = self.string(key)?;
                Ok(MapKey::string(key, s.hash_code(), s.shared_text()))
            }
            _ => Ok(MapKey::scalar(key)),
        }
    }

    /// Store `value` under `key`, returning the previous value (void if
    /// none). Storing void removes the entry.
    pub fn map_set(&mut self, map: Value, key: Value, value: Value) -> Result<Value> {
        let key = self.map_key(key)?;
        self.map_mut(map)?.insert(key, value)
    }

    /// Value stored under `key`, or void when absent.
    pub fn map_get(&self, map: Value, key: Value) -> Result<Value> {
        let key = self.map_key(key)?;
        Ok(self.map(map)?.get(&key))
    }

    pub fn map_remove(&mut self, map: Value, key: Value) -> Result<Value> {
        let key = self.map_key(key)?;
        Ok(self.map_mut(map)?.remove(&key))
    }

    pub fn map_contains(&self, map: Value, key: Value) -> Result<bool> {
        let key = self.map_key(key)?;
        Ok(self.map(map)?.contains(&key))
    }

    pub fn map_len(&self, map: Value) -> Result<usize> {
        Ok(self.map(map)?.len())
    }

    pub fn map_keys(&self, map: Value) -> Result<Vec<Value>> {
        Ok(self.map(map)?.keys().collect())
    }

    // ==================== Strings and weak references ====================

    pub fn string_value(&self, string: Value) -> Result<&str> {
        Ok(self.string(string)?.as_str())
    }

    /// Target of a weak reference, or void once the target has been reclaimed.
    pub fn weak_get(&self, weak: Value) -> Result<Value> {
        let Value::Weak(id) = weak else {
            return Err(wrong_kind(messages::NOT_A_WEAK_REF, weak));
        };
        let obj = self.heap.get(id).ok_or_else(|| stale(id))?;
        let cell = obj
            .as_weak()
            .ok_or_else(|| wrong_kind(messages::NOT_A_WEAK_REF, weak))?;
        Ok(cell
            .target()
            .filter(|target| self.is_live(*target))
            .unwrap_or(Value::Void))
    }
}
