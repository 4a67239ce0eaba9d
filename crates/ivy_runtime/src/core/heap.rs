//! Garbage collection and heap management.
//!
//! Every heap object lives in a slot of one arena. The arena is the
//! all-objects list: sweeping walks it once, and freeing a slot bumps its
//! generation so outstanding handles to the dead object stop resolving.

use crate::core::list::List;
use crate::core::map::Map;
use crate::core::string::Str;
use crate::core::types::{TypeId, TypeRegistry};
use crate::core::value::Value;
use crate::errors::{Result, RuntimeError};
use ivy_core::ObjectId;
use std::any::Any;
use std::fmt;

/// Marking state of an object within one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    /// Not yet proven reachable.
    #[default]
    White,
    /// Proven reachable, children not yet scanned. The object is on the gray worklist.
    Gray,
    /// Reachable and scanned.
    Black,
}

/// Common header of every heap object. The type is fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct ObjectHeader {
    type_id: TypeId,
}

/// Instance of a registered object type: a fixed number of value fields plus
/// an optional native payload owned by collaborator code.
#[derive(Default)]
pub struct Instance {
    fields: Vec<Value>,
    native: Option<Box<dyn Any>>,
}

impl Instance {
    pub(crate) fn new(field_count: usize) -> Self {
        Self {
            fields: vec![Value::Void; field_count],
            native: None,
        }
    }

    #[inline]
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    #[inline]
    pub fn field(&self, index: usize) -> Option<Value> {
        self.fields.get(index).copied()
    }

    #[inline]
    pub fn fields_mut(&mut self) -> &mut [Value] {
        &mut self.fields
    }

    pub fn native<T: Any>(&self) -> Option<&T> {
        self.native.as_deref().and_then(|n| n.downcast_ref::<T>())
    }

    pub fn native_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.native.as_deref_mut().and_then(|n| n.downcast_mut::<T>())
    }

    pub fn set_native(&mut self, payload: Box<dyn Any>) -> Option<Box<dyn Any>> {
        self.native.replace(payload)
    }

    pub fn take_native(&mut self) -> Option<Box<dyn Any>> {
        self.native.take()
    }

    pub fn has_native(&self) -> bool {
        self.native.is_some()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("fields", &self.fields)
            .field("native", &self.native.is_some())
            .finish()
    }
}

/// Weak reference cell. The collector never traces through `target`; once the
/// target is reclaimed the cell is cleared.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeakCell {
    target: Option<Value>,
}

impl WeakCell {
    pub(crate) fn new(target: Value) -> Self {
        Self {
            target: Some(target),
        }
    }

    #[inline]
    pub fn target(&self) -> Option<Value> {
        self.target
    }

    pub(crate) fn clear(&mut self) {
        self.target = None;
    }
}

#[derive(Debug)]
pub enum ObjectBody {
    Instance(Instance),
    List(List),
    Map(Map),
    Str(Str),
    Weak(WeakCell),
}

#[derive(Debug)]
pub struct HeapObject {
    header: ObjectHeader,
    body: ObjectBody,
}

impl HeapObject {
    pub(crate) fn new(type_id: TypeId, body: ObjectBody) -> Self {
        Self {
            header: ObjectHeader { type_id },
            body,
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.header.type_id
    }

    #[inline]
    pub fn body(&self) -> &ObjectBody {
        &self.body
    }

    #[inline]
    pub fn body_mut(&mut self) -> &mut ObjectBody {
        &mut self.body
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match &self.body {
            ObjectBody::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_instance_mut(&mut self) -> Option<&mut Instance> {
        match &mut self.body {
            ObjectBody::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match &self.body {
            ObjectBody::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut List> {
        match &mut self.body {
            ObjectBody::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match &self.body {
            ObjectBody::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match &mut self.body {
            ObjectBody::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&Str> {
        match &self.body {
            ObjectBody::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_weak(&self) -> Option<&WeakCell> {
        match &self.body {
            ObjectBody::Weak(w) => Some(w),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.body {
            ObjectBody::Instance(_) => "object",
            ObjectBody::List(_) => "list",
            ObjectBody::Map(_) => "map",
            ObjectBody::Str(_) => "string",
            ObjectBody::Weak(_) => "weak",
        }
    }

    /// Rough byte footprint, used for statistics.
    pub fn size(&self) -> usize {
        let base = std::mem::size_of::<HeapObject>();
        let deep = match &self.body {
            ObjectBody::Instance(i) => i.fields.len() * std::mem::size_of::<Value>(),
            ObjectBody::List(l) => l.estimated_bytes(),
            ObjectBody::Map(m) => m.estimated_bytes(),
            ObjectBody::Str(s) => s.len(),
            ObjectBody::Weak(_) => 0,
        };
        base + deep
    }
}

pub(crate) struct Slot {
    generation: u32,
    object: Option<HeapObject>,
}

/// Visitor handed to trace callbacks.
///
/// Visiting a white object proves it reachable: objects whose type has a
/// trace callback turn gray and join the worklist; the rest (strings, weak
/// cells, other leaf types) go straight to black.
pub struct Tracer<'a> {
    slots: &'a [Slot],
    colors: &'a mut [Color],
    gray: &'a mut Vec<ObjectId>,
    types: &'a TypeRegistry,
    reached: usize,
}

impl<'a> Tracer<'a> {
    /// Visit a value. Scalars are ignored.
    pub fn visit(&mut self, value: Value) {
        if let Some(id) = value.ref_id() {
            self.visit_id(id);
        }
    }

    pub fn visit_all(&mut self, values: &[Value]) {
        for value in values {
            self.visit(*value);
        }
    }

    fn visit_id(&mut self, id: ObjectId) {
        let idx = id.index();
        let slots = self.slots;
        let Some(slot) = slots.get(idx) else {
            return;
        };
        if slot.generation != id.generation() {
            return;
        }
        let Some(obj) = slot.object.as_ref() else {
            return;
        };
        if self.colors[idx] != Color::White {
            return;
        }
        self.reached += 1;
        if self.types.get(obj.type_id()).has_trace() {
            self.colors[idx] = Color::Gray;
            self.gray.push(id);
        } else {
            self.colors[idx] = Color::Black;
        }
    }

    /// Number of objects this tracer has proven reachable so far.
    pub fn reached(&self) -> usize {
        self.reached
    }

    fn drain(&mut self) {
        let slots = self.slots;
        let types = self.types;
        while let Some(id) = self.gray.pop() {
            let idx = id.index();
            let Some(obj) = slots[idx].object.as_ref() else {
                unreachable!("gray object {id:?} has no heap slot");
            };
            self.colors[idx] = Color::Black;
            if let Some(trace) = types.get(obj.type_id()).trace_fn() {
                trace(obj, self);
            }
        }
    }
}

/// Per-kind object counts and byte estimates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub instances: usize,
    pub instance_bytes: usize,
    pub lists: usize,
    pub list_bytes: usize,
    pub maps: usize,
    pub map_bytes: usize,
    pub strings: usize,
    pub string_bytes: usize,
    pub weaks: usize,
    pub weak_bytes: usize,
    pub slots: usize,
    pub free_slots: usize,
}

impl HeapStats {
    pub fn total_objects(&self) -> usize {
        self.instances + self.lists + self.maps + self.strings + self.weaks
    }

    pub fn total_bytes(&self) -> usize {
        self.instance_bytes + self.list_bytes + self.map_bytes + self.string_bytes + self.weak_bytes
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total_bytes();
        let pct = |bytes: usize| {
            if total > 0 {
                bytes as f64 / total as f64 * 100.0
            } else {
                0.0
            }
        };
        writeln!(f, "=== Heap Memory Stats ===")?;
        for (name, count, bytes) in [
            ("Object", self.instances, self.instance_bytes),
            ("List", self.lists, self.list_bytes),
            ("Map", self.maps, self.map_bytes),
            ("String", self.strings, self.string_bytes),
            ("Weak", self.weaks, self.weak_bytes),
        ] {
            writeln!(
                f,
                "{:<9} {:>8} objects, {:>12} bytes ({:.1}%)",
                format!("{name}:"),
                count,
                bytes,
                pct(bytes)
            )?;
        }
        writeln!(f, "--------------------------")?;
        writeln!(f, "Total:    {:>8} objects, {:>12} bytes", self.total_objects(), total)?;
        write!(f, "Slots:    {:>8} slots,   {:>8} free", self.slots, self.free_slots)
    }
}

pub struct Heap {
    slots: Vec<Slot>,
    colors: Vec<Color>,
    free_list: Vec<u32>,
    gray: Vec<ObjectId>,
    live: usize,
    pub(crate) alloc_count: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(1024),
            colors: Vec::with_capacity(1024),
            free_list: Vec::new(),
            gray: Vec::new(),
            live: 0,
            alloc_count: 0,
        }
    }

    /// Place an object in a free slot. Fails only when the system cannot
    /// provide memory for a new slot or the slot index space is exhausted.
    pub(crate) fn alloc(&mut self, obj: HeapObject) -> Result<ObjectId> {
        let id = if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx as usize];
            debug_assert!(slot.object.is_none());
            slot.object = Some(obj);
            self.colors[idx as usize] = Color::White;
            ObjectId::new(idx, slot.generation)
        } else {
            let idx = u32::try_from(self.slots.len())
                .map_err(|_| RuntimeError::allocation_failed("heap slot index space exhausted"))?;
            self.slots.try_reserve(1)?;
            self.colors.try_reserve(1)?;
            self.slots.push(Slot {
                generation: 0,
                object: Some(obj),
            });
            self.colors.push(Color::White);
            ObjectId::new(idx, 0)
        };
        self.live += 1;
        self.alloc_count += 1;
        Ok(id)
    }

    /// Whether `id` still names a live object.
    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.object.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.object.as_mut()
    }

    pub fn color(&self, id: ObjectId) -> Option<Color> {
        self.get(id)?;
        Some(self.colors[id.index()])
    }

    /// Number of live objects.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn free_slots(&self) -> usize {
        self.free_list.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &HeapObject)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.object
                .as_ref()
                .map(|obj| (ObjectId::new(idx as u32, slot.generation), obj))
        })
    }

    /// Gray every object directly named by `roots`. Returns the number of
    /// objects reached.
    pub(crate) fn premark<'r>(
        &mut self,
        types: &TypeRegistry,
        roots: impl IntoIterator<Item = &'r [Value]>,
    ) -> usize {
        let mut tracer = self.tracer(types);
        for values in roots {
            tracer.visit_all(values);
        }
        tracer.reached
    }

    /// Scan gray objects until the worklist is empty. Returns the number of
    /// further objects reached.
    pub(crate) fn drain_gray(&mut self, types: &TypeRegistry) -> usize {
        let mut tracer = self.tracer(types);
        tracer.drain();
        tracer.reached
    }

    #[inline]
    pub(crate) fn gray_len(&self) -> usize {
        self.gray.len()
    }

    fn tracer<'a>(&'a mut self, types: &'a TypeRegistry) -> Tracer<'a> {
        Tracer {
            slots: &self.slots,
            colors: &mut self.colors,
            gray: &mut self.gray,
            types,
            reached: 0,
        }
    }

    /// Unlink every white object, handing each to `finalize` exactly once,
    /// and flip survivors back to white. Returns the number reclaimed.
    pub(crate) fn sweep(&mut self, mut finalize: impl FnMut(&mut HeapObject)) -> usize {
        debug_assert!(self.gray.is_empty(), "sweep with a non-empty gray worklist");
        let mut freed = 0;
        for idx in 0..self.slots.len() {
            if self.slots[idx].object.is_none() {
                continue;
            }
            match self.colors[idx] {
                Color::White => {
                    let slot = &mut self.slots[idx];
                    let Some(mut obj) = slot.object.take() else {
                        continue;
                    };
                    // A slot whose generation is exhausted is retired, so
                    // no later object can be reached through an old handle.
                    match slot.generation.checked_add(1) {
                        Some(next) => {
                            slot.generation = next;
                            self.free_list.push(idx as u32);
                        }
                        None => log::debug!("retiring heap slot #{idx}: generations exhausted"),
                    }
                    finalize(&mut obj);
                    freed += 1;
                }
                Color::Black => self.colors[idx] = Color::White,
                Color::Gray => unreachable!("object #{idx} still gray after marking"),
            }
        }
        self.live -= freed;
        self.alloc_count = 0;
        freed
    }

    /// Clear weak cells whose targets did not survive the last sweep.
    pub(crate) fn clear_dead_weak_refs(&mut self) -> usize {
        let dead: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                let target = slot.object.as_ref()?.as_weak()?.target()?;
                let id = target.ref_id()?;
                (!self.contains(id)).then_some(idx)
            })
            .collect();
        for &idx in &dead {
            if let Some(ObjectBody::Weak(cell)) =
                self.slots[idx].object.as_mut().map(HeapObject::body_mut)
            {
                cell.clear();
            }
        }
        dead.len()
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            slots: self.slots.len(),
            free_slots: self.free_list.len(),
            ..HeapStats::default()
        };
        for (_, obj) in self.iter() {
            let size = obj.size();
            let (count, bytes) = match obj.body() {
                ObjectBody::Instance(_) => (&mut stats.instances, &mut stats.instance_bytes),
                ObjectBody::List(_) => (&mut stats.lists, &mut stats.list_bytes),
                ObjectBody::Map(_) => (&mut stats.maps, &mut stats.map_bytes),
                ObjectBody::Str(_) => (&mut stats.strings, &mut stats.string_bytes),
                ObjectBody::Weak(_) => (&mut stats.weaks, &mut stats.weak_bytes),
            };
            *count += 1;
            *bytes += size;
        }
        stats
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(text: &str) -> HeapObject {
        HeapObject::new(TypeId::STRING, ObjectBody::Str(Str::new(text)))
    }

    #[test]
    fn freed_slot_is_reused_with_a_new_generation() {
        let mut heap = Heap::new();
        let old = heap.alloc(string("a")).unwrap();
        assert_eq!(heap.sweep(|_| {}), 1);
        let new = heap.alloc(string("b")).unwrap();
        assert_eq!(new.index(), old.index());
        assert_eq!(new.generation(), old.generation() + 1);
        assert!(heap.get(old).is_none());
    }

    #[test]
    fn slot_with_exhausted_generation_is_retired() {
        let mut heap = Heap::new();
        let first = heap.alloc(string("a")).unwrap();
        heap.slots[first.index()].generation = u32::MAX;
        let stale = ObjectId::new(first.index() as u32, u32::MAX);
        assert!(heap.contains(stale));

        assert_eq!(heap.sweep(|_| {}), 1);
        assert_eq!(heap.free_slots(), 0);
        assert!(heap.get(stale).is_none());

        let next = heap.alloc(string("b")).unwrap();
        assert_ne!(next.index(), first.index());
        assert!(heap.get(stale).is_none());
        assert_eq!(heap.slot_count(), 2);
    }
}
