//! Type descriptors and the single-inheritance type lattice.
//!
//! Every heap object names a registered type. A descriptor records the
//! instance shape, the trace and finalize callbacks the collector invokes,
//! and how to build the type's dispatch table. Descriptors are immutable
//! once registered and live as long as the registry.

use crate::core::dispatch::{self, DispatchTable, ROOT_DISPATCH_SIZE};
use crate::core::heap::{HeapObject, Tracer};
use crate::errors::{Result, RuntimeError, messages::FINAL_TYPE, messages::UNKNOWN_TYPE};
use ivy_core::{FastHashMap, fast_map_new};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub const OBJECT: TypeId = TypeId(0);
    pub const LIST: TypeId = TypeId(1);
    pub const MAP: TypeId = TypeId(2);
    pub const STRING: TypeId = TypeId(3);
    pub const WEAK: TypeId = TypeId(4);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// List, map, string and weak types have fixed object bodies and cannot
    /// be subclassed.
    #[inline]
    pub fn is_builtin_collection(self) -> bool {
        matches!(
            self,
            TypeId::LIST | TypeId::MAP | TypeId::STRING | TypeId::WEAK
        )
    }
}

pub type TraceFn = Rc<dyn Fn(&HeapObject, &mut Tracer<'_>)>;
pub type FinalizeFn = Rc<dyn Fn(&mut HeapObject)>;
pub type DispatchInitFn = Rc<dyn Fn(&mut DispatchTable)>;

enum Hook<F> {
    Inherit,
    Absent,
    Set(F),
}

impl<F: Clone> Hook<F> {
    fn resolve(self, inherited: Option<&F>) -> Option<F> {
        match self {
            Hook::Inherit => inherited.cloned(),
            Hook::Absent => None,
            Hook::Set(f) => Some(f),
        }
    }
}

/// Visit every field of an instance. The root object type traces this way,
/// so subtypes do too unless they say otherwise.
pub fn trace_fields(obj: &HeapObject, tracer: &mut Tracer<'_>) {
    if let Some(instance) = obj.as_instance() {
        tracer.visit_all(instance.fields());
    }
}

fn trace_list(obj: &HeapObject, tracer: &mut Tracer<'_>) {
    if let Some(list) = obj.as_list() {
        list.trace(tracer);
    }
}

fn release_list(obj: &mut HeapObject) {
    if let Some(list) = obj.as_list_mut() {
        list.release();
    }
}

fn trace_map(obj: &HeapObject, tracer: &mut Tracer<'_>) {
    if let Some(map) = obj.as_map() {
        map.trace(tracer);
    }
}

fn release_map(obj: &mut HeapObject) {
    if let Some(map) = obj.as_map_mut() {
        map.release();
    }
}

/// Registration request for a new object type.
///
/// Unspecified parts are inherited from the parent: field count, dispatch
/// table size, and the trace and finalize callbacks.
pub struct TypeSpec {
    name: String,
    parent: TypeId,
    instance_size: Option<usize>,
    trace: Hook<TraceFn>,
    finalize: Hook<FinalizeFn>,
    dispatch_size: Option<usize>,
    dispatch_init: Option<DispatchInitFn>,
}

impl TypeSpec {
    /// A new type deriving from the root object type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: TypeId::OBJECT,
            instance_size: None,
            trace: Hook::Inherit,
            finalize: Hook::Inherit,
            dispatch_size: None,
            dispatch_init: None,
        }
    }

    pub fn parent(mut self, parent: TypeId) -> Self {
        self.parent = parent;
        self
    }

    /// Number of value fields per instance, including inherited ones.
    pub fn instance_size(mut self, fields: usize) -> Self {
        self.instance_size = Some(fields);
        self
    }

    pub fn trace(mut self, f: impl Fn(&HeapObject, &mut Tracer<'_>) + 'static) -> Self {
        let f: TraceFn = Rc::new(f);
        self.trace = Hook::Set(f);
        self
    }

    /// Instances own no outgoing references; marking never scans them.
    pub fn leaf(mut self) -> Self {
        self.trace = Hook::Absent;
        self
    }

    pub fn finalize(mut self, f: impl Fn(&mut HeapObject) + 'static) -> Self {
        let f: FinalizeFn = Rc::new(f);
        self.finalize = Hook::Set(f);
        self
    }

    /// Total dispatch slots (inherited ones included) and the initializer
    /// that fills or overrides them.
    pub fn dispatch(mut self, size: usize, init: impl Fn(&mut DispatchTable) + 'static) -> Self {
        self.dispatch_size = Some(size);
        let init: DispatchInitFn = Rc::new(init);
        self.dispatch_init = Some(init);
        self
    }
}

pub struct TypeDescriptor {
    id: TypeId,
    name: String,
    parent: Option<TypeId>,
    instance_size: usize,
    trace: Option<TraceFn>,
    finalize: Option<FinalizeFn>,
    dispatch_size: usize,
    dispatch_init: Option<DispatchInitFn>,
}

impl TypeDescriptor {
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parent(&self) -> Option<TypeId> {
        self.parent
    }

    #[inline]
    pub fn instance_size(&self) -> usize {
        self.instance_size
    }

    #[inline]
    pub fn dispatch_size(&self) -> usize {
        self.dispatch_size
    }

    #[inline]
    pub fn has_trace(&self) -> bool {
        self.trace.is_some()
    }

    #[inline]
    pub fn has_finalize(&self) -> bool {
        self.finalize.is_some()
    }

    pub(crate) fn trace_fn(&self) -> Option<&TraceFn> {
        self.trace.as_ref()
    }

    pub(crate) fn finalize_fn(&self) -> Option<&FinalizeFn> {
        self.finalize.as_ref()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("instance_size", &self.instance_size)
            .field("trace", &self.trace.is_some())
            .field("finalize", &self.finalize.is_some())
            .field("dispatch_size", &self.dispatch_size)
            .finish()
    }
}

pub struct TypeRegistry {
    descriptors: Vec<TypeDescriptor>,
    tables: Vec<Option<Rc<DispatchTable>>>,
    by_name: FastHashMap<String, TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            descriptors: Vec::new(),
            tables: Vec::new(),
            by_name: fast_map_new(),
        };
        registry.install_builtins();
        registry
    }

    fn install_builtins(&mut self) {
        fn builtin(
            id: TypeId,
            name: &str,
            trace: Option<TraceFn>,
            finalize: Option<FinalizeFn>,
        ) -> TypeDescriptor {
            TypeDescriptor {
                id,
                name: name.to_string(),
                parent: (id != TypeId::OBJECT).then_some(TypeId::OBJECT),
                instance_size: 0,
                trace,
                finalize,
                dispatch_size: ROOT_DISPATCH_SIZE,
                dispatch_init: None,
            }
        }

        let fields: TraceFn = Rc::new(trace_fields);
        let root_init: DispatchInitFn = Rc::new(dispatch::init_root);
        let list_trace: TraceFn = Rc::new(trace_list);
        let list_finalize: FinalizeFn = Rc::new(release_list);
        let map_trace: TraceFn = Rc::new(trace_map);
        let map_finalize: FinalizeFn = Rc::new(release_map);

        let mut object = builtin(TypeId::OBJECT, "object", Some(fields), None);
        object.dispatch_init = Some(root_init);
        self.push(object);
        self.push(builtin(TypeId::LIST, "list", Some(list_trace), Some(list_finalize)));
        self.push(builtin(TypeId::MAP, "map", Some(map_trace), Some(map_finalize)));
        self.push(builtin(TypeId::STRING, "string", None, None));
        self.push(builtin(TypeId::WEAK, "weak", None, None));
    }

    fn push(&mut self, desc: TypeDescriptor) -> TypeId {
        let id = desc.id;
        debug_assert_eq!(id.index(), self.descriptors.len());
        self.by_name.insert(desc.name.clone(), id);
        self.descriptors.push(desc);
        self.tables.push(None);
        id
    }

    /// Register a type, or return the existing id if a type of the same name
    /// and parent is already registered.
    pub fn register(&mut self, spec: TypeSpec) -> Result<TypeId> {
        if let Some(&existing) = self.by_name.get(spec.name.as_str()) {
            let desc = self.get(existing);
            if desc.parent != Some(spec.parent) {
                return Err(RuntimeError::invalid_argument(format!(
                    "type `{}` is already registered with a different parent",
                    spec.name
                )));
            }
            return Ok(existing);
        }

        let parent_id = spec.parent;
        let Some(parent) = self.descriptor(parent_id) else {
            return Err(RuntimeError::invalid_argument(format!(
                "{UNKNOWN_TYPE}: parent of `{}`",
                spec.name
            )));
        };
        if parent_id.is_builtin_collection() {
            return Err(RuntimeError::invalid_argument(format!(
                "{FINAL_TYPE}: `{}` cannot extend `{}`",
                spec.name, parent.name
            )));
        }

        let instance_size = spec.instance_size.unwrap_or(parent.instance_size);
        if instance_size < parent.instance_size {
            return Err(RuntimeError::invalid_argument(format!(
                "type `{}` declares {instance_size} fields but `{}` already has {}",
                spec.name, parent.name, parent.instance_size
            )));
        }
        let dispatch_size = spec.dispatch_size.unwrap_or(parent.dispatch_size);
        if dispatch_size < parent.dispatch_size {
            return Err(RuntimeError::invalid_argument(format!(
                "type `{}` declares {dispatch_size} dispatch slots but `{}` already has {}",
                spec.name, parent.name, parent.dispatch_size
            )));
        }
        let trace = spec.trace.resolve(parent.trace.as_ref());
        let finalize = spec.finalize.resolve(parent.finalize.as_ref());

        let id = u32::try_from(self.descriptors.len())
            .map(TypeId)
            .map_err(|_| RuntimeError::allocation_failed("type registry is full"))?;
        log::trace!(
            "registered type `{}` as {:?} (parent {:?}, {} fields, {} dispatch slots)",
            spec.name,
            id,
            parent_id,
            instance_size,
            dispatch_size
        );
        Ok(self.push(TypeDescriptor {
            id,
            name: spec.name,
            parent: Some(parent_id),
            instance_size,
            trace,
            finalize,
            dispatch_size,
            dispatch_init: spec.dispatch_init,
        }))
    }

    /// Descriptor for an id issued by this registry.
    #[inline]
    pub fn get(&self, id: TypeId) -> &TypeDescriptor {
        &self.descriptors[id.index()]
    }

    #[inline]
    pub fn descriptor(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.descriptors.get(id.index())
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// `ty` followed by each of its ancestors up to the root.
    pub fn ancestors(&self, ty: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        std::iter::successors(Some(ty), move |t| self.get(*t).parent)
    }

    pub fn is_subtype(&self, ty: TypeId, ancestor: TypeId) -> bool {
        self.ancestors(ty).any(|t| t == ancestor)
    }

    /// The dispatch table for `ty`, built on first request.
    pub fn dispatch_table(&mut self, ty: TypeId) -> Rc<DispatchTable> {
        if let Some(table) = &self.tables[ty.index()] {
            return Rc::clone(table);
        }
        let desc = self.get(ty);
        let (parent, size, init) = (desc.parent, desc.dispatch_size, desc.dispatch_init.clone());
        let mut table = match parent {
            Some(parent) => (*self.dispatch_table(parent)).clone().inherit(ty, size),
            None => DispatchTable::new(ty, size),
        };
        if let Some(init) = init {
            init(&mut table);
        }
        log::trace!(
            "built dispatch table for `{}` ({} slots)",
            self.get(ty).name,
            table.len()
        );
        let table = Rc::new(table);
        self.tables[ty.index()] = Some(Rc::clone(&table));
        table
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_derive_from_object_unless_told_otherwise() {
        let mut registry = TypeRegistry::new();
        let ty = registry.register(TypeSpec::new("point")).unwrap();
        assert_eq!(registry.get(ty).parent(), Some(TypeId::OBJECT));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .register(TypeSpec::new("orphan").parent(TypeId(99)))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidArgument(_)), "{err}");
        assert_eq!(registry.lookup("orphan"), None);
    }
}
