//! Runtime value representation.
//!
//! A `Value` is a small copyable tagged union. Reference-tagged values name a
//! heap slot but do not own it: only the collector decides when the referent
//! goes away.

use crate::Runtime;
use crate::errors::Result;
use ivy_core::ObjectId;
use std::fmt;

/// A native function. Arguments and results travel through the runtime stack.
pub type NativeFn = fn(&mut Runtime) -> Result<()>;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    Void,
    Bool,
    Int,
    Float,
    Object,
    Native,
    List,
    Map,
    Str,
    Weak,
}

impl ValueTag {
    pub fn name(self) -> &'static str {
        match self {
            ValueTag::Void => "void",
            ValueTag::Bool => "bool",
            ValueTag::Int => "int",
            ValueTag::Float => "float",
            ValueTag::Object => "object",
            ValueTag::Native => "native",
            ValueTag::List => "list",
            ValueTag::Map => "map",
            ValueTag::Str => "string",
            ValueTag::Weak => "weak",
        }
    }

    /// Whether values with this tag point into the heap.
    #[inline]
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            ValueTag::Object | ValueTag::List | ValueTag::Map | ValueTag::Str | ValueTag::Weak
        )
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Default)]
pub enum Value {
    #[default]
    Void,
    Bool(bool),
    Int(i32),
    Float(f32),
    Object(ObjectId),
    Native(NativeFn),
    List(ObjectId),
    Map(ObjectId),
    Str(ObjectId),
    Weak(ObjectId),
}

#[cold]
#[inline(never)]
#[track_caller]
fn tag_mismatch(expected: ValueTag, found: ValueTag) -> ! {
    panic!("Value accessor for {expected} called on a {found} value")
}

impl Value {
    pub const VOID: Value = Value::Void;
    pub const TRUE: Value = Value::Bool(true);
    pub const FALSE: Value = Value::Bool(false);

    #[inline]
    pub fn tag(&self) -> ValueTag {
        match self {
            Value::Void => ValueTag::Void,
            Value::Bool(_) => ValueTag::Bool,
            Value::Int(_) => ValueTag::Int,
            Value::Float(_) => ValueTag::Float,
            Value::Object(_) => ValueTag::Object,
            Value::Native(_) => ValueTag::Native,
            Value::List(_) => ValueTag::List,
            Value::Map(_) => ValueTag::Map,
            Value::Str(_) => ValueTag::Str,
            Value::Weak(_) => ValueTag::Weak,
        }
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        self.tag().is_reference()
    }

    #[inline]
    #[track_caller]
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            _ => tag_mismatch(ValueTag::Bool, self.tag()),
        }
    }

    #[inline]
    #[track_caller]
    pub fn as_int(&self) -> i32 {
        match self {
            Value::Int(i) => *i,
            _ => tag_mismatch(ValueTag::Int, self.tag()),
        }
    }

    #[inline]
    #[track_caller]
    pub fn as_float(&self) -> f32 {
        match self {
            Value::Float(x) => *x,
            _ => tag_mismatch(ValueTag::Float, self.tag()),
        }
    }

    #[inline]
    #[track_caller]
    pub fn as_native(&self) -> NativeFn {
        match self {
            Value::Native(f) => *f,
            _ => tag_mismatch(ValueTag::Native, self.tag()),
        }
    }

    /// Object id of an `Object`-tagged value.
    #[inline]
    #[track_caller]
    pub fn as_object_id(&self) -> ObjectId {
        match self {
            Value::Object(id) => *id,
            _ => tag_mismatch(ValueTag::Object, self.tag()),
        }
    }

    /// Heap slot named by any reference-tagged value.
    #[inline]
    pub fn ref_id(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id)
            | Value::List(id)
            | Value::Map(id)
            | Value::Str(id)
            | Value::Weak(id) => Some(*id),
            _ => None,
        }
    }

    /// Payload bits used for identity hashing and comparison.
    pub(crate) fn payload_bits(&self) -> u64 {
        match self {
            Value::Void => 0,
            Value::Bool(b) => *b as u64,
            Value::Int(i) => *i as u32 as u64,
            Value::Float(x) => x.to_bits() as u64,
            Value::Native(f) => *f as usize as u64,
            Value::Object(id)
            | Value::List(id)
            | Value::Map(id)
            | Value::Str(id)
            | Value::Weak(id) => id.identity(),
        }
    }
}

/// Identity equality: same tag and same payload bits. Floats compare by bit
/// pattern and references by handle, never by contents.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Native(a), Value::Native(b)) => std::ptr::fn_addr_eq(*a, *b),
            _ => self.tag() == other.tag() && self.payload_bits() == other.payload_bits(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<NativeFn> for Value {
    fn from(f: NativeFn) -> Self {
        Value::Native(f)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "Void"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Native(p) => write!(f, "Native({:#x})", *p as usize),
            Value::Object(id) => write!(f, "Object({id:?})"),
            Value::List(id) => write!(f, "List({id:?})"),
            Value::Map(id) => write!(f, "Map({id:?})"),
            Value::Str(id) => write!(f, "Str({id:?})"),
            Value::Weak(id) => write!(f, "Weak({id:?})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Native(p) => write!(f, "<native {:#x}>", *p as usize),
            Value::Object(id) => write!(f, "<object {id}>"),
            Value::List(id) => write!(f, "<list {id}>"),
            Value::Map(id) => write!(f, "<map {id}>"),
            Value::Str(id) => write!(f, "<string {id}>"),
            Value::Weak(id) => write!(f, "<weak {id}>"),
        }
    }
}
