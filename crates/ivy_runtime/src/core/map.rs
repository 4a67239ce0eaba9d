//! Hash map from values to values.
//!
//! Open hashing: an array of buckets, each a short chain of key/value nodes.
//! Keys carry a precomputed hash. String keys also carry their shared text so
//! two distinct string objects with equal contents find the same entry
//! without the map needing access to the heap.

use crate::core::heap::Tracer;
use crate::core::value::Value;
use crate::errors::Result;
use ivy_core::hash::hash_u64;
use ivy_core::{grow_capacity, max_capacity};
use smallvec::SmallVec;
use std::rc::Rc;

const MIN_BUCKETS: usize = 8;

type Bucket = SmallVec<[MapNode; 1]>;

/// A hashed map key, built by the runtime from a `Value`.
#[derive(Clone, Debug)]
pub struct MapKey {
    hash: u64,
    key: Value,
    text: Option<Rc<str>>,
}

impl MapKey {
    /// Key for a non-string value: hashed by tag and payload bits.
    pub(crate) fn scalar(key: Value) -> Self {
        let tag = key.tag() as u64;
        Self {
            hash: hash_u64(key.payload_bits() ^ (tag << 56)),
            key,
            text: None,
        }
    }

    /// Key for a string value: hashed and compared by contents.
    pub(crate) fn string(key: Value, hash: u64, text: Rc<str>) -> Self {
        Self {
            hash,
            key,
            text: Some(text),
        }
    }

    #[inline]
    pub fn value(&self) -> Value {
        self.key
    }

    fn matches(&self, node: &MapNode) -> bool {
        if self.hash != node.hash {
            return false;
        }
        match (&self.text, &node.text) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b) || **a == **b,
            (None, None) => self.key == node.key,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
struct MapNode {
    hash: u64,
    key: Value,
    text: Option<Rc<str>>,
    value: Value,
}

/// Map object body.
#[derive(Clone, Debug, Default)]
pub struct Map {
    buckets: Vec<Bucket>,
    len: usize,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_index(hash: u64, buckets: usize) -> usize {
        (hash % buckets as u64) as usize
    }

    fn find(&self, key: &MapKey) -> Option<&MapNode> {
        if self.buckets.is_empty() {
            return None;
        }
        let bucket = &self.buckets[Self::bucket_index(key.hash, self.buckets.len())];
        bucket.iter().find(|node| key.matches(node))
    }

    /// Value stored under `key`, or void when absent.
    pub fn get(&self, key: &MapKey) -> Value {
        self.find(key).map_or(Value::Void, |node| node.value)
    }

    pub fn contains(&self, key: &MapKey) -> bool {
        self.find(key).is_some()
    }

    /// Store `value` under `key`, returning the previous value (void if none).
    /// Storing void removes the entry.
    pub fn insert(&mut self, key: MapKey, value: Value) -> Result<Value> {
        if value.is_void() {
            return Ok(self.remove(&key));
        }
        if !self.buckets.is_empty() {
            let idx = Self::bucket_index(key.hash, self.buckets.len());
            if let Some(node) = self.buckets[idx].iter_mut().find(|node| key.matches(node)) {
                return Ok(std::mem::replace(&mut node.value, value));
            }
        }
        self.reserve_one()?;
        let idx = Self::bucket_index(key.hash, self.buckets.len());
        self.buckets[idx].push(MapNode {
            hash: key.hash,
            key: key.key,
            text: key.text,
            value,
        });
        self.len += 1;
        Ok(Value::Void)
    }

    /// Remove the entry for `key`, returning its value (void if none).
    pub fn remove(&mut self, key: &MapKey) -> Value {
        if self.buckets.is_empty() {
            return Value::Void;
        }
        let idx = Self::bucket_index(key.hash, self.buckets.len());
        let bucket = &mut self.buckets[idx];
        match bucket.iter().position(|node| key.matches(node)) {
            Some(pos) => {
                self.len -= 1;
                bucket.swap_remove(pos).value
            }
            None => Value::Void,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = Value> + '_ {
        self.buckets.iter().flatten().map(|node| node.key)
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.buckets.iter().flatten().map(|node| node.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.buckets.iter().flatten().map(|node| (node.key, node.value))
    }

    // Keeps the load factor at or below 3/4. Once the bucket array is at its
    // ceiling, chains simply get longer.
    fn reserve_one(&mut self) -> Result<()> {
        let buckets = self.buckets.len();
        if buckets != 0 && (self.len + 1) * 4 <= buckets * 3 {
            return Ok(());
        }
        let next = match grow_capacity(buckets, MIN_BUCKETS, max_capacity::<Bucket>()) {
            Ok(next) => next,
            Err(e) if buckets == 0 => return Err(e.into()),
            Err(_) => return Ok(()),
        };
        let mut resized: Vec<Bucket> = Vec::new();
        resized.try_reserve_exact(next)?;
        resized.resize_with(next, SmallVec::new);
        for node in self.buckets.drain(..).flatten() {
            resized[Self::bucket_index(node.hash, next)].push(node);
        }
        self.buckets = resized;
        Ok(())
    }

    pub(crate) fn release(&mut self) {
        self.buckets = Vec::new();
        self.len = 0;
    }

    pub(crate) fn trace(&self, tracer: &mut Tracer<'_>) {
        for node in self.buckets.iter().flatten() {
            tracer.visit(node.key);
            tracer.visit(node.value);
        }
    }

    pub(crate) fn estimated_bytes(&self) -> usize {
        self.buckets.len() * std::mem::size_of::<Bucket>()
            + self.len * std::mem::size_of::<MapNode>()
    }
}
