//! Pin table: per-object lock counts held by native code.
//!
//! Native code that keeps a heap reference somewhere the collector cannot
//! see (a Rust local across calls, a collaborator's own structures) locks the
//! object to keep it alive. Every entry with a positive count is a root,
//! in addition to the stack.

use crate::core::value::Value;
use crate::errors::{Result, RuntimeError, messages};
use ivy_core::{ObjectId, grow_capacity, max_capacity};
use smallvec::SmallVec;

/// Largest lock count one object may accumulate.
pub const MAX_PIN_COUNT: u32 = i32::MAX as u32;

/// Upper bound on the bucket count a new table starts with.
pub const MAX_INITIAL_BUCKETS: usize = 1 << 16;

type Bucket = SmallVec<[PinEntry; 2]>;

#[derive(Debug, Clone, Copy)]
pub struct PinEntry {
    id: ObjectId,
    value: Value,
    count: u32,
}

impl PinEntry {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The reference that was locked, as the root scan will visit it.
    #[inline]
    pub fn value(&self) -> Value {
        self.value
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Chained hash table keyed by object identity. Entries are removed as soon
/// as their count drops to zero. The bucket array doubles once the average
/// chain length passes two.
pub struct PinTable {
    buckets: Vec<Bucket>,
    len: usize,
}

impl PinTable {
    /// A table with `buckets` initial buckets, capped at
    /// [`MAX_INITIAL_BUCKETS`]. Falls back to a single bucket when even that
    /// cannot be reserved; the table grows on demand either way.
    pub fn new(buckets: usize) -> Self {
        let requested = buckets.clamp(1, MAX_INITIAL_BUCKETS);
        let mut table: Vec<Bucket> = Vec::new();
        if table.try_reserve_exact(requested).is_err() {
            log::warn!("could not reserve {requested} pin buckets, starting with one");
            table = Vec::new();
        }
        let count = if table.capacity() >= requested { requested } else { 1 };
        table.resize_with(count, SmallVec::new);
        Self {
            buckets: table,
            len: 0,
        }
    }

    /// Number of objects with a positive lock count.
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

    /// Sum of all outstanding lock counts.
    pub fn total_locks(&self) -> u64 {
        self.iter().map(|e| e.count as u64).sum()
    }

    #[inline]
    fn bucket_index(id: ObjectId, buckets: usize) -> usize {
        (id.identity() % buckets as u64) as usize
    }

    fn reference_id(value: Value) -> Result<ObjectId> {
        value
            .ref_id()
            .ok_or_else(|| RuntimeError::invalid_argument(messages::NOT_A_REFERENCE))
    }

    pub fn count(&self, id: ObjectId) -> u32 {
        self.buckets[Self::bucket_index(id, self.buckets.len())]
            .iter()
            .find(|e| e.id == id)
            .map_or(0, |e| e.count)
    }

    /// Add one lock on `value`'s referent. Returns the new count.
    pub fn lock(&mut self, value: Value) -> Result<u32> {
        let id = Self::reference_id(value)?;
        let idx = Self::bucket_index(id, self.buckets.len());
        if let Some(entry) = self.buckets[idx].iter_mut().find(|e| e.id == id) {
            if entry.count >= MAX_PIN_COUNT {
                return Err(RuntimeError::invalid_operation(format!(
                    "{}: {id:?} already holds {MAX_PIN_COUNT} locks",
                    messages::LOCK_OVERFLOW
                )));
            }
            entry.count += 1;
            return Ok(entry.count);
        }
        self.buckets[idx].push(PinEntry {
            id,
            value,
            count: 1,
        });
        self.len += 1;
        self.maybe_grow();
        Ok(1)
    }

    /// Release one lock on `value`'s referent. Returns the remaining count.
    pub fn unlock(&mut self, value: Value) -> Result<u32> {
        let id = Self::reference_id(value)?;
        let idx = Self::bucket_index(id, self.buckets.len());
        let bucket = &mut self.buckets[idx];
        let Some(pos) = bucket.iter().position(|e| e.id == id && e.count > 0) else {
            return Err(RuntimeError::invalid_operation(format!(
                "{}: {id:?}",
                messages::NOT_LOCKED
            )));
        };
        bucket[pos].count -= 1;
        let remaining = bucket[pos].count;
        if remaining == 0 {
            bucket.swap_remove(pos);
            self.len -= 1;
        }
        Ok(remaining)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PinEntry> + '_ {
        self.buckets.iter().flatten()
    }

    /// Locked references, as root scanning sees them.
    pub(crate) fn roots(&self) -> Vec<Value> {
        self.iter().filter(|e| e.count > 0).map(|e| e.value).collect()
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
    }

    // Growth is best effort: a table that cannot grow keeps working with
    // longer chains.
    fn maybe_grow(&mut self) {
        let buckets = self.buckets.len();
        if self.len <= buckets * 2 {
            return;
        }
        let Ok(next) = grow_capacity(buckets, 1, max_capacity::<Bucket>()) else {
            return;
        };
        let mut resized: Vec<Bucket> = Vec::new();
        if resized.try_reserve_exact(next).is_err() {
            return;
        }
        resized.resize_with(next, SmallVec::new);
        for entry in self.buckets.drain(..).flatten() {
            resized[Self::bucket_index(entry.id, next)].push(entry);
        }
        self.buckets = resized;
    }

    #[cfg(test)]
    fn force_count(&mut self, id: ObjectId, count: u32) {
        let idx = Self::bucket_index(id, self.buckets.len());
        if let Some(entry) = self.buckets[idx].iter_mut().find(|e| e.id == id) {
            entry.count = count;
        }
    }
}

impl Default for PinTable {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(index: u32) -> Value {
        Value::Object(ObjectId::new(index, 0))
    }

    #[test]
    fn lock_count_saturates() {
        let mut pins = PinTable::new(4);
        pins.lock(obj(1)).unwrap();
        pins.force_count(ObjectId::new(1, 0), MAX_PIN_COUNT);
        let err = pins.lock(obj(1)).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidOperation(_)), "{err}");
        assert_eq!(pins.count(ObjectId::new(1, 0)), MAX_PIN_COUNT);
    }

    #[test]
    fn table_grows_with_load() {
        let mut pins = PinTable::new(2);
        for i in 0..64 {
            pins.lock(obj(i)).unwrap();
        }
        assert_eq!(pins.len(), 64);
        assert!(pins.bucket_count() >= 32);
        for i in 0..64 {
            assert_eq!(pins.count(ObjectId::new(i, 0)), 1);
        }
    }

    #[test]
    fn initial_bucket_count_is_capped() {
        let pins = PinTable::new(usize::MAX);
        assert_eq!(pins.bucket_count(), MAX_INITIAL_BUCKETS);
        assert_eq!(PinTable::new(0).bucket_count(), 1);
    }

    #[test]
    fn unlock_removes_entry_at_zero() {
        let mut pins = PinTable::new(8);
        pins.lock(obj(3)).unwrap();
        pins.lock(obj(3)).unwrap();
        assert_eq!(pins.unlock(obj(3)).unwrap(), 1);
        assert_eq!(pins.unlock(obj(3)).unwrap(), 0);
        assert!(pins.is_empty());
        assert!(pins.unlock(obj(3)).is_err());
    }

    #[test]
    fn scalars_cannot_be_locked() {
        let mut pins = PinTable::default();
        assert!(matches!(
            pins.lock(Value::Int(1)),
            Err(RuntimeError::InvalidArgument(_))
        ));
    }
}
