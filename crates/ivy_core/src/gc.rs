//! Garbage collection infrastructure - base types.

use std::fmt;

/// Handle to a heap-allocated object.
///
/// A handle names an arena slot plus the generation the slot had when the
/// object was allocated. Once the object is swept the slot's generation moves
/// on, so stale handles are detected instead of aliasing a newer object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Identity bits used for hashing by address.
    #[inline]
    pub const fn identity(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectId;

    #[test]
    fn identity_distinguishes_generations() {
        let a = ObjectId::new(7, 0);
        let b = ObjectId::new(7, 1);
        assert_ne!(a, b);
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.index(), b.index());
    }
}
