//! Hashing helpers shared by the runtime.

use ahash::RandomState;
use hashbrown::HashMap;
use std::hash::{BuildHasher, Hasher};

pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

#[inline]
pub fn fast_map_new<K, V>() -> FastHashMap<K, V> {
    HashMap::with_hasher(RandomState::new())
}

// Fixed seeds keep hashes stable for the lifetime of the process, which the
// precomputed string hashes rely on.
fn fixed_state() -> RandomState {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
}

/// Hash string contents.
#[inline]
pub fn hash_str(s: &str) -> u64 {
    let mut hasher = fixed_state().build_hasher();
    hasher.write(s.as_bytes());
    hasher.finish()
}

/// Hash a single word, e.g. an identity or scalar bit pattern.
#[inline]
pub fn hash_u64(v: u64) -> u64 {
    let mut hasher = fixed_state().build_hasher();
    hasher.write_u64(v);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_stable() {
        assert_eq!(hash_str("ivy"), hash_str("ivy"));
        assert_ne!(hash_str("ivy"), hash_str("ivz"));
        assert_eq!(hash_u64(42), hash_u64(42));
    }
}
