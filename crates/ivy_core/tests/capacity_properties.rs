use ivy_core::{CapacityError, grow_capacity};
use proptest::prelude::*;

proptest! {
    #[test]
    fn growth_never_passes_the_ceiling(current in 0usize..10_000, min in 1usize..64, max in 1usize..10_000) {
        match grow_capacity(current, min, max) {
            Ok(next) => {
                prop_assert!(current < max);
                prop_assert!(next > current);
                prop_assert!(next <= max);
            }
            Err(CapacityError { capacity, max: limit }) => {
                prop_assert!(current >= max);
                prop_assert_eq!(capacity, current);
                prop_assert_eq!(limit, max);
            }
        }
    }
}

proptest! {
    #[test]
    fn repeated_growth_reaches_the_ceiling_then_stops(min in 1usize..16, max in 1usize..100_000) {
        let mut cap = 0;
        let mut steps = 0;
        while let Ok(next) = grow_capacity(cap, min, max) {
            if next < max {
                prop_assert!(next == min || next == cap * 2);
            }
            cap = next;
            steps += 1;
            prop_assert!(steps <= 64);
        }
        prop_assert_eq!(cap, max);
    }
}
