//! Growth policy for the runtime's resizable arrays.
//!
//! Stack slots, list elements and map bucket arrays all grow the same way:
//! double until doubling would pass the ceiling, then jump straight to the
//! ceiling, then refuse.

use std::fmt;

/// Largest element count any runtime array may hold.
///
/// Bounded by the address space divided by the element size and by the
/// largest integer a runtime `Value` can represent (`i32::MAX`), so every
/// index stays expressible to hosted code.
pub const fn max_capacity<T>() -> usize {
    let size = std::mem::size_of::<T>();
    let by_address = if size == 0 {
        isize::MAX as usize
    } else {
        isize::MAX as usize / size
    };
    let by_integer = i32::MAX as usize;
    if by_address < by_integer {
        by_address
    } else {
        by_integer
    }
}

/// The array is already at its ceiling and cannot grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    pub capacity: usize,
    pub max: usize,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capacity {} has reached the maximum of {}",
            self.capacity, self.max
        )
    }
}

impl std::error::Error for CapacityError {}

/// Next capacity after `current`, never smaller than `min` and never larger than `max`.
pub fn grow_capacity(current: usize, min: usize, max: usize) -> Result<usize, CapacityError> {
    if current >= max {
        return Err(CapacityError { capacity: current, max });
    }
    let next = if current > max / 2 {
        max
    } else {
        (current * 2).max(min).min(max)
    };
    Ok(next)
}
