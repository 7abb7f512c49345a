//! Capacity and load-factor policy.
//!
//! Slot counts are always powers of two so the ideal slot of a hash is a
//! mask away. The grow threshold is chosen at compile time through the
//! `max-load-*` cargo features; the shrink threshold is fixed.

use crate::error::Error;

/// Slot count used when a table is created with a requested capacity of 0.
pub const DEFAULT_CAPACITY: usize = 32;

/// Smallest slot count a table ever holds. Shrinking stops here.
pub const MIN_CAPACITY: usize = 1;

cfg_if::cfg_if! {
    if #[cfg(feature = "max-load-eighty-seven-point-five")] {
        const GROW_NUMERATOR: u128 = 7;
        const GROW_DENOMINATOR: u128 = 8;
    } else if #[cfg(feature = "max-load-fifty")] {
        const GROW_NUMERATOR: u128 = 1;
        const GROW_DENOMINATOR: u128 = 2;
    } else {
        const GROW_NUMERATOR: u128 = 3;
        const GROW_DENOMINATOR: u128 = 4;
    }
}

/// The grow threshold as a fraction of the slot count.
pub const MAX_LOAD_FACTOR: f64 = GROW_NUMERATOR as f64 / GROW_DENOMINATOR as f64;

/// Rounds a requested capacity to the slot count a table is built with.
///
/// A request of 0 selects [`DEFAULT_CAPACITY`]; anything else is rounded up
/// to the next power of two.
///
/// # Examples
///
/// ```rust
/// use robin_hood_map::sizing::DEFAULT_CAPACITY;
/// use robin_hood_map::sizing::capacity_for;
///
/// assert_eq!(capacity_for(0), Ok(DEFAULT_CAPACITY));
/// assert_eq!(capacity_for(1), Ok(1));
/// assert_eq!(capacity_for(100), Ok(128));
/// assert!(capacity_for(usize::MAX).is_err());
/// ```
pub fn capacity_for(requested: usize) -> Result<usize, Error> {
    if requested == 0 {
        return Ok(DEFAULT_CAPACITY);
    }

    requested
        .checked_next_power_of_two()
        .map(|capacity| capacity.max(MIN_CAPACITY))
        .ok_or(Error::CapacityOverflow)
}

/// Number of occupied-or-tombstoned slots a table of `capacity` slots may
/// hold before it must grow.
#[inline(always)]
pub(crate) fn grow_limit(capacity: usize) -> usize {
    ((capacity as u128 * GROW_NUMERATOR) / GROW_DENOMINATOR) as usize
}

/// Smallest slot count whose grow limit admits `len` live entries.
pub(crate) fn capacity_to_hold(len: usize) -> Result<usize, Error> {
    let mut capacity = MIN_CAPACITY;
    while grow_limit(capacity) < len {
        capacity = capacity.checked_mul(2).ok_or(Error::CapacityOverflow)?;
    }
    Ok(capacity)
}

/// Whether inserting one more entry would push `len + tombstones` past the
/// grow limit of `capacity`.
#[inline(always)]
pub(crate) fn needs_grow(len: usize, tombstones: usize, capacity: usize) -> bool {
    len.saturating_add(tombstones).saturating_add(1) > grow_limit(capacity)
}

/// Whether a table holding `len` live entries should halve before a
/// deletion.
///
/// The threshold is a quarter of the slot count rather than half. Halving at
/// half load would leave the new table full, past the grow limit, and long
/// runs of removals would then exhaust the displacement range. At a quarter
/// the halved table sits at or below half load.
#[inline(always)]
pub(crate) fn needs_shrink(len: usize, capacity: usize) -> bool {
    capacity > MIN_CAPACITY && len <= capacity / 4
}
