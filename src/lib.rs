#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Errors reported by fallible table and map operations.
pub mod error;

/// A HashMap implementation using Robin Hood hashing.
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a standard key-value map interface with configurable hashers.
pub mod hash_map;

/// The raw Robin Hood hash table.
///
/// The table stores keys and values but never hashes them: callers pass the
/// 64-bit hash and an equality predicate to every operation.
pub mod hash_table;

/// Slot-count rounding and the grow and shrink thresholds.
pub mod sizing;

pub use error::Error;
#[cfg(any(feature = "foldhash", feature = "std"))]
pub use hash_map::DefaultHashBuilder;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_table::HashTable;
