use core::alloc::Layout;
use core::fmt;

/// The error type for fallible table operations.
///
/// A failed operation never leaves the table half-modified: a grow or shrink
/// that cannot complete keeps the previous storage, and an insertion that
/// cannot be placed is rejected before any slot is touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The requested capacity cannot be represented, either because the next
    /// power of two overflows `usize` or because the slot arrays would exceed
    /// the maximum allocation size.
    CapacityOverflow,
    /// The global allocator could not provide memory for the given layout.
    AllocError {
        /// The layout of the allocation request that failed.
        layout: Layout,
    },
    /// A probe sequence would need a displacement larger than the slot
    /// metadata can encode.
    ///
    /// The grow policy keeps this unreachable for reasonable hash functions;
    /// seeing it points at a degenerate hash or an aggressive load factor.
    CapacityExhausted,
}

impl Error {
    /// Returns `true` for the errors caused by failing to obtain memory.
    pub fn is_alloc_error(&self) -> bool {
        matches!(self, Error::CapacityOverflow | Error::AllocError { .. })
    }

    /// Escalates the error the way the standard collections do.
    #[cold]
    #[inline(never)]
    pub(crate) fn raise(self) -> ! {
        match self {
            Error::CapacityOverflow => panic!("capacity overflow"),
            Error::AllocError { layout } => alloc::alloc::handle_alloc_error(layout),
            Error::CapacityExhausted => {
                panic!("probe displacement exceeded the slot metadata range")
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityOverflow => f.write_str("capacity overflow"),
            Error::AllocError { layout } => write!(
                f,
                "memory allocation of {} bytes (align {}) failed",
                layout.size(),
                layout.align()
            ),
            Error::CapacityExhausted => {
                f.write_str("probe displacement exceeded the slot metadata range")
            }
        }
    }
}

impl core::error::Error for Error {}
