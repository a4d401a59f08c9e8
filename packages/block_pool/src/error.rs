use std::alloc::Layout;
use std::collections::TryReserveError;

use thiserror::Error;

/// Errors that can occur when a pool needs more storage.
///
/// Contract violations (such as returning a pointer to the wrong pool) are not errors but panics.
/// See the crate-level documentation for details.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The memory allocator could not satisfy the storage request for a new slab.
    #[error("failed to allocate slab storage with {layout:?}")]
    SlabAllocationFailed {
        /// The layout of the storage block that could not be allocated.
        layout: Layout,
    },

    /// The storage of a slab would not be representable as a single allocation.
    #[error("slab of {slot_size}-byte slots would exceed the maximum allocation size")]
    SlabTooLarge {
        /// The size of one slot in the slab, in bytes.
        slot_size: usize,
    },

    /// The list that keeps track of a pool's slabs could not grow to hold more slabs.
    #[error("failed to grow the slab list")]
    SlabListAllocationFailed {
        /// Why the list could not grow.
        #[source]
        source: TryReserveError,
    },
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
