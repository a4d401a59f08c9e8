#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A fixed-size block allocator that hands out and reclaims single objects of one type from
//! pre-reserved, contiguous storage.
//!
//! Programs that create and destroy many objects of the same type (nodes of linked lists, trees
//! and hash tables) can allocate them from a pool instead of the general-purpose heap, turning
//! every allocation and deallocation into an O(1) pool operation with good cache locality.
//!
//! # Storage model
//!
//! A pool keeps an ordered list of slabs. Each slab is one heap allocation holding 255 slots, each
//! slot sized and aligned for one `T`. The vacant slots of a slab form a free list threaded
//! through the slots themselves: the first byte of a vacant slot holds the index of the next
//! vacant slot, so a slab has only two bytes of bookkeeping regardless of the item size.
//!
//! * Allocating takes the most recently freed slot of a slab that has space. If every slab is full,
//!   a new slab is appended.
//! * Deallocating pushes the slot back onto its slab's free list. A slab that becomes empty is
//!   released immediately.
//! * [`reserve()`][BlockPool::reserve] pre-creates slabs so a known number of allocations will not
//!   need to create any.
//!
//! Slab storage never moves. A pointer returned by a pool stays valid until it is given back or
//! the pool is dropped, no matter how much the pool grows in the meantime.
//!
//! # Pool types
//!
//! * [`BlockPool<T, G>`][BlockPool] owns its storage. Dropping it releases all of it.
//! * [`GlobalPool<T, G>`][GlobalPool] is a zero-sized handle to process-wide storage for `T`,
//!   created on first use and kept until the process exits.
//!
//! The `G` parameter is a [group][DefaultGroup]: any type used as a tag. Pools of the same `T`
//! with different groups never share storage, which lets threads or subsystems use private
//! storage for the same item type.
//!
//! Both pool types implement [`ObjectAllocator`], the protocol for containers that manage their
//! own node storage.
//!
//! # Examples
//!
//! ```
//! use block_pool::BlockPool;
//!
//! struct TreeNode {
//!     key: u64,
//!     children: Vec<u64>,
//! }
//!
//! let mut pool = BlockPool::<TreeNode>::new();
//!
//! let node = pool
//!     .insert(TreeNode {
//!         key: 7,
//!         children: vec![1, 2, 3],
//!     })
//!     .unwrap();
//!
//! // SAFETY: The node was inserted into this pool and has not been removed.
//! let key = unsafe { node.as_ref().key };
//! assert_eq!(key, 7);
//!
//! // SAFETY: The node was inserted into this pool and is removed only once.
//! let node = unsafe { pool.remove(node) };
//! assert_eq!(node.children.len(), 3);
//! ```
//!
//! # Validated and unchecked builds
//!
//! Misusing a pool is a contract violation, not a recoverable error:
//!
//! * requesting a `count` other than 1 through [`ObjectAllocator::allocate()`],
//! * giving back a pointer that did not come from the pool, is not at a slot boundary or was
//!   already given back,
//! * allocating from a full slab.
//!
//! In validated builds, which are builds with `debug_assertions` or with the `checked` cargo
//! feature, every such violation panics with a description of the problem. In other builds the
//! checks are compiled out and violating them is undefined behavior. The one exception is giving
//! back a pointer that lies outside every slab of the pool, which always panics.
//!
//! Running out of memory when a pool needs a new slab is reported as an [`Error`].
//!
//! # Thread safety
//!
//! A [`BlockPool`] is thread-mobile but not thread-safe: it has no internal locking. Give each
//! thread its own pool (or its own group of [`GlobalPool`]) or wrap the pool in a mutex.

mod allocator;
mod block_pool;
mod builder;
mod drop_policy;
mod error;
mod global_pool;
mod group;
mod raw_pool;
mod slab;
mod validation;

pub use allocator::*;
pub use block_pool::*;
pub use builder::*;
pub use drop_policy::*;
pub use error::*;
pub use global_pool::*;
pub use group::*;
pub(crate) use raw_pool::*;
pub use slab::SLAB_CAPACITY;
pub(crate) use slab::Slab;
pub(crate) use validation::*;
