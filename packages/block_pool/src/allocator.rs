use std::ptr::NonNull;

use crate::{BlockPool, GlobalPool, Result, VALIDATED};

/// The allocator protocol for containers that manage their own node storage.
///
/// A container generic over `A: ObjectAllocator<T>` can allocate its nodes from either a
/// per-instance [`BlockPool`] or the shared [`GlobalPool`] storage without knowing which one it
/// got. Containers that allocate a node type different from their element type use
/// [`rebind()`][Self::rebind] to obtain an allocator for the node type.
///
/// Allocators compare equal when memory allocated through one may be deallocated through the
/// other.
///
/// # Examples
///
/// ```
/// use std::ptr::NonNull;
///
/// use block_pool::{GlobalPool, ObjectAllocator};
///
/// struct Node {
///     value: u32,
///     next: Option<NonNull<Node>>,
/// }
///
/// fn push_node<A: ObjectAllocator<Node>>(
///     alloc: &mut A,
///     value: u32,
///     next: Option<NonNull<Node>>,
/// ) -> NonNull<Node> {
///     let ptr = alloc.allocate(1).unwrap();
///
///     // SAFETY: The storage is freshly allocated for one Node.
///     unsafe { ptr.write(Node { value, next }) };
///
///     ptr
/// }
///
/// let mut alloc = GlobalPool::<u32>::new().rebind::<Node>();
/// let head = push_node(&mut alloc, 1, None);
///
/// // SAFETY: The node was allocated from this allocator with count 1 and is freed once.
/// unsafe { ObjectAllocator::deallocate(&mut alloc, head, 1) };
/// ```
pub trait ObjectAllocator<T> {
    /// The same kind of allocator, in the same group, for items of type `U`.
    type Rebind<U: 'static>: ObjectAllocator<U>;

    /// Allocates uninitialized storage for one `T`.
    ///
    /// # Panics
    ///
    /// In validated builds, panics if `count` is not 1. In other builds any other
    /// count is an unchecked contract violation.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocator needs more storage and cannot obtain it.
    fn allocate(&mut self, count: usize) -> Result<NonNull<T>>;

    /// Releases storage obtained from [`allocate()`][Self::allocate]. The value in the storage
    /// is not dropped. `count` is accepted for shape compatibility and otherwise ignored.
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by an equal allocator and must not have been
    /// released since.
    unsafe fn deallocate(&mut self, ptr: NonNull<T>, count: usize);

    /// Provisions storage for at least `min_elements` future allocations.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be obtained.
    fn reserve(&mut self, min_elements: usize) -> Result<()>;

    /// Returns the equivalent allocator for items of type `U`.
    #[must_use]
    fn rebind<U: 'static>(&self) -> Self::Rebind<U>;
}

fn assert_single_object(count: usize) {
    if VALIDATED {
        assert!(
            count == 1,
            "pools allocate exactly one object per call but {count} were requested"
        );
    }
}

impl<T, G> ObjectAllocator<T> for BlockPool<T, G> {
    /// A new, empty pool with the same drop policy. Pools own their storage,
    /// so the rebound pool shares nothing with this one.
    type Rebind<U: 'static> = BlockPool<U, G>;

    fn allocate(&mut self, count: usize) -> Result<NonNull<T>> {
        assert_single_object(count);
        Self::allocate(self)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<T>, _count: usize) {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe {
            Self::deallocate(self, ptr);
        }
    }

    fn reserve(&mut self, min_elements: usize) -> Result<()> {
        Self::reserve(self, min_elements)
    }

    fn rebind<U: 'static>(&self) -> Self::Rebind<U> {
        BlockPool::new_inner(self.drop_policy())
    }
}

impl<T: 'static, G: 'static> ObjectAllocator<T> for GlobalPool<T, G> {
    type Rebind<U: 'static> = GlobalPool<U, G>;

    fn allocate(&mut self, count: usize) -> Result<NonNull<T>> {
        assert_single_object(count);
        Self::allocate(self)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<T>, _count: usize) {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe {
            Self::deallocate(self, ptr);
        }
    }

    fn reserve(&mut self, min_elements: usize) -> Result<()> {
        Self::reserve(self, min_elements)
    }

    fn rebind<U: 'static>(&self) -> Self::Rebind<U> {
        GlobalPool::new()
    }
}
