use std::alloc::Layout;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crate::{BlockPoolBuilder, DefaultGroup, DropPolicy, RawBlockPool, Result};

/// Global counter for generating unique pool IDs.
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn generate_pool_id() -> u64 {
    POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A pool that allocates single objects of type `T` from storage owned by this instance.
///
/// Storage is organized in slabs of 255 slots each. Allocating takes a vacant slot, creating a
/// new slab when every slab is full. Deallocating returns the slot and releases its slab as soon
/// as the slab holds no more live objects. Both operations are O(1) apart from locating the slab,
/// which scans the (typically short) list of slabs.
///
/// The pool hands out raw pointers to uninitialized storage via [`allocate()`][Self::allocate],
/// or to an initialized value via [`insert()`][Self::insert]. Pointers remain valid until they
/// are given back to the pool or the pool is dropped; growing the pool never moves objects.
///
/// The `G` parameter is the [group][DefaultGroup] of the pool. It has no effect on a pool that
/// owns its own storage except that pools of different groups are distinct types.
///
/// # Examples
///
/// ```
/// use block_pool::BlockPool;
///
/// let mut pool = BlockPool::<String>::new();
///
/// let greeting = pool.insert("Hello".to_string()).unwrap();
///
/// // SAFETY: The pointer came from this pool and the value is initialized.
/// assert_eq!(unsafe { greeting.as_ref() }, "Hello");
///
/// // SAFETY: The pointer came from this pool and is removed only once.
/// let greeting = unsafe { pool.remove(greeting) };
/// assert_eq!(greeting, "Hello");
/// assert_eq!(pool.slab_count(), 0);
/// ```
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]). Wrap it in a mutex to
/// share it between threads, or give each thread its own pool.
pub struct BlockPool<T, G = DefaultGroup> {
    /// Identifies the instance for equality comparisons. Storage is per instance, so two pools
    /// are only interchangeable if they are the same pool.
    pool_id: u64,

    inner: RawBlockPool,

    drop_policy: DropPolicy,

    _types: PhantomData<(fn() -> T, fn() -> G)>,
}

impl<T> BlockPool<T> {
    /// Creates an empty pool with the default configuration. No storage is allocated
    /// until the first allocation.
    #[must_use]
    pub fn new() -> Self {
        Self::new_inner(DropPolicy::default())
    }

    /// Creates a builder for configuring and constructing a [`BlockPool`].
    #[inline]
    pub fn builder() -> BlockPoolBuilder<T> {
        BlockPoolBuilder::new()
    }
}

impl<T, G> BlockPool<T, G> {
    #[must_use]
    pub(crate) fn new_inner(drop_policy: DropPolicy) -> Self {
        Self {
            pool_id: generate_pool_id(),
            inner: RawBlockPool::new(Layout::new::<T>()),
            drop_policy,
            _types: PhantomData,
        }
    }

    /// The number of objects currently allocated from the pool.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no objects are currently allocated from the pool.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The number of objects the pool can hold without creating more slabs,
    /// including objects already allocated.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// The [drop policy][DropPolicy] the pool was built with.
    #[must_use]
    #[inline]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// The number of slabs currently owned by the pool.
    #[must_use]
    #[inline]
    pub fn slab_count(&self) -> usize {
        self.inner.slab_count()
    }

    /// Whether the pointer points into storage owned by this pool.
    ///
    /// This says nothing about whether the slot it points to is currently allocated.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<T>) -> bool {
        self.inner.contains(ptr.cast())
    }

    /// Reserves storage for one `T` and returns a pointer to it.
    ///
    /// The storage is uninitialized. It is properly aligned for `T` and stays valid until it is
    /// given back via [`deallocate()`][Self::deallocate] or the pool is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a new slab is needed and its storage cannot be allocated.
    /// The pool is unchanged in that case.
    pub fn allocate(&mut self) -> Result<NonNull<T>> {
        self.inner.allocate().map(NonNull::cast)
    }

    /// Gives back storage obtained from [`allocate()`][Self::allocate].
    ///
    /// The pool does not drop the value in the storage; drop it first if needed (or use
    /// [`remove()`][Self::remove]). If this was the last live object in its slab, the slab is
    /// released.
    ///
    /// # Panics
    ///
    /// Panics if the pointer does not point into this pool. In validated builds, also panics if
    /// the pointer is not at a slot boundary or the slot was already given back.
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by this pool and must not have been given back
    /// since. The caller must not access the storage afterwards.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<T>) {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe {
            self.inner.deallocate(ptr.cast());
        }
    }

    /// Ensures the pool has at least `ceil(min_elements / 255)` slabs, creating empty ones
    /// as needed. Never releases slabs; reserving less than the current amount does nothing.
    ///
    /// On a pool without live objects, this guarantees that the next `min_elements` allocations
    /// will not need to create slabs.
    ///
    /// # Errors
    ///
    /// Returns an error if storage for a slab cannot be allocated. Slabs created before the
    /// failure are kept.
    pub fn reserve(&mut self, min_elements: usize) -> Result<()> {
        self.inner.reserve(min_elements)
    }

    /// Moves a value into newly allocated storage and returns a pointer to it.
    ///
    /// # Errors
    ///
    /// Returns an error if a new slab is needed and its storage cannot be allocated.
    /// The value is dropped in that case.
    pub fn insert(&mut self, value: T) -> Result<NonNull<T>> {
        let ptr = self.allocate()?;

        // SAFETY: The storage is freshly allocated, aligned and sized for T.
        unsafe {
            ptr.write(value);
        }

        Ok(ptr)
    }

    /// Moves the value out of storage obtained from [`insert()`][Self::insert] and gives the
    /// storage back to the pool.
    ///
    /// # Panics
    ///
    /// Panics if the pointer does not point into this pool. In validated builds, also panics if
    /// the pointer is not at a slot boundary.
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by this pool, must point to an initialized `T` and
    /// must not have been given back since.
    #[must_use]
    pub unsafe fn remove(&mut self, ptr: NonNull<T>) -> T {
        // The value must not be dropped if the pool rejects the pointer, because then it still
        // belongs to whoever really owns the storage.
        // SAFETY: The caller guarantees the pointer refers to an initialized T.
        let value = ManuallyDrop::new(unsafe { ptr.read() });

        // SAFETY: Forwarding guarantees from the caller; we already moved the value out.
        unsafe {
            self.deallocate(ptr);
        }

        ManuallyDrop::into_inner(value)
    }
}

impl<T> Default for BlockPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, G> fmt::Debug for BlockPool<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockPool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("group", &format_args!("{}", type_name::<G>()))
            .field("pool_id", &self.pool_id)
            .field("inner", &self.inner)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T, G> PartialEq for BlockPool<T, G> {
    fn eq(&self, other: &Self) -> bool {
        self.pool_id == other.pool_id
    }
}

impl<T, G> Eq for BlockPool<T, G> {}

impl<T, G> Drop for BlockPool<T, G> {
    fn drop(&mut self) {
        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if self.drop_policy == DropPolicy::MustNotDropAllocations && !thread::panicking() {
            assert!(
                self.inner.is_empty(),
                "dropped a pool of {} with {} live allocations and a policy that says it must be empty when dropped",
                type_name::<T>(),
                self.inner.len()
            );
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::SLAB_CAPACITY;

    assert_impl_all!(BlockPool<u32>: Send);
    assert_impl_all!(BlockPool<String>: Send);
    assert_not_impl_any!(BlockPool<u32>: Sync, Clone);

    #[test]
    fn smoke_test() {
        let mut pool = BlockPool::<u64>::new();

        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());

        let a = pool.insert(42).unwrap();
        let b = pool.insert(43).unwrap();
        let c = pool.insert(44).unwrap();

        assert_eq!(pool.len(), 3);
        assert!(!pool.is_empty());
        assert_eq!(pool.capacity(), SLAB_CAPACITY);

        // SAFETY: All three were inserted into this pool and are still live.
        unsafe {
            assert_eq!(*a.as_ref(), 42);
            assert_eq!(*b.as_ref(), 43);
            assert_eq!(*c.as_ref(), 44);
        }

        // SAFETY: Inserted into this pool, removed once.
        assert_eq!(unsafe { pool.remove(b) }, 43);

        let d = pool.insert(45).unwrap();

        // The freed slot is reused first.
        assert_eq!(d, b);

        // SAFETY: Inserted into this pool, removed once.
        unsafe {
            assert_eq!(pool.remove(a), 42);
            assert_eq!(pool.remove(c), 44);
            assert_eq!(pool.remove(d), 45);
        }

        assert_eq!(pool.slab_count(), 0);
    }

    #[test]
    fn allocate_returns_aligned_distinct_storage() {
        let mut pool = BlockPool::<u128>::new();
        let mut seen = HashSet::new();

        for _ in 0..600 {
            let ptr = pool.allocate().unwrap();
            assert!(ptr.is_aligned());
            assert!(seen.insert(ptr));
        }

        assert_eq!(pool.slab_count(), 3);
    }

    #[test]
    fn zero_sized_type() {
        let mut pool = BlockPool::<()>::new();

        let a = pool.insert(()).unwrap();
        let b = pool.insert(()).unwrap();
        assert_ne!(a, b);

        // SAFETY: Inserted into this pool, removed once.
        unsafe {
            _ = pool.remove(a);
            _ = pool.remove(b);
        }

        assert!(pool.is_empty());
    }

    #[test]
    fn pointers_stay_valid_while_pool_grows() {
        let mut pool = BlockPool::<usize>::new();

        let ptrs: Vec<_> = (0..5000).map(|n| pool.insert(n).unwrap()).collect();

        for (expected, ptr) in ptrs.iter().enumerate() {
            // SAFETY: Still live in this pool.
            assert_eq!(unsafe { *ptr.as_ref() }, expected);
        }
    }

    #[test]
    fn contains_own_pointers_only() {
        let mut pool_a = BlockPool::<u32>::new();
        let mut pool_b = BlockPool::<u32>::new();

        let a = pool_a.allocate().unwrap();
        let b = pool_b.allocate().unwrap();

        assert!(pool_a.contains(a));
        assert!(!pool_a.contains(b));
        assert!(pool_b.contains(b));
    }

    #[test]
    fn remove_does_not_drop_value() {
        struct Droppable {
            dropped: Rc<Cell<bool>>,
        }

        impl Drop for Droppable {
            fn drop(&mut self) {
                self.dropped.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));
        let mut pool = BlockPool::<Droppable>::new();

        let ptr = pool
            .insert(Droppable {
                dropped: Rc::clone(&dropped),
            })
            .unwrap();

        // SAFETY: Inserted into this pool, removed once.
        let value = unsafe { pool.remove(ptr) };
        assert!(!dropped.get());

        drop(value);
        assert!(dropped.get());
    }

    #[test]
    fn equal_only_to_itself() {
        let pool_a = BlockPool::<u32>::new();
        let pool_b = BlockPool::<u32>::new();

        assert_eq!(pool_a, pool_a);
        assert_ne!(pool_a, pool_b);
    }

    #[test]
    fn debug_names_types() {
        let pool = BlockPool::<u32>::new();

        let debug_output = format!("{pool:?}");
        assert!(debug_output.contains("u32"), "{debug_output}");
        assert!(debug_output.contains("DefaultGroup"), "{debug_output}");
    }

    #[test]
    fn multithreaded_via_mutex() {
        let pool = Arc::new(Mutex::new(BlockPool::<u64>::new()));

        {
            let mut pool = pool.lock().unwrap();
            _ = pool.insert(7).unwrap();
        }

        let pool_clone = Arc::clone(&pool);
        thread::spawn(move || {
            let mut pool = pool_clone.lock().unwrap();
            _ = pool.insert(8).unwrap();
        })
        .join()
        .unwrap();

        let pool = pool.lock().unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn drop_with_live_allocations_is_allowed_by_default() {
        let mut pool = BlockPool::<u32>::new();
        _ = pool.insert(1).unwrap();

        drop(pool);
    }

    #[test]
    #[should_panic]
    fn drop_with_live_allocations_and_forbidding_policy_panics() {
        let mut pool = BlockPool::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropAllocations)
            .build()
            .unwrap();

        _ = pool.insert(1).unwrap();
    }

    #[test]
    fn drop_empty_with_forbidding_policy_ok() {
        let mut pool = BlockPool::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropAllocations)
            .build()
            .unwrap();

        let ptr = pool.insert(1).unwrap();

        // SAFETY: Inserted into this pool, removed once.
        unsafe {
            _ = pool.remove(ptr);
        }
    }

    #[test]
    #[should_panic]
    fn deallocate_pointer_from_other_pool_panics() {
        let mut pool_a = BlockPool::<u32>::new();
        let mut pool_b = BlockPool::<u32>::new();

        _ = pool_a.allocate().unwrap();
        let b = pool_b.allocate().unwrap();

        // SAFETY: Intentionally violating the contract; the pool rejects it.
        unsafe {
            pool_a.deallocate(b);
        }
    }
}
