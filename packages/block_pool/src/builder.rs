use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::{BlockPool, DefaultGroup, DropPolicy, Result};

/// Builder for creating an instance of [`BlockPool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`BlockPool::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use block_pool::{BlockPool, DropPolicy};
///
/// enum Parser {}
///
/// let pool = BlockPool::<u64>::builder()
///     .group::<Parser>()
///     .drop_policy(DropPolicy::MustNotDropAllocations)
///     .reserve(1000)
///     .build()
///     .unwrap();
///
/// assert!(pool.capacity() >= 1000);
/// ```
///
/// [1]: BlockPool::new
#[must_use]
pub struct BlockPoolBuilder<T, G = DefaultGroup> {
    drop_policy: DropPolicy,
    reserve: usize,

    _types: PhantomData<(fn() -> T, fn() -> G)>,
}

impl<T, G> fmt::Debug for BlockPoolBuilder<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockPoolBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("group", &format_args!("{}", type_name::<G>()))
            .field("drop_policy", &self.drop_policy)
            .field("reserve", &self.reserve)
            .finish()
    }
}

impl<T> BlockPoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            drop_policy: DropPolicy::default(),
            reserve: 0,
            _types: PhantomData,
        }
    }
}

impl<T, G> BlockPoolBuilder<T, G> {
    /// Sets the group of the pool. Pools of different groups are different types.
    ///
    /// See [`DefaultGroup`] for more on groups.
    pub fn group<H>(self) -> BlockPoolBuilder<T, H> {
        BlockPoolBuilder {
            drop_policy: self.drop_policy,
            reserve: self.reserve,
            _types: PhantomData,
        }
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat live allocations when the pool is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Provisions storage for at least `min_elements` objects when the pool is built,
    /// equivalent to calling [`BlockPool::reserve()`] on the new pool.
    pub fn reserve(mut self, min_elements: usize) -> Self {
        self.reserve = min_elements;
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage requested via [`reserve()`][Self::reserve]
    /// cannot be allocated.
    pub fn build(self) -> Result<BlockPool<T, G>> {
        let mut pool = BlockPool::new_inner(self.drop_policy);
        pool.reserve(self.reserve)?;
        Ok(pool)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(BlockPoolBuilder<u32>: Send, Sync);

    #[test]
    fn default_build_is_empty() {
        let pool = BlockPool::<u32>::builder().build().unwrap();

        assert!(pool.is_empty());
        assert_eq!(pool.slab_count(), 0);
    }

    #[test]
    fn reserve_is_applied() {
        let pool = BlockPool::<u32>::builder().reserve(256).build().unwrap();

        assert_eq!(pool.slab_count(), 2);
    }

    #[test]
    fn group_keeps_settings() {
        enum Custom {}

        let builder = BlockPool::<u32>::builder()
            .reserve(1)
            .drop_policy(DropPolicy::MustNotDropAllocations)
            .group::<Custom>();

        let debug_output = format!("{builder:?}");
        assert!(debug_output.contains("Custom"), "{debug_output}");
        assert!(debug_output.contains("MustNotDropAllocations"), "{debug_output}");

        let pool: BlockPool<u32, Custom> = builder.build().unwrap();
        assert_eq!(pool.slab_count(), 1);
    }
}
