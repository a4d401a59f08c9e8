/// Determines what happens when a pool is dropped while objects are still allocated from it.
///
/// A pool only manages storage. It never drops the objects living in that storage, because it
/// does not know which slots hold initialized values. Dropping a pool with live allocations
/// therefore releases their storage without running their destructors, leaving every pointer
/// into the pool dangling.
///
/// # Examples
///
/// ```
/// use block_pool::{BlockPool, DropPolicy};
///
/// // The drop policy is set at pool creation time.
/// let pool = BlockPool::<u32>::builder()
///     .drop_policy(DropPolicy::MustNotDropAllocations)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool releases its storage when dropped, even if allocations are still live.
    /// This is the default.
    #[default]
    MayDropAllocations,

    /// The pool will panic if it still has live allocations when it is dropped.
    ///
    /// This may be valuable as a leak check, for example in a container whose destructor is
    /// expected to have returned every node to the pool before the pool itself goes away.
    MustNotDropAllocations,
}
