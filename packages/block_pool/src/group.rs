/// The group used by pools that do not name one.
///
/// A group is any type used as the `G` parameter of [`BlockPool`][crate::BlockPool] or
/// [`GlobalPool`][crate::GlobalPool]. Pools of the same item type but different groups are
/// different types: they never share slabs and cannot be mistaken for one another. This lets
/// each thread (or each subsystem) allocate from its own storage without any locking shared
/// with the others.
///
/// Groups carry no data, so any type works. An empty enum is a convenient choice:
///
/// ```
/// use block_pool::GlobalPool;
///
/// enum RenderThread {}
/// enum NetworkThread {}
///
/// let render_nodes = GlobalPool::<u64, RenderThread>::new();
/// let network_nodes = GlobalPool::<u64, NetworkThread>::new();
///
/// let a = render_nodes.insert(1).unwrap();
/// let b = network_nodes.insert(2).unwrap();
///
/// // SAFETY: Each pointer goes back to the pool it came from, once.
/// unsafe {
///     assert_eq!(render_nodes.remove(a), 1);
///     assert_eq!(network_nodes.remove(b), 2);
/// }
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub struct DefaultGroup;
