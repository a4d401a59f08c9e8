use std::alloc::Layout;
use std::any::{TypeId, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::{DefaultGroup, RawBlockPool, Result};

/// Storage for every `(T, G)` combination that has ever been used, keyed by
/// `TypeId::of::<(T, G)>()`. Entries are leaked and live until the process exits.
static REGISTRY: LazyLock<Mutex<HashMap<TypeId, &'static Mutex<RawBlockPool>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

thread_local! {
    /// Per-thread copy of the registry entries this thread has used, so that only the first use
    /// of each `(T, G)` on a thread touches the registry lock.
    static STORAGE_CACHE: RefCell<HashMap<TypeId, &'static Mutex<RawBlockPool>>> =
        RefCell::new(HashMap::new());
}

/// A handle to process-wide pool storage shared by all users of item type `T` in group `G`.
///
/// The handle itself is zero-sized and freely copyable; all handles with the same `T` and `G`
/// refer to the same storage and are interchangeable. The storage is created on first use and is
/// never torn down before the process exits. Pointers obtained from it stay valid until they are
/// given back.
///
/// Use distinct [groups][DefaultGroup] to give independent threads or subsystems their own
/// storage for the same `T`. Each `(T, G)` combination has its own lock that is taken for the
/// duration of each call. Once a thread has used a `(T, G)` combination, its calls never wait
/// on users of other combinations.
///
/// # Examples
///
/// ```
/// use block_pool::GlobalPool;
///
/// let pool = GlobalPool::<u64>::new();
///
/// let ptr = pool.insert(42).unwrap();
///
/// // Any other handle for the same type and group can give it back.
/// let same_pool = GlobalPool::<u64>::default();
/// assert_eq!(pool, same_pool);
///
/// // SAFETY: The pointer came from this storage and is removed only once.
/// assert_eq!(unsafe { same_pool.remove(ptr) }, 42);
/// ```
pub struct GlobalPool<T, G = DefaultGroup> {
    _types: PhantomData<(fn() -> T, fn() -> G)>,
}

impl<T: 'static, G: 'static> GlobalPool<T, G> {
    /// Creates a handle to the shared storage of `T` in group `G`.
    ///
    /// This does not allocate anything; storage is created when first needed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }

    fn storage() -> &'static Mutex<RawBlockPool> {
        let key = TypeId::of::<(T, G)>();

        // The cache is unavailable once this thread's locals are being destroyed, but destructors
        // of other thread-locals may still give objects back. Those calls use the registry.
        STORAGE_CACHE
            .try_with(|cache| *cache.borrow_mut().entry(key).or_insert_with(Self::register))
            .unwrap_or_else(|_| Self::register())
    }

    fn register() -> &'static Mutex<RawBlockPool> {
        let mut registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);

        *registry.entry(TypeId::of::<(T, G)>()).or_insert_with(|| {
            trace!(
                item_type = type_name::<T>(),
                group = type_name::<G>(),
                "initializing global pool storage"
            );

            let storage: &'static Mutex<RawBlockPool> = Box::leak(Box::new(Mutex::new(
                RawBlockPool::new(Layout::new::<T>()),
            )));

            storage
        })
    }

    fn lock() -> MutexGuard<'static, RawBlockPool> {
        // A panic while holding the lock comes from a rejected contract violation, which is
        // detected before any pool state is modified, so the pool is still consistent.
        Self::storage()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The number of objects currently allocated from the shared storage.
    #[must_use]
    pub fn len(&self) -> usize {
        Self::lock().len()
    }

    /// Whether no objects are currently allocated from the shared storage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        Self::lock().is_empty()
    }

    /// The number of slabs currently owned by the shared storage.
    #[must_use]
    pub fn slab_count(&self) -> usize {
        Self::lock().slab_count()
    }

    /// Whether the pointer points into the shared storage.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<T>) -> bool {
        Self::lock().contains(ptr.cast())
    }

    /// Reserves storage for one `T` and returns a pointer to uninitialized memory.
    ///
    /// # Errors
    ///
    /// Returns an error if a new slab is needed and its storage cannot be allocated.
    pub fn allocate(&self) -> Result<NonNull<T>> {
        Self::lock().allocate().map(NonNull::cast)
    }

    /// Gives back storage obtained from [`allocate()`][Self::allocate] on any handle of the
    /// same `T` and `G`. The value in the storage is not dropped.
    ///
    /// # Panics
    ///
    /// Panics if the pointer does not point into the shared storage. In validated builds, also
    /// panics if the pointer is not at a slot boundary or the slot was already given back.
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by a handle of the same `T` and `G` and must not
    /// have been given back since. The caller must not access the storage afterwards.
    ///
    /// Handles are [`Send`] and [`Sync`] for any `T`, so the caller is responsible for
    /// thread affinity: if `T` is not [`Send`], a value still in the storage must only be
    /// dropped or otherwise used on the thread that created it.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>) {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe {
            Self::lock().deallocate(ptr.cast());
        }
    }

    /// Ensures the shared storage has at least `ceil(min_elements / 255)` slabs.
    ///
    /// # Errors
    ///
    /// Returns an error if storage for a slab cannot be allocated.
    pub fn reserve(&self, min_elements: usize) -> Result<()> {
        Self::lock().reserve(min_elements)
    }

    /// Moves a value into newly allocated storage and returns a pointer to it.
    ///
    /// # Errors
    ///
    /// Returns an error if a new slab is needed and its storage cannot be allocated.
    pub fn insert(&self, value: T) -> Result<NonNull<T>> {
        let ptr = self.allocate()?;

        // SAFETY: The storage is freshly allocated, aligned and sized for T.
        unsafe {
            ptr.write(value);
        }

        Ok(ptr)
    }

    /// Moves the value out of storage obtained from [`insert()`][Self::insert] and gives the
    /// storage back.
    ///
    /// # Panics
    ///
    /// Panics if the pointer does not point into the shared storage.
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by a handle of the same `T` and `G`, must point to
    /// an initialized `T` and must not have been given back since.
    ///
    /// If `T` is not [`Send`], this must be called on the thread that inserted the value.
    /// Handles are [`Send`] and [`Sync`] for any `T`, so the compiler does not check this.
    #[must_use]
    pub unsafe fn remove(&self, ptr: NonNull<T>) -> T {
        // SAFETY: The caller guarantees the pointer refers to an initialized T.
        let value = ManuallyDrop::new(unsafe { ptr.read() });

        // SAFETY: Forwarding guarantees from the caller; we already moved the value out.
        unsafe {
            self.deallocate(ptr);
        }

        ManuallyDrop::into_inner(value)
    }
}

impl<T: 'static, G: 'static> Default for GlobalPool<T, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, G> Clone for GlobalPool<T, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, G> Copy for GlobalPool<T, G> {}

impl<T, G> PartialEq for GlobalPool<T, G> {
    /// All handles for the same `T` and `G` share storage, so they are always equal.
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T, G> Eq for GlobalPool<T, G> {}

impl<T, G> fmt::Debug for GlobalPool<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalPool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("group", &format_args!("{}", type_name::<G>()))
            .finish()
    }
}
