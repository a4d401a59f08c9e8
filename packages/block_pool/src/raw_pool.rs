use std::alloc::Layout;
use std::ptr::NonNull;

use tracing::{debug, warn};

use crate::{Error, Result, SLAB_CAPACITY, Slab};

/// The untyped core of every pool: an ordered collection of slabs for one slot layout.
///
/// Allocation uses the first slab with a vacant slot, appending a new slab if every slab is full.
/// Deallocation finds the slab that owns the pointer and discards that slab as soon as it becomes
/// empty. Slab storage is never moved or reallocated, so growing the collection does not
/// invalidate previously returned pointers.
#[derive(Debug)]
pub(crate) struct RawBlockPool {
    slot_layout: Layout,

    /// We use a Vec here to allow for dynamic capacity growth. Only the `Slab` values move when
    /// the Vec grows; the storage they own stays where it is.
    slabs: Vec<Slab>,

    /// Index of a slab that has a vacant slot, if known. This is a cache, not the ground truth:
    /// `None` does not imply that every slab is full, it just means we do not know which one
    /// has room. When set, it always points to a slab with a vacant slot.
    slab_with_space_index: Option<usize>,

    /// Number of live allocations. We track this explicitly to avoid summing across slabs.
    length: usize,
}

impl RawBlockPool {
    /// Creates an empty pool for items of the given layout. No storage is allocated until needed.
    #[must_use]
    pub(crate) fn new(item_layout: Layout) -> Self {
        Self {
            slot_layout: Slab::slot_layout_for(item_layout),
            slabs: Vec::new(),
            slab_with_space_index: None,
            length: 0,
        }
    }

    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub(crate) fn len(&self) -> usize {
        debug_assert_eq!(
            self.length,
            self.slabs.iter().map(Slab::len).sum::<usize>()
        );

        self.length
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[must_use]
    pub(crate) fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        // Overflow here would imply capacity is greater than virtual memory - impossible.
        self.slabs.len().wrapping_mul(SLAB_CAPACITY)
    }

    /// Whether the pointer points into storage owned by any slab of this pool.
    #[must_use]
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.slabs.iter().any(|slab| slab.contains(ptr))
    }

    /// Reserves one slot and returns a pointer to its uninitialized storage.
    ///
    /// # Errors
    ///
    /// Returns an error if a new slab was needed but its storage could not be allocated.
    /// The pool is unchanged in that case.
    pub(crate) fn allocate(&mut self) -> Result<NonNull<u8>> {
        let slab_index = self.index_of_slab_with_space()?;

        let slab = self
            .slabs
            .get_mut(slab_index)
            .expect("we just received knowledge that there is a slab with space at this index");

        let ptr = slab.allocate();

        self.slab_with_space_index = slab.has_space().then_some(slab_index);

        // Cannot overflow because that would mean the pool is greater than virtual memory.
        self.length = self.length.wrapping_add(1);

        Ok(ptr)
    }

    /// Returns a slot to the slab that owns it, discarding the slab if it became empty.
    ///
    /// # Panics
    ///
    /// Panics if the pointer does not point into any slab of this pool. In validated builds,
    /// also panics if it is not at a slot boundary or if the slot is already vacant.
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by [`allocate()`][Self::allocate] on this pool and
    /// must not have been deallocated since.
    pub(crate) unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        let slab_index = self
            .slabs
            .iter()
            .position(|slab| slab.contains(ptr))
            .unwrap_or_else(|| {
                panic!(
                    "pointer {ptr:p} was not allocated from this pool of {}-byte slots",
                    self.slot_layout.size()
                )
            });

        let slab = self
            .slabs
            .get_mut(slab_index)
            .expect("we just found the slab at this index");

        // SAFETY: Forwarding guarantee from caller; we found the slab that owns the pointer.
        unsafe {
            slab.deallocate(ptr);
        }

        // Cannot underflow because the slot was live.
        self.length = self.length.wrapping_sub(1);

        if slab.is_empty() {
            self.discard_slab(slab_index);
        } else {
            // We try to remember the lowest index of a slab with space, so we fill
            // the collection from the start.
            match self.slab_with_space_index {
                Some(known) if known <= slab_index => {}
                _ => self.slab_with_space_index = Some(slab_index),
            }
        }
    }

    /// Ensures there are at least enough slabs to hold `min_elements` items.
    ///
    /// This counts slabs, not vacant slots: existing slabs count toward the total whether or not
    /// they have space. Never removes slabs.
    ///
    /// # Errors
    ///
    /// Returns an error if the slab list cannot grow or storage for a new slab cannot be
    /// allocated. If the slab list cannot grow, no slabs are added. Slabs added before a
    /// slab storage failure are kept.
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub(crate) fn reserve(&mut self, min_elements: usize) -> Result<()> {
        let required_slabs = min_elements.div_ceil(SLAB_CAPACITY);
        let additional_slabs = required_slabs.saturating_sub(self.slabs.len());

        self.grow_slab_list(additional_slabs)?;

        for _ in 0..additional_slabs {
            self.add_slab()?;
        }

        Ok(())
    }

    fn index_of_slab_with_space(&mut self) -> Result<usize> {
        if let Some(index) = self.slab_with_space_index {
            return Ok(index);
        }

        if let Some(index) = self.slabs.iter().position(Slab::has_space) {
            self.slab_with_space_index = Some(index);
            return Ok(index);
        }

        self.add_slab()?;

        // Cannot underflow because we just added a slab.
        let index = self.slabs.len().wrapping_sub(1);
        self.slab_with_space_index = Some(index);

        Ok(index)
    }

    /// Makes room in the slab list for `additional` more slabs without reallocating on push.
    fn grow_slab_list(&mut self, additional: usize) -> Result<()> {
        self.slabs.try_reserve(additional).map_err(|source| {
            warn!(
                slab_count = self.slabs.len(),
                additional, "slab list allocation failed"
            );

            Error::SlabListAllocationFailed { source }
        })
    }

    fn add_slab(&mut self) -> Result<()> {
        self.grow_slab_list(1)?;

        let slab = Slab::new(self.slot_layout)?;

        // Cannot reallocate because we just reserved room for it.
        self.slabs.push(slab);

        debug!(
            slot_size = self.slot_layout.size(),
            slab_count = self.slabs.len(),
            "constructed slab"
        );

        Ok(())
    }

    fn discard_slab(&mut self, slab_index: usize) {
        // Keep the order of the remaining slabs; later slabs shift down by one.
        drop(self.slabs.remove(slab_index));

        self.slab_with_space_index = match self.slab_with_space_index {
            Some(known) if known == slab_index => None,
            Some(known) if known > slab_index => Some(known.wrapping_sub(1)),
            other => other,
        };

        debug!(
            slot_size = self.slot_layout.size(),
            slab_count = self.slabs.len(),
            "discarded empty slab"
        );
    }
}
