use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

use tracing::warn;

use crate::{Error, Result, VALIDATED};

/// Number of objects that fit in one slab of a pool.
///
/// This is the largest count whose slot indexes (plus an end-of-list marker) fit into the single
/// byte of free list bookkeeping stored in each vacant slot.
pub const SLAB_CAPACITY: usize = 255;

const SLAB_CAPACITY_U8: u8 = u8::MAX;

/// Free list link value meaning "there is no next vacant slot".
const END_OF_FREE_LIST: u8 = u8::MAX;

/// Fixed-capacity block of raw storage for [`SLAB_CAPACITY`] equally sized slots.
///
/// Vacant slots form an intrusive singly linked list: the first byte of every vacant slot holds
/// the index of the next vacant slot, with [`END_OF_FREE_LIST`] terminating the chain. Think of it
/// as a stack of the most recently freed slots, stored in the slots themselves. Occupied slots
/// belong to the caller and the slab never reads them.
///
/// The slab never moves its storage, so slot pointers remain valid for as long as the slab
/// exists, even if the `Slab` value itself is moved.
///
/// # Out of band access
///
/// The slab does not create or keep references to the slots, so it is valid to access occupied
/// slots via the returned pointers even when not holding a reference to the slab.
#[derive(Debug)]
pub(crate) struct Slab {
    first_slot_ptr: NonNull<u8>,

    /// Distance between consecutive slots. Always a non-zero multiple of the slot alignment.
    slot_size: usize,

    /// Layout of the whole storage block, needed again when we release it.
    storage_layout: Layout,

    /// Index of the first vacant slot, or [`END_OF_FREE_LIST`] if the slab is full.
    free_head: u8,

    free_count: u8,
}

impl Slab {
    /// Calculates the slot layout used to store items of the given layout.
    ///
    /// Every slot is at least one byte (to hold the free list link) and is padded to its
    /// alignment so that consecutive slots are all correctly aligned.
    #[must_use]
    pub(crate) fn slot_layout_for(item_layout: Layout) -> Layout {
        Layout::from_size_align(item_layout.size().max(1), item_layout.align())
            .expect("growing a valid layout to at least one byte keeps it valid")
            .pad_to_align()
    }

    /// Creates a slab with every slot vacant.
    ///
    /// The slot layout must have come from [`slot_layout_for()`][Self::slot_layout_for].
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated. Nothing is allocated in that case.
    pub(crate) fn new(slot_layout: Layout) -> Result<Self> {
        debug_assert!(slot_layout.size() > 0, "slot layout must not be zero-sized");

        let slot_size = slot_layout.size();
        let storage_layout = Self::storage_layout(slot_layout)?;

        // SAFETY: The layout is not zero-sized because the slot size is non-zero.
        let Some(first_slot_ptr) = NonNull::new(unsafe { alloc(storage_layout) }) else {
            warn!(
                size = storage_layout.size(),
                align = storage_layout.align(),
                "slab storage allocation failed"
            );

            return Err(Error::SlabAllocationFailed {
                layout: storage_layout,
            });
        };

        for index in 0..SLAB_CAPACITY_U8 {
            // Cannot overflow because the whole storage block was successfully allocated.
            let offset = usize::from(index).wrapping_mul(slot_size);

            // SAFETY: The offset is within the storage block we just allocated.
            let slot_ptr = unsafe { first_slot_ptr.add(offset) };

            // SAFETY: The pointer is valid for writes. For the last slot this writes
            // END_OF_FREE_LIST, which terminates the chain.
            unsafe {
                slot_ptr.write(index.wrapping_add(1));
            }
        }

        Ok(Self {
            first_slot_ptr,
            slot_size,
            storage_layout,
            free_head: 0,
            free_count: SLAB_CAPACITY_U8,
        })
    }

    fn storage_layout(slot_layout: Layout) -> Result<Layout> {
        let too_large = || Error::SlabTooLarge {
            slot_size: slot_layout.size(),
        };

        let size = slot_layout
            .size()
            .checked_mul(SLAB_CAPACITY)
            .ok_or_else(too_large)?;

        Layout::from_size_align(size, slot_layout.align()).map_err(|_| too_large())
    }

    /// Number of occupied slots.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub(crate) fn len(&self) -> usize {
        SLAB_CAPACITY.wrapping_sub(usize::from(self.free_count))
    }

    /// Whether no slot is occupied, making the slab eligible for being discarded.
    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.free_count == SLAB_CAPACITY_U8
    }

    #[must_use]
    pub(crate) fn has_space(&self) -> bool {
        self.free_count != 0
    }

    /// Whether the pointer points anywhere into the storage of this slab.
    #[must_use]
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        let start = self.first_slot_ptr.as_ptr().addr();

        // Cannot overflow because the storage block exists in the address space.
        let end = start.wrapping_add(self.storage_layout.size());

        (start..end).contains(&ptr.as_ptr().addr())
    }

    fn slot_ptr(&self, index: u8) -> NonNull<u8> {
        if VALIDATED {
            assert!(
                usize::from(index) < SLAB_CAPACITY,
                "slot {index} index out of bounds in slab of {}-byte slots",
                self.slot_size
            );
        }

        // Cannot overflow because the index is within the allocated storage block.
        let offset = usize::from(index).wrapping_mul(self.slot_size);

        // SAFETY: The index is in bounds (checked above in validated builds, guaranteed by the
        // free list invariant otherwise), so the offset stays within our storage block.
        unsafe { self.first_slot_ptr.add(offset) }
    }

    #[allow(
        clippy::integer_division,
        clippy::cast_possible_truncation,
        reason = "slot index math on an offset known to be inside the slab"
    )]
    fn slot_index(&self, ptr: NonNull<u8>) -> u8 {
        let offset = ptr
            .as_ptr()
            .addr()
            .wrapping_sub(self.first_slot_ptr.as_ptr().addr());

        if VALIDATED {
            assert!(
                self.contains(ptr),
                "pointer {ptr:p} does not belong to slab at {:p} of {}-byte slots",
                self.first_slot_ptr,
                self.slot_size
            );

            assert!(
                offset % self.slot_size == 0,
                "pointer {ptr:p} is not at a slot boundary in slab at {:p} of {}-byte slots",
                self.first_slot_ptr,
                self.slot_size
            );
        }

        (offset / self.slot_size) as u8
    }

    /// Reserves a vacant slot and returns a pointer to its uninitialized storage.
    ///
    /// # Panics
    ///
    /// In validated builds, panics if the slab is full.
    #[must_use]
    pub(crate) fn allocate(&mut self) -> NonNull<u8> {
        if VALIDATED {
            assert!(
                self.has_space(),
                "cannot allocate from a full slab of {}-byte slots",
                self.slot_size
            );
        }

        // Pop the next free index from the stack of vacant slots.
        let slot_ptr = self.slot_ptr(self.free_head);

        // SAFETY: The slot is vacant, so its first byte holds the free list link we wrote when
        // the slot was initialized or last deallocated.
        self.free_head = unsafe { slot_ptr.read() };

        // Cannot underflow because we have space.
        self.free_count = self.free_count.wrapping_sub(1);

        #[cfg(debug_assertions)]
        self.integrity_check();

        slot_ptr
    }

    /// Returns a previously allocated slot to the slab.
    ///
    /// The first byte of the slot is overwritten; the rest of the slot is left as is.
    ///
    /// # Panics
    ///
    /// In validated builds, panics if the pointer is not a slot of this slab or if the slot
    /// is already vacant.
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by [`allocate()`][Self::allocate] on this slab and
    /// must not have been deallocated since. The caller must not access the slot afterwards.
    pub(crate) unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        let index = self.slot_index(ptr);

        if VALIDATED {
            assert!(
                !self.is_vacant(index),
                "slot {index} was deallocated twice in slab at {:p} of {}-byte slots",
                self.first_slot_ptr,
                self.slot_size
            );
        }

        // Push the released slot onto the stack of vacant slots.
        // SAFETY: The caller guarantees this is a live slot of this slab, valid for writes.
        unsafe {
            ptr.write(self.free_head);
        }

        self.free_head = index;

        // Cannot overflow because the slot was occupied, so at least one slot was not free.
        self.free_count = self.free_count.wrapping_add(1);

        #[cfg(debug_assertions)]
        self.integrity_check();
    }

    /// Whether the slot is currently on the free list. Linear in the number of vacant slots.
    fn is_vacant(&self, index: u8) -> bool {
        let mut current = self.free_head;

        for _ in 0..self.free_count {
            if current == index {
                return true;
            }

            // SAFETY: Every slot on the free list holds a link in its first byte.
            current = unsafe { self.slot_ptr(current).read() };
        }

        false
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let mut observed_vacant = [false; SLAB_CAPACITY];
        let mut current = self.free_head;

        for step in 0..self.free_count {
            let seen = observed_vacant
                .get_mut(usize::from(current))
                .unwrap_or_else(|| {
                    panic!(
                        "free list step {step} points out of bounds to slot {current} in slab of {}-byte slots",
                        self.slot_size
                    )
                });

            assert!(
                !*seen,
                "free list visits slot {current} twice in slab of {}-byte slots",
                self.slot_size
            );

            *seen = true;

            // SAFETY: The slot is in bounds (checked above) and on the free list.
            current = unsafe { self.slot_ptr(current).read() };
        }

        assert!(
            current == END_OF_FREE_LIST,
            "free list of {} slots does not terminate (ends at {current}) in slab of {}-byte slots",
            self.free_count,
            self.slot_size
        );
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: The layout matches the one we allocated with.
        unsafe {
            dealloc(self.first_slot_ptr.as_ptr(), self.storage_layout);
        }
    }
}

// SAFETY: The slab exclusively owns its storage and has no thread affinity.
unsafe impl Send for Slab {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashSet;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Slab: Send);
    assert_not_impl_any!(Slab: Sync, Clone);

    fn new_slab<T>() -> Slab {
        Slab::new(Slab::slot_layout_for(Layout::new::<T>())).unwrap()
    }

    #[test]
    fn capacity_fits_in_link_byte() {
        assert_eq!(usize::from(SLAB_CAPACITY_U8), SLAB_CAPACITY);
        assert_eq!(usize::from(END_OF_FREE_LIST), SLAB_CAPACITY);
    }

    #[test]
    fn smoke_test() {
        let mut slab = new_slab::<u64>();

        assert!(slab.is_empty());
        assert!(slab.has_space());
        assert_eq!(slab.len(), 0);

        let a = slab.allocate();
        let b = slab.allocate();

        assert_eq!(slab.len(), 2);
        assert!(!slab.is_empty());
        assert!(slab.contains(a));
        assert!(slab.contains(b));

        // SAFETY: Both came from this slab and are deallocated once.
        unsafe {
            slab.deallocate(a);
            slab.deallocate(b);
        }

        assert!(slab.is_empty());
    }

    #[test]
    fn fresh_slab_hands_out_slots_in_address_order() {
        let mut slab = new_slab::<[u8; 16]>();

        let first = slab.allocate();

        for index in 1..4_usize {
            let next = slab.allocate();
            assert_eq!(
                next.as_ptr().addr() - first.as_ptr().addr(),
                index * 16,
                "slot {index} is not where expected"
            );
        }
    }

    #[test]
    fn freed_slot_is_reused_first() {
        let mut slab = new_slab::<u32>();

        let a = slab.allocate();
        let b = slab.allocate();

        // SAFETY: From this slab, freed once.
        unsafe {
            slab.deallocate(a);
        }

        let c = slab.allocate();
        assert_eq!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn fills_up_at_capacity() {
        let mut slab = new_slab::<u16>();

        let mut seen = HashSet::new();

        for _ in 0..SLAB_CAPACITY {
            assert!(slab.has_space());
            assert!(seen.insert(slab.allocate()));
        }

        assert!(!slab.has_space());
        assert_eq!(slab.len(), SLAB_CAPACITY);

        for ptr in seen {
            // SAFETY: All from this slab, each freed once.
            unsafe {
                slab.deallocate(ptr);
            }
        }

        assert!(slab.is_empty());
    }

    #[test]
    fn reused_slots_survive_caller_writes() {
        let mut slab = new_slab::<u64>();

        let ptrs: Vec<_> = (0..10).map(|_| slab.allocate()).collect();

        for ptr in &ptrs {
            // SAFETY: The slot is ours and sized for a u64.
            unsafe {
                ptr.cast::<u64>().write(u64::MAX);
            }
        }

        for ptr in ptrs.iter().rev() {
            // SAFETY: All from this slab, each freed once.
            unsafe {
                slab.deallocate(*ptr);
            }
        }

        // The links we wrote over the caller data must still be followed correctly.
        let again: HashSet<_> = (0..10).map(|_| slab.allocate()).collect();
        assert_eq!(again, ptrs.into_iter().collect::<HashSet<_>>());
    }

    #[test]
    fn slots_are_aligned() {
        #[allow(dead_code, reason = "only used for its layout")]
        #[repr(align(64))]
        struct Aligned(u8);

        let mut slab = new_slab::<Aligned>();

        for _ in 0..SLAB_CAPACITY {
            assert_eq!(slab.allocate().as_ptr().addr() % 64, 0);
        }
    }

    #[test]
    fn zero_sized_items_take_one_byte() {
        let slot_layout = Slab::slot_layout_for(Layout::new::<()>());
        assert_eq!(slot_layout.size(), 1);

        let mut slab = Slab::new(slot_layout).unwrap();
        let a = slab.allocate();
        let b = slab.allocate();
        assert_ne!(a, b);
    }

    #[test]
    fn contains_only_own_storage() {
        let slab_a = new_slab::<u64>();
        let mut slab_b = new_slab::<u64>();

        let ptr = slab_b.allocate();

        assert!(slab_b.contains(ptr));
        assert!(!slab_a.contains(ptr));
    }

    #[cfg(any(debug_assertions, feature = "checked"))]
    #[test]
    #[should_panic]
    fn allocate_when_full_panics() {
        let mut slab = new_slab::<u8>();

        for _ in 0..=SLAB_CAPACITY {
            _ = slab.allocate();
        }
    }

    #[cfg(any(debug_assertions, feature = "checked"))]
    #[test]
    #[should_panic]
    fn deallocate_foreign_pointer_panics() {
        let mut slab_a = new_slab::<u64>();
        let mut slab_b = new_slab::<u64>();

        let ptr = slab_b.allocate();

        // SAFETY: Intentionally violating the contract; validated builds catch it.
        unsafe {
            slab_a.deallocate(ptr);
        }
    }

    #[cfg(any(debug_assertions, feature = "checked"))]
    #[test]
    #[should_panic]
    fn deallocate_misaligned_pointer_panics() {
        let mut slab = new_slab::<u64>();

        let ptr = slab.allocate();

        // SAFETY: Intentionally violating the contract; validated builds catch it.
        unsafe {
            slab.deallocate(ptr.add(1));
        }
    }

    #[cfg(any(debug_assertions, feature = "checked"))]
    #[test]
    #[should_panic]
    fn double_deallocate_panics() {
        let mut slab = new_slab::<u64>();

        let ptr = slab.allocate();
        _ = slab.allocate();

        // SAFETY: Intentionally violating the contract; validated builds catch it.
        unsafe {
            slab.deallocate(ptr);
            slab.deallocate(ptr);
        }
    }

    #[test]
    fn oversized_slot_is_error() {
        let slot_layout = Layout::from_size_align(usize::MAX / 4, 1).unwrap();

        assert!(matches!(
            Slab::new(slot_layout),
            Err(Error::SlabTooLarge { .. })
        ));
    }
}
