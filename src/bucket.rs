//! A single hash bucket: a growable array of atomic slots plus the
//! reader/writer coordination needed to grow it without a stop-the-world
//! pause.
//!
//! ## Synchronization strategy
//!
//! Every bucket carries one `ctrl` word (a signed 32-bit atomic):
//!
//! - `ctrl >= 0`: the count of in-flight "shared" operations (`add`,
//!   `remove`, `contains`, iteration) currently reading or mutating the
//!   slot array. Entering shared mode is `ctrl += 1`; leaving is
//!   `ctrl -= 1` on the non-negative branch.
//! - `ctrl < 0`: a grower holds exclusive access. The transition from
//!   shared to exclusive negates and biases by one (`c -> -c - 1`) so the
//!   bit pattern itself records "I am now the sole exclusive claimant, and
//!   here is how many pre-existing shared holders I still need to wait
//!   out" without a second field. The grower then spins until the count of
//!   pre-existing holders drains to the sentinel `ctrl == -1`.
//!
//! A single per-bucket `parking_lot::Mutex<()>` serializes growers so only
//! one thread ever runs the negate-and-bump transition at a time; shared
//! operations never take this lock.
//!
//! The slot array itself lives behind a `crossbeam_epoch::Atomic` pointer.
//! Growing allocates a new, double-length array, copies the old slots into
//! its upper half (no rehash — the hash function is independent of bucket
//! capacity), publishes the new pointer, and defers destruction of the old
//! array to the epoch collector so that any shared reader who loaded the
//! old pointer just before the swap can keep using it safely.

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use crate::backoff::Backoff;
use crate::error::SetError;
use crate::invariants::{
    debug_assert_bit62_clear, debug_assert_quiesced, debug_assert_size_non_negative,
    debug_assert_valid_array_len,
};
use crate::slot::{published, value_bits};

/// Minimum (and initial) slot array length. Always a power of two.
pub(crate) const MIN_BUCKET_CAPACITY: usize = 16;

/// The growable array of atomic slot words backing one bucket.
pub(crate) struct SlotArray {
    slots: Box<[AtomicI64]>,
}

impl SlotArray {
    fn new(len: usize) -> Self {
        debug_assert_valid_array_len!(len, MIN_BUCKET_CAPACITY);
        let mut v = Vec::with_capacity(len);
        v.resize_with(len, || AtomicI64::new(0));
        Self { slots: v.into_boxed_slice() }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn load(&self, i: usize, ord: Ordering) -> u64 {
        self.slots[i].load(ord) as u64
    }

    /// Convenience accessor for external iteration: always `Acquire`.
    #[inline]
    pub(crate) fn load_word(&self, i: usize) -> u64 {
        self.load(i, Ordering::Acquire)
    }

    #[inline]
    fn store(&self, i: usize, word: u64, ord: Ordering) {
        self.slots[i].store(word as i64, ord);
    }

    #[inline]
    fn compare_exchange(
        &self,
        i: usize,
        current: u64,
        new: u64,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u64, u64> {
        self.slots[i]
            .compare_exchange(current as i64, new as i64, success, failure)
            .map(|v| v as u64)
            .map_err(|v| v as u64)
    }
}

/// One hash bucket: a lazily-allocated, lock-free-readable slot array plus
/// the ctrl-word protocol that lets it grow in place.
pub(crate) struct Bucket {
    slots: Atomic<SlotArray>,
    size: CachePadded<AtomicI64>,
    ctrl: CachePadded<AtomicI32>,
    grow_lock: Mutex<()>,
}

impl Bucket {
    pub(crate) fn new() -> Self {
        Self {
            slots: Atomic::null(),
            size: CachePadded::new(AtomicI64::new(0)),
            ctrl: CachePadded::new(AtomicI32::new(0)),
            grow_lock: Mutex::new(()),
        }
    }

    pub(crate) fn with_capacity(initial_capacity: usize) -> Self {
        Self {
            slots: Atomic::new(SlotArray::new(initial_capacity)),
            size: CachePadded::new(AtomicI64::new(0)),
            ctrl: CachePadded::new(AtomicI32::new(0)),
            grow_lock: Mutex::new(()),
        }
    }

    /// Approximate element count. Not linearizable with concurrent
    /// mutators; see `SPEC_FULL.md` section 3.
    pub(crate) fn size(&self) -> i64 {
        let s = self.size.load(Ordering::Relaxed);
        debug_assert_size_non_negative!(s);
        s.max(0)
    }

    pub(crate) fn slots_atomic(&self) -> &Atomic<SlotArray> {
        &self.slots
    }

    // -------------------------------------------------------------------
    // ctrl-word protocol
    // -------------------------------------------------------------------

    fn acquire_shared(&self) {
        let mut backoff = Backoff::new();
        loop {
            let c = self.ctrl.load(Ordering::Acquire);
            if c < 0 {
                backoff.snooze();
                continue;
            }
            if self
                .ctrl
                .compare_exchange_weak(c, c + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
            backoff.spin();
        }
    }

    fn release_shared(&self) {
        let mut backoff = Backoff::new();
        loop {
            let c = self.ctrl.load(Ordering::Acquire);
            let next = if c < 0 { c + 1 } else { c - 1 };
            if self
                .ctrl
                .compare_exchange_weak(c, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
            backoff.spin();
        }
    }

    /// Claims exclusive access. Blocks until every shared holder that was
    /// already in flight when the claim was made has released.
    ///
    /// Callers serialize themselves via `grow_lock` before calling this, so
    /// `ctrl` is never negative on entry in practice.
    fn acquire_exclusive(&self) {
        let mut backoff = Backoff::new();
        loop {
            let c = self.ctrl.load(Ordering::Acquire);
            debug_assert!(c >= 0, "grow_lock should prevent concurrent exclusive claims");
            if self
                .ctrl
                .compare_exchange_weak(c, -c - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
            backoff.spin();
        }
        backoff.reset();
        while self.ctrl.load(Ordering::Acquire) != -1 {
            backoff.snooze();
        }
        debug_assert_quiesced!(self.ctrl.load(Ordering::Acquire));
    }

    fn release_exclusive(&self) {
        debug_assert_quiesced!(self.ctrl.load(Ordering::Acquire));
        self.ctrl.store(0, Ordering::Release);
    }

    // -------------------------------------------------------------------
    // core operations
    // -------------------------------------------------------------------

    /// Returns true iff `biased` is present, scanning from the high index
    /// down (mirrors `add`'s reservation-then-publish order so a value
    /// that has just been published is found promptly).
    pub(crate) fn contains(&self, biased: u64, guard: &Guard) -> bool {
        let shared = self.slots.load(Ordering::Acquire, guard);
        if shared.is_null() {
            return false;
        }
        let arr = unsafe { shared.deref() };
        let target = published(biased);
        for i in (0..arr.len()).rev() {
            if arr.load(i, Ordering::Acquire) == target {
                return true;
            }
        }
        false
    }

    /// Inserts `biased`, returning `Ok(true)` if it was newly added,
    /// `Ok(false)` if it was already present.
    pub(crate) fn add(&self, biased: u64, guard: &Guard) -> Result<bool, SetError> {
        loop {
            self.acquire_shared();
            let shared = self.slots.load(Ordering::Acquire, guard);
            if shared.is_null() {
                self.release_shared();
                self.grow(Shared::null(), guard);
                continue;
            }

            let arr = unsafe { shared.deref() };
            let len = arr.len();
            let provisional = self.size.fetch_add(1, Ordering::Relaxed) + 1;
            if provisional as usize >= len {
                self.release_shared();
                self.grow(shared, guard);
                self.size.fetch_sub(1, Ordering::Relaxed);
                continue;
            }

            let mut store_index: Option<usize> = None;
            let mut found_existing = false;
            for i in (0..len).rev() {
                if store_index.is_none() {
                    if arr
                        .compare_exchange(i, 0, biased, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        store_index = Some(i);
                        continue;
                    }
                }
                let word = arr.load(i, Ordering::Acquire);
                if value_bits(word) == biased {
                    found_existing = true;
                    break;
                }
            }

            if found_existing {
                if let Some(idx) = store_index {
                    arr.store(idx, 0, Ordering::Release);
                }
                self.size.fetch_sub(1, Ordering::Relaxed);
                self.release_shared();
                debug_assert_size_non_negative!(self.size.load(Ordering::Relaxed));
                return Ok(false);
            }

            if let Some(idx) = store_index {
                let word = published(biased);
                debug_assert_bit62_clear!(word);
                let result = arr.compare_exchange(idx, biased, word, Ordering::AcqRel, Ordering::Acquire);
                self.release_shared();
                return match result {
                    Ok(_) => Ok(true),
                    Err(_) => Err(SetError::InternalInvariant),
                };
            }

            // Every slot is occupied by some other value; our provisional
            // increment over-counted relative to what the array could hold.
            // Roll it back and retry, which will trip the growth branch.
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.release_shared();
        }
    }

    /// Removes `biased`, returning whether it was present.
    pub(crate) fn remove(&self, biased: u64, guard: &Guard) -> bool {
        self.acquire_shared();
        let shared = self.slots.load(Ordering::Acquire, guard);
        if shared.is_null() {
            self.release_shared();
            return false;
        }
        let arr = unsafe { shared.deref() };
        let len = arr.len();
        for i in (0..len).rev() {
            loop {
                let word = arr.load(i, Ordering::Acquire);
                if value_bits(word) != biased {
                    break;
                }
                if arr.compare_exchange(i, word, 0, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                    self.size.fetch_sub(1, Ordering::Relaxed);
                    self.release_shared();
                    debug_assert_size_non_negative!(self.size.load(Ordering::Relaxed));
                    return true;
                }
                // slot changed concurrently; re-read the same index
            }
        }
        self.release_shared();
        false
    }

    /// Doubles the slot array's length, or allocates the first array if
    /// `witness` was null. `witness` is the slot-array pointer the caller
    /// last observed; if some other grower has already acted, this is a
    /// no-op.
    fn grow<'g>(&self, witness: Shared<'g, SlotArray>, guard: &'g Guard) {
        let _held = self.grow_lock.lock();
        let current = self.slots.load(Ordering::Acquire, guard);
        if current != witness {
            return;
        }

        if witness.is_null() {
            let fresh = Owned::new(SlotArray::new(MIN_BUCKET_CAPACITY));
            self.slots.store(fresh, Ordering::Release);
            return;
        }

        self.acquire_exclusive();
        let old = unsafe { witness.deref() };
        let old_len = old.len();
        let new_len = old_len * 2;
        let new_arr = SlotArray::new(new_len);
        for i in 0..old_len {
            let word = old.load(i, Ordering::Acquire);
            new_arr.store(i + old_len, word, Ordering::Relaxed);
        }
        self.slots.store(Owned::new(new_arr), Ordering::Release);
        self.release_exclusive();
        unsafe {
            guard.defer_destroy(witness);
        }
    }
}

impl Drop for Bucket {
    /// `Atomic<SlotArray>` does not reclaim its pointee on drop (growth
    /// victims are handled separately via `defer_destroy`). A `Bucket`
    /// being dropped has no concurrent accessors by definition (`drop`
    /// takes `&mut self`), so reclaiming its current array here with an
    /// unprotected guard is sound.
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let shared = self.slots.load(Ordering::Relaxed, guard);
            if !shared.is_null() {
                drop(shared.into_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_epoch as epoch;

    #[test]
    fn add_then_contains_then_remove() {
        let bucket = Bucket::new();
        let guard = epoch::pin();
        assert!(!bucket.contains(5, &guard));
        assert_eq!(bucket.add(5, &guard), Ok(true));
        assert!(bucket.contains(5, &guard));
        assert_eq!(bucket.add(5, &guard), Ok(false));
        assert!(bucket.remove(5, &guard));
        assert!(!bucket.contains(5, &guard));
        assert!(!bucket.remove(5, &guard));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let bucket = Bucket::new();
        let guard = epoch::pin();
        for v in 1..=(MIN_BUCKET_CAPACITY as u64 * 4) {
            assert_eq!(bucket.add(v, &guard), Ok(true));
        }
        for v in 1..=(MIN_BUCKET_CAPACITY as u64 * 4) {
            assert!(bucket.contains(v, &guard));
        }
        assert_eq!(bucket.size(), MIN_BUCKET_CAPACITY as i64 * 4);
    }

    #[test]
    fn remove_after_growth_still_finds_old_values() {
        let bucket = Bucket::new();
        let guard = epoch::pin();
        for v in 1..=(MIN_BUCKET_CAPACITY as u64 * 2) {
            bucket.add(v, &guard).unwrap();
        }
        // values from before growth now live in the upper half of a
        // doubled array; remove must still find them.
        assert!(bucket.remove(1, &guard));
        assert!(!bucket.contains(1, &guard));
        assert!(bucket.contains(2, &guard));
        assert_eq!(bucket.size(), MIN_BUCKET_CAPACITY as i64 * 2 - 1);
    }
}
