//! The top-level concurrent set: a fixed array of [`Bucket`]s selected by a
//! hash of the biased value.

use std::collections::HashSet as StdHashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_epoch::{self as epoch, Owned};

use crate::bucket::Bucket;
use crate::error::SetError;
use crate::iter::Iter;
use crate::slot::{bias, validate_domain};

/// `bucket_index(v, B) = ((v & 0xFFFF_FFFF) ^ (v >> 32)) & (B - 1)`
///
/// `mask` must be `bucket_count - 1` for a power-of-two bucket count.
#[inline]
fn bucket_index(biased: u64, mask: u32) -> usize {
    let folded = (biased & 0xFFFF_FFFF) ^ (biased >> 32);
    (folded as u32 & mask) as usize
}

struct SetInner {
    buckets: Box<[epoch::Atomic<Bucket>]>,
    bucket_mask: u32,
}

impl Drop for SetInner {
    /// `epoch::Atomic<Bucket>` does not reclaim its pointee on drop. No
    /// other handle can still be alive once `SetInner`'s own refcount hits
    /// zero (that's what `Arc` guarantees), so there are no concurrent
    /// accessors left and reclaiming every bucket here with an unprotected
    /// guard is sound; each `Bucket`'s own `Drop` reclaims its slot array
    /// in turn.
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            for slot in self.buckets.iter() {
                let shared = slot.load(Ordering::Relaxed, guard);
                if !shared.is_null() {
                    drop(shared.into_owned());
                }
            }
        }
    }
}

/// A lock-free concurrent set of 62-bit unsigned integers.
///
/// `Set` is a cheap-to-clone handle: cloning shares the same underlying
/// bucket array via an internal `Arc`, so a single `Set` value can be
/// handed to as many threads as needed without wrapping it in `Arc`
/// yourself.
pub struct Set {
    inner: Arc<SetInner>,
}

impl Clone for Set {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

unsafe impl Send for Set {}
unsafe impl Sync for Set {}

impl Set {
    /// Creates a set with `bucket_count` buckets, each lazily allocating
    /// its first slot array on first insert.
    ///
    /// `bucket_count` must be a positive power of two.
    pub fn new(bucket_count: u32) -> Result<Self, SetError> {
        Self::with_initial_bucket_capacity(bucket_count, 0)
    }

    /// Like [`Set::new`], but each bucket pre-allocates a slot array of
    /// `initial_capacity` entries instead of allocating lazily on first
    /// insert. Pass `0` for lazy allocation (same as `new`).
    ///
    /// `initial_capacity`, if non-zero, must be a power of two of at least
    /// 16.
    pub fn with_initial_bucket_capacity(
        bucket_count: u32,
        initial_capacity: u32,
    ) -> Result<Self, SetError> {
        if bucket_count == 0 || !bucket_count.is_power_of_two() {
            return Err(SetError::Config(bucket_count));
        }
        if initial_capacity != 0
            && (!initial_capacity.is_power_of_two() || initial_capacity < 16)
        {
            return Err(SetError::Config(initial_capacity));
        }

        let mut buckets = Vec::with_capacity(bucket_count as usize);
        for _ in 0..bucket_count {
            let bucket = if initial_capacity == 0 {
                Bucket::new()
            } else {
                Bucket::with_capacity(initial_capacity as usize)
            };
            buckets.push(epoch::Atomic::new(bucket));
        }

        Ok(Self {
            inner: Arc::new(SetInner {
                buckets: buckets.into_boxed_slice(),
                bucket_mask: bucket_count - 1,
            }),
        })
    }

    pub(crate) fn bucket_count_for_iter(&self) -> usize {
        self.inner.buckets.len()
    }

    pub(crate) fn bucket_at<'g>(&self, idx: usize, guard: &'g epoch::Guard) -> &'g Bucket {
        let shared = self.inner.buckets[idx].load(Ordering::Acquire, guard);
        unsafe { shared.deref() }
    }

    /// Inserts `v`, returning `Ok(true)` if it was newly added or
    /// `Ok(false)` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns [`SetError::InputDomain`] if `v` is outside `[0, 2^62 - 1)`.
    pub fn add(&self, v: u64) -> Result<bool, SetError> {
        validate_domain(v)?;
        let biased = bias(v);
        let guard = epoch::pin();
        let idx = bucket_index(biased, self.inner.bucket_mask);
        self.bucket_at(idx, &guard).add(biased, &guard)
    }

    /// Removes `v`, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Returns [`SetError::InputDomain`] if `v` is outside `[0, 2^62 - 1)`.
    pub fn remove(&self, v: u64) -> Result<bool, SetError> {
        validate_domain(v)?;
        let biased = bias(v);
        let guard = epoch::pin();
        let idx = bucket_index(biased, self.inner.bucket_mask);
        Ok(self.bucket_at(idx, &guard).remove(biased, &guard))
    }

    /// Returns whether `v` is present. Unlike `add`/`remove`, out-of-domain
    /// values are not rejected; they deterministically return `false`
    /// since no in-domain `add` could ever have stored them.
    pub fn contains(&self, v: u64) -> bool {
        let biased = bias_for_contains(v);
        let guard = epoch::pin();
        let idx = bucket_index(biased, self.inner.bucket_mask);
        self.bucket_at(idx, &guard).contains(biased, &guard)
    }

    /// An approximate element count: the sum of each bucket's counter,
    /// read without any cross-bucket synchronization. See `SPEC_FULL.md`
    /// section 3.
    pub fn size(&self) -> u64 {
        let guard = epoch::pin();
        self.inner.buckets.iter().fold(0u64, |acc, slot| {
            let bucket = unsafe { slot.load(Ordering::Acquire, &guard).deref() };
            acc + bucket.size() as u64
        })
    }

    /// Equivalent to `self.size() == 0`, with the same approximateness
    /// caveat.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Replaces every bucket with a freshly constructed, empty one.
    ///
    /// Not atomic across buckets, and not isolated from concurrent
    /// mutators of the buckets being replaced: a thread already holding a
    /// reference to a bucket's previous incarnation keeps operating on it
    /// safely (it is simply orphaned, not corrupted), while new lookups
    /// see the fresh bucket. See `SPEC_FULL.md` section 4.9.
    pub fn clear(&self) {
        let guard = epoch::pin();
        for slot in self.inner.buckets.iter() {
            let old = slot.swap(Owned::new(Bucket::new()), Ordering::AcqRel, &guard);
            if !old.is_null() {
                unsafe {
                    guard.defer_destroy(old);
                }
            }
        }
    }

    /// An iterator over the set's current contents. See [`Iter`] for the
    /// snapshot and consistency semantics.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self)
    }

    /// Inserts every value from `values`, returning how many were newly
    /// added.
    ///
    /// # Errors
    ///
    /// Returns the first [`SetError`] encountered; already-applied inserts
    /// are not rolled back.
    pub fn add_all(&self, values: impl IntoIterator<Item = u64>) -> Result<usize, SetError> {
        let mut added = 0;
        for v in values {
            if self.add(v)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Removes every value from `values`, returning how many were present.
    ///
    /// # Errors
    ///
    /// Returns the first [`SetError`] encountered; already-applied removals
    /// are not rolled back.
    pub fn remove_all(&self, values: impl IntoIterator<Item = u64>) -> Result<usize, SetError> {
        let mut removed = 0;
        for v in values {
            if self.remove(v)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Removes every element not present in `values`.
    pub fn retain_all(&self, values: &[u64]) {
        let keep: StdHashSet<u64> = values.iter().copied().collect();
        let to_remove: Vec<u64> = self.iter().filter(|v| !keep.contains(v)).collect();
        for v in to_remove {
            let _ = self.remove(v);
        }
    }

    /// Returns whether every value in `values` is present.
    pub fn contains_all(&self, values: impl IntoIterator<Item = u64>) -> bool {
        values.into_iter().all(|v| self.contains(v))
    }

    /// Collects a snapshot-ish `Vec` of the set's current contents, with
    /// the same consistency caveats as [`Set::iter`].
    pub fn to_vec(&self) -> Vec<u64> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &'a Set {
    type Item = u64;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// `contains` never validates its argument (see `Set::contains`), but a
/// value at or past `u64::MAX` must not panic when biased. `wrapping_add`
/// keeps the lookup total; the result can never match a stored biased
/// value since `add` never accepts anything past `slot::MAX_VALUE`.
#[inline]
fn bias_for_contains(v: u64) -> u64 {
    v.wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_bucket_count() {
        assert_eq!(Set::new(0), Err(SetError::Config(0)));
        assert_eq!(Set::new(3), Err(SetError::Config(3)));
        assert!(Set::new(16).is_ok());
    }

    #[test]
    fn basic_add_contains_remove() {
        let set = Set::new(16).unwrap();
        assert_eq!(set.add(42).unwrap(), true);
        assert!(set.contains(42));
        assert_eq!(set.add(42).unwrap(), false);
        assert_eq!(set.size(), 1);
        assert_eq!(set.remove(42).unwrap(), true);
        assert!(!set.contains(42));
        assert!(set.is_empty());
    }

    #[test]
    fn rejects_out_of_domain_add() {
        let set = Set::new(16).unwrap();
        assert!(set.add(u64::MAX).is_err());
        assert!(!set.contains(u64::MAX));
    }

    #[test]
    fn clear_empties_the_set() {
        let set = Set::new(16).unwrap();
        set.add_all(0..100).unwrap();
        assert_eq!(set.size(), 100);
        set.clear();
        assert_eq!(set.size(), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn bulk_ops_round_trip() {
        let set = Set::new(16).unwrap();
        let values: Vec<u64> = (0..200).collect();
        assert_eq!(set.add_all(values.clone()).unwrap(), 200);
        assert!(set.contains_all(values.clone()));
        let mut collected = set.to_vec();
        collected.sort_unstable();
        assert_eq!(collected, values);
        set.retain_all(&[1, 2, 3]);
        let mut remaining = set.to_vec();
        remaining.sort_unstable();
        assert_eq!(remaining, vec![1, 2, 3]);
    }

    #[test]
    fn clone_shares_state() {
        let set = Set::new(16).unwrap();
        let handle = set.clone();
        handle.add(7).unwrap();
        assert!(set.contains(7));
    }
}
