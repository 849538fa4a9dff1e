//! A weakly-consistent iterator over a [`crate::Set`]'s current contents.

use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Guard};

use crate::bucket::{Bucket, SlotArray};
use crate::error::SetError;
use crate::set::Set;
use crate::slot::{is_published, unbias, value_bits};

/// An iterator over a [`Set`]'s elements at the time each bucket is
/// visited.
///
/// The iterator pins an epoch guard for its entire lifetime, so any bucket
/// or slot array it has already loaded stays valid memory even if another
/// thread grows or clears that bucket concurrently — but the iterator does
/// not take a full snapshot up front. A value added after the iterator
/// passes its bucket may be missed; a value removed after the iterator
/// observes it as published may still be yielded. This matches the
/// weakly-consistent, fail-safe iteration model described in
/// `SPEC_FULL.md` section 4.10: no `ConcurrentModificationException`
/// equivalent, ever.
pub struct Iter<'a> {
    set: &'a Set,
    guard: Guard,
    started: bool,
    bucket_idx: usize,
    slot_idx: usize,
    current_bucket: *const Bucket,
    current_array: *const SlotArray,
    last: Option<(*const Bucket, u64)>,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(set: &'a Set) -> Self {
        Self {
            set,
            guard: epoch::pin(),
            started: false,
            bucket_idx: 0,
            slot_idx: 0,
            current_bucket: std::ptr::null(),
            current_array: std::ptr::null(),
            last: None,
        }
    }

    /// Loads bucket `idx` (and its current slot array) into
    /// `current_bucket`/`current_array`. Returns `false` if `idx` is past
    /// the last bucket.
    fn load_bucket(&mut self, idx: usize) -> bool {
        if idx >= self.set.bucket_count_for_iter() {
            self.current_bucket = std::ptr::null();
            self.current_array = std::ptr::null();
            return false;
        }
        let (bucket_ptr, array_ptr) = {
            let bucket = self.set.bucket_at(idx, &self.guard);
            let arr_shared = bucket.slots_atomic().load(Ordering::Acquire, &self.guard);
            (bucket as *const Bucket, arr_shared.as_raw())
        };
        self.current_bucket = bucket_ptr;
        self.current_array = array_ptr;
        true
    }

    /// Advances `bucket_idx`/`slot_idx` until a published slot is found or
    /// the bucket array is exhausted. Returns `false` on exhaustion.
    fn advance_to_readable(&mut self) -> bool {
        if !self.started {
            self.started = true;
            if !self.load_bucket(0) {
                return false;
            }
        }
        loop {
            if self.current_array.is_null() {
                self.bucket_idx += 1;
                self.slot_idx = 0;
                if !self.load_bucket(self.bucket_idx) {
                    return false;
                }
                continue;
            }
            let arr = unsafe { &*self.current_array };
            if self.slot_idx >= arr.len() {
                self.bucket_idx += 1;
                self.slot_idx = 0;
                if !self.load_bucket(self.bucket_idx) {
                    return false;
                }
                continue;
            }
            if is_published(arr.load_word(self.slot_idx)) {
                return true;
            }
            self.slot_idx += 1;
        }
    }

    /// Removes the element most recently returned by [`Iterator::next`].
    ///
    /// # Errors
    ///
    /// Returns [`SetError::NoCurrentElement`] if `next` has not returned a
    /// value since construction or since the last `remove_last`.
    /// Returns [`SetError::AlreadyRemoved`] if another thread removed the
    /// same value between this iterator observing it and this call.
    pub fn remove_last(&mut self) -> Result<(), SetError> {
        let (bucket_ptr, biased) = self.last.take().ok_or(SetError::NoCurrentElement)?;
        let bucket = unsafe { &*bucket_ptr };
        if bucket.remove(biased, &self.guard) {
            Ok(())
        } else {
            Err(SetError::AlreadyRemoved)
        }
    }
}

impl Iterator for Iter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            if !self.advance_to_readable() {
                return None;
            }
            let arr = unsafe { &*self.current_array };
            let word = arr.load_word(self.slot_idx);
            // advance_to_readable saw this slot published, but nothing holds
            // a lock during traversal: a concurrent remove may have zeroed
            // it in between. Re-check before trusting the word, same as
            // spec.md section 4.10's "if READ=0, re-advance" rule.
            if !is_published(word) {
                self.slot_idx += 1;
                continue;
            }
            let biased = value_bits(word);
            self.last = Some((self.current_bucket, biased));
            self.slot_idx += 1;
            return Some(unbias(biased));
        }
    }
}
