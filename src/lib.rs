//! A lock-free concurrent set of 62-bit unsigned integers.
//!
//! Every stored value is biased by +1 and packed into a single atomic
//! 64-bit slot word alongside a "published" flag stolen from its top bit,
//! so a reader can tell reserved-but-not-yet-visible inserts apart from
//! fully published ones with one atomic load. Buckets grow by doubling
//! in place, without a stop-the-world rehash: readers that loaded the old
//! slot array just before a grow keep using it safely until the epoch
//! collector reclaims it.
//!
//! # Example
//!
//! ```
//! use u62set_rs::Set;
//!
//! let set = Set::new(64).unwrap();
//! assert!(set.add(42).unwrap());
//! assert!(set.contains(42));
//! assert!(!set.add(42).unwrap());
//! assert_eq!(set.remove(42).unwrap(), true);
//! assert!(set.is_empty());
//! ```
//!
//! # Concurrency
//!
//! `Set` is cheap to clone (an `Arc` handle internally) and every method
//! takes `&self`, so the same handle can be shared across threads without
//! external locking. `add`, `remove`, and `contains` are individually
//! lock-free; growth inside a single bucket is briefly mutually exclusive
//! with other mutators of that one bucket, but never blocks operations on
//! other buckets.

mod backoff;
mod bucket;
mod error;
mod invariants;
mod iter;
mod set;
mod slot;

pub use error::SetError;
pub use iter::Iter;
pub use set::Set;
