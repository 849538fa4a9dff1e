use thiserror::Error;

/// Errors returned by fallible [`crate::Set`] operations.
///
/// Most constructors and mutators return `Result<_, SetError>`; read-only
/// queries (`contains`, `size`) do not fail and return their answer
/// directly, matching the source's "contains never throws" behavior (see
/// `DESIGN.md` for the open-question resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SetError {
    /// A bucket count or initial-capacity argument was not a positive power
    /// of two.
    #[error("bucket count must be a positive power of two, got {0}")]
    Config(u32),

    /// A value passed to `add`, `remove`, or a bulk variant of either fell
    /// outside the accepted domain.
    #[error("value {0} is out of the representable domain [0, 2^62 - 1)")]
    InputDomain(u64),

    /// `Iter::remove_last` was called before `Iter::next` ever returned
    /// `Some`, or after a prior `remove_last` already consumed the current
    /// element.
    #[error("remove_last() called with no current element")]
    NoCurrentElement,

    /// `Iter::remove_last` targeted a value concurrently removed by another
    /// thread between the iterator observing it and the removal attempt.
    #[error("remove_last() target was already removed concurrently")]
    AlreadyRemoved,

    /// A bucket's publish CAS failed after a slot was successfully reserved
    /// with no other writer able to touch that index. Surfacing this as an
    /// error rather than panicking lets callers decide whether a corrupted
    /// bucket is fatal for their process.
    #[error("internal invariant violated: publish CAS failed on a reserved slot")]
    InternalInvariant,
}
