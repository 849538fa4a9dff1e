//! Debug assertion macros for the bit-stealing and bucket-protocol
//! invariants documented in `SPEC_FULL.md`.
//!
//! These macros provide runtime checks only in debug builds
//! (`#[cfg(debug_assertions)]`), so there is zero overhead in release
//! builds. This is the crate's only observability layer: there is no
//! logging or tracing dependency, matching the source.

// =============================================================================
// INV-SLOT-01: Bit 62 Invariant Zero
// =============================================================================

/// Assert that bit 62 is clear on a word actually stored into a slot.
///
/// **Invariant**: every stored slot word has bit 62 == 0.
///
/// Used in: `Bucket::add` after a reservation or publish CAS succeeds.
macro_rules! debug_assert_bit62_clear {
    ($word:expr) => {
        debug_assert!(
            $word & (1u64 << 62) == 0,
            "INV-SLOT-01 violated: slot word {:#x} has bit 62 set",
            $word
        )
    };
}

// =============================================================================
// INV-CTRL-01: Quiescence Sentinel
// =============================================================================

/// Assert that an exclusive holder only proceeds once `ctrl == -1`.
///
/// **Invariant**: `ctrl == -1` exactly, never some other negative value,
/// by the time a grower swaps the slots array.
///
/// Used in: `Bucket::acquire_exclusive` / `Bucket::release_exclusive`.
macro_rules! debug_assert_quiesced {
    ($ctrl:expr) => {
        debug_assert_eq!(
            $ctrl, -1,
            "INV-CTRL-01 violated: exclusive holder proceeded with ctrl = {} (expected -1)",
            $ctrl
        )
    };
}

// =============================================================================
// INV-BKT-01: Non-Negative Size
// =============================================================================

/// Assert that the approximate size counter is never negative once an
/// operation has finished unwinding its own rollback.
///
/// **Invariant**: `size >= 0` outside of the brief window between an
/// optimistic increment and its rollback.
///
/// Used in: `Bucket::add` / `Bucket::remove` after the counter settles.
macro_rules! debug_assert_size_non_negative {
    ($size:expr) => {
        debug_assert!(
            $size >= 0,
            "INV-BKT-01 violated: bucket size counter went negative ({})",
            $size
        )
    };
}

// =============================================================================
// INV-BKT-02: Array Length Shape
// =============================================================================

/// Assert that a slot array's length is a power of two of at least the
/// configured minimum.
///
/// **Invariant**: `len.is_power_of_two() && len >= MIN_BUCKET_CAPACITY`
///
/// Used in: `Bucket::grow` after allocating the new array.
macro_rules! debug_assert_valid_array_len {
    ($len:expr, $min:expr) => {
        debug_assert!(
            $len >= $min && $len.is_power_of_two(),
            "INV-BKT-02 violated: slot array length {} is not a power of two >= {}",
            $len,
            $min
        )
    };
}

pub(crate) use debug_assert_bit62_clear;
pub(crate) use debug_assert_quiesced;
pub(crate) use debug_assert_size_non_negative;
pub(crate) use debug_assert_valid_array_len;
