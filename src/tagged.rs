//! Tagged index encoding for the idle-stack top.
//!
//! A tagged index packs a worker index and a monotonically increasing tag
//! into a single machine word, so the top of the idle stack can be swapped
//! with one word-sized compare-and-swap while still defeating ABA: every
//! successful swap advances the tag, so the same index at the top carries a
//! distinct tag across time.

/// Width of the index field. 16 bits is far beyond any roster in scope.
pub(crate) const IDX_BITS: u32 = 16;

/// Mask selecting the index field.
pub(crate) const IDX_MASK: usize = (1 << IDX_BITS) - 1;

/// Sentinel index meaning "no worker". Doubles as the initial raw value of
/// the top-of-stack atomic: all-ones index with tag zero.
pub(crate) const NONE_IDX: usize = IDX_MASK;

/// One tag increment.
pub(crate) const TAG_UNIT: usize = 1 << IDX_BITS;

/// Mask selecting the tag field.
pub(crate) const TAG_MASK: usize = !IDX_MASK;

/// Extracts the index field from a raw tagged value.
#[inline]
pub(crate) fn target_of(tagged: usize) -> usize {
    tagged & IDX_MASK
}

/// Builds the successor of `old` pointing at `target`.
///
/// Keeps `old`'s tag bits and adds one tag unit in the same arithmetic step
/// that installs the new index; `target | TAG_UNIT` cannot carry into the
/// tag because `target` fits in the index field.
#[inline]
pub(crate) fn retag(old: usize, target: usize) -> usize {
    debug_assert!(target <= IDX_MASK);
    (old & TAG_MASK).wrapping_add(target | TAG_UNIT)
}
