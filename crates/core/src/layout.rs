//! Buffer layout calculation.
//!
//! All columns of a table live in one allocation. Column `i` starts at the
//! first offset past column `i - 1` that satisfies its alignment, and occupies
//! `size * capacity` bytes. Capacities are kept at multiples of the table's
//! aligned stride so every column's end offset keeps its own alignment.

use alloc::vec::Vec;

/// Largest total allocation size a table will ask for.
pub const ADDRESS_LIMIT: usize = isize::MAX as usize;

/// Rounds `value` up to the next multiple of `alignment` (a power of two).
///
/// Returns `None` on overflow.
#[inline]
pub const fn align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    match value.checked_add(alignment - 1) {
        Some(v) => Some(v & !(alignment - 1)),
        None => None,
    }
}

/// Greatest common divisor.
pub const fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple, or `None` on overflow. `lcm(0, x)` is 0.
pub const fn checked_lcm(a: usize, b: usize) -> Option<usize> {
    if a == 0 || b == 0 {
        return Some(0);
    }
    (a / gcd(a, b)).checked_mul(b)
}

/// Rounds a row count up to a multiple of `stride`, or `None` on overflow.
#[inline]
pub const fn round_up_to_stride(rows: usize, stride: usize) -> Option<usize> {
    let rem = rows % stride;
    if rem == 0 {
        Some(rows)
    } else {
        rows.checked_add(stride - rem)
    }
}

/// Size and alignment of one column element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnShape {
    pub size: usize,
    pub alignment: usize,
}

impl ColumnShape {
    pub const fn new(size: usize, alignment: usize) -> Self {
        Self { size, alignment }
    }
}

/// Byte offsets of every column for a given capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableLayout {
    /// Start of each column, relative to the buffer.
    pub offsets: Vec<usize>,
    /// Bytes needed for the whole buffer; zero means no allocation is needed.
    pub total_size: usize,
    /// Alignment of the buffer: the largest column alignment.
    pub alignment: usize,
}

/// Computes the buffer layout for `capacity` rows.
///
/// Returns `None` if the buffer would exceed [`ADDRESS_LIMIT`].
pub fn compute_offsets(shapes: &[ColumnShape], capacity: usize) -> Option<TableLayout> {
    let mut offsets = Vec::with_capacity(shapes.len());
    let mut offset = 0usize;
    let mut alignment = 1usize;

    for shape in shapes {
        offset = align_up(offset, shape.alignment)?;
        offsets.push(offset);
        offset = offset.checked_add(shape.size.checked_mul(capacity)?)?;
        alignment = alignment.max(shape.alignment);
    }

    if offset > ADDRESS_LIMIT {
        return None;
    }

    // a buffer of only empty columns needs no memory at all
    let total_size = if shapes.iter().all(|s| s.size == 0) || capacity == 0 {
        0
    } else {
        offset
    };

    Some(TableLayout {
        offsets,
        total_size,
        alignment,
    })
}

/// Largest capacity whose layout fits in [`ADDRESS_LIMIT`].
///
/// The bound is exact: `capacity + 1` rows no longer fit. It is not rounded to any
/// stride; tables round their capacities up to their stride only below it.
pub fn max_capacity(shapes: &[ColumnShape]) -> usize {
    let row_size: usize = shapes
        .iter()
        .fold(0usize, |acc, s| acc.saturating_add(s.size));
    if row_size == 0 {
        return usize::MAX;
    }

    if let [only] = shapes {
        return ADDRESS_LIMIT / only.size;
    }

    let fits = |capacity: usize| compute_offsets(shapes, capacity).is_some();

    // no padding can make a row smaller, so this bound is never too low
    let mut hi = ADDRESS_LIMIT / row_size;
    if fits(hi) {
        return hi;
    }

    // padding pushed the optimistic bound over; shrink until something fits
    let mut lo = hi;
    while lo > 0 && !fits(lo) {
        hi = lo;
        lo /= 16;
    }

    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    lo
}
