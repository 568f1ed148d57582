//! Property-based tests for buffer layout calculation.

use proptest::prelude::*;
use tabula_core::layout::{
    checked_lcm, compute_offsets, gcd, max_capacity, round_up_to_stride, ColumnShape,
};

/// Strategy for one column: a size that is a multiple of its power-of-two alignment,
/// plus an over-alignment that may exceed it.
fn shape_strategy() -> impl Strategy<Value = ColumnShape> {
    (0u32..5, 0usize..9, 0u32..7).prop_map(|(natural, elements, extra)| {
        let natural = 1usize << natural;
        let alignment = natural.max(1usize << extra);
        ColumnShape::new(natural * elements, alignment)
    })
}

fn shapes_strategy() -> impl Strategy<Value = Vec<ColumnShape>> {
    prop::collection::vec(shape_strategy(), 1..6)
}

fn stride_of(shapes: &[ColumnShape]) -> usize {
    shapes.iter().fold(1, |acc, s| {
        let stride = if s.size == 0 {
            1
        } else {
            s.alignment / gcd(s.alignment, s.size)
        };
        checked_lcm(acc, stride).unwrap()
    })
}

proptest! {
    /// Property: every column starts at a multiple of its alignment.
    #[test]
    fn offsets_respect_alignment(shapes in shapes_strategy(), units in 0usize..64) {
        let capacity = units * stride_of(&shapes);
        let layout = compute_offsets(&shapes, capacity).unwrap();
        for (shape, offset) in shapes.iter().zip(&layout.offsets) {
            prop_assert_eq!(offset % shape.alignment, 0);
        }
        let largest = shapes.iter().map(|s| s.alignment).max().unwrap();
        prop_assert_eq!(layout.alignment, largest);
    }

    /// Property: at stride multiples, every column ends aligned too.
    #[test]
    fn stride_keeps_column_ends_aligned(shapes in shapes_strategy(), units in 1usize..64) {
        let capacity = units * stride_of(&shapes);
        let layout = compute_offsets(&shapes, capacity).unwrap();
        for (shape, offset) in shapes.iter().zip(&layout.offsets) {
            prop_assert_eq!((offset + shape.size * capacity) % shape.alignment, 0);
        }
    }

    /// Property: total size never shrinks as capacity grows.
    #[test]
    fn total_size_is_monotonic(shapes in shapes_strategy(), a in 0usize..10_000, b in 0usize..10_000) {
        let (lo, hi) = (a.min(b), a.max(b));
        let small = compute_offsets(&shapes, lo).unwrap();
        let large = compute_offsets(&shapes, hi).unwrap();
        prop_assert!(small.total_size <= large.total_size);
    }

    /// Property: the maximum capacity fits and one more row does not.
    #[test]
    fn max_capacity_is_exact(shapes in shapes_strategy()) {
        let max = max_capacity(&shapes);
        prop_assert!(compute_offsets(&shapes, max).is_some());
        if shapes.iter().any(|s| s.size > 0) {
            prop_assert!(compute_offsets(&shapes, max + 1).is_none());
        } else {
            prop_assert_eq!(max, usize::MAX);
        }
    }

    /// Property: the largest stride multiple under the maximum fits too.
    #[test]
    fn stride_multiple_below_max_fits(shapes in shapes_strategy()) {
        let stride = stride_of(&shapes);
        let max = max_capacity(&shapes);
        prop_assert!(compute_offsets(&shapes, max - max % stride).is_some());
    }

    /// Property: rounding lands on the smallest stride multiple not below the input.
    #[test]
    fn rounding_to_stride(rows in 0usize..1_000_000, stride in 1usize..64) {
        let rounded = round_up_to_stride(rows, stride).unwrap();
        prop_assert_eq!(rounded % stride, 0);
        prop_assert!(rounded >= rows);
        prop_assert!(rounded - rows < stride);
    }
}
