//! Tables on allocators that only honour a fixed, small alignment.

use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use tabula_core::{AllocError, Allocator, Column, ColumnDescriptor, Global};
use tabula_storage::Table;

/// Hands out 8-aligned blocks whatever alignment is asked for.
#[derive(Clone, Default)]
struct Coarse {
    live: Rc<Cell<usize>>,
}

unsafe impl Allocator for Coarse {
    const MIN_ALIGNMENT: usize = 8;
    const ALIGNED_ALLOCATE: bool = false;
    const IS_ALWAYS_EQUAL: bool = true;

    fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        assert_eq!(alignment, Self::MIN_ALIGNMENT);
        self.live.set(self.live.get() + 1);
        Global.allocate(size, Self::MIN_ALIGNMENT)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        assert_eq!(alignment, Self::MIN_ALIGNMENT);
        self.live.set(self.live.get() - 1);
        Global.deallocate(ptr, size, alignment)
    }
}

/// A vector lane that wants cache-line alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Lane([f32; 4]);

impl Column for Lane {
    fn descriptor() -> ColumnDescriptor {
        match ColumnDescriptor::builder::<Lane>().copyable().aligned(64) {
            Ok(builder) => builder.default_constructible().equality_comparable().build(),
            Err(err) => panic!("{}", err),
        }
    }
}

#[test]
fn over_aligned_columns_on_coarse_allocator() {
    let allocator = Coarse::default();
    let mut table: Table<(u8, Lane), Coarse> = Table::try_new_in(allocator.clone()).unwrap();
    assert_eq!(table.schema().largest_alignment(), 64);
    // 64 / gcd(64, 16) rows of `Lane` realign to 64 bytes
    assert_eq!(table.aligned_stride(), 4);

    for i in 0..37u8 {
        table.push((i, Lane([f32::from(i); 4]))).unwrap();
        assert_eq!(table.column::<1>().as_ptr() as usize % 64, 0);
        assert_eq!(table.capacity() % table.aligned_stride(), 0);
    }
    assert_eq!(allocator.live.get(), 1);
    assert_eq!(table.column::<1>()[36], Lane([36.0; 4]));

    table.resize(3).unwrap();
    table.shrink_to_fit().unwrap();
    assert_eq!(table.capacity(), 4);
    assert_eq!(table.column::<0>(), &[0, 1, 2]);
    assert_eq!(table.column::<1>().as_ptr() as usize % 64, 0);

    drop(table);
    assert_eq!(allocator.live.get(), 0);
}

#[test]
fn raw_bytes_cover_the_allocation() {
    let mut table: Table<(u16, Lane)> = Table::new();
    table.resize(5).unwrap();
    let size = table.allocation_size();
    let bytes = table.raw().as_bytes().unwrap();
    assert_eq!(bytes.len(), size);
    assert!(size >= 5 * (2 + 16));
}
