//! Row types of typed tables.
//!
//! A [`Row`] is a tuple of [`Column`] types. It knows its column descriptors and
//! how to read and borrow one row out of a table's column buffers.

use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::ptr::{self, NonNull};
use core::slice;
use tabula_core::{Column, ColumnDescriptor};

/// A tuple of columns stored by a [`Table`](crate::Table).
///
/// # Safety
///
/// Implementations must describe field `j` with the descriptor at position `j` of
/// [`Row::descriptors`], and the accessors must read column `j` as that field's
/// type.
pub unsafe trait Row: Sized + 'static {
    /// Number of columns.
    const COLUMNS: usize;

    /// Shared references to every field of one row.
    type Ref<'a>;

    /// Mutable references to every field of one row.
    type Mut<'a>;

    /// One descriptor per field, in field order.
    fn descriptors() -> Vec<ColumnDescriptor>;

    /// Calls `f` with a pointer to every field of `*row`.
    ///
    /// # Safety
    ///
    /// `row` must be valid for reads and writes.
    unsafe fn with_fields<O>(row: *mut Self, f: impl FnOnce(&[*mut u8]) -> O) -> O;

    /// Moves row `row` out of the column buffers.
    ///
    /// # Safety
    ///
    /// The row must be live; it is uninitialized afterwards.
    unsafe fn read(columns: &[NonNull<u8>], row: usize) -> Self;

    /// # Safety
    ///
    /// The row must be live for `'a` and not mutably borrowed.
    unsafe fn get<'a>(columns: &[NonNull<u8>], row: usize) -> Self::Ref<'a>;

    /// # Safety
    ///
    /// The row must be live for `'a` and not otherwise borrowed.
    unsafe fn get_mut<'a>(columns: &[NonNull<u8>], row: usize) -> Self::Mut<'a>;
}

/// Row types whose column `I` stores `Type`.
pub trait ColumnAt<const I: usize>: Row {
    type Type: Column;
}

/// Row types whose columns are all `PartialEq`.
///
/// # Safety
///
/// Implemented only alongside [`Row`] for the same field layout.
pub unsafe trait RowEq: Row {
    /// Column-major equality of rows `[0, len)` of two tables.
    ///
    /// # Safety
    ///
    /// Rows `[0, len)` of both tables must be live.
    unsafe fn columns_eq(a: &[NonNull<u8>], b: &[NonNull<u8>], len: usize) -> bool;
}

/// Row types whose columns are all `PartialOrd`.
///
/// # Safety
///
/// Implemented only alongside [`Row`] for the same field layout.
pub unsafe trait RowOrd: RowEq {
    /// Row-major lexicographic ordering of rows `[0, len)` of two tables.
    ///
    /// # Safety
    ///
    /// Rows `[0, len)` of both tables must be live.
    unsafe fn rows_cmp(a: &[NonNull<u8>], b: &[NonNull<u8>], len: usize) -> Option<Ordering>;
}

#[inline]
unsafe fn element<T>(column: NonNull<u8>, row: usize) -> *mut T {
    column.as_ptr().cast::<T>().add(row)
}

#[inline]
unsafe fn live<'a, T>(column: NonNull<u8>, len: usize) -> &'a [T] {
    slice::from_raw_parts(column.as_ptr().cast::<T>(), len)
}

macro_rules! impl_row {
    ($n:expr; $all:tt; $($T:ident . $idx:tt),+) => {
        unsafe impl<$($T: Column),+> Row for ($($T,)+) {
            const COLUMNS: usize = $n;

            type Ref<'a> = ($(&'a $T,)+);
            type Mut<'a> = ($(&'a mut $T,)+);

            fn descriptors() -> Vec<ColumnDescriptor> {
                vec![$(<$T as Column>::descriptor()),+]
            }

            #[inline]
            unsafe fn with_fields<O>(row: *mut Self, f: impl FnOnce(&[*mut u8]) -> O) -> O {
                f(&[$(ptr::addr_of_mut!((*row).$idx).cast::<u8>()),+])
            }

            #[inline]
            unsafe fn read(columns: &[NonNull<u8>], row: usize) -> Self {
                ($(element::<$T>(columns[$idx], row).read(),)+)
            }

            #[inline]
            unsafe fn get<'a>(columns: &[NonNull<u8>], row: usize) -> Self::Ref<'a> {
                ($(&*element::<$T>(columns[$idx], row),)+)
            }

            #[inline]
            unsafe fn get_mut<'a>(columns: &[NonNull<u8>], row: usize) -> Self::Mut<'a> {
                ($(&mut *element::<$T>(columns[$idx], row),)+)
            }
        }

        unsafe impl<$($T: Column + PartialEq),+> RowEq for ($($T,)+) {
            unsafe fn columns_eq(a: &[NonNull<u8>], b: &[NonNull<u8>], len: usize) -> bool {
                $(live::<$T>(a[$idx], len) == live::<$T>(b[$idx], len))&&+
            }
        }

        unsafe impl<$($T: Column + PartialOrd),+> RowOrd for ($($T,)+) {
            unsafe fn rows_cmp(a: &[NonNull<u8>], b: &[NonNull<u8>], len: usize) -> Option<Ordering> {
                for row in 0..len {
                    $(
                        match (*element::<$T>(a[$idx], row)).partial_cmp(&*element::<$T>(b[$idx], row)) {
                            Some(Ordering::Equal) => {}
                            other => return other,
                        }
                    )+
                }
                Some(Ordering::Equal)
            }
        }

        impl_column_at!($all; $($idx => $T),+);
    };
}

macro_rules! impl_column_at {
    (@one [$($All:ident),+]; $idx:tt => $T:ident) => {
        impl<$($All: Column),+> ColumnAt<$idx> for ($($All,)+) {
            type Type = $T;
        }
    };
    ($all:tt; $($idx:tt => $T:ident),+) => {
        $(impl_column_at!(@one $all; $idx => $T);)+
    };
}

impl_row!(1; [A]; A.0);
impl_row!(2; [A, B]; A.0, B.1);
impl_row!(3; [A, B, C]; A.0, B.1, C.2);
impl_row!(4; [A, B, C, D]; A.0, B.1, C.2, D.3);
impl_row!(5; [A, B, C, D, E]; A.0, B.1, C.2, D.3, E.4);
impl_row!(6; [A, B, C, D, E, F]; A.0, B.1, C.2, D.3, E.4, F.5);
impl_row!(7; [A, B, C, D, E, F, G]; A.0, B.1, C.2, D.3, E.4, F.5, G.6);
impl_row!(8; [A, B, C, D, E, F, G, H]; A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7);
