//! Default column descriptors for common Rust types.

use crate::column::{ColumnBuilder, ColumnDescriptor};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::ptr::NonNull;

/// A type with a canonical column descriptor.
///
/// Implement this for your own types to use them in typed rows; the descriptor
/// should advertise every capability the type actually has.
pub trait Column: Sized + 'static {
    /// Returns the descriptor used when no explicit one is given.
    fn descriptor() -> ColumnDescriptor;
}

macro_rules! impl_copy_column {
    ($($t:ty),* $(,)?) => {
        $(
            impl Column for $t {
                fn descriptor() -> ColumnDescriptor {
                    ColumnBuilder::<$t>::new()
                        .copyable()
                        .default_constructible()
                        .equality_comparable()
                        .ordered()
                        .build()
                }
            }
        )*
    };
}

impl_copy_column!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
);

impl Column for String {
    fn descriptor() -> ColumnDescriptor {
        ColumnBuilder::<String>::new()
            .cloneable()
            .default_constructible()
            .equality_comparable()
            .ordered()
            .build()
    }
}

impl<T: Clone + PartialOrd + 'static> Column for Vec<T> {
    fn descriptor() -> ColumnDescriptor {
        ColumnBuilder::<Vec<T>>::new()
            .cloneable()
            .default_constructible()
            .equality_comparable()
            .ordered()
            .build()
    }
}

impl<T: Clone + PartialOrd + 'static> Column for Box<T> {
    fn descriptor() -> ColumnDescriptor {
        ColumnBuilder::<Box<T>>::new()
            .cloneable()
            .equality_comparable()
            .ordered()
            .build()
    }
}

impl<T: Clone + PartialOrd + 'static> Column for Option<T> {
    fn descriptor() -> ColumnDescriptor {
        ColumnBuilder::<Option<T>>::new()
            .cloneable()
            .default_constructible()
            .equality_comparable()
            .ordered()
            .build()
    }
}

impl<T: Copy + PartialOrd + 'static, const N: usize> Column for [T; N] {
    fn descriptor() -> ColumnDescriptor {
        ColumnBuilder::<[T; N]>::new()
            .copyable()
            .equality_comparable()
            .ordered()
            .build()
    }
}

impl<T: 'static> Column for *const T {
    fn descriptor() -> ColumnDescriptor {
        ColumnDescriptor::pointer::<*const T>().build()
    }
}

impl<T: 'static> Column for *mut T {
    fn descriptor() -> ColumnDescriptor {
        ColumnDescriptor::pointer::<*mut T>().build()
    }
}

impl<T: 'static> Column for NonNull<T> {
    fn descriptor() -> ColumnDescriptor {
        ColumnDescriptor::pointer::<NonNull<T>>().build()
    }
}
