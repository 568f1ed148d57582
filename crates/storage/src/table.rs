//! Typed struct-of-arrays tables.
//!
//! [`Table<R>`] stores rows of the tuple type `R` one column per field. It wraps a
//! [`RawTable`] whose schema is derived from `R`, so every growth, shift and
//! rollback rule of the raw table applies unchanged.
//!
//! ```
//! use tabula_storage::Table;
//!
//! let mut table: Table<(u32, f32)> = Table::new();
//! table.push((1, 0.5)).unwrap();
//! table.push((2, 1.5)).unwrap();
//!
//! assert_eq!(table.column::<0>(), &[1, 2]);
//! assert_eq!(table.row(1), (&2, &1.5));
//! ```

use crate::lifecycle::compare_tables;
use crate::raw_table::RawTable;
use crate::row::{ColumnAt, Row, RowEq, RowOrd};
use alloc::format;
use alloc::sync::Arc;
use core::cmp::Ordering;
use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::slice;
use tabula_core::{Allocator, Error, Global, ParamConvention, Result, Schema, SchemaBuilder};

/// Builds the schema of row type `R`, naming its columns `_0`, `_1`, ...
fn row_schema<R: Row>() -> Result<Arc<Schema>> {
    let mut builder = SchemaBuilder::new();
    for (i, descriptor) in R::descriptors().into_iter().enumerate() {
        builder = builder.column_with(format!("_{}", i), descriptor)?;
    }
    Ok(Arc::new(builder.build()?))
}

/// A growable table of rows of type `R`, stored column by column.
pub struct Table<R: Row, A: Allocator = Global> {
    raw: RawTable<A>,
    _marker: PhantomData<R>,
}

impl<R: Row, A: Allocator + Default> Table<R, A> {
    /// Creates an empty table.
    ///
    /// # Panics
    ///
    /// Panics if the column descriptors of `R` do not form a valid schema, for
    /// example a `ByRef` column that cannot be copied. [`Table::try_new_in`]
    /// reports this as an error instead.
    pub fn new() -> Self {
        match Self::try_new_in(A::default()) {
            Ok(table) => table,
            Err(err) => panic!("invalid row type: {}", err),
        }
    }

    /// Creates an empty table with room for at least `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut table = Self::try_new_in(A::default())?;
        table.reserve(capacity)?;
        Ok(table)
    }
}

impl<R: Row, A: Allocator> Table<R, A> {
    /// Creates an empty table that allocates from `allocator`.
    pub fn try_new_in(allocator: A) -> Result<Self> {
        Ok(Self {
            raw: RawTable::new_in(row_schema::<R>()?, allocator),
            _marker: PhantomData,
        })
    }

    /// The untyped table underneath.
    #[inline]
    pub fn raw(&self) -> &RawTable<A> {
        &self.raw
    }

    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        self.raw.schema()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.raw.max_size()
    }

    #[inline]
    pub fn aligned_stride(&self) -> usize {
        self.raw.aligned_stride()
    }

    #[inline]
    pub fn allocation_size(&self) -> usize {
        self.raw.allocation_size()
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        self.raw.allocator()
    }

    /// See [`RawTable::reserve`].
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        self.raw.reserve(capacity)
    }

    /// See [`RawTable::shrink_to_fit`].
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        self.raw.shrink_to_fit()
    }

    /// Hands the row's fields to `insert`, then settles who owns them.
    ///
    /// Fields the table relocated belong to it now. Fields it copied (`ByRef`
    /// columns) are still ours and are dropped here, as is the whole row when the
    /// insertion failed.
    fn insert_with(
        &mut self,
        row: R,
        insert: impl FnOnce(&mut RawTable<A>, &[*mut u8]) -> Result<()>,
    ) -> Result<()> {
        let mut row = ManuallyDrop::new(row);
        let ptr: *mut R = &mut *row;
        let raw = &mut self.raw;
        // SAFETY: `ptr` points to a live row that the table does not alias.
        let result = unsafe { R::with_fields(ptr, |fields| insert(raw, fields)) };
        match result {
            Ok(()) => {
                if self.raw.schema().has_by_ref() {
                    let descs = self.raw.schema().columns();
                    // SAFETY: only the `ByRef` fields were left behind, and each is
                    // dropped exactly once.
                    unsafe {
                        R::with_fields(ptr, |fields| {
                            for (desc, &field) in descs.iter().zip(fields) {
                                if desc.param() == ParamConvention::ByRef {
                                    if let Some(drop_in_place) = desc.ops().drop_in_place {
                                        drop_in_place(field);
                                    }
                                }
                            }
                        })
                    };
                }
                Ok(())
            }
            Err(err) => {
                // SAFETY: a failed insertion consumed nothing.
                unsafe { ManuallyDrop::drop(&mut row) };
                Err(err)
            }
        }
    }

    /// Appends a row.
    pub fn push(&mut self, row: R) -> Result<()> {
        // SAFETY: the fields are live values of the column types.
        self.insert_with(row, |raw, fields| unsafe { raw.emplace_back(fields) })
    }

    /// Inserts a row at `position`, shifting later rows up.
    pub fn insert(&mut self, position: usize, row: R) -> Result<()> {
        // SAFETY: the fields are live values of the column types.
        self.insert_with(row, |raw, fields| unsafe { raw.insert(position, fields) })
    }

    /// Appends every row of `rows`, stopping at the first failure.
    pub fn try_extend(&mut self, rows: impl IntoIterator<Item = R>) -> Result<()> {
        let rows = rows.into_iter();
        let (lower, _) = rows.size_hint();
        self.reserve(self.len().saturating_add(lower))?;
        for row in rows {
            self.push(row)?;
        }
        Ok(())
    }

    /// Removes the last row and returns it.
    pub fn pop(&mut self) -> Option<R> {
        let last = self.len().checked_sub(1)?;
        // SAFETY: row `last` is live; once read it is no longer counted.
        unsafe {
            let row = R::read(self.raw.columns(), last);
            self.raw.set_len(last);
            Some(row)
        }
    }

    /// Appends a default-constructed row.
    pub fn push_default(&mut self) -> Result<()> {
        self.raw.push_default()
    }

    /// See [`RawTable::resize`].
    pub fn resize(&mut self, len: usize) -> Result<()> {
        self.raw.resize(len)
    }

    /// Removes row `position`, keeping the order of the remaining rows.
    pub fn erase(&mut self, position: usize) -> Result<()> {
        self.raw.erase(position)
    }

    /// See [`RawTable::unordered_erase`].
    pub fn unordered_erase(&mut self, position: usize) -> Result<Option<usize>> {
        self.raw.unordered_erase(position)
    }

    pub fn pop_back(&mut self, count: usize) {
        self.raw.pop_back(count)
    }

    pub fn clear(&mut self) {
        self.raw.clear()
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) -> Result<()> {
        self.raw.swap_rows(a, b)
    }

    /// Appends a copy of row `index`.
    pub fn duplicate_row(&mut self, index: usize) -> Result<()> {
        self.raw.duplicate_row(index)
    }

    /// References to every field of row `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<R::Ref<'_>> {
        if index < self.len() {
            // SAFETY: the row is live and `&self` keeps it from being mutated.
            Some(unsafe { R::get(self.raw.columns(), index) })
        } else {
            None
        }
    }

    /// Like [`Table::get`], with an [`Error::OutOfRange`] past the end.
    pub fn at(&self, index: usize) -> Result<R::Ref<'_>> {
        self.get(index)
            .ok_or_else(|| Error::out_of_range(index, self.len()))
    }

    /// References to every field of row `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn row(&self, index: usize) -> R::Ref<'_> {
        match self.get(index) {
            Some(row) => row,
            None => panic!("row index {} out of range for table of {} rows", index, self.len()),
        }
    }

    /// Mutable references to every field of row `index`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<R::Mut<'_>> {
        if index < self.len() {
            // SAFETY: the row is live and `&mut self` makes the borrow unique.
            Some(unsafe { R::get_mut(self.raw.columns(), index) })
        } else {
            None
        }
    }

    /// Iterates over every row.
    pub fn iter(&self) -> impl Iterator<Item = R::Ref<'_>> + '_ {
        let columns = self.raw.columns();
        // SAFETY: rows `[0, len)` are live for the borrow of `self`.
        (0..self.len()).map(move |i| unsafe { R::get(columns, i) })
    }

    /// The live elements of column `I`.
    #[inline]
    pub fn column<const I: usize>(&self) -> &[<R as ColumnAt<I>>::Type]
    where
        R: ColumnAt<I>,
    {
        // SAFETY: column `I` stores the field type and rows `[0, len)` are live.
        unsafe { slice::from_raw_parts(self.raw.columns()[I].as_ptr().cast(), self.len()) }
    }

    /// The live elements of column `I`, mutably.
    #[inline]
    pub fn column_mut<const I: usize>(&mut self) -> &mut [<R as ColumnAt<I>>::Type]
    where
        R: ColumnAt<I>,
    {
        // SAFETY: as for `column`, and `&mut self` makes the borrow unique.
        unsafe { slice::from_raw_parts_mut(self.raw.columns()[I].as_ptr().cast(), self.len()) }
    }

    /// Exchanges the contents of columns `I` and `J`, which store the same type.
    ///
    /// Columns of different types do not compile here; the untyped
    /// [`RawTable::swap_columns`] rejects them with [`Error::TypeMismatch`].
    pub fn swap_columns<const I: usize, const J: usize>(&mut self) -> Result<()>
    where
        R: ColumnAt<I> + ColumnAt<J, Type = <R as ColumnAt<I>>::Type>,
    {
        self.raw.swap_columns(I, J)
    }

    /// Copies the table with a clone of its allocator.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            raw: self.raw.try_clone()?,
            _marker: PhantomData,
        })
    }

    /// See [`RawTable::assign_from`].
    pub fn assign_from(&mut self, other: &Self) -> Result<()> {
        self.raw.assign_from(&other.raw)
    }

    /// See [`RawTable::take_from`].
    pub fn take_from(&mut self, other: &mut Self) -> Result<()> {
        self.raw.take_from(&mut other.raw)
    }

    /// Moves the rows out into a new table, leaving this one empty.
    pub fn take(&mut self) -> Self {
        Self {
            raw: self.raw.take(),
            _marker: PhantomData,
        }
    }

    /// See [`RawTable::swap`].
    pub fn swap(&mut self, other: &mut Self) {
        self.raw.swap(&mut other.raw)
    }
}

impl<R: Row, A: Allocator + Default> Default for Table<R, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Row + Clone, A: Allocator> Clone for Table<R, A> {
    /// # Panics
    ///
    /// Panics if a column constructor fails or memory runs out; use
    /// [`Table::try_clone`] to handle those.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(table) => table,
            Err(err) => panic!("failed to clone table: {}", err),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if let Err(err) = self.assign_from(source) {
            panic!("failed to clone table: {}", err);
        }
    }
}

impl<R: RowEq, A: Allocator, B: Allocator> PartialEq<Table<R, B>> for Table<R, A> {
    fn eq(&self, other: &Table<R, B>) -> bool {
        self.len() == other.len()
            // SAFETY: both tables hold `len` live rows.
            && unsafe { R::columns_eq(self.raw.columns(), other.raw.columns(), self.len()) }
    }
}

impl<R: RowOrd, A: Allocator, B: Allocator> PartialOrd<Table<R, B>> for Table<R, A> {
    fn partial_cmp(&self, other: &Table<R, B>) -> Option<Ordering> {
        compare_tables(self.len(), other.len(), |common| {
            // SAFETY: the common prefix is live in both tables.
            unsafe { R::rows_cmp(self.raw.columns(), other.raw.columns(), common) }
        })
    }
}

impl<R: Row, A: Allocator> fmt::Debug for Table<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("row", &core::any::type_name::<R>())
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

// SAFETY: the table owns its rows and its allocation outright.
unsafe impl<R: Row + Send, A: Allocator + Send> Send for Table<R, A> {}
// SAFETY: shared access only hands out shared references to rows.
unsafe impl<R: Row + Sync, A: Allocator + Sync> Sync for Table<R, A> {}
