//! Untyped struct-of-arrays tables.
//!
//! A [`RawTable`] owns one buffer holding every column of its [`Schema`] side by
//! side, tracks how many rows are live, and grows, shrinks and shifts rows through
//! the [`RowEngine`]. Row values cross its API as raw pointers; the typed
//! [`Table`](crate::Table) builds on top of it.
//!
//! Growth is strong: a failed reallocation leaves every row and the capacity as
//! they were. Insertion and erasure are strong unless a pinned column's copy
//! assignment fails while rows are being shifted, in which case the table keeps
//! its length and every row stays valid but pinned values may have moved. A
//! column that lacks the operation altogether is reported before any row moves.

use crate::buffer::{Buffer, TempBuffer};
use crate::lifecycle::{compare_tables, RowEngine};
use alloc::format;
use alloc::sync::Arc;
use core::cmp::Ordering;
use core::fmt;
use core::mem::{self, MaybeUninit};
use core::ptr::{self, NonNull};
use core::slice;
use tabula_core::layout::round_up_to_stride;
use tabula_core::{Allocator, ColumnDescriptor, Error, Global, Operation, Result, Schema};
use tracing::{debug, warn};

/// Rounds `rows` up to the schema's aligned stride.
///
/// Right below the maximum capacity the next stride multiple may no longer fit;
/// there the row count is used as is. `rows` must not exceed the maximum.
fn stride_capacity(schema: &Schema, rows: usize) -> usize {
    debug_assert!(rows <= schema.max_capacity());
    round_up_to_stride(rows, schema.aligned_stride())
        .filter(|&capacity| capacity <= schema.max_capacity())
        .unwrap_or(rows)
}

/// A growable table of rows whose columns are described at runtime.
pub struct RawTable<A: Allocator = Global> {
    schema: Arc<Schema>,
    buffer: Buffer,
    len: usize,
    allocator: A,
}

impl<A: Allocator + Default> RawTable<A> {
    /// Creates an empty table without allocating.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::new_in(schema, A::default())
    }
}

impl<A: Allocator> RawTable<A> {
    /// Creates an empty table that will allocate from `allocator`.
    pub fn new_in(schema: Arc<Schema>, allocator: A) -> Self {
        let buffer = Buffer::empty(&schema);
        Self {
            schema,
            buffer,
            len: 0,
            allocator,
        }
    }

    /// Creates an empty table with room for at least `capacity` rows.
    pub fn with_capacity_in(schema: Arc<Schema>, capacity: usize, allocator: A) -> Result<Self> {
        let mut table = Self::new_in(schema, allocator);
        table.reserve(capacity)?;
        Ok(table)
    }

    #[inline]
    fn engine(&self) -> RowEngine<'_> {
        RowEngine::new(&self.schema)
    }

    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of live rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of rows the current buffer can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Largest number of rows a table of this schema can hold.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.schema.max_capacity()
    }

    /// Largest capacity a table of this schema can have; equal to
    /// [`Self::max_size`].
    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.schema.max_capacity()
    }

    /// Row-count granularity of every capacity.
    #[inline]
    pub fn aligned_stride(&self) -> usize {
        self.schema.aligned_stride()
    }

    /// Bytes currently allocated.
    #[inline]
    pub fn allocation_size(&self) -> usize {
        self.buffer.allocation_size()
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Column base pointers.
    #[inline]
    pub(crate) fn columns(&self) -> &[NonNull<u8>] {
        self.buffer.columns()
    }

    /// Sets the number of live rows.
    ///
    /// # Safety
    ///
    /// `len` must not exceed the capacity, and rows `[0, len)` must be live.
    #[inline]
    pub unsafe fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.capacity());
        self.len = len;
    }

    fn descriptor(&self, column: usize) -> Result<&ColumnDescriptor> {
        self.schema.column(column).ok_or_else(|| {
            Error::invalid_schema(format!(
                "table has {} columns, no column {}",
                self.schema.len(),
                column
            ))
        })
    }

    /// Pointer to the first element of column `column`.
    ///
    /// # Panics
    ///
    /// Panics if `column` is out of bounds.
    #[inline]
    pub fn column_ptr(&self, column: usize) -> *const u8 {
        self.buffer.columns()[column].as_ptr()
    }

    /// Mutable pointer to the first element of column `column`.
    ///
    /// # Panics
    ///
    /// Panics if `column` is out of bounds.
    #[inline]
    pub fn column_ptr_mut(&mut self, column: usize) -> *mut u8 {
        self.buffer.columns()[column].as_ptr()
    }

    fn check_type<T: 'static>(&self, column: usize) -> Result<()> {
        let desc = self.descriptor(column)?;
        if desc.value_type().is::<T>() || desc.storage_type().is::<T>() {
            Ok(())
        } else {
            Err(Error::type_mismatch(
                column,
                core::any::type_name::<T>(),
                desc.value_type().name(),
            ))
        }
    }

    /// The live elements of column `column` as `T`.
    pub fn column_slice<T: 'static>(&self, column: usize) -> Result<&[T]> {
        self.check_type::<T>(column)?;
        // SAFETY: the column stores `T` (or its storage type of identical layout),
        // is aligned, and rows `[0, len)` are live.
        Ok(unsafe {
            slice::from_raw_parts(self.buffer.columns()[column].as_ptr().cast::<T>(), self.len)
        })
    }

    /// The live elements of column `column` as mutable `T`.
    pub fn column_slice_mut<T: 'static>(&mut self, column: usize) -> Result<&mut [T]> {
        self.check_type::<T>(column)?;
        // SAFETY: as for `column_slice`, and `&mut self` makes the borrow unique.
        Ok(unsafe {
            slice::from_raw_parts_mut(self.buffer.columns()[column].as_ptr().cast::<T>(), self.len)
        })
    }

    /// The whole buffer as bytes, when every column is trivially copyable.
    ///
    /// Slots past `len` and padding between columns are uninitialized.
    pub fn as_bytes(&self) -> Option<&[MaybeUninit<u8>]> {
        if !self.schema.capabilities().trivially_copyable {
            return None;
        }
        Some(match self.buffer.base() {
            // SAFETY: the allocation spans `allocation_size` bytes.
            Some(base) => unsafe {
                slice::from_raw_parts(base.as_ptr().cast::<MaybeUninit<u8>>(), self.allocation_size())
            },
            None => &[],
        })
    }

    /// Mutable view of the whole buffer, when every column is trivially copyable.
    pub fn as_bytes_mut(&mut self) -> Option<&mut [MaybeUninit<u8>]> {
        if !self.schema.capabilities().trivially_copyable {
            return None;
        }
        let size = self.allocation_size();
        Some(match self.buffer.base() {
            // SAFETY: the allocation spans `size` bytes and `&mut self` is unique.
            Some(base) => unsafe {
                slice::from_raw_parts_mut(base.as_ptr().cast::<MaybeUninit<u8>>(), size)
            },
            None => &mut [],
        })
    }

    fn check_row(&self, index: usize) -> Result<()> {
        if index < self.len {
            Ok(())
        } else {
            Err(Error::out_of_range(index, self.len))
        }
    }

    /// Moves every live row into a fresh buffer of exactly `capacity` rows.
    fn reallocate(&mut self, capacity: usize) -> Result<()> {
        debug_assert!(capacity >= self.len);
        let fresh = TempBuffer::allocate(&self.schema, capacity, &self.allocator)?;
        debug!(
            old_capacity = self.buffer.capacity(),
            new_capacity = capacity,
            bytes = fresh.allocation_size(),
            "reallocating table buffer"
        );

        let engine = RowEngine::new(&self.schema);
        // SAFETY: rows `[0, len)` are live in the old buffer and the fresh one is
        // empty and large enough. A failed transfer destroyed everything it built,
        // so dropping `fresh` only releases memory.
        if let Err(err) = unsafe { engine.transfer_rows(fresh.columns(), self.buffer.columns(), self.len) } {
            warn!(error = %err, rows = self.len, "row migration failed; keeping the existing buffer");
            return Err(err);
        }

        let fresh = fresh.into_inner();
        let mut old = mem::replace(&mut self.buffer, fresh);
        // SAFETY: the transfer left every old slot dead.
        unsafe { old.release(&self.schema, &self.allocator) };
        Ok(())
    }

    /// Ensures room for at least `capacity` rows, rounded up to the aligned stride
    /// where that still fits under [`Self::max_capacity`].
    ///
    /// On failure the table is unchanged.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity() {
            return Ok(());
        }
        let max = self.schema.max_capacity();
        if capacity > max {
            return Err(Error::capacity_exceeded(capacity, max));
        }
        self.reallocate(stride_capacity(&self.schema, capacity))
    }

    /// Shrinks the buffer to the smallest stride multiple holding every row,
    /// releasing it entirely when the table is empty.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        if self.len == 0 {
            if self.allocation_size() > 0 {
                debug!(bytes = self.allocation_size(), "releasing table buffer");
            }
            // SAFETY: no row is live.
            unsafe { self.buffer.release(&self.schema, &self.allocator) };
            return Ok(());
        }
        let target = stride_capacity(&self.schema, self.len);
        if target < self.capacity() {
            self.reallocate(target)?;
        }
        Ok(())
    }

    /// Makes room for one more row, doubling the capacity (clamped to the maximum).
    fn grow_for_one(&mut self) -> Result<()> {
        if self.len < self.capacity() {
            return Ok(());
        }
        let max = self.schema.max_capacity();
        if self.capacity() >= max {
            return Err(Error::capacity_exceeded(self.len.saturating_add(1), max));
        }
        let target = self.capacity().saturating_mul(2).max(self.len + 1).min(max);
        self.reserve(target)
    }

    /// Appends a row built from one argument pointer per column.
    ///
    /// Arguments of `ByValue` and `ByMove` columns are consumed on success;
    /// arguments of `ByRef` columns are copied and stay owned by the caller. On
    /// failure nothing has been consumed and the table is unchanged.
    ///
    /// # Safety
    ///
    /// `args` must hold one pointer per column, each to a live value of that
    /// column's storage type outside the table.
    pub unsafe fn emplace_back(&mut self, args: &[*mut u8]) -> Result<()> {
        debug_assert_eq!(args.len(), self.schema.len());
        self.grow_for_one()?;
        let engine = RowEngine::new(&self.schema);
        engine.construct_row(self.buffer.columns(), self.len, args)?;
        self.len += 1;
        Ok(())
    }

    /// Inserts a row built from `args` at `position`, shifting later rows up.
    ///
    /// # Safety
    ///
    /// As for [`Self::emplace_back`].
    pub unsafe fn insert(&mut self, position: usize, args: &[*mut u8]) -> Result<()> {
        debug_assert_eq!(args.len(), self.schema.len());
        if position > self.len {
            return Err(Error::out_of_range(position, self.len));
        }
        if position == self.len {
            return self.emplace_back(args);
        }
        self.grow_for_one()?;

        let engine = RowEngine::new(&self.schema);
        let columns = self.buffer.columns();

        if self.schema.has_by_ref() {
            // copies are made aside so the gap never has to be closed again
            let scratch = TempBuffer::scratch(&self.schema, &self.allocator)?;
            engine.copy_by_ref_args(scratch.columns(), 0, args)?;
            if let Err(err) = engine.open_gap(columns, position, self.len) {
                engine.destruct_by_ref(scratch.columns(), 0);
                return Err(err);
            }
            engine.relocate_staged(columns, position, scratch.columns(), args);
        } else {
            engine.open_gap(columns, position, self.len)?;
            engine.relocate_args(columns, position, args);
        }
        self.len += 1;
        Ok(())
    }

    /// Appends a default-constructed row.
    pub fn push_default(&mut self) -> Result<()> {
        self.schema.require(Operation::DefaultConstruct)?;
        self.grow_for_one()?;
        let engine = RowEngine::new(&self.schema);
        // SAFETY: row `len` is within capacity and uninitialized.
        unsafe { engine.default_construct_row(self.buffer.columns(), self.len)? };
        self.len += 1;
        Ok(())
    }

    /// Grows with default-constructed rows or drops trailing rows until the table
    /// holds `len` rows.
    ///
    /// Each new row is strong on its own: on failure the rows appended so far stay.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        if len <= self.len {
            self.pop_back(self.len - len);
            return Ok(());
        }
        self.schema.require(Operation::DefaultConstruct)?;
        self.reserve(len)?;
        let engine = RowEngine::new(&self.schema);
        while self.len < len {
            // SAFETY: row `len` is within capacity and uninitialized.
            unsafe { engine.default_construct_row(self.buffer.columns(), self.len)? };
            self.len += 1;
        }
        Ok(())
    }

    /// Appends a copy of row `index` of `other`, whose schema must store the same
    /// types.
    pub fn push_copy_from<B: Allocator>(&mut self, other: &RawTable<B>, index: usize) -> Result<()> {
        if !self.schema.is_compatible(&other.schema) {
            return Err(self.incompatible(&other.schema));
        }
        other.check_row(index)?;
        self.schema.require(Operation::CopyConstruct)?;
        self.grow_for_one()?;
        let engine = RowEngine::new(&self.schema);
        // SAFETY: the source row is live, the destination row is uninitialized,
        // and they live in different buffers.
        unsafe { engine.copy_rows(self.buffer.columns(), self.len, other.buffer.columns(), index, 1)? };
        self.len += 1;
        Ok(())
    }

    /// Appends a copy of this table's row `index`.
    pub fn duplicate_row(&mut self, index: usize) -> Result<()> {
        self.check_row(index)?;
        self.schema.require(Operation::CopyConstruct)?;
        self.grow_for_one()?;
        let engine = RowEngine::new(&self.schema);
        let columns = self.buffer.columns();
        // SAFETY: `index < len`, so source and destination rows are distinct.
        unsafe { engine.copy_rows(columns, self.len, columns, index, 1)? };
        self.len += 1;
        Ok(())
    }

    fn incompatible(&self, other: &Schema) -> Error {
        let column = self
            .schema
            .columns()
            .iter()
            .zip(other.columns())
            .position(|(a, b)| a.storage_type() != b.storage_type())
            .unwrap_or_else(|| self.schema.len().min(other.len()));
        let name = |schema: &Schema| schema.column(column).map_or("<none>", |c| c.value_type().name());
        Error::type_mismatch(column, name(&self.schema), name(other))
    }

    /// Removes row `position`, keeping the order of the remaining rows.
    pub fn erase(&mut self, position: usize) -> Result<()> {
        self.check_row(position)?;
        let engine = RowEngine::new(&self.schema);
        // SAFETY: `position < len` and rows `[0, len)` are live.
        unsafe { engine.close_gap(self.buffer.columns(), position, self.len)? };
        self.len -= 1;
        Ok(())
    }

    /// Removes row `position` by moving the last row into its place.
    ///
    /// Returns the index the last row was moved from, or `None` when `position`
    /// was the last row.
    pub fn unordered_erase(&mut self, position: usize) -> Result<Option<usize>> {
        self.check_row(position)?;
        let last = self.len - 1;
        if position == last {
            self.pop_back(1);
            return Ok(None);
        }
        let engine = RowEngine::new(&self.schema);
        // SAFETY: both rows are live and distinct.
        unsafe { engine.move_row_over(self.buffer.columns(), position, last)? };
        self.len = last;
        Ok(Some(last))
    }

    /// Drops the last `count` rows (all of them if there are fewer). The buffer is
    /// kept.
    pub fn pop_back(&mut self, count: usize) {
        let count = count.min(self.len);
        let start = self.len - count;
        let end = self.len;
        self.len = start;
        // SAFETY: rows `[start, end)` were live and are no longer counted.
        unsafe { self.engine().destruct_rows(self.buffer.columns(), start, end) };
    }

    /// Drops every row. The buffer is kept.
    pub fn clear(&mut self) {
        self.pop_back(self.len);
    }

    /// Exchanges rows `a` and `b`.
    pub fn swap_rows(&mut self, a: usize, b: usize) -> Result<()> {
        self.check_row(a)?;
        self.check_row(b)?;
        if a == b {
            return Ok(());
        }
        let engine = RowEngine::new(&self.schema);
        if self.schema.has_pinned() {
            let scratch = TempBuffer::scratch(&self.schema, &self.allocator)?;
            // SAFETY: both rows are live and distinct; scratch is empty.
            unsafe { engine.swap_rows(self.buffer.columns(), a, b, scratch.columns()) }
        } else {
            // SAFETY: both rows are live and distinct.
            unsafe { engine.swap_rows(self.buffer.columns(), a, b, &[]) }
        }
    }

    /// Exchanges the contents of two columns of the same storage type.
    ///
    /// Columns with the same alignment trade buffers without moving data; the
    /// others are exchanged element by element. Columns of different storage
    /// types are never exchanged, not even element by element: the call fails with
    /// [`Error::TypeMismatch`] and the table is unchanged.
    pub fn swap_columns(&mut self, a: usize, b: usize) -> Result<()> {
        let (da, db) = (self.descriptor(a)?, self.descriptor(b)?);
        if a == b {
            return Ok(());
        }
        if da.storage_type() != db.storage_type() {
            return Err(Error::type_mismatch(b, da.value_type().name(), db.value_type().name()));
        }
        if da.alignment() == db.alignment() {
            self.buffer.columns_mut().swap(a, b);
            return Ok(());
        }

        let engine = RowEngine::new(&self.schema);
        if da.is_pinned() || db.is_pinned() {
            let scratch = TempBuffer::scratch(&self.schema, &self.allocator)?;
            // SAFETY: rows `[0, len)` are live; scratch is empty.
            unsafe { engine.swap_column_elements(self.buffer.columns(), a, b, self.len, scratch.columns()) }
        } else {
            // SAFETY: rows `[0, len)` are live.
            unsafe { engine.swap_column_elements(self.buffer.columns(), a, b, self.len, &[]) }
        }
    }

    /// Builds a table holding copies of this table's rows with `allocator`.
    fn copy_with(&self, allocator: A) -> Result<Self> {
        self.schema.require(Operation::CopyConstruct)?;
        let mut copy = Self::new_in(self.schema.clone(), allocator);
        copy.reserve(self.len)?;
        let engine = RowEngine::new(&self.schema);
        // SAFETY: source rows are live and the fresh buffer is empty.
        unsafe { engine.copy_rows(copy.buffer.columns(), 0, self.buffer.columns(), 0, self.len)? };
        copy.len = self.len;
        Ok(copy)
    }

    /// Copies the table. The copy allocates from the allocator's
    /// [`select_on_copy`](Allocator::select_on_copy).
    pub fn try_clone(&self) -> Result<Self> {
        self.copy_with(self.allocator.select_on_copy())
    }

    /// Replaces this table's rows with copies of `other`'s.
    ///
    /// The copy is built in a fresh buffer before the old rows are dropped, so on
    /// failure this table is unchanged. The allocator is taken from `other` when it
    /// propagates on copy.
    pub fn assign_from(&mut self, other: &Self) -> Result<()> {
        if ptr::eq(self, other) {
            return Ok(());
        }
        if !self.schema.is_compatible(&other.schema) {
            return Err(self.incompatible(&other.schema));
        }
        let allocator = if A::PROPAGATE_ON_COPY {
            other.allocator.clone()
        } else {
            self.allocator.clone()
        };
        let copy = other.copy_with(allocator)?;
        *self = copy;
        Ok(())
    }

    /// Moves `other`'s rows into this table, dropping this table's rows and leaving
    /// `other` empty.
    ///
    /// Storage changes hands when the allocators allow it; otherwise the rows are
    /// moved one by one into a buffer from this table's allocator.
    pub fn take_from(&mut self, other: &mut Self) -> Result<()> {
        if ptr::eq(self, other) {
            return Ok(());
        }

        if A::IS_ALWAYS_EQUAL || A::PROPAGATE_ON_MOVE || self.allocator.equals(&other.allocator) {
            self.clear();
            // SAFETY: no row is live.
            unsafe { self.buffer.release(&self.schema, &self.allocator) };
            self.buffer = mem::replace(&mut other.buffer, Buffer::empty(&other.schema));
            self.len = mem::take(&mut other.len);
            self.schema = other.schema.clone();
            if A::PROPAGATE_ON_MOVE {
                self.allocator = other.allocator.clone();
            }
            return Ok(());
        }

        let capacity = stride_capacity(&other.schema, other.len);
        let fresh = TempBuffer::allocate(&other.schema, capacity, &self.allocator)?;
        let engine = RowEngine::new(&other.schema);
        // SAFETY: `other`'s rows are live and the fresh buffer is empty.
        unsafe { engine.transfer_rows(fresh.columns(), other.buffer.columns(), other.len)? };
        let fresh = fresh.into_inner();
        let len = mem::take(&mut other.len);

        self.clear();
        // SAFETY: no row is live.
        unsafe { self.buffer.release(&self.schema, &self.allocator) };
        self.buffer = fresh;
        self.len = len;
        self.schema = other.schema.clone();
        Ok(())
    }

    /// Moves the rows out into a new table, leaving this one empty with a clone of
    /// its allocator.
    pub fn take(&mut self) -> Self {
        Self {
            schema: self.schema.clone(),
            buffer: mem::replace(&mut self.buffer, Buffer::empty(&self.schema)),
            len: mem::take(&mut self.len),
            allocator: self.allocator.clone(),
        }
    }

    /// Exchanges the contents of two tables.
    ///
    /// Allocators are exchanged only when they propagate on swap; otherwise they
    /// must be equal.
    pub fn swap(&mut self, other: &mut Self) {
        if A::PROPAGATE_ON_SWAP {
            mem::swap(&mut self.allocator, &mut other.allocator);
        } else {
            debug_assert!(
                self.allocator.equals(&other.allocator),
                "swapping tables with unequal, non-propagating allocators"
            );
        }
        mem::swap(&mut self.schema, &mut other.schema);
        mem::swap(&mut self.buffer, &mut other.buffer);
        mem::swap(&mut self.len, &mut other.len);
    }

    /// Equality of two tables: same schema types, same length, and column by
    /// column equal values.
    pub fn try_eq<B: Allocator>(&self, other: &RawTable<B>) -> Result<bool> {
        self.schema.require(Operation::Equality)?;
        if !self.schema.is_compatible(&other.schema) || self.len != other.len {
            return Ok(false);
        }
        // SAFETY: rows `[0, len)` of both tables are live.
        unsafe { self.engine().equal_rows(self.buffer.columns(), other.buffer.columns(), self.len) }
    }

    /// Lexicographic ordering of two tables. Tables of incompatible schemas are
    /// unordered.
    pub fn try_cmp<B: Allocator>(&self, other: &RawTable<B>) -> Result<Option<Ordering>> {
        self.schema.require(Operation::Ordering)?;
        if !self.schema.is_compatible(&other.schema) {
            return Ok(None);
        }
        let engine = self.engine();
        let (a, b) = (self.buffer.columns(), other.buffer.columns());
        let mut failure = None;
        let ordering = compare_tables(self.len, other.len, |common| {
            // SAFETY: the common prefix is live in both tables.
            match unsafe { engine.compare_rows(a, b, common) } {
                Ok(ordering) => ordering,
                Err(err) => {
                    failure = Some(err);
                    None
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(ordering),
        }
    }
}

impl<A: Allocator> Drop for RawTable<A> {
    fn drop(&mut self) {
        let len = mem::take(&mut self.len);
        let engine = RowEngine::new(&self.schema);
        // SAFETY: rows `[0, len)` were live; nothing is live afterwards.
        unsafe {
            engine.destruct_rows(self.buffer.columns(), 0, len);
            if self.buffer.allocation_size() > 0 {
                debug!(bytes = self.buffer.allocation_size(), "releasing table buffer");
            }
            self.buffer.release(&self.schema, &self.allocator);
        }
    }
}

impl<A: Allocator> fmt::Debug for RawTable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTable")
            .field("columns", &self.schema.len())
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;
    use tabula_core::{
        AssignFrom, Column, ColumnBuilder, ConstructionError, ParamConvention, SchemaBuilder,
        Strategy,
    };

    fn schema() -> Arc<Schema> {
        Arc::new(
            SchemaBuilder::new()
                .column::<u32>("id")
                .unwrap()
                .column::<String>("name")
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    fn push(table: &mut RawTable, id: u32, name: &str) {
        let mut id = id;
        let mut name = mem::ManuallyDrop::new(String::from(name));
        unsafe {
            table
                .emplace_back(&[
                    (&mut id as *mut u32).cast(),
                    (&mut *name as *mut String).cast(),
                ])
                .unwrap();
        }
    }

    fn ids(table: &RawTable) -> Vec<u32> {
        table.column_slice::<u32>(0).unwrap().to_vec()
    }

    fn names(table: &RawTable) -> Vec<&str> {
        table
            .column_slice::<String>(1)
            .unwrap()
            .iter()
            .map(|s| s.as_str())
            .collect()
    }

    #[test]
    fn test_new_table_is_empty() {
        let table: RawTable = RawTable::new(schema());
        assert_eq!(table.len(), 0);
        assert_eq!(table.capacity(), 0);
        assert_eq!(table.allocation_size(), 0);
        assert!(table.column_slice::<u32>(0).unwrap().is_empty());
    }

    #[test]
    fn test_push_grows() {
        let mut table: RawTable = RawTable::new(schema());
        for i in 0..10 {
            push(&mut table, i, "x");
            assert!(table.len() <= table.capacity());
        }
        assert_eq!(ids(&table), (0..10).collect::<Vec<_>>());
        assert!(table.allocation_size() > 0);
    }

    #[test]
    fn test_reserve_and_shrink() {
        let mut table: RawTable = RawTable::new(schema());
        table.reserve(20).unwrap();
        assert!(table.capacity() >= 20);
        push(&mut table, 1, "a");
        table.shrink_to_fit().unwrap();
        assert_eq!(table.capacity(), 1);
        table.clear();
        table.shrink_to_fit().unwrap();
        assert_eq!(table.capacity(), 0);
        assert_eq!(table.allocation_size(), 0);
    }

    #[test]
    fn test_reserve_past_max_fails() {
        let mut table: RawTable = RawTable::new(schema());
        let err = table.reserve(table.max_size() + 1).unwrap_err();
        assert!(err.is_out_of_memory());
        assert_eq!(table.capacity(), 0);
    }

    #[test]
    fn test_stride_rounding_stops_at_max() {
        let schema = SchemaBuilder::new()
            .column::<u8>("tag")
            .unwrap()
            .column_with("lane", ColumnBuilder::<u32>::new().copyable().aligned(16).unwrap().build())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(schema.aligned_stride(), 4);
        let max = schema.max_capacity();
        assert_ne!(max % 4, 0);

        assert_eq!(stride_capacity(&schema, 5), 8);
        assert_eq!(stride_capacity(&schema, 8), 8);
        assert_eq!(stride_capacity(&schema, max - max % 4), max - max % 4);
        // the next multiple of the stride is past the limit
        assert_eq!(stride_capacity(&schema, max), max);
    }

    #[test]
    fn test_insert_and_erase() {
        let mut table: RawTable = RawTable::new(schema());
        push(&mut table, 1, "a");
        push(&mut table, 3, "c");
        let mut id = 2u32;
        let mut name = mem::ManuallyDrop::new(String::from("b"));
        unsafe {
            table
                .insert(1, &[(&mut id as *mut u32).cast(), (&mut *name as *mut String).cast()])
                .unwrap();
        }
        assert_eq!(ids(&table), vec![1, 2, 3]);
        assert_eq!(names(&table), vec!["a", "b", "c"]);

        table.erase(0).unwrap();
        assert_eq!(ids(&table), vec![2, 3]);
        assert!(matches!(table.erase(2), Err(Error::OutOfRange { index: 2, len: 2 })));
    }

    #[test]
    fn test_insert_by_ref_keeps_argument() {
        let by_ref = ColumnBuilder::<String>::new()
            .cloneable()
            .pass_by(ParamConvention::ByRef)
            .build();
        let schema = Arc::new(Schema::positional(vec![u32::descriptor(), by_ref]).unwrap());
        let mut table: RawTable = RawTable::new(schema);
        for (id, name) in [(1u32, "a"), (3, "c"), (2, "b")] {
            let mut id = id;
            let mut name = String::from(name);
            let position = table.len().min(1);
            unsafe {
                table
                    .insert(position, &[(&mut id as *mut u32).cast(), (&mut name as *mut String).cast()])
                    .unwrap();
            }
            // copied, not moved
            name.push('?');
        }
        assert_eq!(table.column_slice::<u32>(0).unwrap(), &[1, 2, 3]);
        let names: Vec<&str> = table.column_slice::<String>(1).unwrap().iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut table: RawTable = RawTable::new(schema());
        let mut id = 2u32;
        let mut name = String::from("b");
        let err = unsafe {
            table.insert(1, &[(&mut id as *mut u32).cast(), (&mut name as *mut String).cast()])
        };
        assert!(matches!(err, Err(Error::OutOfRange { index: 1, len: 0 })));
    }

    #[test]
    fn test_unordered_erase() {
        let mut table: RawTable = RawTable::new(schema());
        push(&mut table, 1, "a");
        push(&mut table, 2, "b");
        push(&mut table, 3, "c");
        assert_eq!(table.unordered_erase(0).unwrap(), Some(2));
        assert_eq!(ids(&table), vec![3, 2]);
        assert_eq!(table.unordered_erase(1).unwrap(), None);
        assert_eq!(names(&table), vec!["c"]);
    }

    #[test]
    fn test_resize_requires_default() {
        let mut table: RawTable = RawTable::new(schema());
        table.resize(3).unwrap();
        assert_eq!(ids(&table), vec![0, 0, 0]);
        table.resize(1).unwrap();
        assert_eq!(table.len(), 1);

        let no_default = Arc::new(Schema::positional(vec![ColumnBuilder::<String>::new().build()]).unwrap());
        let mut table: RawTable = RawTable::new(no_default);
        assert!(matches!(
            table.resize(1),
            Err(Error::Unsupported { operation: Operation::DefaultConstruct, .. })
        ));
    }

    #[test]
    fn test_copy_from_and_duplicate() {
        let mut a: RawTable = RawTable::new(schema());
        push(&mut a, 1, "a");
        let mut b: RawTable = RawTable::new(schema());
        b.push_copy_from(&a, 0).unwrap();
        b.duplicate_row(0).unwrap();
        assert_eq!(names(&b), vec!["a", "a"]);
        assert!(b.push_copy_from(&a, 5).is_err());

        let other = Arc::new(Schema::positional(vec![u64::descriptor(), String::descriptor()]).unwrap());
        let c: RawTable = RawTable::new(other);
        assert!(matches!(
            b.push_copy_from(&c, 0),
            Err(Error::TypeMismatch { column: 0, .. })
        ));
    }

    #[test]
    fn test_clone_assign_take_swap() {
        let mut a: RawTable = RawTable::new(schema());
        push(&mut a, 1, "a");
        push(&mut a, 2, "b");

        let b = a.try_clone().unwrap();
        assert!(a.try_eq(&b).unwrap());

        let mut c: RawTable = RawTable::new(schema());
        push(&mut c, 9, "z");
        c.assign_from(&a).unwrap();
        assert_eq!(names(&c), vec!["a", "b"]);

        let mut d: RawTable = RawTable::new(schema());
        d.take_from(&mut c).unwrap();
        assert_eq!(c.len(), 0);
        assert_eq!(ids(&d), vec![1, 2]);

        let e = d.take();
        assert!(d.is_empty());
        assert_eq!(e.len(), 2);

        let mut f: RawTable = RawTable::new(schema());
        push(&mut f, 7, "q");
        let mut e = e;
        e.swap(&mut f);
        assert_eq!(ids(&e), vec![7]);
        assert_eq!(ids(&f), vec![1, 2]);
    }

    #[test]
    fn test_compare() {
        let mut a: RawTable = RawTable::new(schema());
        let mut b: RawTable = RawTable::new(schema());
        assert_eq!(a.try_cmp(&b).unwrap(), Some(Ordering::Equal));
        push(&mut b, 1, "a");
        assert_eq!(a.try_cmp(&b).unwrap(), Some(Ordering::Less));
        push(&mut a, 1, "a");
        push(&mut a, 0, "a");
        assert_eq!(a.try_cmp(&b).unwrap(), Some(Ordering::Greater));
        assert!(!a.try_eq(&b).unwrap());
    }

    #[test]
    fn test_swap_columns_pointer_swap() {
        let schema = Arc::new(Schema::positional(vec![u32::descriptor(), u32::descriptor()]).unwrap());
        let mut table: RawTable = RawTable::new(schema);
        for (x, y) in [(1u32, 10u32), (2, 20)] {
            let (mut x, mut y) = (x, y);
            unsafe {
                table
                    .emplace_back(&[(&mut x as *mut u32).cast(), (&mut y as *mut u32).cast()])
                    .unwrap();
            }
        }
        table.swap_columns(0, 1).unwrap();
        assert_eq!(table.column_slice::<u32>(0).unwrap(), &[10, 20]);
        // the swapped layout survives reallocation
        table.reserve(64).unwrap();
        assert_eq!(table.column_slice::<u32>(1).unwrap(), &[1, 2]);
    }

    #[test]
    fn test_swap_columns_elementwise() {
        let aligned = ColumnBuilder::<u32>::new().copyable().aligned(16).unwrap().build();
        let schema = Arc::new(Schema::positional(vec![u32::descriptor(), aligned]).unwrap());
        let mut table: RawTable = RawTable::new(schema);
        for x in 1u32..=5 {
            let (mut x, mut y) = (x, x * 100);
            unsafe {
                table
                    .emplace_back(&[(&mut x as *mut u32).cast(), (&mut y as *mut u32).cast()])
                    .unwrap();
            }
        }
        let (first, second) = (table.column_ptr(0), table.column_ptr(1));
        table.swap_columns(0, 1).unwrap();
        assert_eq!(table.column_slice::<u32>(0).unwrap(), &[100, 200, 300, 400, 500]);
        assert_eq!(table.column_slice::<u32>(1).unwrap(), &[1, 2, 3, 4, 5]);
        // the data moved, the buffers did not
        assert_eq!(table.column_ptr(0), first);
        assert_eq!(table.column_ptr(1), second);
        assert_eq!(table.column_ptr(1) as usize % 16, 0);

        table.reserve(64).unwrap();
        assert_eq!(table.column_slice::<u32>(1).unwrap(), &[1, 2, 3, 4, 5]);
        assert_eq!(table.column_ptr(1) as usize % 16, 0);

        let mixed = Arc::new(Schema::positional(vec![u32::descriptor(), u64::descriptor()]).unwrap());
        let mut table: RawTable = RawTable::new(mixed);
        assert!(matches!(table.swap_columns(0, 1), Err(Error::TypeMismatch { .. })));
    }

    /// Copyable only by assignment over a default value.
    #[derive(Debug, Default)]
    struct Slot {
        value: u32,
        copies: u32,
    }

    impl AssignFrom for Slot {
        fn assign_from(&mut self, source: &Self) -> core::result::Result<(), ConstructionError> {
            self.value = source.value;
            self.copies = source.copies + 1;
            Ok(())
        }
    }

    fn slot_column() -> ColumnDescriptor {
        ColumnBuilder::<Slot>::new()
            .default_constructible()
            .assignable()
            .pinned()
            .build()
    }

    fn emplace_slot(table: &mut RawTable, position: usize, id: u32, value: u32) {
        let mut id = id;
        let mut slot = mem::ManuallyDrop::new(Slot { value, copies: 0 });
        let args = [(&mut id as *mut u32).cast(), (&mut *slot as *mut Slot).cast()];
        unsafe { table.insert(position, &args).unwrap() };
    }

    fn slots(table: &RawTable, column: usize) -> Vec<(u32, u32)> {
        table
            .column_slice::<Slot>(column)
            .unwrap()
            .iter()
            .map(|s| (s.value, s.copies))
            .collect()
    }

    #[test]
    fn test_default_then_assign_column() {
        let slot = slot_column();
        assert_eq!(slot.strategies().copy_construct, Strategy::DefaultThenAssign);
        let schema = SchemaBuilder::new()
            .column::<u32>("id")
            .unwrap()
            .column_with("slot", slot)
            .unwrap()
            .build()
            .unwrap();
        let mut table: RawTable = RawTable::new(Arc::new(schema));
        table.reserve(8).unwrap();
        for (row, value) in [10u32, 20, 30].into_iter().enumerate() {
            emplace_slot(&mut table, row, row as u32 + 1, value);
        }

        let copy = table.try_clone().unwrap();
        assert_eq!(slots(&copy, 1), vec![(10, 1), (20, 1), (30, 1)]);
        assert_eq!(slots(&table, 1), vec![(10, 0), (20, 0), (30, 0)]);

        // the new last row is copy-constructed, the rest are assigned down the gap
        emplace_slot(&mut table, 0, 0, 5);
        assert_eq!(ids(&table), vec![0, 1, 2, 3]);
        assert_eq!(slots(&table, 1), vec![(5, 0), (10, 1), (20, 1), (30, 1)]);

        table.erase(1).unwrap();
        assert_eq!(ids(&table), vec![0, 2, 3]);
        assert_eq!(slots(&table, 1).iter().map(|s| s.0).collect::<Vec<_>>(), vec![5, 20, 30]);

        table.swap_rows(0, 2).unwrap();
        assert_eq!(ids(&table), vec![3, 2, 0]);
        assert_eq!(slots(&table, 1).iter().map(|s| s.0).collect::<Vec<_>>(), vec![30, 20, 5]);

        // growth migrates the pinned column through the same copies
        table.reserve(64).unwrap();
        assert_eq!(slots(&table, 1).iter().map(|s| s.0).collect::<Vec<_>>(), vec![30, 20, 5]);
    }

    #[test]
    fn test_swap_columns_default_then_assign() {
        let wide = ColumnBuilder::<Slot>::new()
            .default_constructible()
            .assignable()
            .pinned()
            .aligned(32)
            .unwrap()
            .build();
        let schema = Schema::positional(vec![slot_column(), wide]).unwrap();
        let mut table: RawTable = RawTable::new(Arc::new(schema));
        for value in [1u32, 2, 3] {
            let mut a = mem::ManuallyDrop::new(Slot { value, copies: 0 });
            let mut b = mem::ManuallyDrop::new(Slot { value: value * 10, copies: 0 });
            unsafe {
                table
                    .emplace_back(&[(&mut *a as *mut Slot).cast(), (&mut *b as *mut Slot).cast()])
                    .unwrap();
            }
        }
        table.swap_columns(0, 1).unwrap();
        let values = |column| slots(&table, column).iter().map(|s| s.0).collect::<Vec<_>>();
        assert_eq!(values(0), vec![10, 20, 30]);
        assert_eq!(values(1), vec![1, 2, 3]);
        assert_eq!(table.column_ptr(1) as usize % 32, 0);
    }

    /// Copy construction never fails, but there is no copy assignment.
    #[derive(Clone, Debug)]
    struct Label(String);

    fn label_column(alignment: usize) -> ColumnDescriptor {
        ColumnBuilder::<Label>::new()
            .clone_constructible()
            .pinned()
            .aligned(alignment)
            .unwrap()
            .build()
    }

    fn labels(table: &RawTable, column: usize) -> Vec<&str> {
        table
            .column_slice::<Label>(column)
            .unwrap()
            .iter()
            .map(|l| l.0.as_str())
            .collect()
    }

    fn push_labels(table: &mut RawTable, position: usize, a: &str, b: &str) {
        let mut a = mem::ManuallyDrop::new(Label(String::from(a)));
        let mut b = mem::ManuallyDrop::new(Label(String::from(b)));
        let args = [(&mut *a as *mut Label).cast(), (&mut *b as *mut Label).cast()];
        unsafe { table.insert(position, &args).unwrap() };
    }

    #[test]
    fn test_destruct_then_construct_column() {
        let narrow = label_column(8);
        assert_eq!(narrow.strategies().copy_assign, Strategy::DestructThenConstruct);
        let schema = Schema::positional(vec![narrow, label_column(64)]).unwrap();
        let mut table: RawTable = RawTable::new(Arc::new(schema));
        push_labels(&mut table, 0, "a1", "b1");
        push_labels(&mut table, 1, "a3", "b3");
        push_labels(&mut table, 1, "a2", "b2");
        assert_eq!(labels(&table, 0), vec!["a1", "a2", "a3"]);
        assert_eq!(labels(&table, 1), vec!["b1", "b2", "b3"]);

        let copy = table.try_clone().unwrap();
        assert_eq!(labels(&copy, 1), vec!["b1", "b2", "b3"]);

        table.erase(0).unwrap();
        assert_eq!(labels(&table, 0), vec!["a2", "a3"]);
        table.swap_rows(0, 1).unwrap();
        assert_eq!(labels(&table, 0), vec!["a3", "a2"]);
        assert_eq!(labels(&table, 1), vec!["b3", "b2"]);
        assert_eq!(table.unordered_erase(0).unwrap(), Some(1));
        assert_eq!(labels(&table, 1), vec!["b2"]);

        // equal types, unequal alignment: exchanged element by element
        let mut table = copy;
        table.swap_columns(0, 1).unwrap();
        assert_eq!(labels(&table, 0), vec!["b1", "b2", "b3"]);
        assert_eq!(labels(&table, 1), vec!["a1", "a2", "a3"]);
        assert_eq!(table.column_ptr(1) as usize % 64, 0);
    }

    #[test]
    fn test_type_checked_columns() {
        let table: RawTable = RawTable::new(schema());
        assert!(matches!(
            table.column_slice::<u64>(0),
            Err(Error::TypeMismatch { column: 0, .. })
        ));
        assert!(table.column_slice::<u32>(5).is_err());
    }

    #[test]
    fn test_as_bytes_only_for_trivial_tables() {
        let table: RawTable = RawTable::new(schema());
        assert!(table.as_bytes().is_none());

        let plain = Arc::new(Schema::positional(vec![u8::descriptor(), u32::descriptor()]).unwrap());
        let mut table: RawTable = RawTable::new(plain);
        table.resize(4).unwrap();
        let bytes = table.as_bytes().unwrap();
        assert_eq!(bytes.len(), table.allocation_size());
        assert!(bytes.len() >= 4 * 5);
    }
}
