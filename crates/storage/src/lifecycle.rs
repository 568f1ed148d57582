//! The row lifecycle engine.
//!
//! [`RowEngine`] drives whole rows through construction, destruction, copies,
//! relocation, shifts, swaps and comparisons, one column at a time through the
//! strategy each column's descriptor selected at registration.
//!
//! Every operation that may fail does all of its fallible work (copies of
//! pinned columns, construction from borrowed arguments) before any infallible
//! relocation, so a failure can be rolled back without moving anything twice.
//! Rollback runs from drop guards and therefore also covers panics raised by
//! user constructors.
//!
//! All methods take column base pointers as produced by the table buffer and are
//! `unsafe`: the caller vouches for which slots are live.

use core::cmp::Ordering;
use core::mem;
use core::ptr::{self, NonNull};
use tabula_core::{ColumnDescriptor, Error, Operation, ParamConvention, Result, Schema, Strategy};
use tracing::trace;

#[inline]
unsafe fn slot(column: NonNull<u8>, size: usize, row: usize) -> *mut u8 {
    column.as_ptr().add(size * row)
}

#[inline]
unsafe fn drop_slot(desc: &ColumnDescriptor, ptr: *mut u8) {
    if let Some(drop_in_place) = desc.ops().drop_in_place {
        drop_in_place(ptr);
    }
}

unsafe fn destruct_column(desc: &ColumnDescriptor, column: NonNull<u8>, start: usize, end: usize) {
    if let Some(drop_in_place) = desc.ops().drop_in_place {
        for row in start..end {
            drop_in_place(slot(column, desc.size(), row));
        }
    }
}

fn any_column(_: &ColumnDescriptor) -> bool {
    true
}

fn pinned_column(desc: &ColumnDescriptor) -> bool {
    desc.is_pinned()
}

fn by_ref_column(desc: &ColumnDescriptor) -> bool {
    desc.param() == ParamConvention::ByRef
}

/// Destroys one row of the columns `[0, done)` selected by `filter`, in reverse.
struct RowGuard<'e> {
    schema: &'e Schema,
    columns: &'e [NonNull<u8>],
    row: usize,
    done: usize,
    filter: fn(&ColumnDescriptor) -> bool,
}

impl Drop for RowGuard<'_> {
    fn drop(&mut self) {
        for j in (0..self.done).rev() {
            let desc = &self.schema.columns()[j];
            if (self.filter)(desc) {
                // SAFETY: the guarded slots were constructed by the engine.
                unsafe { drop_slot(desc, slot(self.columns[j], desc.size(), self.row)) };
            }
        }
    }
}

/// Destroys `[start, start + count)` in every finished column selected by
/// `filter`, and the first `rows` rows of column `column`.
struct RangeGuard<'e> {
    schema: &'e Schema,
    columns: &'e [NonNull<u8>],
    start: usize,
    count: usize,
    column: usize,
    rows: usize,
    filter: fn(&ColumnDescriptor) -> bool,
}

impl Drop for RangeGuard<'_> {
    fn drop(&mut self) {
        let descs = self.schema.columns();
        // SAFETY: the guarded slots were constructed by the engine.
        unsafe {
            if self.column < descs.len() {
                destruct_column(
                    &descs[self.column],
                    self.columns[self.column],
                    self.start,
                    self.start + self.rows,
                );
            }
            for j in (0..self.column).rev() {
                if (self.filter)(&descs[j]) {
                    destruct_column(&descs[j], self.columns[j], self.start, self.start + self.count);
                }
            }
        }
    }
}

/// Orders two tables: an empty table sorts first, then the common prefix decides,
/// then the length.
pub fn compare_tables(
    len: usize,
    other_len: usize,
    prefix: impl FnOnce(usize) -> Option<Ordering>,
) -> Option<Ordering> {
    if len == 0 {
        return Some(if other_len == 0 {
            Ordering::Equal
        } else {
            Ordering::Less
        });
    }
    if other_len == 0 {
        return Some(Ordering::Greater);
    }
    match prefix(len.min(other_len)) {
        Some(Ordering::Equal) => Some(len.cmp(&other_len)),
        other => other,
    }
}

/// Row operations over the columns of one schema.
#[derive(Clone, Copy)]
pub struct RowEngine<'s> {
    schema: &'s Schema,
}

impl<'s> RowEngine<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    #[inline]
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    fn unsupported(&self, operation: Operation, column: usize) -> Error {
        Error::unsupported(
            operation,
            column,
            self.schema.columns()[column].value_type().name(),
        )
    }

    fn row_guard<'e>(
        &'e self,
        columns: &'e [NonNull<u8>],
        row: usize,
        filter: fn(&ColumnDescriptor) -> bool,
    ) -> RowGuard<'e> {
        RowGuard {
            schema: self.schema,
            columns,
            row,
            done: 0,
            filter,
        }
    }

    /// Default-constructs one element of `column` into uninitialized memory.
    ///
    /// # Safety
    ///
    /// `dst` must be valid, aligned, uninitialized storage for the column.
    pub unsafe fn default_construct_slot(&self, column: usize, dst: *mut u8) -> Result<()> {
        match self.schema.columns()[column].ops().default_construct {
            Some(default) => default(dst).map_err(|e| Error::construction(column, e)),
            None => Err(self.unsupported(Operation::DefaultConstruct, column)),
        }
    }

    /// Copy-constructs one element of `column` into uninitialized memory.
    ///
    /// # Safety
    ///
    /// `dst` must be uninitialized storage and `src` a live element of the
    /// column's storage type; they must not overlap.
    pub unsafe fn copy_construct_slot(&self, column: usize, dst: *mut u8, src: *const u8) -> Result<()> {
        let desc = &self.schema.columns()[column];
        let ops = desc.ops();
        match (desc.strategies().copy_construct, ops.clone_construct) {
            (Strategy::Direct, Some(clone)) => {
                clone(dst, src).map_err(|e| Error::construction(column, e))
            }
            (Strategy::DefaultThenAssign, _) => match (ops.default_construct, ops.clone_assign) {
                (Some(default), Some(assign)) => {
                    default(dst).map_err(|e| Error::construction(column, e))?;
                    if let Err(e) = assign(dst, src) {
                        drop_slot(desc, dst);
                        return Err(Error::construction(column, e));
                    }
                    Ok(())
                }
                _ => Err(self.unsupported(Operation::CopyConstruct, column)),
            },
            _ => Err(self.unsupported(Operation::CopyConstruct, column)),
        }
    }

    /// Copy-assigns one element of `column` over a live element.
    ///
    /// On failure `dst` still holds a valid value.
    ///
    /// # Safety
    ///
    /// Both pointers must address live, distinct elements of the column's storage
    /// type.
    pub unsafe fn copy_assign_slot(&self, column: usize, dst: *mut u8, src: *const u8) -> Result<()> {
        let desc = &self.schema.columns()[column];
        match (desc.strategies().copy_assign, desc.ops().clone_assign) {
            (Strategy::Direct, Some(assign)) => {
                assign(dst, src).map_err(|e| Error::construction(column, e))
            }
            (Strategy::DestructThenConstruct, _) => {
                // only selected when the construction cannot fail
                drop_slot(desc, dst);
                self.copy_construct_slot(column, dst, src)
            }
            _ => Err(self.unsupported(Operation::CopyAssign, column)),
        }
    }

    /// Destroys row `row`.
    ///
    /// # Safety
    ///
    /// The row must be live; afterwards it is uninitialized.
    pub unsafe fn destruct_row(&self, columns: &[NonNull<u8>], row: usize) {
        for (j, desc) in self.schema.columns().iter().enumerate().rev() {
            drop_slot(desc, slot(columns[j], desc.size(), row));
        }
    }

    /// Destroys rows `[start, end)`.
    ///
    /// # Safety
    ///
    /// The rows must be live; afterwards they are uninitialized.
    pub unsafe fn destruct_rows(&self, columns: &[NonNull<u8>], start: usize, end: usize) {
        if start >= end || self.schema.capabilities().destruct.trivial {
            return;
        }
        for (j, desc) in self.schema.columns().iter().enumerate().rev() {
            destruct_column(desc, columns[j], start, end);
        }
    }

    /// Default-constructs row `row`; the row either fully exists afterwards or
    /// not at all.
    ///
    /// # Safety
    ///
    /// The row must be uninitialized.
    pub unsafe fn default_construct_row(&self, columns: &[NonNull<u8>], row: usize) -> Result<()> {
        let mut guard = self.row_guard(columns, row, any_column);
        for (j, desc) in self.schema.columns().iter().enumerate() {
            self.default_construct_slot(j, slot(columns[j], desc.size(), row))?;
            guard.done = j + 1;
        }
        mem::forget(guard);
        Ok(())
    }

    /// Constructs row `row` from one argument pointer per column.
    ///
    /// `ByRef` columns copy from their argument first; only once all of them
    /// succeeded are the remaining arguments relocated in. On success the
    /// relocated arguments have been consumed and `ByRef` arguments are still
    /// owned by the caller. On failure nothing has been consumed.
    ///
    /// # Safety
    ///
    /// The row must be uninitialized, and `args[j]` must point to a live value of
    /// column `j`'s storage type that does not overlap the table.
    pub unsafe fn construct_row(
        &self,
        columns: &[NonNull<u8>],
        row: usize,
        args: &[*mut u8],
    ) -> Result<()> {
        debug_assert_eq!(args.len(), self.schema.len());
        self.copy_by_ref_args(columns, row, args)?;
        self.relocate_args(columns, row, args);
        Ok(())
    }

    /// Copy-constructs the `ByRef` arguments into row `row`, leaving every other
    /// slot of the row untouched. On failure the copies made so far are destroyed.
    ///
    /// # Safety
    ///
    /// As for [`Self::construct_row`].
    pub unsafe fn copy_by_ref_args(
        &self,
        columns: &[NonNull<u8>],
        row: usize,
        args: &[*mut u8],
    ) -> Result<()> {
        if !self.schema.has_by_ref() {
            return Ok(());
        }
        let mut guard = self.row_guard(columns, row, by_ref_column);
        for (j, desc) in self.schema.columns().iter().enumerate() {
            if by_ref_column(desc) {
                self.copy_construct_slot(j, slot(columns[j], desc.size(), row), args[j])?;
            }
            guard.done = j + 1;
        }
        mem::forget(guard);
        Ok(())
    }

    /// Destroys the `ByRef` slots of row `row`.
    ///
    /// # Safety
    ///
    /// Those slots must be live.
    pub unsafe fn destruct_by_ref(&self, columns: &[NonNull<u8>], row: usize) {
        for (j, desc) in self.schema.columns().iter().enumerate() {
            if by_ref_column(desc) {
                drop_slot(desc, slot(columns[j], desc.size(), row));
            }
        }
    }

    /// Fills uninitialized row `row` from staged `ByRef` copies in row 0 of
    /// `staged` and from the remaining arguments, consuming both.
    ///
    /// Staged pinned values are relocated here, before they first enter a table.
    ///
    /// # Safety
    ///
    /// The `ByRef` slots of `staged` row 0 must be live, the other arguments as for
    /// [`Self::construct_row`], and the destination row uninitialized.
    pub unsafe fn relocate_staged(
        &self,
        columns: &[NonNull<u8>],
        row: usize,
        staged: &[NonNull<u8>],
        args: &[*mut u8],
    ) {
        for (j, desc) in self.schema.columns().iter().enumerate() {
            let size = desc.size();
            let src = if by_ref_column(desc) {
                slot(staged[j], size, 0)
            } else {
                args[j]
            };
            ptr::copy_nonoverlapping(src, slot(columns[j], size, row), size);
        }
    }

    /// Relocates every argument not passed `ByRef` into row `row`.
    ///
    /// # Safety
    ///
    /// As for [`Self::construct_row`]; afterwards the relocated arguments have been
    /// consumed.
    pub unsafe fn relocate_args(&self, columns: &[NonNull<u8>], row: usize, args: &[*mut u8]) {
        for (j, desc) in self.schema.columns().iter().enumerate() {
            if !by_ref_column(desc) {
                ptr::copy_nonoverlapping(args[j], slot(columns[j], desc.size(), row), desc.size());
            }
        }
    }

    /// Copy-constructs `count` rows from `src` into uninitialized rows of `dst`.
    ///
    /// Either all rows are constructed or none are.
    ///
    /// # Safety
    ///
    /// Source rows must be live, destination rows uninitialized, and the two
    /// ranges must not overlap.
    pub unsafe fn copy_rows(
        &self,
        dst: &[NonNull<u8>],
        dst_start: usize,
        src: &[NonNull<u8>],
        src_start: usize,
        count: usize,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let descs = self.schema.columns();

        if self.schema.capabilities().trivially_copyable {
            for (j, desc) in descs.iter().enumerate() {
                let size = desc.size();
                ptr::copy_nonoverlapping(
                    slot(src[j], size, src_start),
                    slot(dst[j], size, dst_start),
                    count * size,
                );
            }
            return Ok(());
        }

        let mut guard = RangeGuard {
            schema: self.schema,
            columns: dst,
            start: dst_start,
            count,
            column: 0,
            rows: 0,
            filter: any_column,
        };
        for (j, desc) in descs.iter().enumerate() {
            guard.column = j;
            guard.rows = 0;
            let size = desc.size();
            if desc.capabilities().trivially_copyable {
                ptr::copy_nonoverlapping(
                    slot(src[j], size, src_start),
                    slot(dst[j], size, dst_start),
                    count * size,
                );
                continue;
            }
            for i in 0..count {
                self.copy_construct_slot(
                    j,
                    slot(dst[j], size, dst_start + i),
                    slot(src[j], size, src_start + i),
                )?;
                guard.rows = i + 1;
            }
        }
        mem::forget(guard);
        Ok(())
    }

    /// Moves rows `[0, count)` from `src` into uninitialized rows `[0, count)` of
    /// another buffer.
    ///
    /// Pinned columns are copied first; if any copy fails every copy made so far
    /// is destroyed and `src` is untouched. Once all copies succeeded the pinned
    /// originals are destroyed and every other column is relocated with one block
    /// copy. On success the source rows are uninitialized.
    ///
    /// # Safety
    ///
    /// The buffers must be distinct, the source rows live and the destination rows
    /// uninitialized.
    pub unsafe fn transfer_rows(
        &self,
        dst: &[NonNull<u8>],
        src: &[NonNull<u8>],
        count: usize,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.schema.require(Operation::MoveConstruct)?;
        let descs = self.schema.columns();

        if self.schema.has_pinned() {
            let mut guard = RangeGuard {
                schema: self.schema,
                columns: dst,
                start: 0,
                count,
                column: 0,
                rows: 0,
                filter: pinned_column,
            };
            for (j, desc) in descs.iter().enumerate() {
                if !desc.is_pinned() {
                    continue;
                }
                guard.column = j;
                guard.rows = 0;
                let size = desc.size();
                for i in 0..count {
                    self.copy_construct_slot(j, slot(dst[j], size, i), slot(src[j], size, i))?;
                    guard.rows = i + 1;
                }
            }
            mem::forget(guard);
        }

        for (j, desc) in descs.iter().enumerate() {
            if desc.is_pinned() {
                destruct_column(desc, src[j], 0, count);
            } else {
                ptr::copy_nonoverlapping(src[j].as_ptr(), dst[j].as_ptr(), count * desc.size());
            }
        }
        Ok(())
    }

    /// Shifts rows `[pos, len)` up by one, leaving row `pos` uninitialized in every
    /// column and row `len` live.
    ///
    /// Pinned columns copy-construct row `len` from row `len - 1` and copy-assign
    /// downwards; only after all of them succeeded are the remaining columns moved
    /// with a block move. A column that cannot be moved fails the call before any
    /// row is touched. If a copy fails the table still holds `len` valid rows, but
    /// pinned values in `(pos, len)` may already have been shifted.
    ///
    /// # Safety
    ///
    /// `pos < len`, rows `[0, len)` live and row `len` within capacity and
    /// uninitialized.
    pub unsafe fn open_gap(&self, columns: &[NonNull<u8>], pos: usize, len: usize) -> Result<()> {
        debug_assert!(pos < len);
        self.schema.require(Operation::MoveConstruct)?;
        if pos + 1 < len {
            self.schema.require(Operation::MoveAssign)?;
        }
        let descs = self.schema.columns();

        if self.schema.has_pinned() {
            let mut guard = self.row_guard(columns, len, pinned_column);
            for (j, desc) in descs.iter().enumerate() {
                if !desc.is_pinned() {
                    guard.done = j + 1;
                    continue;
                }
                let size = desc.size();
                let col = columns[j];
                self.copy_construct_slot(j, slot(col, size, len), slot(col, size, len - 1))?;
                guard.done = j + 1;
                for k in (pos + 1..len).rev() {
                    self.copy_assign_slot(j, slot(col, size, k), slot(col, size, k - 1))?;
                }
            }
            mem::forget(guard);
        }

        trace!(position = pos, len, "shifting rows up");
        for (j, desc) in descs.iter().enumerate() {
            let size = desc.size();
            let col = columns[j];
            if desc.is_pinned() {
                drop_slot(desc, slot(col, size, pos));
            } else {
                ptr::copy(slot(col, size, pos), slot(col, size, pos + 1), (len - pos) * size);
            }
        }
        Ok(())
    }

    /// Removes row `pos` by shifting rows `(pos, len)` down by one; row `len - 1`
    /// is uninitialized afterwards.
    ///
    /// A column that cannot be move-assigned fails the call before any row is
    /// touched. If a copy fails the table still holds `len` valid rows, but pinned
    /// values in `[pos, len - 1)` may already have been shifted.
    ///
    /// # Safety
    ///
    /// `pos < len` and rows `[0, len)` live.
    pub unsafe fn close_gap(&self, columns: &[NonNull<u8>], pos: usize, len: usize) -> Result<()> {
        debug_assert!(pos < len);
        if pos + 1 < len {
            self.schema.require(Operation::MoveAssign)?;
        }
        let descs = self.schema.columns();

        if self.schema.has_pinned() {
            for (j, desc) in descs.iter().enumerate() {
                if !desc.is_pinned() {
                    continue;
                }
                let size = desc.size();
                let col = columns[j];
                for k in pos..len - 1 {
                    self.copy_assign_slot(j, slot(col, size, k), slot(col, size, k + 1))?;
                }
            }
        }

        trace!(position = pos, len, "shifting rows down");
        for (j, desc) in descs.iter().enumerate() {
            let size = desc.size();
            let col = columns[j];
            if desc.is_pinned() {
                drop_slot(desc, slot(col, size, len - 1));
            } else {
                drop_slot(desc, slot(col, size, pos));
                ptr::copy(slot(col, size, pos + 1), slot(col, size, pos), (len - pos - 1) * size);
            }
        }
        Ok(())
    }

    /// Replaces row `dst_row` with row `src_row`, leaving `src_row` uninitialized.
    ///
    /// A column that cannot be move-assigned fails the call before any row is
    /// touched.
    ///
    /// # Safety
    ///
    /// Both rows must be live and distinct.
    pub unsafe fn move_row_over(
        &self,
        columns: &[NonNull<u8>],
        dst_row: usize,
        src_row: usize,
    ) -> Result<()> {
        debug_assert_ne!(dst_row, src_row);
        self.schema.require(Operation::MoveAssign)?;
        let descs = self.schema.columns();

        if self.schema.has_pinned() {
            for (j, desc) in descs.iter().enumerate() {
                if !desc.is_pinned() {
                    continue;
                }
                let size = desc.size();
                self.copy_assign_slot(j, slot(columns[j], size, dst_row), slot(columns[j], size, src_row))?;
            }
        }

        for (j, desc) in descs.iter().enumerate() {
            let size = desc.size();
            let col = columns[j];
            if desc.is_pinned() {
                drop_slot(desc, slot(col, size, src_row));
            } else {
                drop_slot(desc, slot(col, size, dst_row));
                ptr::copy_nonoverlapping(slot(col, size, src_row), slot(col, size, dst_row), size);
            }
        }
        Ok(())
    }

    /// Exchanges one pinned element through temporary storage.
    unsafe fn swap_through(
        &self,
        column: usize,
        a: *mut u8,
        b: *mut u8,
        temp: *mut u8,
    ) -> Result<()> {
        let desc = &self.schema.columns()[column];
        self.copy_construct_slot(column, temp, a)?;
        let result = self
            .copy_assign_slot(column, a, b)
            .and_then(|_| self.copy_assign_slot(column, b, temp));
        drop_slot(desc, temp);
        result
    }

    /// Exchanges rows `a` and `b`.
    ///
    /// Relocatable columns swap bytes; pinned columns go through `temp`, a one-row
    /// scratch buffer, and are handled first. A column that cannot be swapped
    /// fails the call before any row is touched.
    ///
    /// # Safety
    ///
    /// Both rows must be live and distinct; `temp` must be uninitialized when the
    /// schema has pinned columns.
    pub unsafe fn swap_rows(
        &self,
        columns: &[NonNull<u8>],
        a: usize,
        b: usize,
        temp: &[NonNull<u8>],
    ) -> Result<()> {
        debug_assert_ne!(a, b);
        self.schema.require(Operation::Swap)?;
        let descs = self.schema.columns();

        if self.schema.has_pinned() {
            for (j, desc) in descs.iter().enumerate() {
                if !desc.is_pinned() {
                    continue;
                }
                let size = desc.size();
                self.swap_through(j, slot(columns[j], size, a), slot(columns[j], size, b), temp[j].as_ptr())?;
            }
        }

        for (j, desc) in descs.iter().enumerate() {
            if !desc.is_pinned() {
                let size = desc.size();
                ptr::swap_nonoverlapping(slot(columns[j], size, a), slot(columns[j], size, b), size);
            }
        }
        Ok(())
    }

    /// Exchanges the first `len` elements of two columns of the same storage type.
    ///
    /// # Safety
    ///
    /// Rows `[0, len)` must be live; `temp` must be uninitialized when either
    /// column is pinned.
    pub unsafe fn swap_column_elements(
        &self,
        columns: &[NonNull<u8>],
        a: usize,
        b: usize,
        len: usize,
        temp: &[NonNull<u8>],
    ) -> Result<()> {
        let descs = self.schema.columns();
        let (da, db) = (&descs[a], &descs[b]);
        debug_assert_eq!(da.storage_type(), db.storage_type());
        let size = da.size();

        if !da.is_pinned() && !db.is_pinned() {
            for i in 0..len {
                ptr::swap_nonoverlapping(slot(columns[a], size, i), slot(columns[b], size, i), size);
            }
            return Ok(());
        }

        for (j, desc) in [(a, da), (b, db)] {
            if desc.strategies().swap == Strategy::Unsupported {
                return Err(self.unsupported(Operation::Swap, j));
            }
        }
        for i in 0..len {
            self.swap_through(a, slot(columns[a], size, i), slot(columns[b], size, i), temp[a].as_ptr())?;
        }
        Ok(())
    }

    /// Column-major equality of rows `[0, len)` of two buffers.
    ///
    /// # Safety
    ///
    /// Rows `[0, len)` of both buffers must be live.
    pub unsafe fn equal_rows(&self, a: &[NonNull<u8>], b: &[NonNull<u8>], len: usize) -> Result<bool> {
        self.schema.require(Operation::Equality)?;
        for (j, desc) in self.schema.columns().iter().enumerate() {
            let Some(eq) = desc.ops().eq else {
                return Err(self.unsupported(Operation::Equality, j));
            };
            let size = desc.size();
            for i in 0..len {
                if !eq(slot(a[j], size, i), slot(b[j], size, i)) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Row-major lexicographic ordering of rows `[0, len)` of two buffers.
    ///
    /// # Safety
    ///
    /// Rows `[0, len)` of both buffers must be live.
    pub unsafe fn compare_rows(
        &self,
        a: &[NonNull<u8>],
        b: &[NonNull<u8>],
        len: usize,
    ) -> Result<Option<Ordering>> {
        self.schema.require(Operation::Ordering)?;
        let descs = self.schema.columns();
        for i in 0..len {
            for (j, desc) in descs.iter().enumerate() {
                let Some(cmp) = desc.ops().partial_cmp else {
                    return Err(self.unsupported(Operation::Ordering, j));
                };
                let size = desc.size();
                match cmp(slot(a[j], size, i), slot(b[j], size, i)) {
                    Some(Ordering::Equal) => {}
                    other => return Ok(other),
                }
            }
        }
        Ok(Some(Ordering::Equal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::vec;
    use core::cell::Cell;
    use tabula_core::{Column, ColumnBuilder, ConstructionError, Global, TryClone};

    const POISON: u32 = 13;

    struct Tracked {
        value: u32,
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    impl TryClone for Tracked {
        fn try_clone(&self) -> core::result::Result<Self, ConstructionError> {
            if self.value == POISON {
                return Err(ConstructionError::new("poisoned"));
            }
            Ok(Tracked {
                value: self.value,
                drops: self.drops.clone(),
            })
        }
    }

    fn tracked_schema(pinned: bool) -> Schema {
        let mut tracked = ColumnBuilder::<Tracked>::new().try_cloneable();
        if pinned {
            tracked = tracked.pinned();
        }
        Schema::positional(vec![u32::descriptor(), tracked.build()]).unwrap()
    }

    unsafe fn write_row(engine: &RowEngine<'_>, columns: &[NonNull<u8>], row: usize, value: u32, drops: &Rc<Cell<usize>>) {
        let mut id = value;
        let mut tracked = mem::ManuallyDrop::new(Tracked {
            value,
            drops: drops.clone(),
        });
        let args = [
            (&mut id as *mut u32).cast::<u8>(),
            (&mut *tracked as *mut Tracked).cast::<u8>(),
        ];
        engine.construct_row(columns, row, &args).unwrap();
    }

    unsafe fn tracked_value(columns: &[NonNull<u8>], row: usize) -> u32 {
        (*columns[1].as_ptr().cast::<Tracked>().add(row)).value
    }

    unsafe fn id_value(columns: &[NonNull<u8>], row: usize) -> u32 {
        *columns[0].as_ptr().cast::<u32>().add(row)
    }

    #[test]
    fn test_compare_tables_rules() {
        assert_eq!(compare_tables(0, 0, |_| None), Some(Ordering::Equal));
        assert_eq!(compare_tables(0, 3, |_| None), Some(Ordering::Less));
        assert_eq!(compare_tables(2, 0, |_| None), Some(Ordering::Greater));
        assert_eq!(compare_tables(2, 3, |_| Some(Ordering::Equal)), Some(Ordering::Less));
        assert_eq!(compare_tables(4, 3, |n| {
            assert_eq!(n, 3);
            Some(Ordering::Less)
        }), Some(Ordering::Less));
    }

    #[test]
    fn test_construct_and_destruct() {
        let schema = tracked_schema(false);
        let engine = RowEngine::new(&schema);
        let drops = Rc::new(Cell::new(0));
        let mut buffer = Buffer::allocate(&schema, 4, &Global).unwrap();
        unsafe {
            let cols = buffer.columns();
            write_row(&engine, cols, 0, 1, &drops);
            write_row(&engine, cols, 1, 2, &drops);
            assert_eq!(tracked_value(cols, 1), 2);
            assert_eq!(id_value(cols, 0), 1);
            engine.destruct_rows(cols, 0, 2);
            assert_eq!(drops.get(), 2);
            buffer.release(&schema, &Global);
        }
    }

    #[test]
    fn test_by_ref_failure_consumes_nothing() {
        let tracked = ColumnBuilder::<Tracked>::new()
            .try_cloneable()
            .pass_by(ParamConvention::ByRef)
            .build();
        let plain = ColumnBuilder::<String>::new().build();
        let schema = Schema::positional(vec![plain, tracked]).unwrap();
        let engine = RowEngine::new(&schema);
        let drops = Rc::new(Cell::new(0));
        let mut buffer = Buffer::allocate(&schema, 1, &Global).unwrap();

        let mut name = mem::ManuallyDrop::new(String::from("kept"));
        let arg = Tracked {
            value: POISON,
            drops: drops.clone(),
        };
        unsafe {
            let args = [
                (&mut *name as *mut String).cast::<u8>(),
                (&arg as *const Tracked as *mut Tracked).cast::<u8>(),
            ];
            let err = engine.construct_row(buffer.columns(), 0, &args).unwrap_err();
            assert!(matches!(err, Error::Construction { column: 1, .. }));
            // the relocatable argument was never moved out
            assert_eq!(name.as_str(), "kept");
            mem::ManuallyDrop::drop(&mut name);
            buffer.release(&schema, &Global);
        }
        drop(arg);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_copy_rows_rolls_back() {
        let schema = tracked_schema(false);
        let engine = RowEngine::new(&schema);
        let drops = Rc::new(Cell::new(0));
        let mut src = Buffer::allocate(&schema, 4, &Global).unwrap();
        let mut dst = Buffer::allocate(&schema, 4, &Global).unwrap();
        unsafe {
            for (row, value) in [1u32, 2, POISON].into_iter().enumerate() {
                write_row(&engine, src.columns(), row, value, &drops);
            }
            let err = engine.copy_rows(dst.columns(), 0, src.columns(), 0, 3).unwrap_err();
            assert!(matches!(err, Error::Construction { column: 1, .. }));
            // the two copies made before the failure were destroyed again
            assert_eq!(drops.get(), 2);

            engine.destruct_rows(src.columns(), 0, 3);
            assert_eq!(drops.get(), 5);
            src.release(&schema, &Global);
            dst.release(&schema, &Global);
        }
    }

    #[test]
    fn test_transfer_pinned_failure_leaves_source() {
        let schema = tracked_schema(true);
        let engine = RowEngine::new(&schema);
        let drops = Rc::new(Cell::new(0));
        let mut src = Buffer::allocate(&schema, 4, &Global).unwrap();
        let mut dst = Buffer::allocate(&schema, 8, &Global).unwrap();
        unsafe {
            for (row, value) in [5u32, POISON].into_iter().enumerate() {
                write_row(&engine, src.columns(), row, value, &drops);
            }
            assert!(engine.transfer_rows(dst.columns(), src.columns(), 2).is_err());
            assert_eq!(drops.get(), 1);
            assert_eq!(tracked_value(src.columns(), 0), 5);
            assert_eq!(tracked_value(src.columns(), 1), POISON);
            engine.destruct_rows(src.columns(), 0, 2);
            src.release(&schema, &Global);
            dst.release(&schema, &Global);
        }
    }

    #[test]
    fn test_transfer_moves_rows() {
        let schema = tracked_schema(true);
        let engine = RowEngine::new(&schema);
        let drops = Rc::new(Cell::new(0));
        let mut src = Buffer::allocate(&schema, 2, &Global).unwrap();
        let mut dst = Buffer::allocate(&schema, 4, &Global).unwrap();
        unsafe {
            write_row(&engine, src.columns(), 0, 7, &drops);
            write_row(&engine, src.columns(), 1, 8, &drops);
            engine.transfer_rows(dst.columns(), src.columns(), 2).unwrap();
            // pinned originals were dropped after being copied
            assert_eq!(drops.get(), 2);
            assert_eq!(tracked_value(dst.columns(), 1), 8);
            assert_eq!(id_value(dst.columns(), 1), 8);
            engine.destruct_rows(dst.columns(), 0, 2);
            src.release(&schema, &Global);
            dst.release(&schema, &Global);
        }
    }

    #[test]
    fn test_open_and_close_gap() {
        for pinned in [false, true] {
            let schema = tracked_schema(pinned);
            let engine = RowEngine::new(&schema);
            let drops = Rc::new(Cell::new(0));
            let mut buffer = Buffer::allocate(&schema, 4, &Global).unwrap();
            unsafe {
                let cols = buffer.columns();
                for (row, value) in [1u32, 2, 3].into_iter().enumerate() {
                    write_row(&engine, cols, row, value, &drops);
                }
                engine.open_gap(cols, 1, 3).unwrap();
                write_row(&engine, cols, 1, 9, &drops);
                let values: vec::Vec<u32> = (0..4).map(|r| tracked_value(cols, r)).collect();
                assert_eq!(values, vec![1, 9, 2, 3]);
                let ids: vec::Vec<u32> = (0..4).map(|r| id_value(cols, r)).collect();
                assert_eq!(ids, vec![1, 9, 2, 3]);

                let before = drops.get();
                engine.close_gap(cols, 0, 4).unwrap();
                assert_eq!(drops.get(), before + if pinned { 4 } else { 1 });
                let values: vec::Vec<u32> = (0..3).map(|r| tracked_value(cols, r)).collect();
                assert_eq!(values, vec![9, 2, 3]);

                engine.destruct_rows(cols, 0, 3);
                buffer.release(&schema, &Global);
            }
        }
    }

    #[test]
    fn test_swap_and_move_over() {
        for pinned in [false, true] {
            let schema = tracked_schema(pinned);
            let engine = RowEngine::new(&schema);
            let drops = Rc::new(Cell::new(0));
            let mut buffer = Buffer::allocate(&schema, 4, &Global).unwrap();
            let mut temp = Buffer::allocate(&schema, 1, &Global).unwrap();
            unsafe {
                let cols = buffer.columns();
                for (row, value) in [1u32, 2, 3].into_iter().enumerate() {
                    write_row(&engine, cols, row, value, &drops);
                }
                engine.swap_rows(cols, 0, 2, temp.columns()).unwrap();
                assert_eq!(tracked_value(cols, 0), 3);
                assert_eq!(tracked_value(cols, 2), 1);
                assert_eq!(id_value(cols, 0), 3);

                engine.move_row_over(cols, 0, 2).unwrap();
                assert_eq!(tracked_value(cols, 0), 1);
                assert_eq!(id_value(cols, 0), 1);

                engine.destruct_rows(cols, 0, 2);
                // pinned rows also drop the values they were assigned over
                assert_eq!(drops.get(), if pinned { 7 } else { 3 });
                buffer.release(&schema, &Global);
                temp.release(&schema, &Global);
            }
        }
    }

    #[test]
    fn test_pinned_without_copy_is_unsupported() {
        let schema = Schema::positional(vec![ColumnBuilder::<String>::new().pinned().build()]).unwrap();
        let engine = RowEngine::new(&schema);
        let mut buffer = Buffer::allocate(&schema, 2, &Global).unwrap();
        unsafe {
            let cols = buffer.columns();
            let mut a = mem::ManuallyDrop::new(String::from("a"));
            let mut b = mem::ManuallyDrop::new(String::from("b"));
            engine.construct_row(cols, 0, &[(&mut *a as *mut String).cast()]).unwrap();
            engine.construct_row(cols, 1, &[(&mut *b as *mut String).cast()]).unwrap();
            assert!(matches!(
                engine.close_gap(cols, 0, 2),
                Err(Error::Unsupported { operation: Operation::MoveAssign, .. })
            ));
            // erasing the last row needs no shifting
            engine.close_gap(cols, 1, 2).unwrap();
            engine.destruct_rows(cols, 0, 1);
            buffer.release(&schema, &Global);
        }
    }

    #[test]
    fn test_equal_and_compare() {
        let schema = Schema::positional(vec![u32::descriptor(), f64::descriptor()]).unwrap();
        let engine = RowEngine::new(&schema);
        let mut a = Buffer::allocate(&schema, 2, &Global).unwrap();
        let mut b = Buffer::allocate(&schema, 2, &Global).unwrap();
        unsafe {
            for (buffer, second) in [(&a, 2.0f64), (&b, 3.0f64)] {
                let cols = buffer.columns();
                for (row, (id, x)) in [(1u32, 1.0f64), (1, second)].into_iter().enumerate() {
                    let mut id = id;
                    let mut x = x;
                    engine
                        .construct_row(cols, row, &[(&mut id as *mut u32).cast(), (&mut x as *mut f64).cast()])
                        .unwrap();
                }
            }
            assert!(engine.equal_rows(a.columns(), b.columns(), 1).unwrap());
            assert!(!engine.equal_rows(a.columns(), b.columns(), 2).unwrap());
            assert_eq!(
                engine.compare_rows(a.columns(), b.columns(), 2).unwrap(),
                Some(Ordering::Less)
            );
            a.release(&schema, &Global);
            b.release(&schema, &Global);
        }
    }
}
