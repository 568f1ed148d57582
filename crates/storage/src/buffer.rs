//! The single allocation backing a table, and one-row scratch space.

use alloc::vec::Vec;
use core::mem;
use core::ptr::NonNull;
use tabula_core::layout::compute_offsets;
use tabula_core::{allocate_aligned, deallocate_aligned, Allocator, Error, Result, Schema};

/// A well-aligned, non-null pointer that must never be dereferenced for more
/// than zero bytes.
#[inline]
pub(crate) fn dangling(alignment: usize) -> NonNull<u8> {
    debug_assert!(alignment.is_power_of_two());
    // SAFETY: a power of two is never zero.
    unsafe { NonNull::new_unchecked(core::ptr::null_mut::<u8>().wrapping_add(alignment)) }
}

/// Column storage for `capacity` rows. Holds no rows itself; whoever owns the
/// buffer tracks which slots are live.
pub(crate) struct Buffer {
    base: Option<NonNull<u8>>,
    size: usize,
    alignment: usize,
    capacity: usize,
    columns: Vec<NonNull<u8>>,
}

impl Buffer {
    /// A buffer with no capacity and no allocation.
    pub(crate) fn empty(schema: &Schema) -> Self {
        Self {
            base: None,
            size: 0,
            alignment: schema.largest_alignment(),
            capacity: 0,
            columns: schema
                .columns()
                .iter()
                .map(|c| dangling(c.alignment()))
                .collect(),
        }
    }

    /// Allocates storage for exactly `capacity` rows.
    pub(crate) fn allocate<A: Allocator>(
        schema: &Schema,
        capacity: usize,
        allocator: &A,
    ) -> Result<Self> {
        if capacity > schema.max_capacity() {
            return Err(Error::capacity_exceeded(capacity, schema.max_capacity()));
        }
        let layout = compute_offsets(schema.shapes(), capacity)
            .ok_or_else(|| Error::capacity_exceeded(capacity, schema.max_capacity()))?;

        if layout.total_size == 0 {
            let mut buffer = Self::empty(schema);
            buffer.capacity = capacity;
            return Ok(buffer);
        }

        let base = allocate_aligned(allocator, layout.total_size, layout.alignment)
            .map_err(|_| Error::allocation_failed(layout.total_size, layout.alignment))?;

        let columns = layout
            .offsets
            .iter()
            // SAFETY: every offset lies within the allocation.
            .map(|&offset| unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) })
            .collect();

        Ok(Self {
            base: Some(base),
            size: layout.total_size,
            alignment: layout.alignment,
            capacity,
            columns,
        })
    }

    /// Gives the memory back to the allocator and resets to empty.
    ///
    /// # Safety
    ///
    /// `allocator` must equal the one that allocated the buffer, and no slot may
    /// still hold a live value.
    pub(crate) unsafe fn release<A: Allocator>(&mut self, schema: &Schema, allocator: &A) {
        if let Some(base) = self.base.take() {
            deallocate_aligned(allocator, base, self.size, self.alignment);
        }
        *self = Self::empty(schema);
    }

    #[inline]
    pub(crate) fn columns(&self) -> &[NonNull<u8>] {
        &self.columns
    }

    #[inline]
    pub(crate) fn columns_mut(&mut self) -> &mut [NonNull<u8>] {
        &mut self.columns
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes held by the allocation.
    #[inline]
    pub(crate) fn allocation_size(&self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn base(&self) -> Option<NonNull<u8>> {
        self.base
    }
}

/// A buffer released on drop unless handed over with [`TempBuffer::into_inner`].
///
/// Holds fresh buffers while rows migrate into them, and one-row scratch space.
pub(crate) struct TempBuffer<'a, A: Allocator> {
    buffer: Buffer,
    schema: &'a Schema,
    allocator: &'a A,
}

impl<'a, A: Allocator> TempBuffer<'a, A> {
    pub(crate) fn allocate(schema: &'a Schema, capacity: usize, allocator: &'a A) -> Result<Self> {
        Ok(Self {
            buffer: Buffer::allocate(schema, capacity, allocator)?,
            schema,
            allocator,
        })
    }

    /// Storage for a single row.
    pub(crate) fn scratch(schema: &'a Schema, allocator: &'a A) -> Result<Self> {
        Self::allocate(schema, 1, allocator)
    }

    #[inline]
    pub(crate) fn columns(&self) -> &[NonNull<u8>] {
        self.buffer.columns()
    }

    #[inline]
    pub(crate) fn allocation_size(&self) -> usize {
        self.buffer.allocation_size()
    }

    /// Keeps the allocation.
    pub(crate) fn into_inner(mut self) -> Buffer {
        mem::replace(&mut self.buffer, Buffer::empty(self.schema))
    }
}

impl<A: Allocator> Drop for TempBuffer<'_, A> {
    fn drop(&mut self) {
        // SAFETY: whoever filled the buffer has destroyed its rows again before
        // letting it go.
        unsafe { self.buffer.release(self.schema, self.allocator) };
    }
}
