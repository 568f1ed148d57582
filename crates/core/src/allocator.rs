//! Allocator abstraction.
//!
//! Tables get their buffer from an [`Allocator`]. Allocators that cannot honour
//! arbitrary alignments set [`Allocator::ALIGNED_ALLOCATE`] to `false`; for them
//! [`allocate_aligned`] over-allocates and stores a small header in front of the
//! aligned pointer so [`deallocate_aligned`] can recover the original block.

use core::alloc::Layout;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;
use thiserror::Error;

/// Minimum alignment assumed of an allocator that does not declare one.
pub const DEFAULT_MIN_ALIGNMENT: usize = 2 * size_of::<usize>();

/// The allocator could not provide the requested memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Error)]
#[error("memory allocation failed")]
pub struct AllocError;

/// Source of table buffers.
///
/// # Safety
///
/// A successful [`allocate`](Allocator::allocate) must return a block valid for
/// reads and writes of `size` bytes that stays valid until it is passed to
/// [`deallocate`](Allocator::deallocate) of an allocator that
/// [`equals`](Allocator::equals) this one. The block must be aligned to
/// `alignment` if [`ALIGNED_ALLOCATE`](Allocator::ALIGNED_ALLOCATE) is true, and
/// to [`MIN_ALIGNMENT`](Allocator::MIN_ALIGNMENT) otherwise.
pub unsafe trait Allocator: Clone {
    /// Alignment every block is guaranteed to have.
    const MIN_ALIGNMENT: usize = DEFAULT_MIN_ALIGNMENT;
    /// Whether `allocate` honours its `alignment` argument.
    const ALIGNED_ALLOCATE: bool = true;
    /// All instances can free each other's blocks.
    const IS_ALWAYS_EQUAL: bool = false;
    /// Copy-assigning a table also copies its allocator.
    const PROPAGATE_ON_COPY: bool = false;
    /// Move-assigning a table also moves its allocator.
    const PROPAGATE_ON_MOVE: bool = true;
    /// Swapping tables also swaps their allocators.
    const PROPAGATE_ON_SWAP: bool = true;

    /// Allocates `size` bytes. `size` is never zero.
    fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, AllocError>;

    /// Frees a block.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate(size, alignment)` on an equal allocator and
    /// must not have been freed already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize);

    /// True if blocks of one allocator may be freed by the other.
    fn equals(&self, _other: &Self) -> bool {
        Self::IS_ALWAYS_EQUAL
    }

    /// Allocator used by a table built as a copy of a table owning `self`.
    fn select_on_copy(&self) -> Self {
        self.clone()
    }
}

/// The global heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Global;

unsafe impl Allocator for Global {
    const IS_ALWAYS_EQUAL: bool = true;

    fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        if size == 0 {
            return Err(AllocError);
        }
        let layout = Layout::from_size_align(size, alignment).map_err(|_| AllocError)?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        // SAFETY: the same layout was accepted by `allocate`.
        let layout = Layout::from_size_align_unchecked(size, alignment);
        alloc::alloc::dealloc(ptr.as_ptr(), layout);
    }

    fn equals(&self, _other: &Self) -> bool {
        true
    }
}

/// Bookkeeping stored in front of an over-aligned block.
#[derive(Clone, Copy)]
#[repr(C)]
struct Header {
    requested: usize,
    actual: usize,
    raw: *mut u8,
}

const HEADER_SIZE: usize = size_of::<Header>();

#[inline]
fn needs_header<A: Allocator>(alignment: usize) -> bool {
    !A::ALIGNED_ALLOCATE && alignment > A::MIN_ALIGNMENT
}

/// Allocates `size` bytes aligned to `alignment`, whatever the allocator supports.
pub fn allocate_aligned<A: Allocator>(
    allocator: &A,
    size: usize,
    alignment: usize,
) -> Result<NonNull<u8>, AllocError> {
    debug_assert!(alignment.is_power_of_two());

    if !needs_header::<A>(alignment) {
        return allocator.allocate(size, alignment);
    }

    let base_alignment = A::MIN_ALIGNMENT.max(align_of::<Header>());
    let alignment = alignment.max(base_alignment);
    let actual = size
        .checked_add(alignment - 1)
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .ok_or(AllocError)?;

    let raw = allocator.allocate(actual, A::MIN_ALIGNMENT)?;
    let raw_addr = raw.as_ptr() as usize;
    let aligned_addr = (raw_addr + HEADER_SIZE + alignment - 1) & !(alignment - 1);
    let offset = aligned_addr - raw_addr;

    // SAFETY: `offset + size <= actual`, and the header sits in the
    // `HEADER_SIZE` bytes before the aligned pointer, which are inside the block.
    unsafe {
        let aligned = raw.as_ptr().add(offset);
        aligned.sub(HEADER_SIZE).cast::<Header>().write_unaligned(Header {
            requested: size,
            actual,
            raw: raw.as_ptr(),
        });
        Ok(NonNull::new_unchecked(aligned))
    }
}

/// Frees a block obtained from [`allocate_aligned`].
///
/// # Safety
///
/// `ptr` must come from `allocate_aligned(allocator, size, alignment)` with an
/// equal allocator, and must not have been freed already.
pub unsafe fn deallocate_aligned<A: Allocator>(
    allocator: &A,
    ptr: NonNull<u8>,
    size: usize,
    alignment: usize,
) {
    if !needs_header::<A>(alignment) {
        allocator.deallocate(ptr, size, alignment);
        return;
    }

    let header = ptr.as_ptr().sub(HEADER_SIZE).cast::<Header>().read_unaligned();
    debug_assert_eq!(header.requested, size);
    allocator.deallocate(
        NonNull::new_unchecked(header.raw),
        header.actual,
        A::MIN_ALIGNMENT,
    );
}
