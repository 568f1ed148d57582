//! Column descriptors.
//!
//! A [`ColumnDescriptor`] is everything the row engine knows about one column:
//! its value and storage types, size and alignment, how arguments are passed in,
//! the lifecycle operations it supports and the strategy chosen for each of them.
//! Operations are type-erased function pointers monomorphized once per storage
//! type, so the engine itself is written once against raw byte pointers.
//!
//! Descriptors are assembled with [`ColumnBuilder`]; each builder method is bounded
//! on the trait that provides the capability, so the flags always agree with the
//! type.

use crate::capability::{Capabilities, Capability};
use crate::error::{ConstructionError, Error, Result};
use crate::layout::{gcd, ColumnShape};
use alloc::format;
use core::any::{type_name, TypeId};
use core::cmp::Ordering;
use core::marker::PhantomData;
use core::mem::{align_of, needs_drop, size_of};
use core::ptr::{self, NonNull};

/// Fallible duplication, for values whose copies can fail.
pub trait TryClone: Sized {
    /// Returns a copy of `self`.
    fn try_clone(&self) -> core::result::Result<Self, ConstructionError>;

    /// Overwrites `self` with a copy of `source`.
    ///
    /// On failure `self` must still hold a valid value.
    fn try_clone_from(&mut self, source: &Self) -> core::result::Result<(), ConstructionError> {
        *self = source.try_clone()?;
        Ok(())
    }
}

/// Fallible default construction.
pub trait TryDefault: Sized {
    fn try_default() -> core::result::Result<Self, ConstructionError>;
}

/// Copy-assignment for types that can be overwritten from another value but not
/// duplicated from scratch.
pub trait AssignFrom {
    fn assign_from(&mut self, source: &Self) -> core::result::Result<(), ConstructionError>;
}

/// Raw-pointer-like types that share the untyped pointer storage representation.
///
/// # Safety
///
/// Implementors must have exactly the size and alignment of `*const ()`, and every
/// bit pattern they produce must be a valid `*const ()`.
pub unsafe trait ThinPointer: Copy + 'static {}

unsafe impl<T: 'static> ThinPointer for *const T {}
unsafe impl<T: 'static> ThinPointer for *mut T {}
unsafe impl<T: 'static> ThinPointer for NonNull<T> {}
unsafe impl<T: 'static> ThinPointer for Option<NonNull<T>> {}

/// Identity of a Rust type.
#[derive(Clone, Copy, Debug)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    /// Returns the type info for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if this is the type `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

/// How a value is handed to a column when a row is constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamConvention {
    /// Small `Copy` values: copied in and consumed.
    ByValue,
    /// Owned values relocated into the column and consumed.
    ByMove,
    /// The column copy-constructs from the argument; the caller keeps ownership.
    ByRef,
}

/// How the engine performs one operation for one column, chosen at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Bitwise relocation (or exchange, for swaps).
    Relocate,
    /// The column's own operation.
    Direct,
    /// Default-construct, then copy-assign.
    DefaultThenAssign,
    /// Destroy the destination, then copy-construct into it. Only chosen when the
    /// construction cannot fail.
    DestructThenConstruct,
    /// Moves of pinned columns: the matching copy operation, then destruction of the
    /// source.
    ViaCopy,
    /// Swap of pinned columns: copy into a temporary, then two copy-assignments.
    ThroughTemporary,
    /// Not available.
    Unsupported,
}

/// Strategies for every operation with a fallback chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Strategies {
    pub copy_construct: Strategy,
    pub move_construct: Strategy,
    pub copy_assign: Strategy,
    pub move_assign: Strategy,
    pub swap: Strategy,
}

/// Drops the value at the pointer.
pub type DropFn = unsafe fn(*mut u8);
/// Writes a default value to uninitialized memory.
pub type DefaultFn = unsafe fn(*mut u8) -> core::result::Result<(), ConstructionError>;
/// Writes a copy of `src` to uninitialized `dst`.
pub type CloneFn = unsafe fn(*mut u8, *const u8) -> core::result::Result<(), ConstructionError>;
/// Overwrites live `dst` with a copy of `src`.
pub type AssignFn = unsafe fn(*mut u8, *const u8) -> core::result::Result<(), ConstructionError>;
/// Equality of two live values.
pub type EqFn = unsafe fn(*const u8, *const u8) -> bool;
/// Partial ordering of two live values.
pub type CmpFn = unsafe fn(*const u8, *const u8) -> Option<Ordering>;

/// Type-erased operations of one storage type.
#[derive(Clone, Copy, Debug, Default)]
pub struct ColumnOps {
    /// `None` when the type needs no drop.
    pub drop_in_place: Option<DropFn>,
    pub default_construct: Option<DefaultFn>,
    pub clone_construct: Option<CloneFn>,
    pub clone_assign: Option<AssignFn>,
    pub eq: Option<EqFn>,
    pub partial_cmp: Option<CmpFn>,
}

unsafe fn drop_shim<T>(p: *mut u8) {
    ptr::drop_in_place(p.cast::<T>());
}

unsafe fn default_shim<T: Default>(p: *mut u8) -> core::result::Result<(), ConstructionError> {
    p.cast::<T>().write(T::default());
    Ok(())
}

unsafe fn try_default_shim<T: TryDefault>(
    p: *mut u8,
) -> core::result::Result<(), ConstructionError> {
    p.cast::<T>().write(T::try_default()?);
    Ok(())
}

unsafe fn clone_shim<T: Clone>(
    dst: *mut u8,
    src: *const u8,
) -> core::result::Result<(), ConstructionError> {
    dst.cast::<T>().write((*src.cast::<T>()).clone());
    Ok(())
}

unsafe fn clone_from_shim<T: Clone>(
    dst: *mut u8,
    src: *const u8,
) -> core::result::Result<(), ConstructionError> {
    (*dst.cast::<T>()).clone_from(&*src.cast::<T>());
    Ok(())
}

unsafe fn copy_shim<T: Copy>(
    dst: *mut u8,
    src: *const u8,
) -> core::result::Result<(), ConstructionError> {
    ptr::copy_nonoverlapping(src.cast::<T>(), dst.cast::<T>(), 1);
    Ok(())
}

unsafe fn try_clone_shim<T: TryClone>(
    dst: *mut u8,
    src: *const u8,
) -> core::result::Result<(), ConstructionError> {
    dst.cast::<T>().write((*src.cast::<T>()).try_clone()?);
    Ok(())
}

unsafe fn try_clone_from_shim<T: TryClone>(
    dst: *mut u8,
    src: *const u8,
) -> core::result::Result<(), ConstructionError> {
    (*dst.cast::<T>()).try_clone_from(&*src.cast::<T>())
}

unsafe fn assign_from_shim<T: AssignFrom>(
    dst: *mut u8,
    src: *const u8,
) -> core::result::Result<(), ConstructionError> {
    (*dst.cast::<T>()).assign_from(&*src.cast::<T>())
}

unsafe fn eq_shim<T: PartialEq>(lhs: *const u8, rhs: *const u8) -> bool {
    *lhs.cast::<T>() == *rhs.cast::<T>()
}

unsafe fn cmp_shim<T: PartialOrd>(lhs: *const u8, rhs: *const u8) -> Option<Ordering> {
    (*lhs.cast::<T>()).partial_cmp(&*rhs.cast::<T>())
}

/// Metadata and operations for one column.
#[derive(Clone, Debug)]
pub struct ColumnDescriptor {
    value_type: TypeInfo,
    storage_type: TypeInfo,
    size: usize,
    natural_alignment: usize,
    alignment: usize,
    aligned_stride: usize,
    param: ParamConvention,
    pinned: bool,
    ops: ColumnOps,
    capabilities: Capabilities,
    strategies: Strategies,
}

impl ColumnDescriptor {
    /// Starts a descriptor for values of type `T`.
    pub fn builder<T: 'static>() -> ColumnBuilder<T> {
        ColumnBuilder::new()
    }

    /// Starts a descriptor for a raw-pointer-like column.
    ///
    /// All pointer columns share the `*const ()` storage representation and its
    /// operations; only the value type differs.
    pub fn pointer<P: ThinPointer>() -> ColumnBuilder<*const ()> {
        debug_assert_eq!(size_of::<P>(), size_of::<*const ()>());
        debug_assert_eq!(align_of::<P>(), align_of::<*const ()>());

        let mut builder = ColumnBuilder::<*const ()>::new()
            .copyable()
            .equality_comparable()
            .ordered();
        builder.value_type = TypeInfo::of::<P>();
        builder
    }

    /// The type callers see.
    #[inline]
    pub fn value_type(&self) -> TypeInfo {
        self.value_type
    }

    /// The type actually stored.
    #[inline]
    pub fn storage_type(&self) -> TypeInfo {
        self.storage_type
    }

    /// Size of one element in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment of the storage type itself.
    #[inline]
    pub fn natural_alignment(&self) -> usize {
        self.natural_alignment
    }

    /// Alignment of the column buffer; at least the natural alignment.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Row-count granularity at which elements realign to [`Self::alignment`].
    #[inline]
    pub fn aligned_stride(&self) -> usize {
        self.aligned_stride
    }

    /// Convention for arguments passed by the caller.
    #[inline]
    pub fn param(&self) -> ParamConvention {
        self.param
    }

    /// Convention for arguments the caller gives up.
    #[inline]
    pub fn rvalue_param(&self) -> ParamConvention {
        match self.param {
            ParamConvention::ByValue => ParamConvention::ByValue,
            _ => ParamConvention::ByMove,
        }
    }

    /// True if stored values must never be relocated bitwise.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// True if values must be dropped.
    #[inline]
    pub fn needs_drop(&self) -> bool {
        self.ops.drop_in_place.is_some()
    }

    #[inline]
    pub fn ops(&self) -> &ColumnOps {
        &self.ops
    }

    #[inline]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    #[inline]
    pub fn strategies(&self) -> &Strategies {
        &self.strategies
    }

    /// Size and alignment, as used by the layout calculator.
    #[inline]
    pub fn shape(&self) -> ColumnShape {
        ColumnShape::new(self.size, self.alignment)
    }
}

/// Builder for [`ColumnDescriptor`].
///
/// A fresh builder describes a column that can only be relocated and dropped; each
/// method adds the capabilities provided by one trait of `T`.
pub struct ColumnBuilder<T> {
    value_type: TypeInfo,
    alignment: usize,
    param: Option<ParamConvention>,
    pinned: bool,
    copy: bool,
    default_nofail: bool,
    clone_nofail: bool,
    assign_nofail: bool,
    ops: ColumnOps,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ColumnBuilder<T> {
    /// Creates a builder for a relocatable, droppable column.
    pub fn new() -> Self {
        let drop_in_place: Option<DropFn> = if needs_drop::<T>() {
            Some(drop_shim::<T>)
        } else {
            None
        };
        Self {
            value_type: TypeInfo::of::<T>(),
            alignment: align_of::<T>(),
            param: None,
            pinned: false,
            copy: false,
            default_nofail: false,
            clone_nofail: false,
            assign_nofail: false,
            ops: ColumnOps {
                drop_in_place,
                ..ColumnOps::default()
            },
            _marker: PhantomData,
        }
    }

    /// Adds infallible default construction.
    pub fn default_constructible(mut self) -> Self
    where
        T: Default,
    {
        self.ops.default_construct = Some(default_shim::<T>);
        self.default_nofail = true;
        self
    }

    /// Adds fallible default construction.
    pub fn try_default_constructible(mut self) -> Self
    where
        T: TryDefault,
    {
        self.ops.default_construct = Some(try_default_shim::<T>);
        self.default_nofail = false;
        self
    }

    /// Adds infallible copy construction and copy assignment.
    pub fn cloneable(mut self) -> Self
    where
        T: Clone,
    {
        self.ops.clone_construct = Some(clone_shim::<T>);
        self.ops.clone_assign = Some(clone_from_shim::<T>);
        self.clone_nofail = true;
        self.assign_nofail = true;
        self
    }

    /// Adds infallible copy construction only. Copy assignment then destroys the
    /// target and constructs the copy in its place.
    pub fn clone_constructible(mut self) -> Self
    where
        T: Clone,
    {
        self.ops.clone_construct = Some(clone_shim::<T>);
        self.clone_nofail = true;
        self
    }

    /// Like [`Self::cloneable`], and marks the column trivially copyable.
    pub fn copyable(mut self) -> Self
    where
        T: Copy,
    {
        self.ops.clone_construct = Some(copy_shim::<T>);
        self.ops.clone_assign = Some(copy_shim::<T>);
        self.clone_nofail = true;
        self.assign_nofail = true;
        self.copy = true;
        self
    }

    /// Adds fallible copy construction and copy assignment.
    pub fn try_cloneable(mut self) -> Self
    where
        T: TryClone,
    {
        self.ops.clone_construct = Some(try_clone_shim::<T>);
        self.ops.clone_assign = Some(try_clone_from_shim::<T>);
        self.clone_nofail = false;
        self.assign_nofail = false;
        self.copy = false;
        self
    }

    /// Adds fallible copy assignment only.
    pub fn assignable(mut self) -> Self
    where
        T: AssignFrom,
    {
        self.ops.clone_assign = Some(assign_from_shim::<T>);
        self.assign_nofail = false;
        self
    }

    /// Adds equality comparison.
    pub fn equality_comparable(mut self) -> Self
    where
        T: PartialEq,
    {
        self.ops.eq = Some(eq_shim::<T>);
        self
    }

    /// Adds ordering comparison.
    pub fn ordered(mut self) -> Self
    where
        T: PartialOrd,
    {
        self.ops.partial_cmp = Some(cmp_shim::<T>);
        self
    }

    /// Forbids bitwise relocation of stored values.
    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    /// Raises the column alignment. Lower values than the natural alignment are
    /// ignored.
    pub fn aligned(mut self, alignment: usize) -> Result<Self> {
        if !alignment.is_power_of_two() {
            return Err(Error::invalid_schema(format!(
                "alignment {} of column type {} is not a power of two",
                alignment,
                self.value_type.name()
            )));
        }
        self.alignment = self.alignment.max(alignment);
        Ok(self)
    }

    /// Overrides the parameter-passing convention.
    pub fn pass_by(mut self, param: ParamConvention) -> Self {
        self.param = Some(param);
        self
    }

    /// Finishes the descriptor, resolving every fallback chain.
    pub fn build(self) -> ColumnDescriptor {
        let size = size_of::<T>();
        let ops = self.ops;

        let default_construct = match ops.default_construct {
            Some(_) => Capability::possible(self.default_nofail),
            None => Capability::UNSUPPORTED,
        };

        let direct_copy = match ops.clone_construct {
            Some(_) => Capability {
                possible: true,
                nofail: self.clone_nofail,
                trivial: self.copy,
            },
            None => Capability::UNSUPPORTED,
        };
        let direct_assign = match ops.clone_assign {
            Some(_) => Capability {
                possible: true,
                nofail: self.assign_nofail,
                trivial: self.copy,
            },
            None => Capability::UNSUPPORTED,
        };
        let default_then_assign = if default_construct.possible && direct_assign.possible {
            Capability::possible(default_construct.nofail && direct_assign.nofail)
        } else {
            Capability::UNSUPPORTED
        };

        // no-fail paths first, then anything that works at all
        let (copy_construct_strategy, copy_construct) = if direct_copy.is_nofail() {
            (Strategy::Direct, direct_copy)
        } else if default_then_assign.is_nofail() {
            (Strategy::DefaultThenAssign, default_then_assign)
        } else if direct_copy.possible {
            (Strategy::Direct, direct_copy)
        } else if default_then_assign.possible {
            (Strategy::DefaultThenAssign, default_then_assign)
        } else {
            (Strategy::Unsupported, Capability::UNSUPPORTED)
        };

        let (copy_assign_strategy, copy_assign) = if direct_assign.possible {
            (Strategy::Direct, direct_assign)
        } else if copy_construct.is_nofail() {
            (Strategy::DestructThenConstruct, Capability::INFALLIBLE)
        } else {
            (Strategy::Unsupported, Capability::UNSUPPORTED)
        };

        let destruct = if ops.drop_in_place.is_some() {
            Capability::INFALLIBLE
        } else {
            Capability::TRIVIAL
        };

        let non_trivial = |cap: Capability| Capability {
            trivial: false,
            ..cap
        };

        let (move_construct_strategy, move_construct, move_assign_strategy, move_assign, swap_strategy, swap) =
            if !self.pinned {
                (
                    Strategy::Relocate,
                    Capability::TRIVIAL,
                    Strategy::Relocate,
                    // relocating over a live value drops it first
                    destruct,
                    Strategy::Relocate,
                    Capability::TRIVIAL,
                )
            } else {
                let (mc_strategy, mc) = if copy_construct.possible {
                    (Strategy::ViaCopy, non_trivial(copy_construct))
                } else {
                    (Strategy::Unsupported, Capability::UNSUPPORTED)
                };
                let (ma_strategy, ma) = if copy_assign.possible {
                    (Strategy::ViaCopy, non_trivial(copy_assign))
                } else {
                    (Strategy::Unsupported, Capability::UNSUPPORTED)
                };
                let (sw_strategy, sw) = if copy_construct.possible && copy_assign.possible {
                    (
                        Strategy::ThroughTemporary,
                        Capability::possible(copy_construct.nofail && copy_assign.nofail),
                    )
                } else {
                    (Strategy::Unsupported, Capability::UNSUPPORTED)
                };
                (mc_strategy, mc, ma_strategy, ma, sw_strategy, sw)
            };

        let equality = match ops.eq {
            Some(_) => Capability::INFALLIBLE,
            None => Capability::UNSUPPORTED,
        };
        let ordering = match ops.partial_cmp {
            Some(_) => Capability::INFALLIBLE,
            None => Capability::UNSUPPORTED,
        };

        let param = self.param.unwrap_or(if self.copy && size <= 2 * size_of::<usize>() {
            ParamConvention::ByValue
        } else {
            ParamConvention::ByMove
        });

        // lcm(alignment, size) / size, without the intermediate product
        let aligned_stride = if size == 0 {
            1
        } else {
            self.alignment / gcd(self.alignment, size)
        };

        ColumnDescriptor {
            value_type: self.value_type,
            storage_type: TypeInfo::of::<T>(),
            size,
            natural_alignment: align_of::<T>(),
            alignment: self.alignment,
            aligned_stride,
            param,
            pinned: self.pinned,
            ops,
            capabilities: Capabilities {
                default_construct,
                copy_construct,
                move_construct,
                copy_assign,
                move_assign,
                destruct,
                swap,
                equality,
                ordering,
                trivially_copyable: self.copy && !self.pinned,
            },
            strategies: Strategies {
                copy_construct: copy_construct_strategy,
                move_construct: move_construct_strategy,
                copy_assign: copy_assign_strategy,
                move_assign: move_assign_strategy,
                swap: swap_strategy,
            },
        }
    }
}

impl<T: 'static> Default for ColumnBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
