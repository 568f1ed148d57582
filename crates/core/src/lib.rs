//! Tabula Core - column descriptors and layout for struct-of-arrays tables.
//!
//! This crate provides the building blocks shared by every Tabula table:
//!
//! - `ColumnDescriptor`: size, alignment, parameter convention and lifecycle
//!   operations of one column, assembled with `ColumnBuilder`
//! - `Capabilities`: which operations a column (or a whole schema) supports, and
//!   whether they can fail
//! - `Schema`: the ordered columns of a table with derived stride and limits
//! - `Allocator`: the memory source of table buffers
//! - `layout`: offsets of every column inside one buffer
//! - `Error`: error types for table operations
//!
//! # Example
//!
//! ```rust
//! use tabula_core::{ColumnBuilder, Operation, SchemaBuilder};
//!
//! let schema = SchemaBuilder::new()
//!     .column::<u32>("id")
//!     .unwrap()
//!     .column::<String>("name")
//!     .unwrap()
//!     .column_with("position", ColumnBuilder::<[f32; 3]>::new().copyable().aligned(16).unwrap().build())
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.column_index("name"), Some(1));
//! assert_eq!(schema.largest_alignment(), 16);
//! assert!(schema.require(Operation::CopyConstruct).is_ok());
//! // `[f32; 3]` has no default
//! assert!(schema.require(Operation::DefaultConstruct).is_err());
//! ```

#![no_std]

extern crate alloc;

pub mod allocator;
pub mod capability;
pub mod column;
mod column_type;
mod error;
pub mod layout;
pub mod schema;

pub use allocator::{allocate_aligned, deallocate_aligned, AllocError, Allocator, Global};
pub use capability::{Capabilities, Capability, Operation};
pub use column::{
    AssignFrom, ColumnBuilder, ColumnDescriptor, ColumnOps, ParamConvention, Strategies, Strategy,
    ThinPointer, TryClone, TryDefault, TypeInfo,
};
pub use column_type::Column;
pub use error::{ConstructionError, Error, OutOfMemory, Result};
pub use schema::{Schema, SchemaBuilder};
