//! Tabula Storage - struct-of-arrays tables for Tabula.
//!
//! This crate provides the storage layer including:
//!
//! - `RowEngine`: whole-row construction, relocation, shifts, swaps and comparison
//! - `RawTable`: an untyped table driven by a runtime [`Schema`](tabula_core::Schema)
//! - `Table`: a typed table of tuple rows, one column per field
//!
//! Every table owns a single allocation holding all of its columns, grows by
//! doubling in multiples of its aligned stride, and rolls back any row operation a
//! column constructor fails halfway through.
//!
//! # Example
//!
//! ```rust
//! use tabula_storage::Table;
//!
//! let mut table: Table<(i32, f64)> = Table::new();
//! table.reserve(4).unwrap();
//! assert!(table.capacity() >= 4);
//!
//! table.push((1, 1.5)).unwrap();
//! table.push((2, 2.5)).unwrap();
//! assert_eq!(table.row(0), (&1, &1.5));
//!
//! table.erase(0).unwrap();
//! assert_eq!(table.len(), 1);
//! assert_eq!(table.column::<1>(), &[2.5]);
//! ```

#![no_std]

extern crate alloc;

mod buffer;
pub mod lifecycle;
pub mod raw_table;
pub mod row;
pub mod table;

pub use lifecycle::{compare_tables, RowEngine};
pub use raw_table::RawTable;
pub use row::{ColumnAt, Row, RowEq, RowOrd};
pub use table::Table;
