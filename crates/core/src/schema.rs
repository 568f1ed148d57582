//! Table schemas.
//!
//! A [`Schema`] is the ordered list of column descriptors of a table plus
//! everything derived from them once: the table's aligned stride, its maximum
//! capacity, and the table-wide capability flags.

use crate::capability::{Capabilities, Operation};
use crate::column::{ColumnDescriptor, ParamConvention};
use crate::column_type::Column;
use crate::error::{Error, Result};
use crate::layout::{self, checked_lcm, ColumnShape};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;

/// Column layout and capabilities of a table.
#[derive(Clone, Debug)]
pub struct Schema {
    columns: Vec<ColumnDescriptor>,
    names: Vec<Option<String>>,
    index: HashMap<String, usize>,
    shapes: Vec<ColumnShape>,
    aligned_stride: usize,
    largest_alignment: usize,
    largest_size: usize,
    max_capacity: usize,
    capabilities: Capabilities,
    has_pinned: bool,
    has_by_ref: bool,
}

impl Schema {
    /// Creates a schema of unnamed columns.
    pub fn positional(columns: Vec<ColumnDescriptor>) -> Result<Self> {
        let names = core::iter::repeat_with(|| None).take(columns.len()).collect();
        Self::from_parts(columns, names)
    }

    fn from_parts(columns: Vec<ColumnDescriptor>, names: Vec<Option<String>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::invalid_schema("table must have at least one column"));
        }

        let mut index = HashMap::new();
        for (i, name) in names.iter().enumerate() {
            if let Some(name) = name {
                index.insert(name.clone(), i);
            }
        }

        let mut aligned_stride = 1usize;
        let mut largest_alignment = 1usize;
        let mut largest_size = 0usize;
        let mut capabilities = Capabilities::ALL;
        let mut has_pinned = false;
        let mut has_by_ref = false;

        for (i, column) in columns.iter().enumerate() {
            if column.param() == ParamConvention::ByRef
                && !column.capabilities().copy_construct.possible
            {
                return Err(Error::invalid_schema(format!(
                    "column {} ({}) is passed by reference but cannot be copy-constructed",
                    i,
                    column.value_type().name()
                )));
            }

            aligned_stride = checked_lcm(aligned_stride, column.aligned_stride()).ok_or_else(|| {
                Error::invalid_schema("aligned stride of the table overflows")
            })?;
            largest_alignment = largest_alignment.max(column.alignment());
            largest_size = largest_size.max(column.size());
            capabilities = capabilities.and(column.capabilities());
            has_pinned |= column.is_pinned();
            has_by_ref |= column.param() == ParamConvention::ByRef;
        }

        let shapes: Vec<ColumnShape> = columns.iter().map(|c| c.shape()).collect();
        let max_capacity = layout::max_capacity(&shapes);

        Ok(Self {
            columns,
            names,
            index,
            shapes,
            aligned_stride,
            largest_alignment,
            largest_size,
            max_capacity,
            capabilities,
            has_pinned,
            has_by_ref,
        })
    }

    /// Number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false; a schema has at least one column.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Returns the descriptor of column `index`.
    #[inline]
    pub fn column(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(index)
    }

    /// Returns the name of column `index`, if it has one.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).and_then(|n| n.as_deref())
    }

    /// Looks up a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn shapes(&self) -> &[ColumnShape] {
        &self.shapes
    }

    /// Row-count granularity of every capacity this table uses.
    #[inline]
    pub fn aligned_stride(&self) -> usize {
        self.aligned_stride
    }

    /// Alignment of the table buffer.
    #[inline]
    pub fn largest_alignment(&self) -> usize {
        self.largest_alignment
    }

    /// Size of the largest column element.
    #[inline]
    pub fn largest_size(&self) -> usize {
        self.largest_size
    }

    /// Largest capacity any table of this schema can have.
    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Conjunction of every column's capabilities.
    #[inline]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// True if any column is pinned.
    #[inline]
    pub fn has_pinned(&self) -> bool {
        self.has_pinned
    }

    /// True if constructing a row from caller arguments runs a copy constructor.
    #[inline]
    pub fn has_by_ref(&self) -> bool {
        self.has_by_ref
    }

    /// Fails with [`Error::Unsupported`] naming the first column that cannot
    /// perform `operation`.
    pub fn require(&self, operation: Operation) -> Result<()> {
        if self.capabilities.get(operation).possible {
            return Ok(());
        }
        match self
            .columns
            .iter()
            .position(|c| !c.capabilities().get(operation).possible)
        {
            Some(column) => Err(Error::unsupported(
                operation,
                column,
                self.columns[column].value_type().name(),
            )),
            None => Ok(()),
        }
    }

    /// True if both schemas store the same types in the same layout.
    pub fn is_compatible(&self, other: &Schema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| {
                    a.storage_type() == b.storage_type()
                        && a.alignment() == b.alignment()
                        && a.is_pinned() == b.is_pinned()
                })
    }
}

/// Builder for [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    columns: Vec<ColumnDescriptor>,
    names: Vec<Option<String>>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let mut chars = name.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return Err(Error::invalid_schema("Name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a column using the type's default descriptor.
    pub fn column<T: Column>(self, name: impl Into<String>) -> Result<Self> {
        self.column_with(name, T::descriptor())
    }

    /// Adds a column with an explicit descriptor.
    pub fn column_with(
        mut self,
        name: impl Into<String>,
        descriptor: ColumnDescriptor,
    ) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        if self.names.iter().flatten().any(|n| *n == name) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                name
            )));
        }
        self.columns.push(descriptor);
        self.names.push(Some(name));
        Ok(self)
    }

    /// Adds an unnamed column.
    pub fn unnamed(mut self, descriptor: ColumnDescriptor) -> Self {
        self.columns.push(descriptor);
        self.names.push(None);
        self
    }

    /// Builds the schema.
    pub fn build(self) -> Result<Schema> {
        Schema::from_parts(self.columns, self.names)
    }
}
