//! Per-column lifecycle capabilities.
//!
//! Every lifecycle operation a column can take part in is described by a
//! [`Capability`]: whether it is possible at all, whether it can fail, and whether
//! it degenerates to a plain byte copy (or to nothing, for destruction).

use core::fmt;

/// Lifecycle operations the row engine drives across columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    DefaultConstruct,
    CopyConstruct,
    MoveConstruct,
    CopyAssign,
    MoveAssign,
    Destruct,
    Swap,
    Equality,
    Ordering,
}

impl Operation {
    /// All operations, in declaration order.
    pub const ALL: [Operation; 9] = [
        Operation::DefaultConstruct,
        Operation::CopyConstruct,
        Operation::MoveConstruct,
        Operation::CopyAssign,
        Operation::MoveAssign,
        Operation::Destruct,
        Operation::Swap,
        Operation::Equality,
        Operation::Ordering,
    ];

    /// Returns a short human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::DefaultConstruct => "default-construct",
            Operation::CopyConstruct => "copy-construct",
            Operation::MoveConstruct => "move-construct",
            Operation::CopyAssign => "copy-assign",
            Operation::MoveAssign => "move-assign",
            Operation::Destruct => "destruct",
            Operation::Swap => "swap",
            Operation::Equality => "equality comparison",
            Operation::Ordering => "ordering comparison",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether an operation is possible, no-fail and trivial for a column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capability {
    pub possible: bool,
    pub nofail: bool,
    pub trivial: bool,
}

impl Capability {
    /// The operation is not available.
    pub const UNSUPPORTED: Capability = Capability {
        possible: false,
        nofail: false,
        trivial: false,
    };

    /// Available, but may report failure.
    pub const FALLIBLE: Capability = Capability {
        possible: true,
        nofail: false,
        trivial: false,
    };

    /// Available and cannot report failure.
    pub const INFALLIBLE: Capability = Capability {
        possible: true,
        nofail: true,
        trivial: false,
    };

    /// Available, cannot fail, and is a plain byte copy (or a no-op).
    pub const TRIVIAL: Capability = Capability {
        possible: true,
        nofail: true,
        trivial: true,
    };

    /// Builds a capability that is possible, with the given failure mode.
    pub const fn possible(nofail: bool) -> Self {
        if nofail {
            Self::INFALLIBLE
        } else {
            Self::FALLIBLE
        }
    }

    /// Conjunction of two capabilities; used for table-wide flags.
    #[inline]
    pub const fn and(self, other: Capability) -> Capability {
        Capability {
            possible: self.possible && other.possible,
            nofail: self.nofail && other.nofail,
            trivial: self.trivial && other.trivial,
        }
    }

    /// True if the operation is possible and cannot fail.
    #[inline]
    pub const fn is_nofail(&self) -> bool {
        self.possible && self.nofail
    }
}

/// The full capability set of a column (or, by conjunction, of a whole schema).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub default_construct: Capability,
    pub copy_construct: Capability,
    pub move_construct: Capability,
    pub copy_assign: Capability,
    pub move_assign: Capability,
    pub destruct: Capability,
    pub swap: Capability,
    pub equality: Capability,
    pub ordering: Capability,
    /// Values may be duplicated with a raw byte copy.
    pub trivially_copyable: bool,
}

impl Capabilities {
    /// Capabilities that hold for every column of every table: the identity of
    /// [`Capabilities::and`].
    pub const ALL: Capabilities = Capabilities {
        default_construct: Capability::TRIVIAL,
        copy_construct: Capability::TRIVIAL,
        move_construct: Capability::TRIVIAL,
        copy_assign: Capability::TRIVIAL,
        move_assign: Capability::TRIVIAL,
        destruct: Capability::TRIVIAL,
        swap: Capability::TRIVIAL,
        equality: Capability::TRIVIAL,
        ordering: Capability::TRIVIAL,
        trivially_copyable: true,
    };

    /// Returns the capability for one operation.
    pub fn get(&self, operation: Operation) -> Capability {
        match operation {
            Operation::DefaultConstruct => self.default_construct,
            Operation::CopyConstruct => self.copy_construct,
            Operation::MoveConstruct => self.move_construct,
            Operation::CopyAssign => self.copy_assign,
            Operation::MoveAssign => self.move_assign,
            Operation::Destruct => self.destruct,
            Operation::Swap => self.swap,
            Operation::Equality => self.equality,
            Operation::Ordering => self.ordering,
        }
    }

    /// Operation-wise conjunction.
    pub fn and(&self, other: &Capabilities) -> Capabilities {
        Capabilities {
            default_construct: self.default_construct.and(other.default_construct),
            copy_construct: self.copy_construct.and(other.copy_construct),
            move_construct: self.move_construct.and(other.move_construct),
            copy_assign: self.copy_assign.and(other.copy_assign),
            move_assign: self.move_assign.and(other.move_assign),
            destruct: self.destruct.and(other.destruct),
            swap: self.swap.and(other.swap),
            equality: self.equality.and(other.equality),
            ordering: self.ordering.and(other.ordering),
            trivially_copyable: self.trivially_copyable && other.trivially_copyable,
        }
    }
}
