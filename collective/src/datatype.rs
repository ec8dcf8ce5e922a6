//! Wire datatypes and reduction operators.
//!
//! These mirror the fixed sets a real atomic/reduction kernel collaborator
//! would support (`FI_UINT8`..`FI_DOUBLE`, `FI_MIN`..`FI_BXOR`); the core
//! never invents new ones; see [`crate::reduce`] for the fixed operator
//! range `query` and `allreduce` enforce.

use serde::{Deserialize, Serialize};

/// A wire datatype understood by the reduction kernel collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    /// Unsigned 8-bit integer.
    Uint8,
    /// Unsigned 16-bit integer.
    Uint16,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Unsigned 64-bit integer.
    Uint64,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// IEEE-754 single precision float.
    Float32,
    /// IEEE-754 double precision float.
    Float64,
}

impl Datatype {
    /// Size in bytes of one value of this datatype.
    pub const fn size(self) -> usize {
        match self {
            Datatype::Uint8 | Datatype::Int8 => 1,
            Datatype::Uint16 | Datatype::Int16 => 2,
            Datatype::Uint32 | Datatype::Int32 | Datatype::Float32 => 4,
            Datatype::Uint64 | Datatype::Int64 | Datatype::Float64 => 8,
        }
    }

    /// Whether this datatype admits bitwise/logical reduction operators
    /// (`BAND`, `BOR`, `BXOR`, `LAND`, `LOR`, `LXOR`).
    pub const fn is_integral(self) -> bool {
        !matches!(self, Datatype::Float32 | Datatype::Float64)
    }
}

/// A reduction operator, ordered `MIN..BXOR` as in spec §6/§7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceOp {
    /// Elementwise minimum.
    Min,
    /// Elementwise maximum.
    Max,
    /// Elementwise sum.
    Sum,
    /// Elementwise product.
    Prod,
    /// Logical AND (nonzero vs. zero).
    Land,
    /// Logical OR.
    Lor,
    /// Bitwise AND.
    Band,
    /// Bitwise OR.
    Bor,
    /// Logical XOR.
    Lxor,
    /// Bitwise XOR.
    Bxor,
}

impl ReduceOp {
    /// Every operator the fixed reduction set supports, in `MIN..BXOR` order.
    pub const ALL: [ReduceOp; 10] = [
        ReduceOp::Min,
        ReduceOp::Max,
        ReduceOp::Sum,
        ReduceOp::Prod,
        ReduceOp::Land,
        ReduceOp::Lor,
        ReduceOp::Band,
        ReduceOp::Bor,
        ReduceOp::Lxor,
        ReduceOp::Bxor,
    ];

    /// `true` for the bitwise/logical operators that only make sense on
    /// integral datatypes.
    pub const fn is_bitwise(self) -> bool {
        matches!(
            self,
            ReduceOp::Land | ReduceOp::Lor | ReduceOp::Band | ReduceOp::Bor | ReduceOp::Lxor | ReduceOp::Bxor
        )
    }
}
