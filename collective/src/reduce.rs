//! The atomic/reduction kernel collaborator.
//!
//! The engine treats every buffer as an untyped byte slice tagged with a
//! [`Datatype`] and a `count`, exactly as a wire protocol must — it has
//! no compile-time knowledge of what a caller's `Vec<u8>` actually holds.
//! [`ReduceKernel`] is the seam a real provider plugs atomic instructions
//! into; [`StandardReduceKernel`] is a portable, safe-Rust implementation
//! of the full fixed operator set, provided so the scheduler has a
//! working reduction to exercise in tests without a real provider.

use crate::datatype::{Datatype, ReduceOp};
use crate::error::CollError;

/// In-place elementwise reduction over typed buffers.
pub trait ReduceKernel {
    /// `inout := op(inout, in_)`, elementwise, `count` values of `datatype`.
    ///
    /// `in_` and `inout` must each be exactly `count * datatype.size()`
    /// bytes; implementations may assume this (the planners guarantee it).
    fn reduce(&self, op: ReduceOp, datatype: Datatype, inout: &mut [u8], in_: &[u8], count: usize) -> Result<(), CollError>;

    /// Whether this kernel can perform `op` over `datatype`.
    fn supports(&self, datatype: Datatype, op: ReduceOp) -> bool;
}

/// A safe, portable reduction kernel covering the full fixed datatype
/// and operator cross product that makes arithmetic sense.
///
/// Bitwise/logical operators are unsupported on floating-point
/// datatypes; every other combination is supported.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardReduceKernel;

macro_rules! reduce_numeric {
    ($ty:ty, $op:expr, $inout:expr, $in_:expr, $count:expr) => {{
        const WIDTH: usize = std::mem::size_of::<$ty>();
        for i in 0..$count {
            let at = i * WIDTH;
            let a = <$ty>::from_ne_bytes($inout[at..at + WIDTH].try_into().unwrap());
            let b = <$ty>::from_ne_bytes($in_[at..at + WIDTH].try_into().unwrap());
            let r = $op(a, b);
            $inout[at..at + WIDTH].copy_from_slice(&r.to_ne_bytes());
        }
    }};
}

macro_rules! arith_op {
    ($op:expr, $a:expr, $b:expr) => {
        match $op {
            ReduceOp::Min => {
                if $a < $b {
                    $a
                } else {
                    $b
                }
            }
            ReduceOp::Max => {
                if $a > $b {
                    $a
                } else {
                    $b
                }
            }
            ReduceOp::Sum => $a.wrapping_add($b),
            ReduceOp::Prod => $a.wrapping_mul($b),
            _ => unreachable!("arithmetic op expected"),
        }
    };
}

macro_rules! arith_op_float {
    ($op:expr, $a:expr, $b:expr) => {
        match $op {
            ReduceOp::Min => {
                if $a < $b {
                    $a
                } else {
                    $b
                }
            }
            ReduceOp::Max => {
                if $a > $b {
                    $a
                } else {
                    $b
                }
            }
            ReduceOp::Sum => $a + $b,
            ReduceOp::Prod => $a * $b,
            _ => unreachable!("arithmetic op expected"),
        }
    };
}

macro_rules! bitwise_op {
    ($op:expr, $a:expr, $b:expr) => {
        match $op {
            ReduceOp::Land => (($a != 0) && ($b != 0)) as _,
            ReduceOp::Lor => (($a != 0) || ($b != 0)) as _,
            ReduceOp::Band => $a & $b,
            ReduceOp::Bor => $a | $b,
            ReduceOp::Lxor => (($a != 0) != ($b != 0)) as _,
            ReduceOp::Bxor => $a ^ $b,
            _ => unreachable!("bitwise op expected"),
        }
    };
}

macro_rules! reduce_int {
    ($ty:ty, $op:expr, $inout:expr, $in_:expr, $count:expr) => {
        if $op.is_bitwise() {
            reduce_numeric!($ty, |a: $ty, b: $ty| bitwise_op!($op, a, b), $inout, $in_, $count)
        } else {
            reduce_numeric!($ty, |a: $ty, b: $ty| arith_op!($op, a, b), $inout, $in_, $count)
        }
    };
}

macro_rules! reduce_float {
    ($ty:ty, $op:expr, $inout:expr, $in_:expr, $count:expr) => {
        reduce_numeric!($ty, |a: $ty, b: $ty| arith_op_float!($op, a, b), $inout, $in_, $count)
    };
}

impl ReduceKernel for StandardReduceKernel {
    fn reduce(&self, op: ReduceOp, datatype: Datatype, inout: &mut [u8], in_: &[u8], count: usize) -> Result<(), CollError> {
        if !self.supports(datatype, op) {
            return Err(CollError::Unsupported("datatype/op combination not supported by reduction kernel"));
        }
        match datatype {
            Datatype::Uint8 => reduce_int!(u8, op, inout, in_, count),
            Datatype::Uint16 => reduce_int!(u16, op, inout, in_, count),
            Datatype::Uint32 => reduce_int!(u32, op, inout, in_, count),
            Datatype::Uint64 => reduce_int!(u64, op, inout, in_, count),
            Datatype::Int8 => reduce_int!(i8, op, inout, in_, count),
            Datatype::Int16 => reduce_int!(i16, op, inout, in_, count),
            Datatype::Int32 => reduce_int!(i32, op, inout, in_, count),
            Datatype::Int64 => reduce_int!(i64, op, inout, in_, count),
            Datatype::Float32 => reduce_float!(f32, op, inout, in_, count),
            Datatype::Float64 => reduce_float!(f64, op, inout, in_, count),
        }
        Ok(())
    }

    fn supports(&self, datatype: Datatype, op: ReduceOp) -> bool {
        datatype.is_integral() || !op.is_bitwise()
    }
}
