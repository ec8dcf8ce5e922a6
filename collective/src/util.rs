//! Small numeric helpers the planners lean on: finding the lowest set
//! bit of a rank and rounding down to a power of two. Trivial enough to
//! implement directly rather than thread through a collaborator trait.

/// Position (1-indexed) of the least significant set bit.
///
/// Panics if `x == 0`, matching the original's assumption that this is
/// only ever called on nonzero rank-derived values.
pub fn lsb(x: u64) -> u32 {
    assert_ne!(x, 0, "lsb of zero is undefined");
    x.trailing_zeros() + 1
}

/// The largest power of two less than or equal to `x`.
pub fn round_down_pow2(x: u64) -> u64 {
    if x == 0 {
        0
    } else {
        1u64 << (63 - x.leading_zeros())
    }
}
