//! Comparisons on the ring of 32-bit sequence numbers. Every ordering
//! between sequence, acknowledgment or timestamp values goes through
//! [`distance`].

/// Half of the sequence space. Values closer than this are ordered.
const HALF: u32 = 1 << 31;

/// How far `b` lies ahead of `a`, wrapping modulo 2^32.
pub const fn distance(a: u32, b: u32) -> u32 {
    b.wrapping_sub(a)
}

/// a < b under modular arithmetic
pub const fn mod_lt(a: u32, b: u32) -> bool {
    let d = distance(a, b);
    d != 0 && d < HALF
}

/// a <= b under modular arithmetic
pub const fn mod_leq(a: u32, b: u32) -> bool {
    distance(a, b) < HALF
}

/// a > b under modular arithmetic
pub const fn mod_gt(a: u32, b: u32) -> bool {
    mod_lt(b, a)
}

/// a >= b under modular arithmetic
pub const fn mod_geq(a: u32, b: u32) -> bool {
    mod_leq(b, a)
}

/// Is `b` between `a` and `c` when accounting for modular arithmetic?
/// `ab_cmp` and `bc_cmp` choose whether each end of the range is open or
/// closed.
pub fn mod_bounded(a: u32, ab_cmp: ModCmp, b: u32, bc_cmp: ModCmp, c: u32) -> bool {
    let lower = match ab_cmp {
        Lt => mod_lt(a, b),
        Leq => mod_leq(a, b),
    };
    let upper = match bc_cmp {
        Lt => distance(a, b) < distance(a, c),
        Leq => distance(a, b) <= distance(a, c),
    };
    lower && upper
}

pub use ModCmp::*;
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModCmp {
    Lt,
    Leq,
}
