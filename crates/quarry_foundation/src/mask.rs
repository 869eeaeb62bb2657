//! Fixed-width variable bitset.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Variable slot index inside one compiled rule.
pub type VarId = u8;

/// Maximum number of variables a rule can track.
pub const MAX_VARS: usize = 64;

/// A set of variable ids, one bit per id.
///
/// Used for the compile-time written and conditionally-written sets, and
/// for the per-instruction written sets the VM propagates at run time.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct VarMask(u64);

impl VarMask {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// A set containing only `var`.
    #[must_use]
    pub const fn single(var: VarId) -> Self {
        Self(1 << var)
    }

    /// Returns true if `var` is in the set.
    #[must_use]
    pub const fn contains(self, var: VarId) -> bool {
        self.0 & (1 << var) != 0
    }

    /// Adds `var` to the set.
    pub fn insert(&mut self, var: VarId) {
        self.0 |= 1 << var;
    }

    /// Removes `var` from the set.
    pub fn remove(&mut self, var: VarId) {
        self.0 &= !(1 << var);
    }

    /// Returns true if no variable is in the set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of variables in the set.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Variables in `self` but not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Iterates the variable ids in ascending order.
    pub fn iter(self) -> impl Iterator<Item = VarId> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            #[allow(clippy::cast_possible_truncation)]
            let var = bits.trailing_zeros() as VarId;
            bits &= bits - 1;
            Some(var)
        })
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }
}

impl BitOr for VarMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for VarMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for VarMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for VarMask {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for VarMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl FromIterator<VarId> for VarMask {
    fn from_iter<I: IntoIterator<Item = VarId>>(iter: I) -> Self {
        let mut mask = Self::EMPTY;
        for var in iter {
            mask.insert(var);
        }
        mask
    }
}

impl fmt::Debug for VarMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
