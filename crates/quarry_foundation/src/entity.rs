//! Entity ids: an index into the world's entity slots plus a generation.
//!
//! The first [`BUILTIN_COUNT`] indices are reserved for builtin entities
//! (wildcards, `IsA`, relationship properties, predicates).

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An entity handle.
///
/// A slot's generation is bumped each time the slot is recycled, so a handle
/// kept past deletion no longer compares equal to the slot's new occupant.
///
/// Ordering is by index, then generation. Sorted archetype types depend on it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityId {
    /// Slot in the world's entity store.
    pub index: u64,
    /// Bumped when the slot is reused.
    pub generation: u32,
}

// =============================================================================
// Builtin Entities
// =============================================================================

/// Number of builtin entities a fresh world reserves before any user entity.
pub const BUILTIN_COUNT: u64 = 12;

impl EntityId {
    /// Matches any id in its position, enumerating every match (`*`).
    pub const WILDCARD: Self = Self::new(0, 1);
    /// Matches any id in its position, matching at most once (`_`).
    pub const ANY: Self = Self::new(1, 1);
    /// The implicit iteration subject.
    pub const THIS: Self = Self::new(2, 1);
    /// Inheritance relationship (`IsA`).
    pub const IS_A: Self = Self::new(3, 1);
    /// Hierarchy relationship (`ChildOf`), also used for name scopes.
    pub const CHILD_OF: Self = Self::new(4, 1);
    /// Relationship property: `R(a, b) && R(b, c)` implies `R(a, c)`.
    pub const TRANSITIVE: Self = Self::new(5, 1);
    /// Relationship property: `R(a, a)` holds for every `a`.
    pub const REFLEXIVE: Self = Self::new(6, 1);
    /// Relationship property: the relationship may be followed by up traversal.
    pub const TRAVERSABLE: Self = Self::new(7, 1);
    /// Entity property: the entity cannot be inherited from.
    pub const FINAL: Self = Self::new(8, 1);
    /// Equality predicate.
    pub const PRED_EQ: Self = Self::new(9, 1);
    /// Name substring predicate.
    pub const PRED_MATCH: Self = Self::new(10, 1);
    /// Marker for variables in disassembly and field ids.
    pub const VARIABLE: Self = Self::new(11, 1);

    /// Builtin entities and their names, in registration order.
    pub const BUILTINS: [(Self, &'static str); BUILTIN_COUNT as usize] = [
        (Self::WILDCARD, "*"),
        (Self::ANY, "_"),
        (Self::THIS, "this"),
        (Self::IS_A, "IsA"),
        (Self::CHILD_OF, "ChildOf"),
        (Self::TRANSITIVE, "Transitive"),
        (Self::REFLEXIVE, "Reflexive"),
        (Self::TRAVERSABLE, "Traversable"),
        (Self::FINAL, "Final"),
        (Self::PRED_EQ, "PredEq"),
        (Self::PRED_MATCH, "PredMatch"),
        (Self::VARIABLE, "$"),
    ];

    /// Builds a handle from raw parts.
    #[must_use]
    pub const fn new(index: u64, generation: u32) -> Self {
        Self { index, generation }
    }

    /// The "no entity" handle. Index `u64::MAX` is never handed out.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            index: u64::MAX,
            generation: 0,
        }
    }

    /// Is this [`EntityId::null`]?
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == u64::MAX
    }

    /// Returns true for `*` and `_`.
    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        self.index == Self::WILDCARD.index || self.index == Self::ANY.index
    }

    /// Returns true if this is one of the entities a world reserves at creation.
    #[must_use]
    pub const fn is_builtin(self) -> bool {
        self.index < BUILTIN_COUNT
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return out.write_str("EntityId(null)");
        }
        write!(out, "EntityId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return out.write_str("Entity(null)");
        }
        write!(out, "Entity({})", self.index)
    }
}
