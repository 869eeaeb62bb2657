//! Component ids: plain entities used as tags, or relationship pairs.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// An id that can be added to an entity.
///
/// Derived ordering places every plain id before every pair, and pairs by
/// relationship then target. Archetype types are sorted by this order, so all
/// pairs sharing a relationship occupy contiguous columns.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Id {
    /// A tag (plain entity).
    Entity(EntityId),
    /// A `(relationship, target)` pair.
    Pair(EntityId, EntityId),
}

impl Id {
    /// The `*` id, matching every plain id.
    pub const WILDCARD: Self = Self::Entity(EntityId::WILDCARD);

    /// Creates a pair id.
    #[must_use]
    pub const fn pair(first: EntityId, second: EntityId) -> Self {
        Self::Pair(first, second)
    }

    /// Returns true for pair ids.
    #[must_use]
    pub const fn is_pair(self) -> bool {
        matches!(self, Self::Pair(..))
    }

    /// The tag entity, or the relationship of a pair.
    #[must_use]
    pub const fn first(self) -> EntityId {
        match self {
            Self::Entity(e) | Self::Pair(e, _) => e,
        }
    }

    /// The target of a pair.
    #[must_use]
    pub const fn second(self) -> Option<EntityId> {
        match self {
            Self::Entity(_) => None,
            Self::Pair(_, t) => Some(t),
        }
    }

    /// Returns true if any position is `*` or `_`.
    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        match self {
            Self::Entity(e) => e.is_wildcard(),
            Self::Pair(r, t) => r.is_wildcard() || t.is_wildcard(),
        }
    }

    /// Returns true if the concrete id `other` is matched by this (possibly wildcard) id.
    #[must_use]
    pub fn matches(self, other: Self) -> bool {
        let part = |w: EntityId, c: EntityId| w.is_wildcard() || w == c;
        match (self, other) {
            (Self::Entity(w), Self::Entity(c)) => part(w, c),
            (Self::Pair(wr, wt), Self::Pair(cr, ct)) => part(wr, cr) && part(wt, ct),
            _ => false,
        }
    }

    /// Replaces `_` with `*` so the id can be used against the id index.
    #[must_use]
    pub fn any_to_wildcard(self) -> Self {
        let conv = |e: EntityId| if e == EntityId::ANY { EntityId::WILDCARD } else { e };
        match self {
            Self::Entity(e) => Self::Entity(conv(e)),
            Self::Pair(r, t) => Self::Pair(conv(r), conv(t)),
        }
    }
}

impl From<EntityId> for Id {
    fn from(e: EntityId) -> Self {
        Self::Entity(e)
    }
}

impl From<(EntityId, EntityId)> for Id {
    fn from((r, t): (EntityId, EntityId)) -> Self {
        Self::Pair(r, t)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(e) => write!(f, "Id({})", e.index),
            Self::Pair(r, t) => write!(f, "Id({}, {})", r.index, t.index),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(e) => write!(f, "#{}", e.index),
            Self::Pair(r, t) => write!(f, "(#{}, #{})", r.index, t.index),
        }
    }
}
