//! Terms: the parsed predicates a rule is compiled from.
//!
//! A term reads as `first(src, second)`: `Likes($this, $friend)` has `Likes` as
//! its first id, `$this` as source and `$friend` as second. Terms are built with
//! the constructors and builder methods below and are immutable once handed to
//! a [`Filter`](crate::Filter).

use std::fmt;

use bitflags::bitflags;
use quarry_foundation::EntityId;

/// Name of the implicit iteration subject.
pub const THIS_NAME: &str = "this";

// =============================================================================
// Term Identifiers
// =============================================================================

/// One position of a term.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TermId {
    /// A fixed entity.
    Entity(EntityId),
    /// A named variable, written `$name`. Dotted names (`$x.child`) are lookup variables.
    Var(String),
    /// `*`: matches anything, enumerating every match.
    Wildcard,
    /// `_`: matches anything, at most once.
    Any,
    /// A literal name, only valid as the right operand of a name predicate.
    Name(String),
}

impl TermId {
    /// A variable reference.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// The implicit iteration subject.
    #[must_use]
    pub fn this() -> Self {
        Self::Var(THIS_NAME.to_string())
    }

    /// Variable name, if this is a variable.
    #[must_use]
    pub fn var_name(&self) -> Option<&str> {
        match self {
            Self::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Returns true for `$this`.
    #[must_use]
    pub fn is_this(&self) -> bool {
        self.var_name() == Some(THIS_NAME)
    }

    /// Returns true for `*` and `_`.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard | Self::Any)
    }
}

impl From<EntityId> for TermId {
    fn from(e: EntityId) -> Self {
        Self::Entity(e)
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(e) => write!(f, "#{}", e.index),
            Self::Var(name) => write!(f, "${name}"),
            Self::Wildcard => write!(f, "*"),
            Self::Any => write!(f, "_"),
            Self::Name(name) => write!(f, "\"{name}\""),
        }
    }
}

// =============================================================================
// Operators and Modifiers
// =============================================================================

/// How a term combines with its neighbours.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Oper {
    /// The term must match.
    #[default]
    And,
    /// The term and the consecutive `Or` terms around it form one disjunction.
    Or,
    /// The term must not match.
    Not,
    /// The term is matched if possible.
    Optional,
}

/// How the source of a term is searched.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Traverse {
    /// Only the source itself.
    #[default]
    SelfOnly,
    /// Only ancestors reached through the relationship.
    Up(EntityId),
    /// The source first, then its ancestors.
    SelfUp(EntityId),
}

/// Comparison performed by a predicate term.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// `$x == e` or `$x == $y`.
    Eq,
    /// `$x != e` or `$x != $y`.
    Neq,
    /// `$x == "name"`.
    EqName,
    /// `$x != "name"`.
    NeqName,
    /// `$x ~= "substring"`.
    Match,
    /// `$x ~= "!substring"`.
    NeqMatch,
}

impl Predicate {
    /// The predicate with the opposite outcome.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Eq => Self::Neq,
            Self::Neq => Self::Eq,
            Self::EqName => Self::NeqName,
            Self::NeqName => Self::EqName,
            Self::Match => Self::NeqMatch,
            Self::NeqMatch => Self::Match,
        }
    }

    /// Returns true if the right operand is a literal name.
    #[must_use]
    pub fn compares_names(self) -> bool {
        !matches!(self, Self::Eq | Self::Neq)
    }
}

bitflags! {
    /// Per-term switches.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TermFlags: u8 {
        /// Do not resolve the first id through `IsA` subtypes.
        const NO_INHERIT = 1 << 0;
        /// Match a transitive relationship literally, without closure.
        const NO_TRANSITIVE = 1 << 1;
    }
}

// =============================================================================
// Term
// =============================================================================

/// One predicate of a rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Term {
    /// The tag, component or relationship.
    pub first: TermId,
    /// The target, for pairs.
    pub second: Option<TermId>,
    /// The entity the term is matched on.
    pub src: TermId,
    /// Operator.
    pub oper: Oper,
    /// Source traversal.
    pub traverse: Traverse,
    /// Set for predicate terms.
    pub predicate: Option<Predicate>,
    /// Switches.
    pub flags: TermFlags,
}

impl Term {
    /// `first($this)`.
    #[must_use]
    pub fn new(first: impl Into<TermId>) -> Self {
        Self {
            first: first.into(),
            second: None,
            src: TermId::this(),
            oper: Oper::And,
            traverse: Traverse::SelfOnly,
            predicate: None,
            flags: TermFlags::empty(),
        }
    }

    /// `(first, second)($this)`.
    #[must_use]
    pub fn pair(first: impl Into<TermId>, second: impl Into<TermId>) -> Self {
        Self::new(first).second(second)
    }

    fn predicate(kind: Predicate, lhs: &str, rhs: TermId) -> Self {
        let first = if matches!(kind, Predicate::Match | Predicate::NeqMatch) {
            EntityId::PRED_MATCH
        } else {
            EntityId::PRED_EQ
        };
        Self {
            predicate: Some(kind),
            ..Self::pair(first, rhs).src(TermId::var(lhs))
        }
    }

    /// `$lhs == rhs`, where `rhs` is an entity or a variable.
    #[must_use]
    pub fn eq(lhs: &str, rhs: impl Into<TermId>) -> Self {
        Self::predicate(Predicate::Eq, lhs, rhs.into())
    }

    /// `$lhs != rhs`.
    #[must_use]
    pub fn neq(lhs: &str, rhs: impl Into<TermId>) -> Self {
        Self::predicate(Predicate::Neq, lhs, rhs.into())
    }

    /// `$lhs == "name"`.
    #[must_use]
    pub fn eq_name(lhs: &str, name: &str) -> Self {
        Self::predicate(Predicate::EqName, lhs, TermId::Name(name.to_string()))
    }

    /// `$lhs != "name"`.
    #[must_use]
    pub fn neq_name(lhs: &str, name: &str) -> Self {
        Self::predicate(Predicate::NeqName, lhs, TermId::Name(name.to_string()))
    }

    /// `$lhs ~= "substring"`.
    #[must_use]
    pub fn name_match(lhs: &str, pattern: &str) -> Self {
        Self::predicate(Predicate::Match, lhs, TermId::Name(pattern.to_string()))
    }

    /// Sets the second id.
    #[must_use]
    pub fn second(mut self, second: impl Into<TermId>) -> Self {
        self.second = Some(second.into());
        self
    }

    /// Sets the source.
    #[must_use]
    pub fn src(mut self, src: impl Into<TermId>) -> Self {
        self.src = src.into();
        self
    }

    /// Sets the source to a variable.
    #[must_use]
    pub fn src_var(self, name: &str) -> Self {
        self.src(TermId::var(name))
    }

    /// Negates the term.
    #[must_use]
    pub fn not(mut self) -> Self {
        self.oper = Oper::Not;
        self
    }

    /// Makes the term optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.oper = Oper::Optional;
        self
    }

    /// Joins the term to an `Or` chain with its `Or` neighbours.
    #[must_use]
    pub fn or(mut self) -> Self {
        self.oper = Oper::Or;
        self
    }

    /// Matches the id on ancestors reached through `rel`.
    #[must_use]
    pub fn up(mut self, rel: EntityId) -> Self {
        self.traverse = Traverse::Up(rel);
        self
    }

    /// Matches the id on the source, then on ancestors reached through `rel`.
    #[must_use]
    pub fn self_up(mut self, rel: EntityId) -> Self {
        self.traverse = Traverse::SelfUp(rel);
        self
    }

    /// Disables `IsA` resolution of the first id.
    #[must_use]
    pub fn no_inherit(mut self) -> Self {
        self.flags |= TermFlags::NO_INHERIT;
        self
    }

    /// Matches a transitive relationship literally.
    #[must_use]
    pub fn no_transitive(mut self) -> Self {
        self.flags |= TermFlags::NO_TRANSITIVE;
        self
    }

    /// Variable names this term mentions, in position order (src, first, second).
    pub fn var_names(&self) -> impl Iterator<Item = &str> {
        [Some(&self.src), Some(&self.first), self.second.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(TermId::var_name)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.oper {
            Oper::Not => write!(f, "!")?,
            Oper::Optional => write!(f, "?")?,
            Oper::And | Oper::Or => {}
        }
        if let Some(pred) = self.predicate {
            let op = match pred {
                Predicate::Eq | Predicate::EqName => "==",
                Predicate::Neq | Predicate::NeqName => "!=",
                Predicate::Match | Predicate::NeqMatch => "~=",
            };
            let rhs = self.second.as_ref().map(ToString::to_string).unwrap_or_default();
            return write!(f, "{} {op} {rhs}", self.src);
        }
        write!(f, "{}({}", self.first, self.src)?;
        if let Some(second) = &self.second {
            write!(f, ", {second}")?;
        }
        write!(f, ")")
    }
}
