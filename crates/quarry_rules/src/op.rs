//! The rule instruction set.
//!
//! A compiled rule is a flat array of [`Op`]s. Control flow is carried by the
//! `prev`/`next`/`other` labels of each op, so the array is a graph: on success
//! the VM moves to `next`, on failure to `prev` (in redo mode), and control-flow
//! ops override both with explicit jumps.

use std::fmt;

use bitflags::bitflags;
use quarry_foundation::{EntityId, VarId, VarMask};

/// Index into the op array. `-1` is the exhaustion label.
pub type Label = i16;

/// Label that ends iteration when jumped to.
pub const EXHAUSTED: Label = -1;

/// One operand of an op.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Ref {
    /// No operand.
    #[default]
    None,
    /// A literal entity (wildcards included).
    Entity(EntityId),
    /// A variable slot.
    Var(VarId),
}

impl Ref {
    /// Variable slot, if this operand is a variable.
    #[must_use]
    pub fn var(self) -> Option<VarId> {
        match self {
            Self::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Returns true if there is no operand.
    #[must_use]
    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

bitflags! {
    /// Match modifiers of an op.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MatchFlags: u8 {
        /// Matches on the source itself, without traversal.
        const SELF = 1 << 0;
        /// The relationship relates every entity to itself.
        const REFLEXIVE = 1 << 1;
        /// The source is `_`: succeed at most once.
        const ANY_SRC = 1 << 2;
    }
}

/// Opcodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    // === Matching ===
    /// Search tables for an id when the source is unwritten, test it otherwise.
    And,
    /// Test an id on a fixed entity.
    With,
    /// Like `And`, but succeeds at most once per source.
    AndAny,
    /// Match an id on ancestors reached through `trav`.
    Up,
    /// Match an id on the source, then on ancestors reached through `trav`.
    SelfUp,
    /// Transitive closure of `first(src, second)`.
    Trav,
    /// Bind `second` to every target of `(first, *)` pairs in the world.
    IdsRight,
    /// Unroll a table variable (`src`) into its entity twin (`first`).
    Each,
    /// Bind variable `src` to `first`.
    Store,
    /// Clear a variable that was only conditionally written.
    Reset,
    /// Resolve a lookup variable (`src`) relative to its base (`first`).
    Lookup,

    // === Control flow ===
    /// Enumerate the branches of an or chain one after another.
    Union,
    /// Convergence point of a branch group; resumes the branch that reached it.
    End,
    /// Closes a negated or optional term; succeeds when the term was skipped.
    Not,
    /// Opens a negated or optional term; redo jumps to `other` if the term never matched.
    JmpCondFalse,
    /// Records that the optional term opened at `other` matched.
    SetCond,
    /// Jumps to `other` when any variable in `guard` was not written on this path.
    JmpNotSet,

    // === Predicates ===
    /// `$src == second`.
    PredEq,
    /// `$src != second`.
    PredNeq,
    /// `$src == "name"`.
    PredEqName,
    /// `$src != "name"`.
    PredNeqName,
    /// `$src ~= "substring"`.
    PredEqMatch,
    /// `$src ~= "!substring"`.
    PredNeqMatch,

    // === Bookkeeping ===
    /// Narrow table variable `src` to the row of entity `first`.
    Contain,
    /// The matched pair of the field must have equal first and second ids.
    PairEq,
    /// Anchor `$this` to the table row of its entity twin.
    SetThis,
    /// Report a match.
    Yield,
    /// Never matches.
    Nothing,
}

impl OpKind {
    /// Short name used in disassembly.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::With => "with",
            Self::AndAny => "andany",
            Self::Up => "up",
            Self::SelfUp => "selfup",
            Self::Trav => "trav",
            Self::IdsRight => "idsright",
            Self::Each => "each",
            Self::Store => "store",
            Self::Reset => "reset",
            Self::Lookup => "lookup",
            Self::Union => "union",
            Self::End => "end",
            Self::Not => "not",
            Self::JmpCondFalse => "jfalse",
            Self::SetCond => "setcond",
            Self::JmpNotSet => "jnotset",
            Self::PredEq => "pred_eq",
            Self::PredNeq => "pred_neq",
            Self::PredEqName => "pred_eq_nm",
            Self::PredNeqName => "pred_neq_nm",
            Self::PredEqMatch => "pred_eq_m",
            Self::PredNeqMatch => "pred_neq_m",
            Self::Contain => "contain",
            Self::PairEq => "paireq",
            Self::SetThis => "setthis",
            Self::Yield => "yield",
            Self::Nothing => "nothing",
        }
    }

    /// Returns true for ops that report a field.
    #[must_use]
    pub fn is_match(self) -> bool {
        matches!(
            self,
            Self::And | Self::With | Self::AndAny | Self::Up | Self::SelfUp | Self::Trav
        )
    }

    /// Returns true for predicate ops.
    #[must_use]
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            Self::PredEq
                | Self::PredNeq
                | Self::PredEqName
                | Self::PredNeqName
                | Self::PredEqMatch
                | Self::PredNeqMatch
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Op {
    /// Opcode.
    pub kind: OpKind,
    /// Source operand.
    pub src: Ref,
    /// First operand (relationship, tag, or a variable for bookkeeping ops).
    pub first: Ref,
    /// Second operand (pair target).
    pub second: Ref,
    /// Field this op reports into.
    pub field: Option<u16>,
    /// Term this op was compiled from.
    pub term: Option<u16>,
    /// Match modifiers.
    pub flags: MatchFlags,
    /// Relationship followed by `Up` and `SelfUp`.
    pub trav: Option<EntityId>,
    /// Label taken on failure.
    pub prev: Label,
    /// Label taken on success.
    pub next: Label,
    /// Auxiliary jump target for control-flow ops.
    pub other: Label,
    /// Variables this op writes when it succeeds.
    pub written: VarMask,
    /// Variables `JmpNotSet` checks.
    pub guard: VarMask,
    /// Branch heads of a `Union`.
    pub branches: Vec<Label>,
    /// Literal operand of name predicates.
    pub text: Option<String>,
}

impl Op {
    /// An op with no operands and unpatched labels.
    #[must_use]
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            src: Ref::None,
            first: Ref::None,
            second: Ref::None,
            field: None,
            term: None,
            flags: MatchFlags::empty(),
            trav: None,
            prev: EXHAUSTED,
            next: EXHAUSTED,
            other: EXHAUSTED,
            written: VarMask::EMPTY,
            guard: VarMask::EMPTY,
            branches: Vec::new(),
            text: None,
        }
    }

    pub(crate) fn with_src(mut self, src: Ref) -> Self {
        self.src = src;
        self
    }

    pub(crate) fn with_first(mut self, first: Ref) -> Self {
        self.first = first;
        self
    }

    pub(crate) fn with_second(mut self, second: Ref) -> Self {
        self.second = second;
        self
    }

    /// Variables read or written by the operands.
    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        [self.src, self.first, self.second].into_iter().filter_map(Ref::var)
    }
}
