//! Variable slots and per-op scratch state.
//!
//! Each iterator owns one [`OpCtx`] per op, created for the op's kind when the
//! iterator starts. Ops keep whatever they need to resume in their context.

use std::sync::Arc;

use quarry_foundation::{EntityId, Id, VarId};
use quarry_storage::{Table, TableId, World};

use crate::op::{Label, OpKind};
use crate::trav::DownTable;

// =============================================================================
// Variable Slots
// =============================================================================

/// A contiguous range of rows in one table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableRange {
    /// The table.
    pub table: TableId,
    /// First row.
    pub offset: usize,
    /// Number of rows.
    pub count: usize,
}

impl TableRange {
    /// Every row of a table.
    #[must_use]
    pub fn whole(table: &Table) -> Self {
        Self {
            table: table.id(),
            offset: 0,
            count: table.len(),
        }
    }

    /// One row of a table.
    #[must_use]
    pub fn row(table: TableId, row: usize) -> Self {
        Self {
            table,
            offset: row,
            count: 1,
        }
    }

    /// The `i`th row of this range as a one-row range.
    #[must_use]
    pub fn narrow(self, i: usize) -> Self {
        Self::row(self.table, self.offset + i)
    }

    /// Entities in the range. Rows that no longer exist are cut off.
    #[must_use]
    pub fn entities(self, world: &World) -> &[EntityId] {
        let all = world.table(self.table).entities();
        let start = self.offset.min(all.len());
        let end = (self.offset + self.count).min(all.len());
        &all[start..end]
    }

    /// The `i`th entity of the range.
    #[must_use]
    pub fn entity_at(self, world: &World, i: usize) -> Option<EntityId> {
        self.entities(world).get(i).copied()
    }
}

/// Run-time value of one variable.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct VarSlot {
    pub entity: Option<EntityId>,
    pub range: Option<TableRange>,
}

impl VarSlot {
    pub(crate) fn is_empty(&self) -> bool {
        self.entity.is_none() && self.range.is_none()
    }
}

/// Run-time value of one field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct FieldState {
    pub id: Id,
    pub column: Option<usize>,
    pub set: bool,
    /// Set when the id was found on an ancestor.
    pub up_src: Option<EntityId>,
}

impl Default for FieldState {
    fn default() -> Self {
        Self {
            id: Id::WILDCARD,
            column: None,
            set: false,
            up_src: None,
        }
    }
}

// =============================================================================
// Op Contexts
// =============================================================================

#[derive(Clone, Debug)]
pub(crate) struct AndCtx {
    pub id: Id,
    /// Searching tables rather than testing a bound source.
    pub select: bool,
    pub src: VarId,
    pub table: TableId,
    pub column: Option<usize>,
    pub next_table: usize,
}

impl Default for AndCtx {
    fn default() -> Self {
        Self {
            id: Id::WILDCARD,
            select: false,
            src: 0,
            table: TableId::ROOT,
            column: None,
            next_table: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum UpPhase {
    /// Tables holding the id themselves (`SelfUp` only).
    #[default]
    SelfTables,
    /// Tables inheriting the id.
    Down,
    /// Source was bound; the single answer has been given.
    Done,
}

#[derive(Clone, Debug)]
pub(crate) struct UpCtx {
    pub id: Id,
    pub src: VarId,
    pub phase: UpPhase,
    pub next: usize,
    pub down: Option<Arc<[DownTable]>>,
}

impl Default for UpCtx {
    fn default() -> Self {
        Self {
            id: Id::WILDCARD,
            src: 0,
            phase: UpPhase::SelfTables,
            next: 0,
            down: None,
        }
    }
}

/// Which operands of a transitive match are bound.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum TravCase {
    /// Source and target bound: a single check.
    #[default]
    Check,
    /// Target bound: enumerate everything reaching it.
    Down,
    /// Source bound: enumerate everything it reaches.
    Up,
    /// `R($x, $x)` with `$x` free.
    SameVar,
}

#[derive(Clone, Debug)]
pub(crate) struct TravCtx {
    pub case: TravCase,
    pub reflexive_done: bool,
    pub rel: EntityId,
    pub tgt: EntityId,
    pub src: Option<VarId>,
    pub second: Option<VarId>,
    pub range: Option<TableRange>,
    pub saved: Option<TableRange>,
    pub elems: Option<Arc<[EntityId]>>,
    pub elem: usize,
    pub table_idx: usize,
    pub row: usize,
}

impl Default for TravCtx {
    fn default() -> Self {
        Self {
            case: TravCase::Check,
            reflexive_done: false,
            rel: EntityId::null(),
            tgt: EntityId::null(),
            src: None,
            second: None,
            range: None,
            saved: None,
            elems: None,
            elem: 0,
            table_idx: 0,
            row: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct IdsCtx {
    pub ids: Vec<Id>,
    pub next: usize,
}

/// Row cursor over a saved range (`Each` and predicate filters).
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct RowCtx {
    pub range: Option<TableRange>,
    pub row: usize,
}

#[derive(Clone, Debug)]
pub(crate) enum OpCtx {
    None,
    And(AndCtx),
    Up(UpCtx),
    Trav(TravCtx),
    Ids(IdsCtx),
    Rows(RowCtx),
    Union(usize),
    End(Label),
    Cond(bool),
    Saved(Option<VarSlot>),
}

impl OpCtx {
    pub(crate) fn for_op(kind: OpKind) -> Self {
        match kind {
            OpKind::And | OpKind::With | OpKind::AndAny => Self::And(AndCtx::default()),
            OpKind::Up | OpKind::SelfUp => Self::Up(UpCtx::default()),
            OpKind::Trav => Self::Trav(TravCtx::default()),
            OpKind::IdsRight => Self::Ids(IdsCtx::default()),
            OpKind::Each
            | OpKind::PredEq
            | OpKind::PredNeq
            | OpKind::PredEqName
            | OpKind::PredNeqName
            | OpKind::PredEqMatch
            | OpKind::PredNeqMatch => Self::Rows(RowCtx::default()),
            OpKind::Union => Self::Union(0),
            OpKind::End => Self::End(0),
            OpKind::JmpCondFalse => Self::Cond(false),
            OpKind::Contain | OpKind::SetThis => Self::Saved(None),
            OpKind::Store
            | OpKind::Reset
            | OpKind::Lookup
            | OpKind::Not
            | OpKind::SetCond
            | OpKind::JmpNotSet
            | OpKind::PairEq
            | OpKind::Yield
            | OpKind::Nothing => Self::None,
        }
    }
}
