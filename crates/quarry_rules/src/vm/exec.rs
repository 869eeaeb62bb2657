//! Op handlers.
//!
//! Every handler runs in one of two modes: fresh (`redo == false`) starts the
//! op from scratch, redo produces the op's next alternative. A handler reports
//! success, failure, or an explicit jump.

use quarry_foundation::{EntityId, Id, VarId, VarMask};
use quarry_storage::World;

use super::context::{
    AndCtx, FieldState, OpCtx, RowCtx, TableRange, TravCase, TravCtx, UpCtx, UpPhase, VarSlot,
};
use super::Regs;
use crate::compiler::Program;
use crate::op::{EXHAUSTED, Label, MatchFlags, Op, OpKind, Ref};
use crate::trav::TravCache;
use crate::var::VarKind;

/// Where the driver goes after an op.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Success: follow `next`.
    Next,
    /// Failure: follow `prev`.
    Prev,
    /// Explicit jump.
    Jump(Label),
}

fn flow(ok: bool) -> Flow {
    if ok { Flow::Next } else { Flow::Prev }
}

/// A resolved source operand.
#[derive(Copy, Clone, Debug)]
enum Source {
    /// An unwritten variable the op must bind.
    Free(VarId),
    /// Rows to test.
    Bound(TableRange),
    /// A written variable or fixed entity with no storage.
    Missing,
}

macro_rules! ctx_as {
    ($ctx:expr, $variant:ident) => {
        match $ctx {
            OpCtx::$variant(c) => c,
            _ => {
                debug_assert!(false, "op context does not match op kind");
                return false;
            }
        }
    };
}

pub(crate) struct Exec<'r> {
    pub world: &'r World,
    pub program: &'r Program,
    pub regs: &'r mut Regs,
    pub cache: &'r mut TravCache,
    /// Variables written on the path that reached this op.
    pub written: VarMask,
    pub prev_ip: Label,
}

impl Exec<'_> {
    pub(crate) fn run(&mut self, op: &Op, ctx: &mut OpCtx, redo: bool) -> Flow {
        match op.kind {
            OpKind::And | OpKind::With | OpKind::AndAny => flow(self.and(op, ctx, redo)),
            OpKind::Up | OpKind::SelfUp => flow(self.up(op, ctx, redo)),
            OpKind::Trav => flow(self.trav(op, ctx, redo)),
            OpKind::IdsRight => flow(self.ids_right(op, ctx, redo)),
            OpKind::Each => flow(self.each(op, ctx, redo)),
            OpKind::Store => flow(!redo && self.store(op)),
            OpKind::Reset => flow(!redo && self.reset(op)),
            OpKind::Lookup => flow(!redo && self.lookup(op)),
            OpKind::Union => Self::union(op, ctx, redo),
            OpKind::End => self.end(op, ctx, redo),
            OpKind::Not => flow(!redo && self.not(op)),
            OpKind::JmpCondFalse => Self::jmp_cond_false(op, ctx, redo),
            OpKind::JmpNotSet => self.jmp_not_set(op, redo),
            OpKind::PredEq
            | OpKind::PredNeq
            | OpKind::PredEqName
            | OpKind::PredNeqName
            | OpKind::PredEqMatch
            | OpKind::PredNeqMatch => flow(self.predicate(op, ctx, redo)),
            OpKind::Contain => flow(self.contain(op, ctx, redo)),
            OpKind::PairEq => flow(!redo && self.pair_eq(op)),
            OpKind::SetThis => flow(self.set_this(op, ctx, redo)),
            // SetCond and a fresh Yield are handled by the driver
            OpKind::SetCond | OpKind::Yield | OpKind::Nothing => Flow::Prev,
        }
    }

    // =========================================================================
    // Operand Access
    // =========================================================================

    fn kind_of(&self, var: VarId) -> VarKind {
        self.program.vars[usize::from(var)].kind
    }

    fn slot(&self, var: VarId) -> VarSlot {
        self.regs.vars[usize::from(var)]
    }

    fn slot_mut(&mut self, var: VarId) -> &mut VarSlot {
        &mut self.regs.vars[usize::from(var)]
    }

    fn is_bound(&self, var: VarId) -> bool {
        self.written.contains(var)
    }

    fn entity_range(&self, entity: EntityId) -> Option<TableRange> {
        let record = self.world.record(entity)?;
        Some(TableRange::row(record.table, record.row))
    }

    fn source(&self, src: Ref) -> Source {
        let range = match src {
            Ref::Entity(e) => self.entity_range(e),
            Ref::Var(v) if !self.is_bound(v) => return Source::Free(v),
            Ref::Var(v) => match self.kind_of(v) {
                VarKind::Table => self.slot(v).range,
                VarKind::Entity => self.slot(v).entity.and_then(|e| self.entity_range(e)),
            },
            Ref::None => None,
        };
        range.map_or(Source::Missing, Source::Bound)
    }

    /// Value of an operand; unbound variables read as `*`.
    fn resolve(&self, r: Ref) -> EntityId {
        match r {
            Ref::Entity(e) => e,
            Ref::Var(v) if self.is_bound(v) => {
                let slot = self.slot(v);
                slot.entity
                    .or_else(|| slot.range.and_then(|range| range.entity_at(self.world, 0)))
                    .unwrap_or(EntityId::WILDCARD)
            }
            Ref::Var(_) | Ref::None => EntityId::WILDCARD,
        }
    }

    fn op_id(&self, op: &Op) -> Id {
        let first = self.resolve(op.first);
        match op.second {
            Ref::None => Id::Entity(first),
            second => Id::pair(first, self.resolve(second)),
        }
    }

    /// Binds the unwritten operand variables from a matched id.
    fn bind_id(&mut self, op: &Op, id: Id) {
        if let Ref::Var(v) = op.first {
            if !self.is_bound(v) {
                self.slot_mut(v).entity = Some(id.first());
            }
        }
        if let Ref::Var(v) = op.second {
            if !self.is_bound(v) {
                self.slot_mut(v).entity = id.second();
            }
        }
    }

    fn set_entity(&mut self, var: VarId, entity: EntityId) {
        let slot = self.slot_mut(var);
        slot.entity = Some(entity);
        slot.range = None;
    }

    /// Binds a source variable to a range (entity variables take its first row).
    fn set_src(&mut self, var: VarId, range: TableRange) {
        match self.kind_of(var) {
            VarKind::Table => {
                let slot = self.slot_mut(var);
                slot.range = Some(range);
                slot.entity = None;
            }
            VarKind::Entity => {
                let entity = range.entity_at(self.world, 0);
                self.slot_mut(var).entity = entity;
            }
        }
    }

    fn narrow_src(&mut self, src: Ref, range: TableRange) {
        if let Ref::Var(v) = src {
            self.set_src(v, range);
        }
    }

    fn set_field(&mut self, op: &Op, id: Id, column: Option<usize>, up_src: Option<EntityId>) {
        if let Some(field) = op.field {
            self.regs.fields[usize::from(field)] = FieldState {
                id,
                column,
                set: true,
                up_src,
            };
        }
    }

    // =========================================================================
    // Matching
    // =========================================================================

    fn and(&mut self, op: &Op, ctx: &mut OpCtx, redo: bool) -> bool {
        let c = ctx_as!(ctx, And);
        let once = op.kind == OpKind::AndAny;
        if !redo {
            c.id = self.op_id(op);
            c.column = None;
            return match self.source(op.src) {
                Source::Missing => false,
                Source::Bound(range) => {
                    c.select = false;
                    c.table = range.table;
                    range.count > 0 && self.next_column(op, c)
                }
                Source::Free(v) => {
                    c.select = true;
                    c.src = v;
                    c.next_table = 0;
                    self.next_table(op, c)
                }
            };
        }

        if once && !c.select {
            return false;
        }
        if c.select {
            if op.flags.contains(MatchFlags::ANY_SRC) {
                return false;
            }
            if !once && self.next_column(op, c) {
                return true;
            }
            return self.next_table(op, c);
        }
        self.next_column(op, c)
    }

    fn next_column(&mut self, op: &Op, c: &mut AndCtx) -> bool {
        let table = self.world.table(c.table);
        let from = c.column.map_or(0, |col| col + 1);
        let Some(column) = table.find_column(c.id, from) else {
            return false;
        };
        let id = table.ty()[column];
        c.column = Some(column);
        self.bind_id(op, id);
        self.set_field(op, id, Some(column), None);
        true
    }

    fn next_table(&mut self, op: &Op, c: &mut AndCtx) -> bool {
        let world = self.world;
        let Some(record) = world.id_record(c.id) else {
            return false;
        };
        while let Some(tr) = record.tables().get(c.next_table) {
            c.next_table += 1;
            let table = world.table(tr.table);
            if table.is_empty() {
                continue;
            }
            self.set_src(c.src, TableRange::whole(table));
            c.table = tr.table;
            c.column = None;
            if self.next_column(op, c) {
                return true;
            }
        }
        false
    }

    fn up(&mut self, op: &Op, ctx: &mut OpCtx, redo: bool) -> bool {
        let c = ctx_as!(ctx, Up);
        let Some(rel) = op.trav else {
            return false;
        };
        if redo {
            if c.phase == UpPhase::Done || op.flags.contains(MatchFlags::ANY_SRC) {
                return false;
            }
            return self.next_up_table(op, rel, c);
        }

        c.id = self.op_id(op);
        match self.source(op.src) {
            Source::Missing => false,
            Source::Bound(range) => {
                c.phase = UpPhase::Done;
                let table = self.world.table(range.table);
                if op.kind == OpKind::SelfUp {
                    if let Some(column) = table.find_column(c.id, 0) {
                        let id = table.ty()[column];
                        self.bind_id(op, id);
                        self.set_field(op, id, Some(column), None);
                        return true;
                    }
                }
                let Some(hit) = self.cache.up_match(self.world, rel, range.table, c.id) else {
                    return false;
                };
                self.bind_id(op, hit.id);
                self.set_field(op, hit.id, Some(hit.column), Some(hit.src));
                true
            }
            Source::Free(v) => {
                c.src = v;
                c.next = 0;
                c.down = None;
                c.phase = if op.kind == OpKind::SelfUp {
                    UpPhase::SelfTables
                } else {
                    UpPhase::Down
                };
                self.next_up_table(op, rel, c)
            }
        }
    }

    fn next_up_table(&mut self, op: &Op, rel: EntityId, c: &mut UpCtx) -> bool {
        let world = self.world;
        loop {
            match c.phase {
                UpPhase::SelfTables => {
                    let tr = world
                        .id_record(c.id)
                        .and_then(|record| record.tables().get(c.next).copied());
                    let Some(tr) = tr else {
                        c.phase = UpPhase::Down;
                        c.next = 0;
                        continue;
                    };
                    c.next += 1;
                    let table = world.table(tr.table);
                    if table.is_empty() {
                        continue;
                    }
                    let id = table.ty()[tr.column];
                    self.set_src(c.src, TableRange::whole(table));
                    self.bind_id(op, id);
                    self.set_field(op, id, Some(tr.column), None);
                    return true;
                }
                UpPhase::Down => {
                    if c.down.is_none() {
                        c.down = Some(self.cache.down_tables(world, rel, c.id));
                    }
                    let entry = c.down.as_ref().and_then(|d| d.get(c.next).copied());
                    let Some(entry) = entry else {
                        c.phase = UpPhase::Done;
                        return false;
                    };
                    c.next += 1;
                    let table = world.table(entry.table);
                    if table.is_empty() {
                        continue;
                    }
                    self.set_src(c.src, TableRange::whole(table));
                    self.bind_id(op, entry.hit.id);
                    self.set_field(op, entry.hit.id, Some(entry.hit.column), Some(entry.hit.src));
                    return true;
                }
                UpPhase::Done => return false,
            }
        }
    }

    // =========================================================================
    // Transitive Closure
    // =========================================================================

    fn trav(&mut self, op: &Op, ctx: &mut OpCtx, redo: bool) -> bool {
        let c = ctx_as!(ctx, Trav);
        if redo {
            return match c.case {
                TravCase::Check => {
                    if let (Some(saved), Ref::Var(v)) = (c.saved.take(), op.src) {
                        self.set_src(v, saved);
                    }
                    false
                }
                TravCase::Down => self.trav_down_next(op, c),
                TravCase::Up => self.trav_up_next(op, c),
                TravCase::SameVar => self.trav_same_next(op, c),
            };
        }

        c.rel = self.resolve(op.first);
        c.saved = None;
        c.elems = None;
        c.elem = 0;
        c.table_idx = 0;
        c.row = 0;
        c.reflexive_done = !op.flags.contains(MatchFlags::REFLEXIVE);

        let second_free = op.second.var().filter(|&v| !self.is_bound(v));
        let same_var = match (op.src, second_free) {
            (Ref::Var(s), Some(t)) => self.program.vars[usize::from(s)].entity_id == Some(t),
            _ => false,
        };
        c.second = second_free;

        match (self.source(op.src), second_free) {
            (Source::Missing, _) => false,
            (Source::Bound(range), None) => {
                c.case = TravCase::Check;
                c.tgt = self.resolve(op.second);
                self.trav_check(op, c, range)
            }
            (Source::Free(v), None) => {
                c.case = TravCase::Down;
                c.src = Some(v);
                c.tgt = self.resolve(op.second);
                self.trav_down_next(op, c)
            }
            (Source::Bound(range), Some(_)) => {
                c.case = TravCase::Up;
                c.range = Some(range);
                c.src = op.src.var();
                // The target must be the source itself
                if same_var {
                    c.elems = Some(Vec::<EntityId>::new().into());
                }
                self.trav_up_next(op, c)
            }
            (Source::Free(v), Some(_)) => {
                if !same_var {
                    debug_assert!(false, "transitive match with both operands free");
                    return false;
                }
                c.case = TravCase::SameVar;
                c.src = Some(v);
                c.range = None;
                self.trav_same_next(op, c)
            }
        }
    }

    fn trav_check(&mut self, op: &Op, c: &mut TravCtx, range: TableRange) -> bool {
        let pair = Id::pair(c.rel, c.tgt);
        let table = self.world.table(range.table);
        if let Some(column) = table.column_of(pair) {
            self.set_field(op, pair, Some(column), None);
            return true;
        }
        if self.cache.trav_up(self.world, c.rel, range.table).contains(&c.tgt) {
            self.set_field(op, pair, None, None);
            return true;
        }
        if c.reflexive_done {
            return false;
        }
        let Some(row) = range.entities(self.world).iter().position(|&e| e == c.tgt) else {
            return false;
        };
        if range.count > 1 {
            c.saved = Some(range);
            self.narrow_src(op.src, range.narrow(row));
        }
        self.set_field(op, pair, None, None);
        true
    }

    fn trav_down_next(&mut self, op: &Op, c: &mut TravCtx) -> bool {
        let world = self.world;
        let Some(src) = c.src else {
            return false;
        };
        if !c.reflexive_done {
            c.reflexive_done = true;
            if let Some(range) = self.entity_range(c.tgt) {
                self.set_src(src, range);
                self.set_field(op, Id::pair(c.rel, c.tgt), None, None);
                return true;
            }
        }
        if c.elems.is_none() {
            c.elems = Some(self.cache.trav_down(world, c.rel, c.tgt));
        }
        loop {
            let Some(elem) = c.elems.as_ref().and_then(|e| e.get(c.elem).copied()) else {
                return false;
            };
            let pair = Id::pair(c.rel, elem);
            let tr = world
                .id_record(pair)
                .and_then(|record| record.tables().get(c.table_idx).copied());
            let Some(tr) = tr else {
                c.elem += 1;
                c.table_idx = 0;
                continue;
            };
            c.table_idx += 1;
            let table = world.table(tr.table);
            if table.is_empty() {
                continue;
            }
            self.set_src(src, TableRange::whole(table));
            self.set_field(op, pair, Some(tr.column), None);
            return true;
        }
    }

    fn trav_up_next(&mut self, op: &Op, c: &mut TravCtx) -> bool {
        let (Some(range), Some(second)) = (c.range, c.second) else {
            return false;
        };
        if !c.reflexive_done {
            if let Some(entity) = range.entity_at(self.world, c.row) {
                let row = c.row;
                c.row += 1;
                if range.count > 1 {
                    self.narrow_src(op.src, range.narrow(row));
                }
                self.set_entity(second, entity);
                self.set_field(op, Id::pair(c.rel, entity), None, None);
                return true;
            }
            c.reflexive_done = true;
            self.narrow_src(op.src, range);
        }
        if c.elems.is_none() {
            c.elems = Some(self.cache.trav_up(self.world, c.rel, range.table));
        }
        let Some(target) = c.elems.as_ref().and_then(|e| e.get(c.elem).copied()) else {
            return false;
        };
        c.elem += 1;
        let pair = Id::pair(c.rel, target);
        let column = self.world.table(range.table).column_of(pair);
        self.set_entity(second, target);
        self.set_field(op, pair, column, None);
        true
    }

    fn trav_same_next(&mut self, op: &Op, c: &mut TravCtx) -> bool {
        let world = self.world;
        let (Some(src), Some(second)) = (c.src, c.second) else {
            return false;
        };
        loop {
            if let Some(range) = c.range {
                if let Some(entity) = range.entity_at(world, c.row) {
                    let row = c.row;
                    c.row += 1;
                    self.set_src(src, range.narrow(row));
                    self.set_entity(second, entity);
                    self.set_field(op, Id::pair(c.rel, entity), None, None);
                    return true;
                }
                c.range = None;
            }
            let tr = world
                .id_record(Id::pair(c.rel, EntityId::WILDCARD))
                .and_then(|record| record.tables().get(c.table_idx).copied());
            let Some(tr) = tr else {
                return false;
            };
            c.table_idx += 1;
            let table = world.table(tr.table);
            if !table.is_empty() {
                c.range = Some(TableRange::whole(table));
                c.row = 0;
            }
        }
    }

    fn ids_right(&mut self, op: &Op, ctx: &mut OpCtx, redo: bool) -> bool {
        let c = ctx_as!(ctx, Ids);
        let Ref::Var(second) = op.second else {
            return false;
        };
        if !redo {
            c.ids = self.world.pair_ids(self.resolve(op.first));
            c.next = 0;
        }
        while let Some(id) = c.ids.get(c.next).copied() {
            c.next += 1;
            if let Some(target) = id.second() {
                self.set_entity(second, target);
                return true;
            }
        }
        false
    }

    // =========================================================================
    // Variables
    // =========================================================================

    fn each(&mut self, op: &Op, ctx: &mut OpCtx, redo: bool) -> bool {
        let c = ctx_as!(ctx, Rows);
        let (Ref::Var(table), Ref::Var(entity)) = (op.src, op.first) else {
            return false;
        };
        if !redo {
            let Some(range) = self.slot(table).range else {
                return false;
            };
            c.range = Some(range);
            c.row = 0;
        }
        let Some(range) = c.range else {
            return false;
        };
        match range.entity_at(self.world, c.row) {
            Some(e) => {
                self.set_src(table, range.narrow(c.row));
                self.set_entity(entity, e);
                c.row += 1;
                true
            }
            _ => {
                self.set_src(table, range);
                false
            }
        }
    }

    fn store(&mut self, op: &Op) -> bool {
        let Ref::Var(var) = op.src else {
            return false;
        };
        let value = self.resolve(op.first);
        if value.is_wildcard() {
            return false;
        }
        match self.kind_of(var) {
            VarKind::Entity => self.set_entity(var, value),
            VarKind::Table => {
                let Some(range) = self.entity_range(value) else {
                    return false;
                };
                self.set_src(var, range);
            }
        }
        self.set_field(op, Id::pair(EntityId::PRED_EQ, value), None, None);
        true
    }

    fn reset(&mut self, op: &Op) -> bool {
        if let Ref::Var(v) = op.src {
            if !self.is_bound(v) {
                *self.slot_mut(v) = VarSlot::default();
            }
        }
        true
    }

    fn lookup(&mut self, op: &Op) -> bool {
        let Ref::Var(var) = op.src else {
            return false;
        };
        let base = self.resolve(op.first);
        let Some(path) = self.program.vars[usize::from(var)].lookup.as_deref() else {
            return false;
        };
        match self.world.lookup_from(Some(base), path) {
            Some(found) => {
                self.set_entity(var, found);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Control Flow
    // =========================================================================

    fn union(op: &Op, ctx: &mut OpCtx, redo: bool) -> Flow {
        let OpCtx::Union(branch) = ctx else {
            return Flow::Prev;
        };
        *branch = if redo { *branch + 1 } else { 0 };
        op.branches.get(*branch).map_or(Flow::Prev, |&head| Flow::Jump(head))
    }

    /// Convergence point. Redo returns to the op that entered it, or to a
    /// fixed `other` label when one is set.
    fn end(&self, op: &Op, ctx: &mut OpCtx, redo: bool) -> Flow {
        let OpCtx::End(from) = ctx else {
            return Flow::Prev;
        };
        if redo {
            Flow::Jump(if op.other == EXHAUSTED { *from } else { op.other })
        } else {
            *from = self.prev_ip;
            Flow::Next
        }
    }

    fn not(&mut self, op: &Op) -> bool {
        let id = self.op_id(op);
        if let Some(field) = op.field {
            self.regs.fields[usize::from(field)] = FieldState {
                id,
                ..FieldState::default()
            };
        }
        for var in op.vars() {
            if !self.is_bound(var) {
                *self.slot_mut(var) = VarSlot::default();
            }
        }
        true
    }

    fn jmp_cond_false(op: &Op, ctx: &mut OpCtx, redo: bool) -> Flow {
        let OpCtx::Cond(cond) = ctx else {
            return Flow::Prev;
        };
        if !redo {
            *cond = false;
            return Flow::Next;
        }
        if *cond { Flow::Prev } else { Flow::Jump(op.other) }
    }

    fn jmp_not_set(&self, op: &Op, redo: bool) -> Flow {
        if redo {
            return Flow::Prev;
        }
        let unset = op
            .guard
            .iter()
            .any(|v| !self.is_bound(v) || self.slot(v).is_empty());
        if unset { Flow::Jump(op.other) } else { Flow::Next }
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    fn pred_test(&self, op: &Op, entity: EntityId) -> bool {
        let text = op.text.as_deref().unwrap_or_default();
        let name = self.world.name(entity);
        match op.kind {
            OpKind::PredEq => entity == self.resolve(op.second),
            OpKind::PredNeq => entity != self.resolve(op.second),
            OpKind::PredEqName => name == Some(text),
            OpKind::PredNeqName => name != Some(text),
            OpKind::PredEqMatch => name.is_some_and(|n| n.contains(text)),
            OpKind::PredNeqMatch => !name.is_some_and(|n| n.contains(text)),
            _ => false,
        }
    }

    fn pred_id(&self, op: &Op) -> Id {
        match op.kind {
            OpKind::PredEq | OpKind::PredNeq => {
                Id::pair(EntityId::PRED_EQ, self.resolve(op.second))
            }
            OpKind::PredEqMatch | OpKind::PredNeqMatch => {
                Id::pair(EntityId::PRED_MATCH, EntityId::WILDCARD)
            }
            _ => Id::pair(EntityId::PRED_EQ, EntityId::WILDCARD),
        }
    }

    fn predicate(&mut self, op: &Op, ctx: &mut OpCtx, redo: bool) -> bool {
        let c = ctx_as!(ctx, Rows);
        let Ref::Var(var) = op.src else {
            return false;
        };
        if self.kind_of(var) == VarKind::Entity {
            if redo {
                return false;
            }
            let Some(entity) = self.slot(var).entity else {
                return false;
            };
            if !self.pred_test(op, entity) {
                return false;
            }
            let id = self.pred_id(op);
            self.set_field(op, id, None, None);
            return true;
        }

        if !redo {
            c.range = self.slot(var).range;
            c.row = 0;
        }
        self.filter_rows(op, var, c)
    }

    /// Yields the matching rows of a table variable one at a time.
    fn filter_rows(&mut self, op: &Op, var: VarId, c: &mut RowCtx) -> bool {
        let Some(range) = c.range else {
            return false;
        };
        while c.row < range.count {
            let row = c.row;
            c.row += 1;
            let Some(entity) = range.entity_at(self.world, row) else {
                break;
            };
            if self.pred_test(op, entity) {
                self.set_src(var, range.narrow(row));
                let id = self.pred_id(op);
                self.set_field(op, id, None, None);
                return true;
            }
        }
        self.set_src(var, range);
        false
    }

    // =========================================================================
    // Bookkeeping
    // =========================================================================

    fn contain(&mut self, op: &Op, ctx: &mut OpCtx, redo: bool) -> bool {
        let OpCtx::Saved(saved) = ctx else {
            return false;
        };
        let Ref::Var(table) = op.src else {
            return false;
        };
        if redo {
            if let Some(slot) = saved.take() {
                *self.slot_mut(table) = slot;
            }
            return false;
        }
        let entity = self.resolve(op.first);
        let Some(range) = self.slot(table).range else {
            return false;
        };
        let Some(row) = range.entities(self.world).iter().position(|&e| e == entity) else {
            return false;
        };
        *saved = Some(self.slot(table));
        self.set_src(table, range.narrow(row));
        true
    }

    fn pair_eq(&self, op: &Op) -> bool {
        let Some(field) = op.field else {
            return false;
        };
        match self.regs.fields[usize::from(field)].id {
            Id::Pair(first, second) => first == second,
            Id::Entity(_) => false,
        }
    }

    fn set_this(&mut self, op: &Op, ctx: &mut OpCtx, redo: bool) -> bool {
        let OpCtx::Saved(saved) = ctx else {
            return false;
        };
        let Ref::Var(this) = op.src else {
            return false;
        };
        if redo {
            if let Some(slot) = saved.take() {
                *self.slot_mut(this) = slot;
            }
            return false;
        }
        let entity = self.resolve(op.first);
        let Some(range) = self.entity_range(entity) else {
            return false;
        };
        *saved = Some(self.slot(this));
        self.set_src(this, range);
        true
    }
}
