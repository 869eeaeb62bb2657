//! Backtracking virtual machine for compiled rules.
//!
//! The VM walks the op array with a single instruction pointer. Each op either
//! succeeds (continue at `next`), fails (continue at `prev`), or jumps. Moving
//! to a lower label switches the VM into redo mode, in which the target op
//! produces its next alternative instead of starting over. Iteration ends when
//! control reaches label `-1`.
//!
//! # Written sets
//!
//! The compiler records which variables each op writes. At run time the VM
//! tracks, per op, the variables written on the path that reached it: moving
//! forward assigns `written[next] = written[ip] | op.written` (without
//! `op.written` on failure). Ops read this set to decide whether an operand is
//! bound.

// Labels are bounded by the op count, which the compiler keeps below i16::MAX
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

mod context;
mod exec;

pub use context::TableRange;

use quarry_foundation::{EntityId, Error, Result, VarId, VarMask};
use quarry_storage::{TableId, World};
use tracing::{debug, trace};

use crate::compiler::{FieldSrc, Program};
use crate::config::RuleConfig;
use crate::iter::{Field, Match};
use crate::op::{EXHAUSTED, Label, OpKind};
use crate::trav::TravCache;
use crate::var::VarKind;
use context::{FieldState, OpCtx, VarSlot};
use exec::{Exec, Flow};

/// Execution counts of one op.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OpProfile {
    /// Times the op ran in fresh mode.
    pub fresh: u64,
    /// Times the op ran in redo mode.
    pub redo: u64,
}

/// Variable and field registers.
#[derive(Clone, Debug, Default)]
pub(crate) struct Regs {
    pub vars: Vec<VarSlot>,
    pub fields: Vec<FieldState>,
    /// Per op: variables written on the path that reached it.
    pub written: Vec<VarMask>,
}

/// Run-time state of one rule iterator.
#[derive(Debug)]
pub(crate) struct Vm {
    regs: Regs,
    ctx: Vec<OpCtx>,
    cache: TravCache,
    ip: Label,
    prev_ip: Label,
    redo: bool,
    done: bool,
    /// Variables set by the caller before iterating.
    bound: VarMask,
    profile: Option<Vec<OpProfile>>,
    trace: bool,
    steps: u64,
    yielded: u64,
}

impl Vm {
    pub(crate) fn new(program: &Program, config: &RuleConfig) -> Self {
        let mut vm = Self {
            regs: Regs {
                vars: vec![VarSlot::default(); program.vars.len()],
                fields: vec![FieldState::default(); program.field_count],
                written: vec![VarMask::EMPTY; program.ops.len()],
            },
            ctx: Vec::with_capacity(program.ops.len()),
            cache: TravCache::default(),
            ip: 0,
            prev_ip: EXHAUSTED,
            redo: false,
            done: false,
            bound: VarMask::EMPTY,
            profile: config.profile.then(|| vec![OpProfile::default(); program.ops.len()]),
            trace: config.trace_steps,
            steps: 0,
            yielded: 0,
        };
        vm.restart(program);
        vm
    }

    /// Rewinds to the first op, keeping caller-bound variables.
    pub(crate) fn restart(&mut self, program: &Program) {
        self.ip = 0;
        self.prev_ip = EXHAUSTED;
        self.redo = false;
        self.done = program.ops.is_empty();
        self.steps = 0;
        self.yielded = 0;
        self.cache.clear();

        for (i, slot) in self.regs.vars.iter_mut().enumerate() {
            if !self.bound.contains(i as VarId) {
                *slot = VarSlot::default();
            }
        }
        self.regs.fields.fill(FieldState::default());
        self.regs.written.fill(VarMask::EMPTY);
        if let Some(first) = self.regs.written.first_mut() {
            *first = self.bound;
        }
        self.ctx.clear();
        self.ctx.extend(program.ops.iter().map(|op| OpCtx::for_op(op.kind)));
    }

    // =========================================================================
    // Variable Binding
    // =========================================================================

    /// Binds a variable to an entity before iteration.
    ///
    /// A table variable is bound to the entity's row; an entity variable with
    /// a table twin binds the twin as well.
    pub(crate) fn bind_entity(
        &mut self,
        program: &Program,
        world: &World,
        var: VarId,
        entity: EntityId,
    ) -> Result<()> {
        let rule_var = program
            .vars
            .get(usize::from(var))
            .ok_or_else(|| Error::variable_not_found(format!("#{var}")))?;
        let row = world
            .record(entity)
            .map(|record| TableRange::row(record.table, record.row));

        match rule_var.kind {
            VarKind::Entity => {
                self.set_slot(var, Some(entity), None);
                if let Some(table_var) = rule_var.table_id {
                    let range = row.ok_or_else(|| Error::entity_not_found(entity))?;
                    self.set_slot(table_var, None, Some(range));
                }
            }
            VarKind::Table => {
                let range = row.ok_or_else(|| Error::entity_not_found(entity))?;
                self.set_slot(var, None, Some(range));
                if let Some(entity_var) = rule_var.entity_id {
                    self.set_slot(entity_var, Some(entity), None);
                }
            }
        }
        self.restart(program);
        Ok(())
    }

    /// Binds a table variable to every row of a table before iteration.
    pub(crate) fn bind_table(
        &mut self,
        program: &Program,
        world: &World,
        var: VarId,
        table: TableId,
    ) -> Result<()> {
        let rule_var = program
            .vars
            .get(usize::from(var))
            .ok_or_else(|| Error::variable_not_found(format!("#{var}")))?;
        if rule_var.kind != VarKind::Table {
            return Err(Error::variable_not_found(format!(
                "{} is not a table variable",
                rule_var.label()
            )));
        }
        let range = world
            .tables()
            .find(|t| t.id() == table)
            .map(TableRange::whole)
            .ok_or_else(|| Error::internal(format!("unknown table {}", table.0)))?;
        self.set_slot(var, None, Some(range));
        self.restart(program);
        Ok(())
    }

    fn set_slot(&mut self, var: VarId, entity: Option<EntityId>, range: Option<TableRange>) {
        self.regs.vars[usize::from(var)] = VarSlot { entity, range };
        self.bound.insert(var);
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Runs until the next match. Returns false once the rule is exhausted.
    pub(crate) fn advance(&mut self, world: &World, program: &Program) -> bool {
        if self.done {
            return false;
        }

        while self.ip >= 0 {
            let ip = self.ip as usize;
            let op = &program.ops[ip];
            let redo = self.redo;
            self.steps += 1;
            if let Some(profile) = self.profile.as_mut() {
                let entry = &mut profile[ip];
                if redo {
                    entry.redo += 1;
                } else {
                    entry.fresh += 1;
                }
            }
            if self.trace {
                trace!(ip, op = op.kind.name(), redo, "step");
            }

            let flow = match op.kind {
                OpKind::Yield if !redo => {
                    self.yielded += 1;
                    self.redo = true;
                    return true;
                }
                OpKind::SetCond if !redo => {
                    if let Some(OpCtx::Cond(cond)) = self.ctx.get_mut(op.other as usize) {
                        *cond = true;
                    }
                    Flow::Next
                }
                OpKind::SetCond => Flow::Prev,
                _ => {
                    let written = self.regs.written[ip];
                    let mut exec = Exec {
                        world,
                        program,
                        regs: &mut self.regs,
                        cache: &mut self.cache,
                        written,
                        prev_ip: self.prev_ip,
                    };
                    exec.run(op, &mut self.ctx[ip], redo)
                }
            };

            let next = match flow {
                Flow::Next => op.next,
                Flow::Prev => op.prev,
                Flow::Jump(label) => label,
            };
            if next > self.ip {
                let gained = if flow == Flow::Prev { VarMask::EMPTY } else { op.written };
                self.regs.written[next as usize] = self.regs.written[ip] | gained;
            }
            self.redo = next < self.ip;
            self.prev_ip = self.ip;
            self.ip = next;
        }

        self.done = true;
        self.cache.clear();
        debug!(matches = self.yielded, steps = self.steps, "rule iterator exhausted");
        false
    }

    pub(crate) fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn profile(&self) -> Option<&[OpProfile]> {
        self.profile.as_deref()
    }

    // =========================================================================
    // Projection
    // =========================================================================

    /// The current match, read from the registers at the yield.
    pub(crate) fn project(&self, world: &World, program: &Program) -> Match {
        let written = self
            .regs
            .written
            .get(self.ip.max(0) as usize)
            .copied()
            .unwrap_or(VarMask::EMPTY);

        let this = written
            .contains(0)
            .then(|| self.regs.vars.first().copied())
            .flatten()
            .unwrap_or_default();
        let (table, entities) = match (this.range, this.entity) {
            (Some(range), _) => (Some(range.table), range.entities(world).to_vec()),
            (None, Some(entity)) => (world.table_of(entity), vec![entity]),
            (None, None) => (None, Vec::new()),
        };

        let fields = self
            .regs
            .fields
            .iter()
            .zip(&program.field_src)
            .map(|(state, &src)| Field {
                id: state.id,
                src: self.field_source(world, state, src, written),
                column: state.column,
                is_set: state.set,
            })
            .collect();

        let vars = (0..program.pub_count)
            .map(|v| {
                if !written.contains(v as VarId) {
                    return None;
                }
                let slot = self.regs.vars[v];
                slot.entity.or_else(|| {
                    slot.range
                        .filter(|range| range.count == 1)
                        .and_then(|range| range.entity_at(world, 0))
                })
            })
            .collect();

        Match::new(table, entities, fields, vars)
    }

    fn field_source(
        &self,
        world: &World,
        state: &FieldState,
        src: FieldSrc,
        written: VarMask,
    ) -> Option<EntityId> {
        if !state.set {
            return None;
        }
        if state.up_src.is_some() {
            return state.up_src;
        }
        match src {
            FieldSrc::This | FieldSrc::None => None,
            FieldSrc::Entity(e) => Some(e),
            FieldSrc::Var(v) if written.contains(v) => {
                let slot = self.regs.vars[usize::from(v)];
                slot.entity
                    .or_else(|| slot.range.and_then(|range| range.entity_at(world, 0)))
            }
            FieldSrc::Var(_) => None,
        }
    }
}
