//! Instruction compiler.
//!
//! Compilation is a single pass over the filter's terms. The compiler threads
//! two variable sets through the pass: `written` (variables every path reaching
//! the current position has bound) and `cond` (variables only some paths bound,
//! because an optional term or one branch of an or chain wrote them). Whether a
//! variable is written decides how a term is compiled: an unwritten source is
//! searched, a written one is tested; an unwritten operand is bound from the
//! matched id, a written one is read.
//!
//! # Layouts
//!
//! Negated terms are bracketed by `JmpCondFalse` and `Not`. The last op of the
//! negated term jumps back to the op before the bracket, so a match of the term
//! rejects the current candidate:
//!
//! ```text
//! j:  jfalse  other=n
//!     <term>            last.next = j-1
//! n:  not     prev=j-1
//! ```
//!
//! Optional terms add `SetCond` and a convergence `End`:
//!
//! ```text
//! j:  jfalse  other=n
//!     <term>
//! s:  setcond other=j   next=e
//! n:  not     prev=j-1
//! e:  end
//! ```
//!
//! A term reading a conditionally written variable is guarded by `JmpNotSet`,
//! which skips to a `Not` reporting the field as unset when the variable was not
//! bound on the current path.

// Labels are bounded by the op count, which `validate` keeps below i16::MAX
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

use quarry_foundation::{EntityId, Error, ErrorKind, Id, Result, VarId, VarMask};
use quarry_storage::World;
use tracing::{debug, warn};

use crate::config::RuleConfig;
use crate::filter::Filter;
use crate::op::{EXHAUSTED, Label, MatchFlags, Op, OpKind, Ref};
use crate::term::{Oper, Predicate, THIS_NAME, Term, TermFlags, TermId, Traverse};
use crate::var::{RuleVar, VarKind, VarTable};

/// Where a field's source entity comes from when a match is projected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldSrc {
    /// The `$this` entities of the match.
    This,
    /// A fixed entity.
    Entity(EntityId),
    /// An entity variable.
    Var(VarId),
    /// The source is not reported (`_`).
    None,
}

/// Reusable buffers for compiling many rules.
///
/// Pass the same scratch to consecutive [`Rule::compile`](crate::Rule::compile)
/// calls to avoid reallocating the op buffer.
#[derive(Debug, Default)]
pub struct CompileScratch {
    ops: Vec<Op>,
    heads: Vec<usize>,
    tails: Vec<usize>,
}

impl CompileScratch {
    /// Creates empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The output of compilation.
#[derive(Clone, Debug)]
pub(crate) struct Program {
    pub ops: Vec<Op>,
    pub vars: Vec<RuleVar>,
    pub pub_count: usize,
    pub field_src: Vec<FieldSrc>,
    pub field_count: usize,
}

/// Compiles a filter into a program.
pub(crate) fn compile(
    world: &World,
    filter: &Filter,
    config: &RuleConfig,
    scratch: &mut CompileScratch,
) -> Result<Program> {
    scratch.ops.clear();
    let result = VarTable::discover(filter, config.max_variables).and_then(|vars| {
        let mut compiler = Compiler {
            world,
            filter,
            config,
            vars,
            scratch: &mut *scratch,
            written: VarMask::EMPTY,
            cond: VarMask::EMPTY,
            field_src: vec![FieldSrc::None; filter.field_count()],
            lbl_prev: None,
        };
        compiler.run()?;
        let Compiler {
            vars, field_src, ..
        } = compiler;
        Ok((vars, field_src))
    });

    let (vars, field_src) = match result {
        Ok(parts) => parts,
        Err(e) => {
            warn!(kind = ?e.kind, "rule rejected");
            return Err(e);
        }
    };
    let ops = std::mem::take(&mut scratch.ops);
    validate(&ops)?;

    let (vars, pub_count) = vars.into_parts();
    debug!(
        terms = filter.terms().len(),
        vars = vars.len(),
        ops = ops.len(),
        "compiled rule"
    );
    Ok(Program {
        ops,
        vars,
        pub_count,
        field_src,
        field_count: filter.field_count(),
    })
}

fn label(index: usize) -> Label {
    index as Label
}

fn refs_mask(refs: &[Ref]) -> VarMask {
    refs.iter().filter_map(|r| r.var()).collect()
}

/// Plain operands of a compiled term, used by the `Not` that reports it unset.
#[derive(Copy, Clone, Debug)]
struct Operands {
    src: Ref,
    first: Ref,
    second: Ref,
    field: usize,
}

struct Compiler<'a> {
    world: &'a World,
    filter: &'a Filter,
    config: &'a RuleConfig,
    vars: VarTable,
    scratch: &'a mut CompileScratch,
    written: VarMask,
    cond: VarMask,
    field_src: Vec<FieldSrc>,
    /// Overrides the `prev` label of the next inserted op.
    lbl_prev: Option<Label>,
}

impl Compiler<'_> {
    fn run(&mut self) -> Result<()> {
        let filter = self.filter;
        if filter.is_empty() {
            self.insert(Op::new(OpKind::Nothing), VarMask::EMPTY);
            return Ok(());
        }

        let terms = filter.terms();
        let mut i = 0;
        while i < terms.len() {
            if terms[i].oper == Oper::Or {
                let end = (i..terms.len())
                    .find(|&j| terms[j].oper != Oper::Or)
                    .unwrap_or(terms.len());
                self.compile_or_chain(i, end)?;
                i = end;
            } else {
                self.compile_term(i).map_err(|e| e.at_term(i))?;
                i += 1;
            }
        }

        self.compile_tail()
    }

    // =========================================================================
    // Op Insertion
    // =========================================================================

    fn insert(&mut self, mut op: Op, writes: VarMask) -> usize {
        let index = self.scratch.ops.len();
        op.prev = self.lbl_prev.take().unwrap_or(label(index) - 1);
        op.next = label(index + 1);
        op.written = writes.difference(self.written);
        self.written |= op.written;
        self.cond = self.cond.difference(op.written);
        self.scratch.ops.push(op);
        index
    }

    fn last(&self) -> usize {
        self.scratch.ops.len() - 1
    }

    fn op_mut(&mut self, index: usize) -> &mut Op {
        &mut self.scratch.ops[index]
    }

    fn is_set(&self, var: VarId) -> bool {
        self.written.contains(var) || self.cond.contains(var)
    }

    // =========================================================================
    // Variable Resolution
    // =========================================================================

    /// Entity and table slots of a named variable.
    fn var_pair(&self, name: &str) -> (Option<VarId>, Option<VarId>) {
        if name == THIS_NAME {
            return (self.vars.find(THIS_NAME, VarKind::Entity), Some(0));
        }
        let entity = self.vars.find(name, VarKind::Entity);
        let table = entity.and_then(|e| self.vars.get(e).table_id);
        (entity, table)
    }

    /// The slot a term should use for a named source.
    fn most_specific(&self, name: &str) -> Result<VarId> {
        match self.var_pair(name) {
            (Some(entity), _) if self.is_set(entity) => Ok(entity),
            (_, Some(table)) => Ok(table),
            (Some(entity), None) => Ok(entity),
            (None, None) => Err(Error::unknown_variable(name)),
        }
    }

    /// Entity slot of a named variable, unrolling its table twin if only the twin is written.
    fn ensure_entity(&mut self, name: &str) -> Result<VarId> {
        let (Some(entity), table) = self.var_pair(name) else {
            return Err(Error::unknown_variable(name));
        };
        if !self.is_set(entity) {
            if let Some(table) = table.filter(|&t| self.is_set(t)) {
                let each = Op::new(OpKind::Each)
                    .with_src(Ref::Var(table))
                    .with_first(Ref::Var(entity));
                self.insert(each, VarMask::single(entity));
            }
        }
        Ok(entity)
    }

    fn resolve_lookup(&mut self, name: &str) -> Result<()> {
        let Some(var) = self.vars.find(name, VarKind::Entity) else {
            return Err(Error::unknown_variable(name));
        };
        if self.is_set(var) {
            return Ok(());
        }
        let base_name = self
            .vars
            .get(var)
            .base_id
            .and_then(|b| self.vars.get(b).name.clone())
            .ok_or_else(|| Error::new(ErrorKind::UnresolvedLookup(name.to_string())))?;
        let base = self.ensure_entity(&base_name)?;
        if !self.is_set(base) {
            return Err(Error::new(ErrorKind::UnresolvedLookup(name.to_string())));
        }
        let lookup = Op::new(OpKind::Lookup)
            .with_src(Ref::Var(var))
            .with_first(Ref::Var(base));
        self.insert(lookup, VarMask::single(var));
        Ok(())
    }

    fn resolve_id(&self, id: &TermId) -> Result<Ref> {
        match id {
            TermId::Entity(e) => Ok(Ref::Entity(*e)),
            TermId::Wildcard => Ok(Ref::Entity(EntityId::WILDCARD)),
            TermId::Any => Ok(Ref::Entity(EntityId::ANY)),
            TermId::Var(name) => self
                .var_pair(name)
                .0
                .map(Ref::Var)
                .ok_or_else(|| Error::unknown_variable(name.as_str())),
            TermId::Name(_) => Err(Error::invalid_term("literal name outside a predicate")),
        }
    }

    fn field_src_of(&self, var: VarId) -> FieldSrc {
        let v = self.vars.get(var);
        match v.kind {
            VarKind::Table if var == 0 => FieldSrc::This,
            VarKind::Table => v
                .entity_id
                .filter(|&e| !self.vars.get(e).is_anonymous())
                .map_or(FieldSrc::None, FieldSrc::Var),
            VarKind::Entity => FieldSrc::Var(var),
        }
    }

    /// Resolves a term source. Returns the operand, its field source, and for
    /// `*` sources the anonymous table/entity pair to unroll after the match.
    fn resolve_src(&mut self, src: &TermId) -> Result<(Ref, FieldSrc, Option<(VarId, VarId)>)> {
        match src {
            TermId::Entity(e) => Ok((Ref::Entity(*e), FieldSrc::Entity(*e), None)),
            TermId::Var(name) => {
                let var = self.most_specific(name)?;
                Ok((Ref::Var(var), self.field_src_of(var), None))
            }
            TermId::Wildcard => {
                let (table, entity) = self.vars.add_anonymous_pair()?;
                Ok((Ref::Var(table), FieldSrc::Var(entity), Some((table, entity))))
            }
            TermId::Any => {
                let table = self.vars.add_anonymous(VarKind::Table)?;
                Ok((Ref::Var(table), FieldSrc::None, None))
            }
            TermId::Name(_) => Err(Error::invalid_term("literal name as source")),
        }
    }

    /// Conditionally written variables a term reads.
    fn cond_vars(&self, term: &Term) -> VarMask {
        let mut guard = VarMask::EMPTY;
        for name in term.var_names() {
            let name = name.split_once('.').map_or(name, |(base, _)| base);
            let (entity, table) = self.var_pair(name);
            for var in [entity, table].into_iter().flatten() {
                if self.cond.contains(var) && !self.written.contains(var) {
                    guard.insert(var);
                }
            }
        }
        guard
    }

    // =========================================================================
    // Terms
    // =========================================================================

    fn compile_term(&mut self, ti: usize) -> Result<()> {
        let filter = self.filter;
        let term = &filter.terms()[ti];
        let guard = self.cond_vars(term);
        if guard.is_empty() {
            self.compile_prelude(term)?;
            self.compile_negatable(ti)?;
            return Ok(());
        }

        let saved = (self.written, self.cond);
        let mut jmp = Op::new(OpKind::JmpNotSet);
        jmp.guard = guard;
        let c = self.insert(jmp, VarMask::EMPTY);
        self.compile_prelude(term)?;
        let plain = self.compile_negatable(ti)?;
        let last = self.last();
        let term_writes = self.written.difference(saved.0);
        (self.written, self.cond) = saved;
        self.cond |= term_writes;

        let n = self.insert(self.not_op(ti, plain), VarMask::EMPTY);
        let e = self.insert(Op::new(OpKind::End), VarMask::EMPTY);
        self.op_mut(n).prev = label(c) - 1;
        self.op_mut(c).other = label(n);
        self.op_mut(last).next = label(e);
        Ok(())
    }

    /// Resolves lookup variables and unrolls operands that are only written as tables.
    fn compile_prelude(&mut self, term: &Term) -> Result<()> {
        for name in term.var_names() {
            if name.contains('.') {
                self.resolve_lookup(name)?;
            }
        }
        let operands = [Some(&term.first), term.second.as_ref()];
        for id in operands.into_iter().flatten() {
            if let TermId::Var(name) = id {
                if !name.contains('.') {
                    self.ensure_entity(name)?;
                }
            }
        }
        Ok(())
    }

    fn compile_negatable(&mut self, ti: usize) -> Result<Operands> {
        let filter = self.filter;
        let term = &filter.terms()[ti];
        if term.predicate.is_some() {
            return self.compile_predicate(ti, term.oper == Oper::Not);
        }
        match term.oper {
            Oper::Not => self.compile_not(ti),
            Oper::Optional => self.compile_optional(ti),
            Oper::And | Oper::Or => self.compile_body(ti),
        }
    }

    fn not_op(&self, ti: usize, plain: Operands) -> Op {
        let mut not = Op::new(OpKind::Not)
            .with_src(plain.src)
            .with_first(plain.first)
            .with_second(plain.second);
        not.field = Some(plain.field as u16);
        not.term = Some(ti as u16);
        not
    }

    fn compile_not(&mut self, ti: usize) -> Result<Operands> {
        let saved = (self.written, self.cond);
        let j = self.insert(Op::new(OpKind::JmpCondFalse), VarMask::EMPTY);
        let plain = self.compile_body(ti)?;
        let last = self.last();
        self.op_mut(last).next = label(j) - 1;
        (self.written, self.cond) = saved;

        let n = self.insert(self.not_op(ti, plain), VarMask::EMPTY);
        self.op_mut(n).prev = label(j) - 1;
        self.op_mut(j).other = label(n);
        Ok(plain)
    }

    fn compile_optional(&mut self, ti: usize) -> Result<Operands> {
        let saved = (self.written, self.cond);
        let j = self.insert(Op::new(OpKind::JmpCondFalse), VarMask::EMPTY);
        let plain = self.compile_body(ti)?;
        let inner_writes = self.written.difference(saved.0);

        let mut set_cond = Op::new(OpKind::SetCond);
        set_cond.other = label(j);
        let s = self.insert(set_cond, VarMask::EMPTY);
        (self.written, self.cond) = saved;
        self.cond |= inner_writes;

        let n = self.insert(self.not_op(ti, plain), VarMask::EMPTY);
        let e = self.insert(Op::new(OpKind::End), VarMask::EMPTY);
        self.op_mut(n).prev = label(j) - 1;
        self.op_mut(s).next = label(e);
        self.op_mut(j).other = label(n);
        Ok(plain)
    }

    fn compile_body(&mut self, ti: usize) -> Result<Operands> {
        let filter = self.filter;
        let term = &filter.terms()[ti];
        let field = filter.field_of(ti);

        let first = self.resolve_id(&term.first)?;
        let second = match &term.second {
            Some(id) => self.resolve_id(id)?,
            None => Ref::None,
        };
        let (src, field_src, unroll) = self.resolve_src(&term.src)?;
        self.field_src[field] = field_src;
        let plain = Operands {
            src,
            first,
            second,
            field,
        };

        if let Some(rel) = self.transitive_rel(term) {
            self.compile_trav(ti, rel, plain)?;
        } else {
            self.compile_match(ti, term, plain)?;
        }

        if let Some((table, entity)) = unroll {
            let each = Op::new(OpKind::Each)
                .with_src(Ref::Var(table))
                .with_first(Ref::Var(entity));
            self.insert(each, VarMask::single(entity));
        }
        Ok(plain)
    }

    fn compile_match(&mut self, ti: usize, term: &Term, plain: Operands) -> Result<()> {
        let Operands {
            src,
            first,
            second,
            field,
        } = plain;

        let (kind, trav) = match term.traverse {
            Traverse::Up(rel) | Traverse::SelfUp(rel) => {
                if !self.world.is_traversable(rel) {
                    return Err(Error::new(ErrorKind::NotTraversable(rel)));
                }
                let kind = if matches!(term.traverse, Traverse::Up(_)) {
                    OpKind::Up
                } else {
                    OpKind::SelfUp
                };
                (kind, Some(rel))
            }
            Traverse::SelfOnly => {
                let any = term.first == TermId::Any || term.second == Some(TermId::Any);
                let kind = if any {
                    OpKind::AndAny
                } else if matches!(src, Ref::Entity(_)) {
                    OpKind::With
                } else {
                    OpKind::And
                };
                (kind, None)
            }
        };

        let main_first = match self.inherited_first(term, kind) {
            Some(base) => self.compile_inheritance(base)?,
            None => first,
        };

        let before = self.written;
        let mut op = Op::new(kind)
            .with_src(src)
            .with_first(main_first)
            .with_second(second);
        op.field = Some(field as u16);
        op.term = Some(ti as u16);
        op.trav = trav;
        if term.traverse == Traverse::SelfOnly {
            op.flags |= MatchFlags::SELF;
        }
        if term.src == TermId::Any {
            op.flags |= MatchFlags::ANY_SRC;
        }
        self.insert(op, refs_mask(&[src, main_first, second]));

        // ($x, $x): both halves of the matched pair must agree
        if let (Ref::Var(f), Ref::Var(s)) = (first, second) {
            if f == s && !before.contains(f) {
                let mut check = Op::new(OpKind::PairEq);
                check.field = Some(field as u16);
                self.insert(check, VarMask::EMPTY);
            }
        }

        // Rel($x, $x): the entity bound as operand must be a row of the source table
        if let Ref::Var(table) = src {
            if let Some(entity) = self.vars.get(table).entity_id {
                let operand = [first, second].contains(&Ref::Var(entity));
                if operand && !before.contains(entity) {
                    let contain = Op::new(OpKind::Contain)
                        .with_src(src)
                        .with_first(Ref::Var(entity));
                    self.insert(contain, VarMask::EMPTY);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Component Inheritance
    // =========================================================================

    /// The literal first id of a term, if it should be resolved through `IsA` subtypes.
    fn inherited_first(&self, term: &Term, kind: OpKind) -> Option<EntityId> {
        if !self.config.inherit_components || term.flags.contains(TermFlags::NO_INHERIT) {
            return None;
        }
        if !matches!(kind, OpKind::And | OpKind::With | OpKind::AndAny) {
            return None;
        }
        let TermId::Entity(base) = term.first else {
            return None;
        };
        if base.is_builtin() || self.world.is_final(base) {
            return None;
        }
        let record = self.world.id_record(Id::pair(EntityId::IS_A, base))?;
        let has_subtypes = record
            .tables()
            .iter()
            .any(|tr| !self.world.table(tr.table).is_empty());
        has_subtypes.then_some(base)
    }

    /// Emits `IsA*(T, base)` and `each T -> E`; the term then reads its first id from `E`.
    fn compile_inheritance(&mut self, base: EntityId) -> Result<Ref> {
        let (table, entity) = self.vars.add_anonymous_pair()?;
        let mut trav = Op::new(OpKind::Trav)
            .with_src(Ref::Var(table))
            .with_first(Ref::Entity(EntityId::IS_A))
            .with_second(Ref::Entity(base));
        trav.flags = MatchFlags::REFLEXIVE;
        self.insert(trav, VarMask::single(table));

        let each = Op::new(OpKind::Each)
            .with_src(Ref::Var(table))
            .with_first(Ref::Var(entity));
        self.insert(each, VarMask::single(entity));
        Ok(Ref::Var(entity))
    }

    // =========================================================================
    // Transitive Relationships
    // =========================================================================

    fn transitive_rel(&self, term: &Term) -> Option<EntityId> {
        if term.flags.contains(TermFlags::NO_TRANSITIVE) || term.traverse != Traverse::SelfOnly {
            return None;
        }
        let TermId::Entity(rel) = term.first else {
            return None;
        };
        match &term.second {
            Some(TermId::Entity(t)) if !t.is_wildcard() => {}
            Some(TermId::Var(_)) => {}
            _ => return None,
        }
        self.world.is_transitive(rel).then_some(rel)
    }

    fn compile_trav(&mut self, ti: usize, rel: EntityId, plain: Operands) -> Result<()> {
        let Operands {
            src,
            second,
            field,
            ..
        } = plain;
        let reflexive = self.world.is_reflexive(rel);

        let same_var = match (src, second) {
            (Ref::Var(s), Ref::Var(t)) => self.vars.get(s).entity_id == Some(t),
            _ => false,
        };
        let src_free = matches!(src, Ref::Var(s) if !self.is_set(s));
        let second_free = matches!(second, Ref::Var(t) if !self.is_set(t));

        if same_var && second_free && !reflexive {
            return Err(Error::invalid_term(
                "same variable as source and target of a non-reflexive transitive relationship",
            ));
        }

        if src_free && second_free && !same_var {
            let ids = Op::new(OpKind::IdsRight)
                .with_first(Ref::Entity(rel))
                .with_second(second);
            self.insert(ids, refs_mask(&[second]));
        }

        let mut op = Op::new(OpKind::Trav)
            .with_src(src)
            .with_first(Ref::Entity(rel))
            .with_second(second);
        op.field = Some(field as u16);
        op.term = Some(ti as u16);
        if reflexive {
            op.flags |= MatchFlags::REFLEXIVE;
        }
        self.insert(op, refs_mask(&[src, second]));
        Ok(())
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    fn compile_predicate(&mut self, ti: usize, negate: bool) -> Result<Operands> {
        let filter = self.filter;
        let term = &filter.terms()[ti];
        let field = filter.field_of(ti);
        let Some(mut pred) = term.predicate else {
            return Err(Error::internal("predicate expected"));
        };
        if negate {
            pred = pred.negate();
        }
        let lhs = term
            .src
            .var_name()
            .ok_or_else(|| Error::invalid_term("predicate left operand must be a variable"))?;

        let (entity, table) = self.var_pair(lhs);
        let src = match (entity, table) {
            (Some(e), _) if self.is_set(e) => Some(e),
            (_, Some(t)) if self.is_set(t) => Some(t),
            _ => None,
        };

        let rhs = match (&term.second, pred.compares_names()) {
            (Some(TermId::Entity(e)), false) => Ref::Entity(*e),
            (Some(TermId::Var(name)), false) => {
                let var = self
                    .vars
                    .find(name, VarKind::Entity)
                    .ok_or_else(|| Error::unknown_variable(name.as_str()))?;
                if !self.is_set(var) {
                    return Err(Error::unwritten_operand(name.as_str()));
                }
                Ref::Var(var)
            }
            _ => Ref::None,
        };
        let text = match &term.second {
            Some(TermId::Name(text)) => Some(text.clone()),
            _ => None,
        };

        let Some(src_var) = src else {
            let target = entity.or(table).ok_or_else(|| Error::unknown_variable(lhs))?;
            if pred != Predicate::Eq {
                return Err(Error::new(ErrorKind::UnconstrainedPredicate(lhs.to_string())));
            }
            let mut store = Op::new(OpKind::Store)
                .with_src(Ref::Var(target))
                .with_first(rhs);
            store.field = Some(field as u16);
            store.term = Some(ti as u16);
            self.field_src[field] = self.field_src_of(target);
            self.insert(store, VarMask::single(target));
            return Ok(Operands {
                src: Ref::Var(target),
                first: Ref::Entity(EntityId::PRED_EQ),
                second: rhs,
                field,
            });
        };

        let kind = match pred {
            Predicate::Eq => OpKind::PredEq,
            Predicate::Neq => OpKind::PredNeq,
            Predicate::EqName => OpKind::PredEqName,
            Predicate::NeqName => OpKind::PredNeqName,
            Predicate::Match => OpKind::PredEqMatch,
            Predicate::NeqMatch => OpKind::PredNeqMatch,
        };
        let first = if matches!(pred, Predicate::Match | Predicate::NeqMatch) {
            EntityId::PRED_MATCH
        } else {
            EntityId::PRED_EQ
        };
        let mut op = Op::new(kind)
            .with_src(Ref::Var(src_var))
            .with_first(Ref::Entity(first))
            .with_second(rhs);
        op.field = Some(field as u16);
        op.term = Some(ti as u16);
        op.text = text;
        self.field_src[field] = self.field_src_of(src_var);
        self.insert(op, VarMask::EMPTY);
        Ok(Operands {
            src: Ref::Var(src_var),
            first: Ref::Entity(first),
            second: rhs,
            field,
        })
    }

    // =========================================================================
    // Or Chains
    // =========================================================================

    fn compile_or_chain(&mut self, start: usize, end: usize) -> Result<()> {
        let filter = self.filter;
        let terms = &filter.terms()[start..end];
        if terms[0].src.is_wildcard() {
            return Err(Error::new(ErrorKind::InvalidOperator(
                "or chains cannot have a wildcard source".to_string(),
            ))
            .at_term(start));
        }

        let mut guard = VarMask::EMPTY;
        for term in terms {
            guard |= self.cond_vars(term);
        }
        let outer = (self.written, self.cond);
        let guard_op = if guard.is_empty() {
            None
        } else {
            let mut jmp = Op::new(OpKind::JmpNotSet);
            jmp.guard = guard;
            Some(self.insert(jmp, VarMask::EMPTY))
        };

        let union = match &terms[0].src {
            TermId::Var(name) => {
                let var = self.most_specific(name).map_err(|e| e.at_term(start))?;
                !self.is_set(var)
            }
            _ => false,
        };

        let begin = (self.written, self.cond);
        let mut all: Option<VarMask> = None;
        let mut any = VarMask::EMPTY;
        self.scratch.heads.clear();
        self.scratch.tails.clear();

        let union_op = union.then(|| self.insert(Op::new(OpKind::Union), VarMask::EMPTY));
        let before = label(self.scratch.ops.len()) - 1;

        for ti in start..end {
            (self.written, self.cond) = begin;
            if let Some(u) = union_op {
                self.lbl_prev = Some(label(u));
            }
            let head = self.scratch.ops.len();
            let term = &filter.terms()[ti];
            self.compile_prelude(term).map_err(|e| e.at_term(ti))?;
            self.compile_body(ti).map_err(|e| e.at_term(ti))?;
            self.scratch.heads.push(head);
            self.scratch.tails.push(self.last());

            let writes = self.written.difference(begin.0);
            all = Some(all.map_or(writes, |a| a & writes));
            any |= writes;
        }
        (self.written, self.cond) = begin;

        let heads = std::mem::take(&mut self.scratch.heads);
        let mut tails = std::mem::take(&mut self.scratch.tails);
        if let Some(u) = union_op {
            let e = self.insert(Op::new(OpKind::End), VarMask::EMPTY);
            self.op_mut(e).prev = label(u);
            for &tail in &tails {
                self.op_mut(tail).next = label(e);
            }
            self.op_mut(u).branches = heads.iter().map(|&h| label(h)).collect();
        } else {
            // First success wins: a failing branch falls through to the next one
            let after = label(self.scratch.ops.len());
            for (k, &head) in heads.iter().enumerate() {
                let fallback = heads.get(k + 1).map_or(before, |&h| label(h));
                self.op_mut(head).prev = fallback;
            }
            for &tail in &tails {
                self.op_mut(tail).next = after;
            }
            self.lbl_prev = Some(before);
        }
        let all = all.unwrap_or(VarMask::EMPTY);
        let partial = any.difference(all);
        self.written |= all;
        for var in partial.iter() {
            self.insert(Op::new(OpKind::Reset).with_src(Ref::Var(var)), VarMask::EMPTY);
        }
        self.cond = (self.cond | partial).difference(self.written);

        if let Some(c) = guard_op {
            let last = self.last();
            let chain_writes = self.written.difference(outer.0);
            (self.written, self.cond) = outer;
            self.cond |= chain_writes;

            let mut not = Op::new(OpKind::Not);
            not.field = Some(filter.field_of(start) as u16);
            not.term = Some(start as u16);
            let n = self.insert(not, VarMask::EMPTY);
            let e = self.insert(Op::new(OpKind::End), VarMask::EMPTY);
            self.op_mut(n).prev = label(c) - 1;
            self.op_mut(c).other = label(n);
            self.op_mut(last).next = label(e);
            if union_op.is_none() {
                // Redo leaves a first-success chain instead of resuming its branch
                self.op_mut(e).other = before;
            }
            tails.push(last);
            for &tail in &tails {
                if self.scratch.ops[tail].next == label(n) {
                    self.op_mut(tail).next = label(e);
                }
            }
        }
        self.scratch.heads = heads;
        self.scratch.tails = tails;
        Ok(())
    }

    // =========================================================================
    // Tail
    // =========================================================================

    fn compile_tail(&mut self) -> Result<()> {
        if let Some(this_entity) = self.vars.find(THIS_NAME, VarKind::Entity) {
            if self.written.contains(this_entity) && !self.written.contains(0) {
                let set_this = Op::new(OpKind::SetThis)
                    .with_src(Ref::Var(0))
                    .with_first(Ref::Var(this_entity));
                self.insert(set_this, VarMask::single(0));
            }
        }

        let unrolls: Vec<(VarId, VarId)> = (0..self.vars.len())
            .filter_map(|i| {
                let var = self.vars.get(i as VarId);
                let named = var.kind == VarKind::Entity && !var.is_anonymous();
                let table = var.table_id.filter(|&t| t != 0)?;
                (named && var.lookup.is_none()).then_some((table, var.id))
            })
            .filter(|&(table, entity)| {
                self.written.contains(table) && !self.written.contains(entity)
            })
            .collect();
        for (table, entity) in unrolls {
            let each = Op::new(OpKind::Each)
                .with_src(Ref::Var(table))
                .with_first(Ref::Var(entity));
            self.insert(each, VarMask::single(entity));
        }

        self.insert(Op::new(OpKind::Yield), VarMask::EMPTY);
        Ok(())
    }
}

/// Checks every label of a finished program.
fn validate(ops: &[Op]) -> Result<()> {
    if ops.len() >= i16::MAX as usize {
        return Err(Error::internal(format!("program too long: {} ops", ops.len())));
    }
    let len = label(ops.len());
    let in_range = |l: Label| (0..len).contains(&l);
    for (i, op) in ops.iter().enumerate() {
        let terminal = matches!(op.kind, OpKind::Yield | OpKind::Nothing);
        let prev_ok = op.prev == EXHAUSTED || in_range(op.prev);
        let next_ok = terminal || op.next == EXHAUSTED || in_range(op.next);
        let other_ok = match op.kind {
            OpKind::JmpCondFalse | OpKind::SetCond | OpKind::JmpNotSet => in_range(op.other),
            OpKind::End => op.other == EXHAUSTED || in_range(op.other),
            _ => true,
        };
        let branches_ok = op.branches.iter().all(|&b| in_range(b));
        if !(prev_ok && next_ok && other_ok && branches_ok) {
            return Err(Error::internal(format!("op {i} ({}) has a label out of range", op.kind)));
        }
    }
    Ok(())
}
