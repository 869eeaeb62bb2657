//! Rule iteration and match results.

use quarry_foundation::{EntityId, Error, Id, Result, VarId};
use quarry_storage::{TableId, World};

use crate::rule::Rule;
use crate::vm::{OpProfile, Vm};

// =============================================================================
// Match
// =============================================================================

/// One field of a match.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// The matched id. For fields that are not set, the id the term asked for.
    pub id: Id,
    /// Entity the id was found on, when it is not the match's `$this`.
    pub src: Option<EntityId>,
    /// Column of the id in the source's table.
    pub column: Option<usize>,
    /// False for negated terms and optional terms that did not match.
    pub is_set: bool,
}

/// One result of a rule iterator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    table: Option<TableId>,
    entities: Vec<EntityId>,
    fields: Vec<Field>,
    vars: Vec<Option<EntityId>>,
}

impl Match {
    pub(crate) fn new(
        table: Option<TableId>,
        entities: Vec<EntityId>,
        fields: Vec<Field>,
        vars: Vec<Option<EntityId>>,
    ) -> Self {
        Self {
            table,
            entities,
            fields,
            vars,
        }
    }

    /// Table of the `$this` entities.
    #[must_use]
    pub fn table(&self) -> Option<TableId> {
        self.table
    }

    /// The `$this` entities matched together. Empty when the rule has no `$this` subject.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Number of `$this` entities.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entities.len()
    }

    /// All fields, in term order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// One field.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Matched id of a field.
    #[must_use]
    pub fn id(&self, index: usize) -> Option<Id> {
        self.field(index).map(|f| f.id)
    }

    /// Source entity of a field.
    #[must_use]
    pub fn src(&self, index: usize) -> Option<EntityId> {
        self.field(index).and_then(|f| f.src)
    }

    /// Returns true if a field is set.
    #[must_use]
    pub fn is_set(&self, index: usize) -> bool {
        self.field(index).is_some_and(|f| f.is_set)
    }

    /// Value of a published variable.
    #[must_use]
    pub fn var(&self, var: VarId) -> Option<EntityId> {
        self.vars.get(usize::from(var)).copied().flatten()
    }

    /// Values of all published variables, indexed by variable id.
    #[must_use]
    pub fn vars(&self) -> &[Option<EntityId>] {
        &self.vars
    }
}

// =============================================================================
// Iterator
// =============================================================================

/// A lazy stream of matches of one rule against one world.
///
/// Many iterators may run over the same rule at once. Each owns its variable
/// registers and traversal caches; dropping an iterator early releases them.
#[derive(Debug)]
pub struct RuleIter<'a> {
    rule: &'a Rule,
    world: &'a World,
    vm: Vm,
}

impl<'a> RuleIter<'a> {
    pub(crate) fn new(rule: &'a Rule, world: &'a World) -> Self {
        Self {
            rule,
            world,
            vm: Vm::new(rule.program(), rule.config()),
        }
    }

    /// Constrains a variable to an entity. Restarts iteration.
    ///
    /// Table variables (such as `$this`) are constrained to the entity's row.
    ///
    /// # Errors
    /// Returns `VariableNotFound` for an unknown variable id and
    /// `EntityNotFound` when a table variable is set to a dead entity.
    pub fn set_var(&mut self, var: VarId, entity: EntityId) -> Result<()> {
        self.vm.bind_entity(self.rule.program(), self.world, var, entity)
    }

    /// Constrains a table variable to every row of a table. Restarts iteration.
    ///
    /// # Errors
    /// Returns `VariableNotFound` if `var` is unknown or not table valued.
    pub fn set_var_table(&mut self, var: VarId, table: TableId) -> Result<()> {
        self.vm.bind_table(self.rule.program(), self.world, var, table)
    }

    /// Constrains a named variable to an entity. Restarts iteration.
    ///
    /// # Errors
    /// Returns `VariableNotFound` if the rule has no such variable.
    pub fn set_var_by_name(&mut self, name: &str, entity: EntityId) -> Result<()> {
        let var = self
            .rule
            .find_var(name)
            .ok_or_else(|| Error::variable_not_found(name))?;
        self.set_var(var, entity)
    }

    /// Per-op execution counts, when profiling is enabled.
    #[must_use]
    pub fn profile(&self) -> Option<&[OpProfile]> {
        self.vm.profile()
    }

    /// VM steps executed so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.vm.steps()
    }

    /// Drains the iterator, returning the number of matches.
    pub fn count_matches(&mut self) -> usize {
        let mut n = 0;
        while self.vm.advance(self.world, self.rule.program()) {
            n += 1;
        }
        n
    }
}

impl Iterator for RuleIter<'_> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        let program = self.rule.program();
        self.vm
            .advance(self.world, program)
            .then(|| self.vm.project(self.world, program))
    }
}
