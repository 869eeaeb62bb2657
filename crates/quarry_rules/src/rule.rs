//! Compiled rules.

use quarry_foundation::{Result, VarId};
use quarry_storage::World;

use crate::compiler::{self, CompileScratch, Program};
use crate::config::RuleConfig;
use crate::explain;
use crate::filter::Filter;
use crate::iter::RuleIter;
use crate::op::Op;
use crate::term::THIS_NAME;
use crate::var::{RuleVar, VarKind};
use crate::vm::OpProfile;

/// A filter compiled into an instruction program.
///
/// A rule is immutable once compiled. Iterate it with [`Rule::iter`]; any
/// number of iterators may run over one rule at the same time.
///
/// # Example
///
/// ```
/// use quarry_rules::{Filter, Rule, Term, TermId};
/// use quarry_storage::World;
///
/// let mut world = World::new();
/// let likes = world.entity("Likes");
/// let alice = world.entity("alice");
/// let bob = world.entity("bob");
/// world.add_pair(alice, likes, bob).unwrap();
///
/// let filter = Filter::new(vec![Term::pair(likes, TermId::var("x"))]).unwrap();
/// let rule = Rule::new(&world, &filter).unwrap();
/// let x = rule.find_var("x").unwrap();
///
/// let m = rule.iter(&world).next().unwrap();
/// assert_eq!(m.entities(), &[alice]);
/// assert_eq!(m.var(x), Some(bob));
/// ```
#[derive(Clone, Debug)]
pub struct Rule {
    filter: Filter,
    config: RuleConfig,
    program: Program,
}

impl Rule {
    /// Compiles a filter with the default configuration.
    ///
    /// # Errors
    /// Returns an error if the filter cannot be compiled; see [`Rule::compile`].
    pub fn new(world: &World, filter: &Filter) -> Result<Self> {
        Self::with_config(world, filter, RuleConfig::default())
    }

    /// Compiles a filter with an explicit configuration.
    ///
    /// # Errors
    /// Returns an error if the filter cannot be compiled; see [`Rule::compile`].
    pub fn with_config(world: &World, filter: &Filter, config: RuleConfig) -> Result<Self> {
        Self::compile(world, filter, config, &mut CompileScratch::new())
    }

    /// Compiles a filter, reusing scratch buffers from earlier compilations.
    ///
    /// The world is consulted for relationship properties (transitive,
    /// reflexive, traversable) and for resolving fixed lookup paths.
    ///
    /// # Errors
    /// - `UnknownVariable` if a term reads a variable nothing binds
    /// - `UnwrittenOperand` if an equality reads an unwritten right operand
    /// - `NotTraversable` if `up`/`self_up` names a relationship without `Traversable`
    /// - `UnresolvedLookup` if a lookup base is never written
    /// - `UnconstrainedPredicate` if an inequality or name predicate reads an unwritten variable
    /// - `TooManyVariables` if the rule needs more slots than the configuration allows
    /// - `InvalidTerm` / `InvalidOperator` for structurally unusable terms
    pub fn compile(
        world: &World,
        filter: &Filter,
        config: RuleConfig,
        scratch: &mut CompileScratch,
    ) -> Result<Self> {
        let program = compiler::compile(world, filter, &config, scratch)?;
        Ok(Self {
            filter: filter.clone(),
            config,
            program,
        })
    }

    /// Starts iterating the rule.
    #[must_use]
    pub fn iter<'a>(&'a self, world: &'a World) -> RuleIter<'a> {
        RuleIter::new(self, world)
    }

    /// Returns true if the rule has at least one match.
    #[must_use]
    pub fn is_true(&self, world: &World) -> bool {
        self.iter(world).next().is_some()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The filter this rule was compiled from.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// The configuration this rule was compiled with.
    #[must_use]
    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// The compiled instructions.
    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.program.ops
    }

    /// All variable slots, anonymous ones included.
    #[must_use]
    pub fn vars(&self) -> &[RuleVar] {
        &self.program.vars
    }

    /// Number of published variables (`$this` and the named entity variables).
    #[must_use]
    pub fn var_count(&self) -> usize {
        self.program.pub_count
    }

    /// Number of fields in each match.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.program.field_count
    }

    /// Finds a published variable by name. `"this"` is variable 0.
    #[must_use]
    pub fn find_var(&self, name: &str) -> Option<VarId> {
        if name == THIS_NAME {
            return Some(0);
        }
        self.program.vars[..self.program.pub_count]
            .iter()
            .find(|v| v.kind == VarKind::Entity && v.name.as_deref() == Some(name))
            .map(|v| v.id)
    }

    /// Name of a variable.
    #[must_use]
    pub fn var_name(&self, var: VarId) -> Option<&str> {
        self.program.vars.get(usize::from(var))?.name.as_deref()
    }

    /// Returns true if a variable holds a single entity rather than a table range.
    #[must_use]
    pub fn var_is_entity(&self, var: VarId) -> bool {
        self.program
            .vars
            .get(usize::from(var))
            .is_some_and(|v| v.kind == VarKind::Entity)
    }

    /// Human-readable listing of the instructions.
    #[must_use]
    pub fn disassemble(&self, world: &World) -> String {
        explain::disassemble(&self.program, world, None)
    }

    /// Listing annotated with the execution counts of a profiled iterator.
    #[must_use]
    pub fn disassemble_profiled(&self, world: &World, profile: &[OpProfile]) -> String {
        explain::disassemble(&self.program, world, Some(profile))
    }

    pub(crate) fn program(&self) -> &Program {
        &self.program
    }
}
