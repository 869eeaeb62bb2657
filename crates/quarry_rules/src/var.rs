//! Variable discovery.
//!
//! Variable 0 is always the table-valued iteration subject `$this`. Named
//! entity variables follow, then the table-valued twins of variables used as a
//! source, then anonymous variables the compiler adds. Only variable 0 and the
//! named entity variables are published to callers.

use quarry_foundation::{Error, ErrorKind, MAX_VARS, Result, VarId};

use crate::filter::Filter;
use crate::term::{THIS_NAME, TermId};

/// What a variable slot holds at run time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// A single entity.
    Entity,
    /// A range of rows in one table.
    Table,
}

/// One variable slot of a compiled rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleVar {
    /// Slot index.
    pub id: VarId,
    /// Entity or table valued.
    pub kind: VarKind,
    /// Name, for named variables (dotted for lookup variables).
    pub name: Option<String>,
    /// Entity variable: its table-valued twin.
    pub table_id: Option<VarId>,
    /// Table variable: its entity-valued twin.
    pub entity_id: Option<VarId>,
    /// Lookup variables: the path resolved relative to the base.
    pub lookup: Option<String>,
    /// Lookup variables: the variable the path is relative to.
    pub base_id: Option<VarId>,
}

impl RuleVar {
    /// Display form used in disassembly: `$x` for entities, `$[x]` for tables.
    #[must_use]
    pub fn label(&self) -> String {
        let name = self.name.clone().unwrap_or_else(|| format!("_{}", self.id));
        match self.kind {
            VarKind::Entity => format!("${name}"),
            VarKind::Table => format!("$[{name}]"),
        }
    }

    /// Returns true for compiler-generated variables.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }
}

/// The variables of one rule.
#[derive(Clone, Debug)]
pub(crate) struct VarTable {
    vars: Vec<RuleVar>,
    pub_count: usize,
    max: usize,
}

impl VarTable {
    /// Assigns slots to every variable the filter mentions.
    ///
    /// `max` is clamped to [`MAX_VARS`], the width of a [`VarMask`](quarry_foundation::VarMask).
    pub(crate) fn discover(filter: &Filter, max: usize) -> Result<Self> {
        let mut table = Self {
            vars: Vec::new(),
            pub_count: 0,
            max: max.min(MAX_VARS),
        };
        table.push(VarKind::Table, Some(THIS_NAME.to_string()))?;

        for term in filter.terms() {
            let positions = [
                (&term.src, true),
                (&term.first, false),
            ];
            for (id, is_src) in positions {
                if let TermId::Var(name) = id {
                    if !(is_src && name == THIS_NAME) {
                        table.ensure_entity(name)?;
                    }
                }
            }
            // Predicates compare against their right operand; they never introduce it
            if term.predicate.is_none() {
                if let Some(TermId::Var(name)) = &term.second {
                    table.ensure_entity(name)?;
                }
            }
        }
        table.pub_count = table.vars.len();

        for term in filter.terms() {
            if term.predicate.is_some() {
                continue;
            }
            let Some(name) = term.src.var_name() else {
                continue;
            };
            if name == THIS_NAME || name.contains('.') {
                continue;
            }
            let Some(entity) = table.find(name, VarKind::Entity) else {
                continue;
            };
            if table.vars[usize::from(entity)].table_id.is_none() {
                let twin = table.push(VarKind::Table, Some(name.to_string()))?;
                table.link(entity, twin);
            }
        }

        Ok(table)
    }

    fn ensure_entity(&mut self, name: &str) -> Result<VarId> {
        if let Some(id) = self.find(name, VarKind::Entity) {
            return Ok(id);
        }
        if let Some((base, path)) = name.split_once('.') {
            let base_id = self.ensure_entity(base)?;
            let id = self.push(VarKind::Entity, Some(name.to_string()))?;
            let var = &mut self.vars[usize::from(id)];
            var.lookup = Some(path.to_string());
            var.base_id = Some(base_id);
            return Ok(id);
        }
        let id = self.push(VarKind::Entity, Some(name.to_string()))?;
        if name == THIS_NAME {
            self.link(id, 0);
        }
        Ok(id)
    }

    fn link(&mut self, entity: VarId, table: VarId) {
        self.vars[usize::from(entity)].table_id = Some(table);
        self.vars[usize::from(table)].entity_id = Some(entity);
    }

    fn push(&mut self, kind: VarKind, name: Option<String>) -> Result<VarId> {
        if self.vars.len() >= self.max {
            return Err(Error::new(ErrorKind::TooManyVariables { limit: self.max }));
        }
        #[allow(clippy::cast_possible_truncation)]
        let id = self.vars.len() as VarId;
        self.vars.push(RuleVar {
            id,
            kind,
            name,
            table_id: None,
            entity_id: None,
            lookup: None,
            base_id: None,
        });
        Ok(id)
    }

    /// Adds a compiler-generated variable.
    pub(crate) fn add_anonymous(&mut self, kind: VarKind) -> Result<VarId> {
        self.push(kind, None)
    }

    /// Adds an anonymous table variable with an entity twin.
    pub(crate) fn add_anonymous_pair(&mut self) -> Result<(VarId, VarId)> {
        let table = self.push(VarKind::Table, None)?;
        let entity = self.push(VarKind::Entity, None)?;
        self.link(entity, table);
        Ok((table, entity))
    }

    pub(crate) fn find(&self, name: &str, kind: VarKind) -> Option<VarId> {
        self.vars
            .iter()
            .find(|v| v.kind == kind && v.name.as_deref() == Some(name))
            .map(|v| v.id)
    }

    pub(crate) fn get(&self, id: VarId) -> &RuleVar {
        &self.vars[usize::from(id)]
    }

    pub(crate) fn len(&self) -> usize {
        self.vars.len()
    }

    pub(crate) fn into_parts(self) -> (Vec<RuleVar>, usize) {
        (self.vars, self.pub_count)
    }
}
