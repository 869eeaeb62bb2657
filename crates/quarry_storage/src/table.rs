//! Archetype tables and the id index.
//!
//! Every entity lives in exactly one table, identified by its sorted type.
//! For each id (and each wildcard form of it) the index records which tables
//! hold it and at which columns, in table creation order.

use std::collections::HashMap;
use std::fmt;

use quarry_foundation::{EntityId, Id};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of a table in the world.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableId(pub u32);

impl TableId {
    /// The table of entities with an empty type.
    pub const ROOT: Self = Self(0);
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

// =============================================================================
// Table
// =============================================================================

/// All entities sharing one exact type.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Table {
    id: TableId,
    ty: Vec<Id>,
    entities: Vec<EntityId>,
}

impl Table {
    pub(crate) fn new(id: TableId, ty: Vec<Id>) -> Self {
        debug_assert!(ty.windows(2).all(|w| w[0] < w[1]), "table type must be sorted");
        Self {
            id,
            ty,
            entities: Vec::new(),
        }
    }

    /// The table's id.
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// The sorted ids every entity in this table has.
    #[must_use]
    pub fn ty(&self) -> &[Id] {
        &self.ty
    }

    /// Entities in row order.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Column of a concrete id.
    #[must_use]
    pub fn column_of(&self, id: Id) -> Option<usize> {
        self.ty.binary_search(&id).ok()
    }

    /// Returns true if the type contains the concrete id.
    #[must_use]
    pub fn has(&self, id: Id) -> bool {
        self.column_of(id).is_some()
    }

    /// First column at or after `from` whose id matches the (possibly wildcard) id.
    #[must_use]
    pub fn find_column(&self, id: Id, from: usize) -> Option<usize> {
        if !id.is_wildcard() {
            return self.column_of(id).filter(|&c| c >= from);
        }
        self.ty
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, col)| id.matches(**col))
            .map(|(c, _)| c)
    }

    /// Row of an entity in this table.
    #[must_use]
    pub fn row_of(&self, entity: EntityId) -> Option<usize> {
        self.entities.iter().position(|&e| e == entity)
    }

    pub(crate) fn push(&mut self, entity: EntityId) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Removes a row, returning the entity that moved into it (if any).
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<EntityId> {
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }
}

// =============================================================================
// Id Index
// =============================================================================

/// Where an id sits inside one table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableRecord {
    /// The table holding the id.
    pub table: TableId,
    /// First matching column.
    pub column: usize,
    /// Number of matching columns (more than one only for wildcard ids).
    pub count: usize,
}

/// The tables that hold one id.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IdRecord {
    id: Id,
    tables: Vec<TableRecord>,
    by_table: HashMap<TableId, usize>,
}

impl IdRecord {
    pub(crate) fn new(id: Id) -> Self {
        Self {
            id,
            tables: Vec::new(),
            by_table: HashMap::new(),
        }
    }

    /// The indexed id.
    #[must_use]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Table records in table creation order, empty tables included.
    #[must_use]
    pub fn tables(&self) -> &[TableRecord] {
        &self.tables
    }

    /// The record for one table.
    #[must_use]
    pub fn get(&self, table: TableId) -> Option<&TableRecord> {
        self.by_table.get(&table).map(|&i| &self.tables[i])
    }

    pub(crate) fn register(&mut self, table: TableId, column: usize) {
        if let Some(&i) = self.by_table.get(&table) {
            self.tables[i].count += 1;
        } else {
            self.by_table.insert(table, self.tables.len());
            self.tables.push(TableRecord {
                table,
                column,
                count: 1,
            });
        }
    }
}

/// The index keys a concrete id is registered under: itself plus its wildcard forms.
pub(crate) fn index_keys(id: Id) -> Vec<Id> {
    match id {
        Id::Entity(_) => vec![id, Id::WILDCARD],
        Id::Pair(r, t) => vec![
            id,
            Id::pair(r, EntityId::WILDCARD),
            Id::pair(EntityId::WILDCARD, t),
            Id::pair(EntityId::WILDCARD, EntityId::WILDCARD),
        ],
    }
}
