//! World state: entities, tables, the id index, and names.
//!
//! The `World` uses persistent data structures so cloning it is cheap, which
//! lets callers snapshot a world before mutating it.

// Allow u64/usize to u32 casts - table counts stay far below u32::MAX
#![allow(clippy::cast_possible_truncation)]

use im::{HashMap, Vector};
use quarry_foundation::{EntityId, Error, ErrorKind, Id, Result};
use tracing::trace;

use crate::entity::EntityStore;
use crate::table::{IdRecord, Table, TableId, index_keys};

/// Where an entity is stored.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Record {
    /// The entity's table.
    pub table: TableId,
    /// The entity's row in that table.
    pub row: usize,
    /// Set once the entity is the target of some pair, so traversals know
    /// whether it is worth looking for tables below it.
    pub traversable: bool,
}

/// The unified interface to entity-component storage.
#[derive(Clone, Debug)]
pub struct World {
    entities: EntityStore,
    records: HashMap<EntityId, Record>,
    tables: Vector<Table>,
    table_index: HashMap<Vec<Id>, TableId>,
    id_index: HashMap<Id, IdRecord>,
    names: HashMap<EntityId, String>,
    scopes: HashMap<(EntityId, String), EntityId>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world holding only the builtin entities.
    #[must_use]
    pub fn new() -> Self {
        let mut world = Self {
            entities: EntityStore::new(),
            records: HashMap::new(),
            tables: Vector::new(),
            table_index: HashMap::new(),
            id_index: HashMap::new(),
            names: HashMap::new(),
            scopes: HashMap::new(),
        };
        world.tables.push_back(Table::new(TableId::ROOT, Vec::new()));
        world.table_index.insert(Vec::new(), TableId::ROOT);

        for (entity, name) in EntityId::BUILTINS {
            world.place(entity, TableId::ROOT);
            world.names.insert(entity, name.to_string());
            world.scopes.insert((EntityId::null(), name.to_string()), entity);
        }
        // Builtin relationships
        for rel in [EntityId::IS_A, EntityId::CHILD_OF] {
            world.add_unchecked(rel, Id::from(EntityId::TRAVERSABLE));
        }
        world.add_unchecked(EntityId::IS_A, Id::from(EntityId::TRANSITIVE));
        world.add_unchecked(EntityId::IS_A, Id::from(EntityId::REFLEXIVE));
        world
    }

    // =========================================================================
    // Entity Lifecycle
    // =========================================================================

    /// Creates an anonymous entity with an empty type.
    pub fn spawn(&mut self) -> EntityId {
        let entity = self.entities.spawn();
        self.place(entity, TableId::ROOT);
        entity
    }

    /// Returns the root-scoped entity with this name, creating it if needed.
    pub fn entity(&mut self, name: &str) -> EntityId {
        if let Some(&existing) = self.scopes.get(&(EntityId::null(), name.to_string())) {
            return existing;
        }
        let entity = self.spawn();
        self.names.insert(entity, name.to_string());
        self.scopes.insert((EntityId::null(), name.to_string()), entity);
        entity
    }

    /// Creates a named child of `parent`.
    ///
    /// # Errors
    /// Returns an error if `parent` is not alive or already has a child with that name.
    pub fn child(&mut self, parent: EntityId, name: &str) -> Result<EntityId> {
        self.entities.validate(parent)?;
        if self.scopes.contains_key(&(parent, name.to_string())) {
            return Err(Error::new(ErrorKind::DuplicateName(name.to_string())));
        }
        let entity = self.spawn();
        self.names.insert(entity, name.to_string());
        self.add_unchecked(entity, Id::pair(EntityId::CHILD_OF, parent));
        Ok(entity)
    }

    /// Deletes an entity and frees its id.
    ///
    /// Children of the entity are deleted with it. Every other id that mentions
    /// the entity, as a component or as either side of a pair, is removed from
    /// the entities holding it.
    ///
    /// # Errors
    /// Returns an error if the entity is not alive or is a builtin.
    pub fn delete(&mut self, entity: EntityId) -> Result<()> {
        self.entities.validate(entity)?;
        if entity.is_builtin() {
            return Err(Error::internal(format!("cannot delete builtin {entity:?}")));
        }
        for (child, _) in self.holders(Id::pair(EntityId::CHILD_OF, entity)) {
            if child != entity {
                self.delete(child)?;
            }
        }
        let references = [
            Id::from(entity),
            Id::pair(entity, EntityId::WILDCARD),
            Id::pair(EntityId::WILDCARD, entity),
        ];
        for key in references {
            for (holder, ids) in self.holders(key) {
                if holder == entity {
                    continue;
                }
                for id in ids {
                    self.remove(holder, id)?;
                }
            }
        }

        let scope = self.parent(entity).unwrap_or(EntityId::null());
        if let Some(name) = self.names.remove(&entity) {
            if self.scopes.get(&(scope, name.clone())) == Some(&entity) {
                self.scopes.remove(&(scope, name));
            }
        }
        if let Some(record) = self.records.remove(&entity) {
            let table = &mut self.tables[record.table.0 as usize];
            if let Some(moved) = table.swap_remove(record.row) {
                if let Some(r) = self.records.get_mut(&moved) {
                    r.row = record.row;
                }
            }
        }
        trace!(entity = entity.index, "deleted entity");
        self.entities.destroy(entity)
    }

    /// Returns true if the entity is alive.
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.exists(entity)
    }

    /// Number of live entities, builtins included.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // =========================================================================
    // Ids
    // =========================================================================

    /// Adds an id to an entity. Adding an id the entity already has is a no-op.
    ///
    /// # Errors
    /// Returns an error if the entity (or a pair target) is not alive, or if the id
    /// contains a wildcard.
    pub fn add(&mut self, entity: EntityId, id: impl Into<Id>) -> Result<()> {
        let id = id.into();
        self.entities.validate(entity)?;
        self.entities.validate(id.first())?;
        if let Some(target) = id.second() {
            self.entities.validate(target)?;
        }
        if id.is_wildcard() {
            return Err(Error::internal(format!("cannot add wildcard id {id:?}")));
        }
        self.add_unchecked(entity, id);
        Ok(())
    }

    /// Adds a `(relationship, target)` pair.
    ///
    /// # Errors
    /// See [`World::add`].
    pub fn add_pair(&mut self, entity: EntityId, rel: EntityId, target: EntityId) -> Result<()> {
        self.add(entity, Id::pair(rel, target))
    }

    /// Removes an id from an entity. Removing an absent id is a no-op.
    ///
    /// # Errors
    /// Returns an error if the entity is not alive.
    pub fn remove(&mut self, entity: EntityId, id: impl Into<Id>) -> Result<()> {
        let id = id.into();
        self.entities.validate(entity)?;
        let Some(record) = self.records.get(&entity).copied() else {
            return Err(Error::entity_not_found(entity));
        };
        let current = &self.tables[record.table.0 as usize];
        if !current.has(id) {
            return Ok(());
        }
        let ty: Vec<Id> = current.ty().iter().copied().filter(|&c| c != id).collect();
        let renamed_scope = id.first() == EntityId::CHILD_OF;
        let old_parent = self.parent(entity);
        let table = self.find_or_create_table(ty);
        self.move_entity(entity, record, table);
        if renamed_scope {
            self.rescope(entity, old_parent);
        }
        Ok(())
    }

    /// Returns true if the entity has the concrete id.
    #[must_use]
    pub fn has(&self, entity: EntityId, id: impl Into<Id>) -> bool {
        let id = id.into();
        self.table_of(entity).is_some_and(|t| self.table(t).has(id))
    }

    /// The entity's type, sorted.
    #[must_use]
    pub fn type_of(&self, entity: EntityId) -> &[Id] {
        self.table_of(entity).map_or(&[][..], |t| self.table(t).ty())
    }

    /// Targets of `(rel, *)` pairs on the entity, in column order.
    pub fn targets(&self, entity: EntityId, rel: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.type_of(entity).iter().filter_map(move |id| match id {
            Id::Pair(r, t) if *r == rel => Some(*t),
            _ => None,
        })
    }

    fn add_unchecked(&mut self, entity: EntityId, id: Id) {
        let Some(record) = self.records.get(&entity).copied() else {
            return;
        };
        let current = &self.tables[record.table.0 as usize];
        if current.has(id) {
            return;
        }
        let old_parent = self.parent(entity);
        let mut ty = current.ty().to_vec();
        let pos = ty.binary_search(&id).unwrap_or_else(|p| p);
        ty.insert(pos, id);
        let table = self.find_or_create_table(ty);
        self.move_entity(entity, record, table);

        if let Id::Pair(rel, target) = id {
            if let Some(r) = self.records.get_mut(&target) {
                r.traversable = true;
            }
            if rel == EntityId::CHILD_OF {
                self.rescope(entity, old_parent);
            }
        }
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// The table an entity is stored in.
    #[must_use]
    pub fn table_of(&self, entity: EntityId) -> Option<TableId> {
        self.record(entity).map(|r| r.table)
    }

    /// The storage record of an entity.
    #[must_use]
    pub fn record(&self, entity: EntityId) -> Option<Record> {
        if !self.entities.exists(entity) {
            return None;
        }
        self.records.get(&entity).copied()
    }

    /// Looks up a table by id.
    ///
    /// # Panics
    /// Panics if the id does not belong to this world.
    #[must_use]
    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0 as usize]
    }

    /// All tables in creation order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// The id index record for a (possibly wildcard) id.
    ///
    /// `_` positions are looked up as `*`.
    #[must_use]
    pub fn id_record(&self, id: Id) -> Option<&IdRecord> {
        self.id_index.get(&id.any_to_wildcard())
    }

    /// Concrete pair ids `(rel, t)` present in any non-empty table, in first-seen order.
    #[must_use]
    pub fn pair_ids(&self, rel: EntityId) -> Vec<Id> {
        let mut out: Vec<Id> = Vec::new();
        let Some(record) = self.id_record(Id::pair(rel, EntityId::WILDCARD)) else {
            return out;
        };
        for tr in record.tables() {
            let table = self.table(tr.table);
            if table.is_empty() {
                continue;
            }
            for id in &table.ty()[tr.column..tr.column + tr.count] {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        }
        out
    }

    /// Entities in non-empty tables matching `key`, each with the concrete ids that matched.
    fn holders(&self, key: Id) -> Vec<(EntityId, Vec<Id>)> {
        let Some(record) = self.id_record(key) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for tr in record.tables() {
            let table = self.table(tr.table);
            let ids = &table.ty()[tr.column..tr.column + tr.count];
            for &holder in table.entities() {
                out.push((holder, ids.to_vec()));
            }
        }
        out
    }

    fn find_or_create_table(&mut self, ty: Vec<Id>) -> TableId {
        if let Some(&existing) = self.table_index.get(&ty) {
            return existing;
        }
        let id = TableId(self.tables.len() as u32);
        for (column, &col_id) in ty.iter().enumerate() {
            for key in index_keys(col_id) {
                self.id_index
                    .entry(key)
                    .or_insert_with(|| IdRecord::new(key))
                    .register(id, column);
            }
        }
        trace!(table = id.0, columns = ty.len(), "created table");
        self.table_index.insert(ty.clone(), id);
        self.tables.push_back(Table::new(id, ty));
        id
    }

    fn place(&mut self, entity: EntityId, table: TableId) {
        let row = self.tables[table.0 as usize].push(entity);
        self.records.insert(
            entity,
            Record {
                table,
                row,
                traversable: false,
            },
        );
    }

    fn move_entity(&mut self, entity: EntityId, record: Record, to: TableId) {
        if let Some(moved) = self.tables[record.table.0 as usize].swap_remove(record.row) {
            if let Some(r) = self.records.get_mut(&moved) {
                r.row = record.row;
            }
        }
        let row = self.tables[to.0 as usize].push(entity);
        if let Some(r) = self.records.get_mut(&entity) {
            r.table = to;
            r.row = row;
        }
    }

    // =========================================================================
    // Relationship Properties
    // =========================================================================

    /// Returns true if the relationship carries `Transitive`.
    #[must_use]
    pub fn is_transitive(&self, rel: EntityId) -> bool {
        self.has(rel, EntityId::TRANSITIVE)
    }

    /// Returns true if the relationship carries `Reflexive`.
    #[must_use]
    pub fn is_reflexive(&self, rel: EntityId) -> bool {
        self.has(rel, EntityId::REFLEXIVE)
    }

    /// Returns true if the relationship may be followed by up/down traversal.
    #[must_use]
    pub fn is_traversable(&self, rel: EntityId) -> bool {
        self.has(rel, EntityId::TRAVERSABLE) || self.is_transitive(rel)
    }

    /// Returns true if the entity cannot be inherited from.
    #[must_use]
    pub fn is_final(&self, entity: EntityId) -> bool {
        self.has(entity, EntityId::FINAL)
    }

    // =========================================================================
    // Names
    // =========================================================================

    /// The entity's name.
    #[must_use]
    pub fn name(&self, entity: EntityId) -> Option<&str> {
        self.names.get(&entity).map(String::as_str)
    }

    /// Names or renames an entity within its current scope.
    ///
    /// # Errors
    /// Returns an error if the entity is not alive or the name is taken in the scope.
    pub fn set_name(&mut self, entity: EntityId, name: &str) -> Result<()> {
        self.entities.validate(entity)?;
        let scope = self.parent(entity).unwrap_or(EntityId::null());
        match self.scopes.get(&(scope, name.to_string())) {
            Some(&other) if other != entity => {
                return Err(Error::new(ErrorKind::DuplicateName(name.to_string())));
            }
            _ => {}
        }
        if let Some(old) = self.names.insert(entity, name.to_string()) {
            self.scopes.remove(&(scope, old));
        }
        self.scopes.insert((scope, name.to_string()), entity);
        Ok(())
    }

    /// The entity's `ChildOf` parent.
    #[must_use]
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.targets(entity, EntityId::CHILD_OF).next()
    }

    /// Resolves a `.`-separated path relative to `scope` (`None` for the root scope).
    #[must_use]
    pub fn lookup_from(&self, scope: Option<EntityId>, path: &str) -> Option<EntityId> {
        let mut current = scope.unwrap_or(EntityId::null());
        for segment in path.split('.') {
            if segment.is_empty() {
                return None;
            }
            current = *self.scopes.get(&(current, segment.to_string()))?;
        }
        if current.is_null() { None } else { Some(current) }
    }

    /// Resolves a `.`-separated path from the root scope.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<EntityId> {
        self.lookup_from(None, path)
    }

    /// Full `.`-separated path of a named entity, or `#index` for anonymous ones.
    #[must_use]
    pub fn path(&self, entity: EntityId) -> String {
        let Some(name) = self.name(entity) else {
            return format!("#{}", entity.index);
        };
        match self.parent(entity) {
            Some(parent) if parent != entity => format!("{}.{name}", self.path(parent)),
            _ => name.to_string(),
        }
    }

    /// Human-readable form of an id, using entity names.
    #[must_use]
    pub fn id_str(&self, id: Id) -> String {
        match id {
            Id::Entity(e) => self.path(e),
            Id::Pair(r, t) => format!("({}, {})", self.path(r), self.path(t)),
        }
    }

    fn rescope(&mut self, entity: EntityId, old_parent: Option<EntityId>) {
        let Some(name) = self.names.get(&entity).cloned() else {
            return;
        };
        let old_scope = old_parent.unwrap_or(EntityId::null());
        if self.scopes.get(&(old_scope, name.clone())) == Some(&entity) {
            self.scopes.remove(&(old_scope, name.clone()));
        }
        let new_scope = self.parent(entity).unwrap_or(EntityId::null());
        self.scopes.insert((new_scope, name), entity);
    }
}
