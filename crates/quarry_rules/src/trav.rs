//! Traversal cache.
//!
//! Relationship walks are memoized per iterator: the first use of a
//! (relationship, root) pair builds the full reachable set breadth first, and
//! later redo steps index into the stored slice. Nothing is shared between
//! iterators since the graph may change between iterations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use quarry_foundation::{EntityId, Id};
use quarry_storage::{TableId, World};
use tracing::trace;

/// An id found on an ancestor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct UpMatch {
    /// The ancestor holding the id.
    pub src: EntityId,
    /// The concrete id matched.
    pub id: Id,
    /// Column of the id in the ancestor's table.
    pub column: usize,
}

/// A table below a holder of an id.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct DownTable {
    pub table: TableId,
    pub hit: UpMatch,
}

#[derive(Debug, Default)]
pub(crate) struct TravCache {
    down: HashMap<(EntityId, EntityId), Arc<[EntityId]>>,
    up: HashMap<(EntityId, TableId), Arc<[EntityId]>>,
    up_match: HashMap<(EntityId, TableId, Id), Option<UpMatch>>,
    down_tables: HashMap<(EntityId, Id), Arc<[DownTable]>>,
}

impl TravCache {
    pub(crate) fn clear(&mut self) {
        self.down.clear();
        self.up.clear();
        self.up_match.clear();
        self.down_tables.clear();
    }

    /// `root` and every entity reaching it through `rel`, breadth first, root first.
    pub(crate) fn trav_down(&mut self, world: &World, rel: EntityId, root: EntityId) -> Arc<[EntityId]> {
        if let Some(elems) = self.down.get(&(rel, root)) {
            return Arc::clone(elems);
        }
        let mut out = vec![root];
        let mut seen = HashSet::from([root]);
        let mut i = 0;
        while i < out.len() {
            let elem = out[i];
            i += 1;
            let Some(record) = world.id_record(Id::pair(rel, elem)) else {
                continue;
            };
            for tr in record.tables() {
                for &entity in world.table(tr.table).entities() {
                    if seen.insert(entity) {
                        out.push(entity);
                    }
                }
            }
        }
        trace!(rel = ?rel, root = ?root, len = out.len(), "built down cache");
        let elems: Arc<[EntityId]> = out.into();
        self.down.insert((rel, root), Arc::clone(&elems));
        elems
    }

    /// Every target reached from the entities of `table` through `rel`, breadth first.
    pub(crate) fn trav_up(&mut self, world: &World, rel: EntityId, table: TableId) -> Arc<[EntityId]> {
        if let Some(targets) = self.up.get(&(rel, table)) {
            return Arc::clone(targets);
        }
        let mut out: Vec<EntityId> = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([table]);
        let mut visited_tables = HashSet::from([table]);
        while let Some(current) = queue.pop_front() {
            for id in world.table(current).ty() {
                let Id::Pair(r, target) = *id else {
                    continue;
                };
                if r != rel || !seen.insert(target) {
                    continue;
                }
                out.push(target);
                if let Some(next) = world.table_of(target) {
                    if visited_tables.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        trace!(rel = ?rel, table = table.0, len = out.len(), "built up cache");
        let targets: Arc<[EntityId]> = out.into();
        self.up.insert((rel, table), Arc::clone(&targets));
        targets
    }

    /// The nearest ancestor (through `rel`) of the entities in `table` holding `id`.
    pub(crate) fn up_match(&mut self, world: &World, rel: EntityId, table: TableId, id: Id) -> Option<UpMatch> {
        if let Some(hit) = self.up_match.get(&(rel, table, id)) {
            return *hit;
        }
        let ancestors = self.trav_up(world, rel, table);
        let hit = ancestors.iter().find_map(|&ancestor| {
            let t = world.table(world.table_of(ancestor)?);
            let column = t.find_column(id, 0)?;
            Some(UpMatch {
                src: ancestor,
                id: t.ty()[column],
                column,
            })
        });
        self.up_match.insert((rel, table, id), hit);
        hit
    }

    /// Tables whose entities inherit `id` through `rel` without holding it themselves.
    pub(crate) fn down_tables(&mut self, world: &World, rel: EntityId, id: Id) -> Arc<[DownTable]> {
        if let Some(tables) = self.down_tables.get(&(rel, id)) {
            return Arc::clone(tables);
        }
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(record) = world.id_record(id) {
            for tr in record.tables() {
                let table = world.table(tr.table);
                for &holder in table.entities() {
                    let hit = UpMatch {
                        src: holder,
                        id: table.ty()[tr.column],
                        column: tr.column,
                    };
                    queue.push_back((holder, hit));
                }
            }
        }

        while let Some((entity, hit)) = queue.pop_front() {
            if !world.record(entity).is_some_and(|r| r.traversable) {
                continue;
            }
            let Some(record) = world.id_record(Id::pair(rel, entity)) else {
                continue;
            };
            for tr in record.tables() {
                let table = world.table(tr.table);
                if table.find_column(id, 0).is_some() || !seen.insert(tr.table) {
                    continue;
                }
                out.push(DownTable {
                    table: tr.table,
                    hit,
                });
                for &child in table.entities() {
                    queue.push_back((child, hit));
                }
            }
        }
        trace!(rel = ?rel, id = ?id, len = out.len(), "built down table cache");
        let tables: Arc<[DownTable]> = out.into();
        self.down_tables.insert((rel, id), Arc::clone(&tables));
        tables
    }
}
