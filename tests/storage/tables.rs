//! Integration tests for archetype tables and the id index
//!
//! Tests table creation and reuse, entity moves, and wildcard index lookups.

use quarry_foundation::{EntityId, Id};
use quarry_storage::{TableId, World};

// =============================================================================
// Table Membership
// =============================================================================

#[test]
fn same_type_shares_a_table() {
    let mut world = World::new();
    let position = world.entity("Position");
    let velocity = world.entity("Velocity");
    let a = world.spawn();
    let b = world.spawn();

    world.add(a, position).unwrap();
    world.add(a, velocity).unwrap();
    // Added in the other order, same sorted type
    world.add(b, velocity).unwrap();
    world.add(b, position).unwrap();

    let table = world.table_of(a).unwrap();
    assert_eq!(world.table_of(b), Some(table));
    assert_eq!(world.table(table).entities(), &[a, b]);
    assert_eq!(world.table(table).len(), 2);
}

#[test]
fn table_type_is_sorted() {
    let mut world = World::new();
    let ids: Vec<EntityId> = ["C", "A", "B"].iter().map(|n| world.entity(n)).collect();
    let e = world.spawn();
    for id in ids.iter().rev() {
        world.add(e, *id).unwrap();
    }
    let ty = world.type_of(e);
    assert_eq!(ty.len(), 3);
    assert!(ty.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn adding_twice_is_a_no_op() {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let e = world.spawn();
    world.add(e, tag).unwrap();
    let table = world.table_of(e);
    world.add(e, tag).unwrap();
    assert_eq!(world.table_of(e), table);
    assert_eq!(world.type_of(e), &[Id::from(tag)]);
}

#[test]
fn remove_moves_back() {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let e = world.spawn();
    world.add(e, tag).unwrap();
    world.remove(e, tag).unwrap();

    assert!(!world.has(e, tag));
    assert_eq!(world.table_of(e), Some(TableId::ROOT));
    // Removing an absent id is fine
    world.remove(e, tag).unwrap();
}

#[test]
fn emptied_tables_are_kept() {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let e = world.spawn();
    world.add(e, tag).unwrap();
    let table = world.table_of(e).unwrap();
    world.remove(e, tag).unwrap();

    assert!(world.table(table).is_empty());
    assert!(world.tables().any(|t| t.id() == table));
    assert!(world.id_record(Id::from(tag)).and_then(|r| r.get(table)).is_some());
}

#[test]
fn rows_stay_consistent_after_moves() {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let other = world.entity("Other");
    let entities: Vec<EntityId> = (0..5).map(|_| world.spawn()).collect();
    for &e in &entities {
        world.add(e, tag).unwrap();
    }
    world.add(entities[0], other).unwrap();
    world.add(entities[2], other).unwrap();

    for &e in &entities {
        let record = world.record(e).unwrap();
        assert_eq!(world.table(record.table).entities()[record.row], e);
        assert_eq!(world.table(record.table).row_of(e), Some(record.row));
    }
}

// =============================================================================
// Id Index
// =============================================================================

#[test]
fn id_record_lists_tables_in_creation_order() {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let a = world.entity("A");
    let b = world.entity("B");

    let e1 = world.spawn();
    world.add(e1, tag).unwrap();
    let e2 = world.spawn();
    world.add(e2, a).unwrap();
    world.add(e2, tag).unwrap();
    let e3 = world.spawn();
    world.add(e3, b).unwrap();
    world.add(e3, tag).unwrap();

    let tables: Vec<TableId> = world
        .id_record(Id::from(tag))
        .unwrap()
        .tables()
        .iter()
        .map(|r| r.table)
        .collect();
    assert_eq!(
        tables,
        vec![
            world.table_of(e1).unwrap(),
            world.table_of(e2).unwrap(),
            world.table_of(e3).unwrap(),
        ]
    );
}

#[test]
fn wildcard_record_counts_matching_columns() {
    let mut world = World::new();
    let likes = world.entity("Likes");
    let x = world.entity("x");
    let y = world.entity("y");
    let e = world.spawn();
    world.add_pair(e, likes, x).unwrap();
    world.add_pair(e, likes, y).unwrap();

    let table = world.table_of(e).unwrap();
    let record = world.id_record(Id::pair(likes, EntityId::WILDCARD)).unwrap();
    let tr = record.get(table).unwrap();
    assert_eq!(tr.count, 2);
    assert_eq!(world.table(table).ty()[tr.column], Id::pair(likes, x));

    // `_` looks up the same record as `*`
    let any = world.id_record(Id::pair(likes, EntityId::ANY)).unwrap();
    assert_eq!(any.id(), record.id());
}

#[test]
fn find_column_skips_earlier_matches() {
    let mut world = World::new();
    let likes = world.entity("Likes");
    let x = world.entity("x");
    let y = world.entity("y");
    let e = world.spawn();
    world.add_pair(e, likes, x).unwrap();
    world.add_pair(e, likes, y).unwrap();

    let table = world.table(world.table_of(e).unwrap());
    let wild = Id::pair(likes, EntityId::WILDCARD);
    let first = table.find_column(wild, 0).unwrap();
    let second = table.find_column(wild, first + 1).unwrap();
    assert!(second > first);
    assert_eq!(table.find_column(wild, second + 1), None);
}

#[test]
fn wildcard_ids_cannot_be_added() {
    let mut world = World::new();
    let likes = world.entity("Likes");
    let e = world.spawn();
    assert!(world.add(e, EntityId::WILDCARD).is_err());
    assert!(world.add_pair(e, likes, EntityId::WILDCARD).is_err());
    assert!(world.type_of(e).is_empty());
}

// =============================================================================
// Snapshots
// =============================================================================

#[test]
fn clones_are_independent() {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let e = world.spawn();
    world.add(e, tag).unwrap();
    let snapshot = world.clone();

    world.remove(e, tag).unwrap();
    let f = world.spawn();
    world.add(f, tag).unwrap();

    assert!(snapshot.has(e, tag));
    assert!(!snapshot.is_alive(f));
    assert!(!world.has(e, tag));
}
