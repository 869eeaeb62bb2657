//! Integration tests for entity allocation
//!
//! Tests spawning, generational indices, and stale reference detection.

use quarry_foundation::{BUILTIN_COUNT, EntityId, ErrorKind};
use quarry_storage::{EntityStore, World};

// =============================================================================
// Spawning
// =============================================================================

#[test]
fn new_world_holds_only_builtins() {
    let world = World::new();
    assert_eq!(world.entity_count(), BUILTIN_COUNT as usize);
    for (builtin, name) in EntityId::BUILTINS {
        assert!(world.is_alive(builtin));
        assert_eq!(world.name(builtin), Some(name));
    }
}

#[test]
fn spawned_entities_are_unique() {
    let mut world = World::new();
    let e1 = world.spawn();
    let e2 = world.spawn();
    let e3 = world.spawn();

    assert_ne!(e1, e2);
    assert_ne!(e2, e3);
    assert_ne!(e1, e3);
    assert!(!e1.is_builtin());
    assert_eq!(world.entity_count(), BUILTIN_COUNT as usize + 3);
}

#[test]
fn spawned_entities_start_in_root_table() {
    let mut world = World::new();
    let e1 = world.spawn();
    let e2 = world.spawn();
    assert!(world.type_of(e1).is_empty());
    assert_eq!(world.table_of(e1), world.table_of(e2));
    assert_eq!(world.record(e2).map(|r| r.row), Some(world.record(e1).unwrap().row + 1));
}

#[test]
fn named_entity_is_reused() {
    let mut world = World::new();
    let first = world.entity("Position");
    let again = world.entity("Position");
    assert_eq!(first, again);
    assert_eq!(world.entity_count(), BUILTIN_COUNT as usize + 1);
}

// =============================================================================
// Generations
// =============================================================================

#[test]
fn destroyed_entity_is_stale() {
    let mut store = EntityStore::new();
    let e = store.spawn();
    store.destroy(e).unwrap();

    assert!(!store.exists(e));
    let err = store.validate(e).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::EntityNotFound(_) | ErrorKind::StaleEntity(_)
    ));
}

#[test]
fn reused_index_gets_new_generation() {
    let mut store = EntityStore::new();
    let old = store.spawn();
    store.destroy(old).unwrap();
    let new = store.spawn();

    assert_eq!(old.index, new.index);
    assert_ne!(old.generation, new.generation);
    assert!(store.exists(new));
    assert_eq!(
        store.validate(old).unwrap_err().kind,
        ErrorKind::StaleEntity(old)
    );
}

#[test]
fn builtins_cannot_be_destroyed() {
    let mut store = EntityStore::new();
    assert!(store.destroy(EntityId::IS_A).is_err());
    assert!(store.exists(EntityId::IS_A));
}

#[test]
fn unknown_entity_is_rejected() {
    let mut world = World::new();
    let ghost = EntityId::new(9_999, 1);
    let tag = world.entity("Tag");

    assert!(!world.is_alive(ghost));
    assert_eq!(
        world.add(ghost, tag).unwrap_err().kind,
        ErrorKind::EntityNotFound(ghost)
    );
    assert!(world.record(ghost).is_none());
}

// =============================================================================
// Deletion
// =============================================================================

#[test]
fn delete_frees_row_and_stales_id() {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let a = world.spawn();
    let b = world.spawn();
    let c = world.spawn();
    for e in [a, b, c] {
        world.add(e, tag).unwrap();
    }
    let count = world.entity_count();

    world.delete(a).unwrap();

    assert!(!world.is_alive(a));
    assert_eq!(world.entity_count(), count - 1);
    let table = world.table_of(c).unwrap();
    assert_eq!(world.table(table).entities(), &[c, b]);
    assert_eq!(world.record(c).map(|r| r.row), Some(0));
    assert_eq!(
        world.add(a, tag).unwrap_err().kind,
        ErrorKind::StaleEntity(a)
    );
}

#[test]
fn delete_removes_references() {
    let mut world = World::new();
    let likes = world.entity("Likes");
    let bob = world.entity("bob");
    let alice = world.entity("alice");
    world.add_pair(alice, likes, bob).unwrap();
    world.add(alice, bob).unwrap();

    world.delete(bob).unwrap();
    assert!(world.type_of(alice).is_empty());
    assert_eq!(world.lookup("bob"), None);
    assert!(world.pair_ids(likes).is_empty());

    let carol = world.entity("carol");
    let dave = world.entity("dave");
    world.add_pair(carol, likes, dave).unwrap();
    world.delete(likes).unwrap();
    assert!(world.type_of(carol).is_empty());
    assert!(world.is_alive(dave));
}

#[test]
fn delete_takes_children() {
    let mut world = World::new();
    let ship = world.entity("ship");
    let engine = world.child(ship, "engine").unwrap();
    let bolt = world.child(engine, "bolt").unwrap();

    world.delete(ship).unwrap();
    for e in [ship, engine, bolt] {
        assert!(!world.is_alive(e));
    }
    assert_eq!(world.lookup("ship.engine"), None);
    assert_ne!(world.entity("ship"), ship);
}

#[test]
fn builtins_cannot_be_deleted() {
    let mut world = World::new();
    assert!(world.delete(EntityId::IS_A).is_err());
    assert!(world.is_alive(EntityId::IS_A));
}
