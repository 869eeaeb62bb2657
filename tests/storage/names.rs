//! Integration tests for entity names
//!
//! Tests naming, `ChildOf` scopes, path lookup, and path formatting.

use quarry_foundation::{EntityId, ErrorKind};
use quarry_storage::World;

// =============================================================================
// Naming
// =============================================================================

#[test]
fn names_resolve_from_root() {
    let mut world = World::new();
    let ship = world.entity("ship");
    assert_eq!(world.name(ship), Some("ship"));
    assert_eq!(world.lookup("ship"), Some(ship));
    assert_eq!(world.lookup("boat"), None);
}

#[test]
fn anonymous_entities_print_their_index() {
    let mut world = World::new();
    let e = world.spawn();
    assert_eq!(world.name(e), None);
    assert_eq!(world.path(e), format!("#{}", e.index));
}

#[test]
fn rename_frees_old_name() {
    let mut world = World::new();
    let e = world.spawn();
    world.set_name(e, "first").unwrap();
    world.set_name(e, "second").unwrap();

    assert_eq!(world.lookup("first"), None);
    assert_eq!(world.lookup("second"), Some(e));
}

#[test]
fn duplicate_names_are_rejected() {
    let mut world = World::new();
    world.entity("taken");
    let e = world.spawn();
    let err = world.set_name(e, "taken").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateName("taken".to_string()));
}

#[test]
fn builtins_are_named() {
    let world = World::new();
    assert_eq!(world.lookup("IsA"), Some(EntityId::IS_A));
    assert_eq!(world.lookup("ChildOf"), Some(EntityId::CHILD_OF));
    assert_eq!(world.path(EntityId::TRANSITIVE), "Transitive");
}

// =============================================================================
// Scopes
// =============================================================================

#[test]
fn children_live_in_parent_scope() {
    let mut world = World::new();
    let ship = world.entity("ship");
    let engine = world.child(ship, "engine").unwrap();
    let piston = world.child(engine, "piston").unwrap();

    assert_eq!(world.parent(engine), Some(ship));
    assert!(world.has(engine, quarry_foundation::Id::pair(EntityId::CHILD_OF, ship)));
    assert_eq!(world.lookup("ship.engine.piston"), Some(piston));
    assert_eq!(world.lookup_from(Some(engine), "piston"), Some(piston));
    assert_eq!(world.lookup("engine"), None);
    assert_eq!(world.path(piston), "ship.engine.piston");
}

#[test]
fn same_name_in_different_scopes() {
    let mut world = World::new();
    let earth = world.entity("earth");
    let mars = world.entity("mars");
    let earth_core = world.child(earth, "core").unwrap();
    let mars_core = world.child(mars, "core").unwrap();

    assert_ne!(earth_core, mars_core);
    assert_eq!(world.lookup("earth.core"), Some(earth_core));
    assert_eq!(world.lookup("mars.core"), Some(mars_core));
    assert!(world.child(earth, "core").is_err());
}

#[test]
fn reparenting_moves_scope() {
    let mut world = World::new();
    let a = world.entity("a");
    let b = world.entity("b");
    let item = world.child(a, "item").unwrap();

    world
        .remove(item, quarry_foundation::Id::pair(EntityId::CHILD_OF, a))
        .unwrap();
    assert_eq!(world.lookup("a.item"), None);
    assert_eq!(world.lookup("item"), Some(item));

    world.add_pair(item, EntityId::CHILD_OF, b).unwrap();
    assert_eq!(world.lookup("b.item"), Some(item));
    assert_eq!(world.lookup("item"), None);
    assert_eq!(world.path(item), "b.item");
}

#[test]
fn malformed_paths_do_not_resolve() {
    let mut world = World::new();
    let ship = world.entity("ship");
    world.child(ship, "engine").unwrap();
    assert_eq!(world.lookup("ship..engine"), None);
    assert_eq!(world.lookup(""), None);
    assert_eq!(world.lookup("ship.engine."), None);
}
