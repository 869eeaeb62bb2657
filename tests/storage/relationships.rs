//! Integration tests for relationships
//!
//! Tests pairs, relationship properties, and traversal bookkeeping.

use quarry_foundation::{EntityId, Id};
use quarry_storage::World;

// =============================================================================
// Pairs
// =============================================================================

#[test]
fn pairs_are_ids() {
    let mut world = World::new();
    let likes = world.entity("Likes");
    let alice = world.entity("alice");
    let bob = world.entity("bob");
    world.add_pair(alice, likes, bob).unwrap();

    assert!(world.has(alice, Id::pair(likes, bob)));
    assert!(!world.has(bob, Id::pair(likes, alice)));
    assert_eq!(world.id_str(Id::pair(likes, bob)), "(Likes, bob)");
}

#[test]
fn targets_follow_column_order() {
    let mut world = World::new();
    let likes = world.entity("Likes");
    let alice = world.entity("alice");
    let bob = world.entity("bob");
    let carol = world.entity("carol");
    world.add_pair(alice, likes, carol).unwrap();
    world.add_pair(alice, likes, bob).unwrap();

    let targets: Vec<EntityId> = world.targets(alice, likes).collect();
    assert_eq!(targets, vec![bob, carol]);
    assert_eq!(world.targets(bob, likes).count(), 0);
}

#[test]
fn pair_target_must_be_alive() {
    let mut world = World::new();
    let likes = world.entity("Likes");
    let alice = world.entity("alice");
    let ghost = EntityId::new(5_000, 1);
    assert!(world.add_pair(alice, likes, ghost).is_err());
    assert!(world.type_of(alice).is_empty());
}

#[test]
fn pair_ids_skip_empty_tables() {
    let mut world = World::new();
    let likes = world.entity("Likes");
    let alice = world.entity("alice");
    let bob = world.entity("bob");
    let carol = world.entity("carol");
    world.add_pair(alice, likes, bob).unwrap();
    world.add_pair(carol, likes, alice).unwrap();
    assert_eq!(
        world.pair_ids(likes),
        vec![Id::pair(likes, bob), Id::pair(likes, alice)]
    );

    world.remove(alice, Id::pair(likes, bob)).unwrap();
    assert_eq!(world.pair_ids(likes), vec![Id::pair(likes, alice)]);
}

#[test]
fn targets_are_marked_traversable() {
    let mut world = World::new();
    let likes = world.entity("Likes");
    let alice = world.entity("alice");
    let bob = world.entity("bob");
    assert!(!world.record(bob).unwrap().traversable);

    world.add_pair(alice, likes, bob).unwrap();
    assert!(world.record(bob).unwrap().traversable);
    assert!(!world.record(alice).unwrap().traversable);

    // The flag survives table moves
    let tag = world.entity("Tag");
    world.add(bob, tag).unwrap();
    assert!(world.record(bob).unwrap().traversable);
}

// =============================================================================
// Relationship Properties
// =============================================================================

#[test]
fn builtin_relationship_properties() {
    let world = World::new();
    assert!(world.is_transitive(EntityId::IS_A));
    assert!(world.is_reflexive(EntityId::IS_A));
    assert!(world.is_traversable(EntityId::IS_A));
    assert!(world.is_traversable(EntityId::CHILD_OF));
    assert!(!world.is_transitive(EntityId::CHILD_OF));
    assert!(!world.is_reflexive(EntityId::CHILD_OF));
}

#[test]
fn properties_are_tags() {
    let mut world = World::new();
    let located_in = world.entity("LocatedIn");
    assert!(!world.is_transitive(located_in));
    assert!(!world.is_traversable(located_in));

    world.add(located_in, EntityId::TRANSITIVE).unwrap();
    assert!(world.is_transitive(located_in));
    // Transitive implies traversable
    assert!(world.is_traversable(located_in));
    assert!(!world.is_reflexive(located_in));

    world.add(located_in, EntityId::REFLEXIVE).unwrap();
    assert!(world.is_reflexive(located_in));
}

#[test]
fn final_entities() {
    let mut world = World::new();
    let sealed = world.entity("Sealed");
    assert!(!world.is_final(sealed));
    world.add(sealed, EntityId::FINAL).unwrap();
    assert!(world.is_final(sealed));
}
