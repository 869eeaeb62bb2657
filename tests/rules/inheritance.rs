//! Integration tests for component inheritance
//!
//! Tests matching components through `IsA` subtypes, including diamond hierarchies.

use quarry_foundation::{EntityId, Id};
use quarry_rules::{Filter, Rule, RuleConfig, Term};
use quarry_storage::World;

use crate::{matched, rule, values};

struct Units {
    world: World,
    tag: EntityId,
    unit: EntityId,
    melee: EntityId,
    warrior: EntityId,
    wizard: EntityId,
    warlock: EntityId,
    plain: EntityId,
    fighter: EntityId,
    mage: EntityId,
    hybrid: EntityId,
    rock: EntityId,
}

/// Unit <- MeleeUnit <- Warrior, Unit <- RangedUnit <- Wizard, and Warlock
/// inheriting from both Warrior and Wizard. One tagged instance of each leaf
/// plus a plain unit and a tagged rock.
fn units() -> Units {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let unit = world.entity("Unit");
    let melee = world.entity("MeleeUnit");
    let ranged = world.entity("RangedUnit");
    let warrior = world.entity("Warrior");
    let wizard = world.entity("Wizard");
    let warlock = world.entity("Warlock");
    world.add_pair(melee, EntityId::IS_A, unit).unwrap();
    world.add_pair(ranged, EntityId::IS_A, unit).unwrap();
    world.add_pair(warrior, EntityId::IS_A, melee).unwrap();
    world.add_pair(wizard, EntityId::IS_A, ranged).unwrap();
    world.add_pair(warlock, EntityId::IS_A, warrior).unwrap();
    world.add_pair(warlock, EntityId::IS_A, wizard).unwrap();

    let plain = world.entity("plain");
    let fighter = world.entity("fighter");
    let mage = world.entity("mage");
    let hybrid = world.entity("hybrid");
    let rock = world.entity("rock");
    for (e, ty) in [(plain, unit), (fighter, warrior), (mage, wizard), (hybrid, warlock)] {
        world.add(e, ty).unwrap();
        world.add(e, tag).unwrap();
    }
    world.add(rock, tag).unwrap();

    Units {
        world,
        tag,
        unit,
        melee,
        warrior,
        wizard,
        warlock,
        plain,
        fighter,
        mage,
        hybrid,
        rock,
    }
}

// =============================================================================
// Subtypes
// =============================================================================

#[test]
fn base_matches_every_subtype() {
    let u = units();
    let rule = rule(&u.world, vec![Term::new(u.unit)]);
    let seen: Vec<(Vec<EntityId>, Option<Id>)> = rule
        .iter(&u.world)
        .map(|m| (m.entities().to_vec(), m.id(0)))
        .collect();

    // The warlock table is reached through both parents of the diamond
    assert_eq!(
        seen,
        vec![
            (vec![u.plain], Some(Id::from(u.unit))),
            (vec![u.fighter], Some(Id::from(u.warrior))),
            (vec![u.mage], Some(Id::from(u.wizard))),
            (vec![u.hybrid], Some(Id::from(u.warlock))),
            (vec![u.hybrid], Some(Id::from(u.warlock))),
        ]
    );
}

#[test]
fn diamond_yields_once_per_path() {
    let u = units();
    let rule = rule(&u.world, vec![Term::new(u.unit).src(u.hybrid)]);
    let ids: Vec<Option<Id>> = rule.iter(&u.world).map(|m| m.id(0)).collect();
    assert_eq!(ids, vec![Some(Id::from(u.warlock)); 2]);

    let single = rule_for(&u, u.fighter);
    assert_eq!(single, vec![Some(Id::from(u.warrior))]);
}

fn rule_for(u: &Units, entity: EntityId) -> Vec<Option<Id>> {
    rule(&u.world, vec![Term::new(u.unit).src(entity)])
        .iter(&u.world)
        .map(|m| m.id(0))
        .collect()
}

#[test]
fn intermediate_type_matches_its_subtree() {
    let u = units();
    let rule = rule(&u.world, vec![Term::new(u.melee)]);
    assert_eq!(matched(&u.world, &rule), vec![u.fighter, u.hybrid]);
}

#[test]
fn leaf_type_matches_directly() {
    let u = units();
    let rule = rule(&u.world, vec![Term::new(u.warlock)]);
    assert_eq!(matched(&u.world, &rule), vec![u.hybrid]);
    assert!(!rule.ops().iter().any(|op| op.kind.name() == "trav"));
}

#[test]
fn inherited_match_on_entity_variable() {
    let u = units();
    let rule = rule(
        &u.world,
        vec![Term::new(u.tag).src_var("x"), Term::new(u.melee).src_var("x")],
    );
    assert_eq!(values(&u.world, &rule, "x"), vec![Some(u.fighter), Some(u.hybrid)]);
}

#[test]
fn negated_inherited_term() {
    let u = units();
    let rule = rule(
        &u.world,
        vec![Term::new(u.tag).src_var("x"), Term::new(u.melee).src_var("x").not()],
    );
    let matches: Vec<_> = rule.iter(&u.world).collect();
    let x = rule.find_var("x").unwrap();
    let mut found: Vec<EntityId> = matches.iter().filter_map(|m| m.var(x)).collect();
    found.sort();

    let mut expected = vec![u.plain, u.mage, u.rock];
    expected.sort();
    assert_eq!(found, expected);
    assert!(matches.iter().all(|m| !m.is_set(1)));
}

// =============================================================================
// Opting Out
// =============================================================================

#[test]
fn no_inherit_matches_direct_holders_only() {
    let u = units();
    let rule = rule(&u.world, vec![Term::new(u.unit).no_inherit()]);
    assert_eq!(matched(&u.world, &rule), vec![u.plain]);
}

#[test]
fn inheritance_can_be_disabled_per_rule() {
    let u = units();
    let filter = Filter::new(vec![Term::new(u.unit)]).unwrap();
    let config = RuleConfig::default().with_inherit_components(false);
    let rule = Rule::with_config(&u.world, &filter, config).unwrap();
    assert_eq!(matched(&u.world, &rule), vec![u.plain]);
}

#[test]
fn final_type_is_not_inherited() {
    let mut u = units();
    u.world.add(u.unit, EntityId::FINAL).unwrap();
    let rule = rule(&u.world, vec![Term::new(u.unit)]);
    assert_eq!(matched(&u.world, &rule), vec![u.plain]);
    assert!(!rule.ops().iter().any(|op| op.kind.name() == "trav"));
}

#[test]
fn is_a_is_queried_transitively() {
    let u = units();
    let rule = rule(
        &u.world,
        vec![Term::pair(EntityId::IS_A, u.unit).src_var("x")],
    );
    let found = values(&u.world, &rule, "x");
    // Reflexive: the base itself comes first
    assert_eq!(found.first(), Some(&Some(u.unit)));
    assert!(found.contains(&Some(u.warlock)));
    assert!(!found.contains(&Some(u.plain)));
}
