//! Integration tests for up traversal
//!
//! Tests finding components on ancestors through traversable relationships.

use quarry_foundation::{EntityId, ErrorKind};
use quarry_rules::{Filter, Rule, Term};
use quarry_storage::World;

use crate::{matched, rule};

struct Circuit {
    world: World,
    power: EntityId,
    light: EntityId,
    attached: EntityId,
    generator: EntityId,
    lamp: EntityId,
    bulb: EntityId,
    candle: EntityId,
}

/// bulb -> lamp -> generator through `AttachedTo`; the generator has `Power`.
fn circuit() -> Circuit {
    let mut world = World::new();
    let power = world.entity("Power");
    let light = world.entity("Light");
    let attached = world.entity("AttachedTo");
    world.add(attached, EntityId::TRAVERSABLE).unwrap();

    let generator = world.entity("generator");
    let lamp = world.entity("lamp");
    let bulb = world.entity("bulb");
    let candle = world.entity("candle");
    world.add(generator, power).unwrap();
    for e in [candle, lamp, bulb] {
        world.add(e, light).unwrap();
    }
    world.add_pair(lamp, attached, generator).unwrap();
    world.add_pair(bulb, attached, lamp).unwrap();
    Circuit {
        world,
        power,
        light,
        attached,
        generator,
        lamp,
        bulb,
        candle,
    }
}

// =============================================================================
// Up
// =============================================================================

#[test]
fn up_finds_component_on_ancestor() {
    let c = circuit();
    let rule = rule(
        &c.world,
        vec![Term::new(c.light), Term::new(c.power).up(c.attached)],
    );
    let found: Vec<(Vec<EntityId>, Option<EntityId>)> = rule
        .iter(&c.world)
        .map(|m| (m.entities().to_vec(), m.src(1)))
        .collect();
    assert_eq!(
        found,
        vec![
            (vec![c.lamp], Some(c.generator)),
            (vec![c.bulb], Some(c.generator)),
        ]
    );
}

#[test]
fn up_skips_the_entity_itself() {
    let c = circuit();
    let rule = rule(&c.world, vec![Term::new(c.power).up(c.attached)]);
    let found = matched(&c.world, &rule);
    assert!(!found.contains(&c.generator));
    assert!(!found.contains(&c.candle));
    assert!(found.contains(&c.lamp));
    assert!(found.contains(&c.bulb));
}

#[test]
fn self_up_includes_holders() {
    let c = circuit();
    let rule = rule(&c.world, vec![Term::new(c.power).self_up(c.attached)]);
    let matches: Vec<_> = rule.iter(&c.world).collect();

    assert_eq!(matches.len(), 3);
    assert_eq!(matches[0].entities(), &[c.generator]);
    assert_eq!(matches[0].src(0), None);
    for m in &matches[1..] {
        assert_eq!(m.src(0), Some(c.generator));
    }
}

#[test]
fn up_on_bound_entity() {
    let c = circuit();
    let rule = rule(&c.world, vec![Term::new(c.power).up(c.attached)]);

    let mut it = rule.iter(&c.world);
    it.set_var(0, c.bulb).unwrap();
    assert_eq!(it.count(), 1);

    let mut it = rule.iter(&c.world);
    it.set_var(0, c.candle).unwrap();
    assert_eq!(it.count(), 0);
}

#[test]
fn child_of_is_traversable() {
    let mut world = World::new();
    let docked = world.entity("Docked");
    let station = world.entity("station");
    world.add(station, docked).unwrap();
    let ring = world.child(station, "ring").unwrap();
    let bay = world.child(ring, "bay").unwrap();

    let rule = rule(&world, vec![Term::new(docked).up(EntityId::CHILD_OF)]);
    assert_eq!(matched(&world, &rule), vec![ring, bay]);
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn up_requires_traversable_relationship() {
    let mut c = circuit();
    let near = c.world.entity("Near");
    let filter = Filter::new(vec![Term::new(c.light), Term::new(c.power).up(near)]).unwrap();
    let err = Rule::new(&c.world, &filter).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotTraversable(near));
    assert_eq!(err.context.and_then(|ctx| ctx.term), Some(1));
}
