//! Integration tests for lookup variables
//!
//! Tests `$x.child` variables that resolve names relative to another variable.

use quarry_foundation::{EntityId, ErrorKind};
use quarry_rules::{Filter, Rule, Term};
use quarry_storage::World;

use crate::{rule, values};

struct Planets {
    world: World,
    planet: EntityId,
    hot: EntityId,
    earth: EntityId,
    mars: EntityId,
    venus: EntityId,
}

/// earth and mars have a `core` child; only earth's core is hot; venus has none.
fn planets() -> Planets {
    let mut world = World::new();
    let planet = world.entity("Planet");
    let hot = world.entity("Hot");
    let earth = world.entity("earth");
    let mars = world.entity("mars");
    let venus = world.entity("venus");
    for p in [earth, mars, venus] {
        world.add(p, planet).unwrap();
    }
    let earth_core = world.child(earth, "core").unwrap();
    world.child(mars, "core").unwrap();
    world.add(earth_core, hot).unwrap();
    Planets {
        world,
        planet,
        hot,
        earth,
        mars,
        venus,
    }
}

#[test]
fn lookup_resolves_child_of_bound_variable() {
    let p = planets();
    let rule = rule(
        &p.world,
        vec![
            Term::new(p.planet).src_var("x"),
            Term::new(p.hot).src_var("x.core"),
        ],
    );
    assert_eq!(values(&p.world, &rule, "x"), vec![Some(p.earth)]);
}

#[test]
fn missing_child_fails_quietly() {
    let p = planets();
    let rule = rule(
        &p.world,
        vec![
            Term::new(p.planet).src_var("x"),
            Term::new(p.hot).src_var("x.core").not(),
        ],
    );
    // venus has no core at all, so the negated term cannot match it either
    let found = values(&p.world, &rule, "x");
    assert!(found.contains(&Some(p.mars)));
    assert!(!found.contains(&Some(p.earth)));
    assert!(!found.contains(&Some(p.venus)));
}

#[test]
fn lookup_with_bound_base() {
    let p = planets();
    let rule = rule(
        &p.world,
        vec![
            Term::new(p.planet).src_var("x"),
            Term::new(p.hot).src_var("x.core"),
        ],
    );
    let mut it = rule.iter(&p.world);
    it.set_var_by_name("x", p.mars).unwrap();
    assert_eq!(it.count(), 0);

    let mut it = rule.iter(&p.world);
    it.set_var_by_name("x", p.earth).unwrap();
    assert_eq!(it.count(), 1);
}

#[test]
fn lookup_needs_written_base() {
    let p = planets();
    let filter = Filter::new(vec![Term::new(p.hot).src_var("x.core")]).unwrap();
    let err = Rule::new(&p.world, &filter).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnresolvedLookup("x.core".to_string()));
}
