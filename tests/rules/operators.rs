//! Integration tests for term operators
//!
//! Tests `Not`, `Optional`, and `Or` terms, and operator validation.

use quarry_foundation::{EntityId, ErrorKind, Id};
use quarry_rules::{Filter, Match, Term, TermId};
use quarry_storage::World;

use crate::{matched, rule, values};

struct Army {
    world: World,
    unit: EntityId,
    dead: EntityId,
    wields: EntityId,
    sword: EntityId,
    u1: EntityId,
    u2: EntityId,
    u3: EntityId,
}

/// Three units; `u2` is dead and `u3` wields a sword.
fn army() -> Army {
    let mut world = World::new();
    let unit = world.entity("Unit");
    let dead = world.entity("Dead");
    let wields = world.entity("Wields");
    let sword = world.entity("sword");
    let u1 = world.entity("u1");
    let u2 = world.entity("u2");
    let u3 = world.entity("u3");
    for u in [u1, u2, u3] {
        world.add(u, unit).unwrap();
    }
    world.add(u2, dead).unwrap();
    world.add_pair(u3, wields, sword).unwrap();
    Army {
        world,
        unit,
        dead,
        wields,
        sword,
        u1,
        u2,
        u3,
    }
}

// =============================================================================
// Not
// =============================================================================

#[test]
fn not_excludes_holders() {
    let a = army();
    let rule = rule(&a.world, vec![Term::new(a.unit), Term::new(a.dead).not()]);
    let matches: Vec<Match> = rule.iter(&a.world).collect();

    assert_eq!(matched(&a.world, &rule), vec![a.u1, a.u3]);
    for m in &matches {
        assert!(!m.is_set(1));
        assert_eq!(m.id(1), Some(Id::from(a.dead)));
    }
}

#[test]
fn not_with_wildcard_target() {
    let a = army();
    let rule = rule(
        &a.world,
        vec![Term::new(a.unit), Term::pair(a.wields, TermId::Wildcard).not()],
    );
    assert_eq!(matched(&a.world, &rule), vec![a.u1, a.u2]);
}

#[test]
fn not_on_bound_variable() {
    let mut a = army();
    let follows = a.world.entity("Follows");
    a.world.add_pair(a.u1, follows, a.u2).unwrap();
    a.world.add_pair(a.u3, follows, a.u1).unwrap();

    let rule = rule(
        &a.world,
        vec![
            Term::pair(follows, TermId::var("leader")),
            Term::new(a.dead).src_var("leader").not(),
        ],
    );
    assert_eq!(matched(&a.world, &rule), vec![a.u3]);
    assert_eq!(values(&a.world, &rule, "leader"), vec![Some(a.u1)]);
}

// =============================================================================
// Optional
// =============================================================================

#[test]
fn optional_reports_presence() {
    let a = army();
    let rule = rule(
        &a.world,
        vec![
            Term::new(a.unit),
            Term::pair(a.wields, TermId::var("weapon")).optional(),
        ],
    );
    let weapon = rule.find_var("weapon").unwrap();
    let seen: Vec<(Vec<EntityId>, bool, Option<EntityId>)> = rule
        .iter(&a.world)
        .map(|m| (m.entities().to_vec(), m.is_set(1), m.var(weapon)))
        .collect();
    assert_eq!(
        seen,
        vec![
            (vec![a.u1], false, None),
            (vec![a.u2], false, None),
            (vec![a.u3], true, Some(a.sword)),
        ]
    );
}

#[test]
fn optional_never_filters() {
    let a = army();
    let with = rule(
        &a.world,
        vec![Term::new(a.unit), Term::new(a.dead).optional()],
    );
    let without = rule(&a.world, vec![Term::new(a.unit)]);

    let mut all = matched(&a.world, &with);
    let mut plain = matched(&a.world, &without);
    all.sort();
    plain.sort();
    assert_eq!(all, plain);
}

// =============================================================================
// Or
// =============================================================================

#[test]
fn or_chain_on_bound_source_reports_first_branch() {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let ta = world.entity("A");
    let tb = world.entity("B");
    let e1 = world.entity("e1");
    let e2 = world.entity("e2");
    let e3 = world.entity("e3");
    for e in [e1, e2, e3] {
        world.add(e, tag).unwrap();
    }
    world.add(e1, ta).unwrap();
    world.add(e2, tb).unwrap();
    world.add(e3, ta).unwrap();
    world.add(e3, tb).unwrap();

    let rule = rule(
        &world,
        vec![
            Term::new(tag).src_var("x"),
            Term::new(ta).src_var("x").or(),
            Term::new(tb).src_var("x").or(),
        ],
    );
    assert_eq!(rule.field_count(), 2);

    let x = rule.find_var("x").unwrap();
    let seen: Vec<(Option<EntityId>, Option<Id>)> =
        rule.iter(&world).map(|m| (m.var(x), m.id(1))).collect();
    assert_eq!(
        seen,
        vec![
            (Some(e1), Some(Id::from(ta))),
            (Some(e2), Some(Id::from(tb))),
            (Some(e3), Some(Id::from(ta))),
        ]
    );
}

#[test]
fn or_chain_on_free_source_enumerates_branches() {
    let mut world = World::new();
    let ta = world.entity("A");
    let tb = world.entity("B");
    let e1 = world.entity("e1");
    let e2 = world.entity("e2");
    let e3 = world.entity("e3");
    world.add(e1, ta).unwrap();
    world.add(e2, tb).unwrap();
    world.add(e3, ta).unwrap();
    world.add(e3, tb).unwrap();

    let rule = rule(
        &world,
        vec![
            Term::new(ta).src_var("x").or(),
            Term::new(tb).src_var("x").or(),
        ],
    );
    assert_eq!(
        values(&world, &rule, "x"),
        vec![Some(e1), Some(e3), Some(e2), Some(e3)]
    );
}

#[test]
fn or_chain_behind_optional_matches_like_plain_chain() {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let has = world.entity("Has");
    let likes = world.entity("Likes");
    let hates = world.entity("Hates");
    let y0 = world.entity("y0");
    let y1 = world.entity("y1");
    let both = world.entity("both");
    world.add(both, tag).unwrap();
    world.add_pair(both, has, y0).unwrap();
    world.add_pair(both, likes, y0).unwrap();
    world.add_pair(both, hates, y0).unwrap();
    let hater = world.entity("hater");
    world.add(hater, tag).unwrap();
    world.add_pair(hater, has, y1).unwrap();
    world.add_pair(hater, hates, y1).unwrap();

    let terms = |has_term: Term| {
        vec![
            Term::new(tag),
            has_term,
            Term::pair(likes, TermId::var("y")).or(),
            Term::pair(hates, TermId::var("y")).or(),
        ]
    };
    let plain = rule(&world, terms(Term::pair(has, TermId::var("y"))));
    let guarded = rule(&world, terms(Term::pair(has, TermId::var("y")).optional()));

    assert_eq!(matched(&world, &plain), vec![both, hater]);
    assert_eq!(matched(&world, &guarded), vec![both, hater]);
    for m in guarded.iter(&world) {
        assert!(m.is_set(1));
        assert!(m.is_set(2));
    }
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn or_chain_must_share_source() {
    let a = army();
    let err = Filter::new(vec![
        Term::new(a.unit).or(),
        Term::new(a.dead).src_var("x").or(),
    ])
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidOperator(_)));
    assert_eq!(err.context.and_then(|c| c.term), Some(1));
}

#[test]
fn predicates_cannot_be_optional() {
    let a = army();
    let err = Filter::new(vec![Term::new(a.unit), Term::neq("this", a.u1).optional()])
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidOperator(_)));
}

#[test]
fn literal_names_outside_predicates_are_rejected() {
    let err = Filter::new(vec![Term::new(TermId::Name("Unit".to_string()))]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidTerm(_)));
}
