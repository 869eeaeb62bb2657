//! Integration tests for rule introspection
//!
//! Tests disassembly, profiling, step tracing, and compile scratch reuse.

use quarry_foundation::EntityId;
use quarry_rules::{CompileScratch, Filter, OpKind, Rule, RuleConfig, Term, TermId};
use quarry_storage::World;

use crate::{init_tracing, rule};

fn world() -> (World, EntityId, EntityId) {
    let mut world = World::new();
    let tag = world.entity("Tag");
    let likes = world.entity("Likes");
    let target = world.entity("target");
    for i in 0..4 {
        let e = world.entity(&format!("e{i}"));
        world.add(e, tag).unwrap();
        if i % 2 == 0 {
            world.add_pair(e, likes, target).unwrap();
        }
    }
    (world, tag, likes)
}

// =============================================================================
// Program Shape
// =============================================================================

#[test]
fn program_ends_in_yield() {
    let (world, tag, likes) = world();
    let rule = rule(
        &world,
        vec![Term::new(tag), Term::pair(likes, TermId::var("x")).optional()],
    );
    assert_eq!(rule.ops().last().map(|op| op.kind), Some(OpKind::Yield));
    assert_eq!(rule.field_count(), 2);
    assert_eq!(rule.filter().terms().len(), 2);
    assert!(rule.var_count() >= 2);
}

#[test]
fn disassembly_names_operands() {
    let (world, tag, likes) = world();
    let rule = rule(
        &world,
        vec![Term::new(tag), Term::pair(likes, TermId::var("x")).not()],
    );
    let text = rule.disassemble(&world);

    assert_eq!(text.lines().count(), rule.ops().len());
    assert!(text.contains("$[this](Tag)"));
    assert!(text.contains("(Likes, $x)"));
    assert!(text.contains("not"));
    assert!(text.lines().last().unwrap().contains("yield"));
}

// =============================================================================
// Profiling
// =============================================================================

#[test]
fn profile_tracks_every_op() {
    let (world, tag, likes) = world();
    let filter = Filter::new(vec![Term::new(tag), Term::pair(likes, TermId::Wildcard).not()]).unwrap();
    let rule = Rule::with_config(&world, &filter, RuleConfig::default().with_profile(true)).unwrap();

    let mut it = rule.iter(&world);
    assert_eq!(it.count_matches(), 1);
    let profile = it.profile().unwrap().to_vec();
    assert_eq!(profile.len(), rule.ops().len());
    assert_eq!(profile[0].fresh, 1);
    assert!(profile.last().unwrap().fresh >= 1);

    let listing = rule.disassemble_profiled(&world, &profile);
    assert_eq!(listing.lines().count(), rule.ops().len() + 1);
}

#[test]
fn step_tracing_does_not_change_results() {
    init_tracing();
    let (world, tag, likes) = world();
    let filter = Filter::new(vec![Term::new(tag), Term::pair(likes, TermId::var("x"))]).unwrap();
    let plain = Rule::new(&world, &filter).unwrap();
    let traced = Rule::with_config(&world, &filter, RuleConfig::debug()).unwrap();

    let a: Vec<_> = plain.iter(&world).collect();
    let b: Vec<_> = traced.iter(&world).collect();
    assert_eq!(a, b);

    let mut it = traced.iter(&world);
    let n = it.count_matches();
    assert_eq!(n, a.len());
    assert!(it.steps() > 0);
}

// =============================================================================
// Compilation
// =============================================================================

#[test]
fn scratch_reuse_produces_same_program() {
    let (world, tag, likes) = world();
    let filters = [
        Filter::new(vec![Term::new(tag)]).unwrap(),
        Filter::new(vec![Term::new(tag), Term::pair(likes, TermId::var("x"))]).unwrap(),
        Filter::new(vec![Term::new(tag).src_var("y"), Term::new(likes).src_var("y").not()])
            .unwrap(),
    ];

    let mut scratch = CompileScratch::new();
    for filter in &filters {
        let shared = Rule::compile(&world, filter, RuleConfig::default(), &mut scratch).unwrap();
        let fresh = Rule::new(&world, filter).unwrap();
        assert_eq!(shared.ops(), fresh.ops());
        assert_eq!(shared.disassemble(&world), fresh.disassemble(&world));
    }
}

#[test]
fn many_iterators_share_one_rule() {
    let (world, tag, _) = world();
    let rule = rule(&world, vec![Term::new(tag)]);
    let total = rule.iter(&world).count();

    let mut first = rule.iter(&world);
    let mut second = rule.iter(&world);
    assert_eq!(first.next(), second.next());

    // Advancing one iterator leaves the other where it was
    let rest_of_first: Vec<_> = first.collect();
    assert_eq!(rest_of_first.len(), total - 1);
    assert_eq!(second.count(), total - 1);
}
