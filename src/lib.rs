//! Quarry - Backtracking rule engine over archetype storage
//!
//! This crate re-exports all layers of the Quarry system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: quarry_rules       Rule compiler, backtracking VM, traversal caches
//! Layer 1: quarry_storage     Archetype tables, id index, names
//! Layer 0: quarry_foundation  Core types (EntityId, Id, VarMask, Error)
//! ```
//!
//! # Example
//!
//! ```
//! use quarry::{EntityId, Filter, Rule, Term, World};
//!
//! let mut world = World::new();
//! let unit = world.entity("Unit");
//! let warrior = world.entity("Warrior");
//! world.add_pair(warrior, EntityId::IS_A, unit).unwrap();
//!
//! let grunt = world.spawn();
//! world.add(grunt, warrior).unwrap();
//!
//! // Warrior is a Unit, so grunt matches Unit through inheritance
//! let rule = Rule::new(&world, &Filter::new(vec![Term::new(unit)]).unwrap()).unwrap();
//! let entities: Vec<EntityId> = rule.iter(&world).flat_map(|m| m.entities().to_vec()).collect();
//! assert_eq!(entities, vec![grunt]);
//! ```

pub use quarry_foundation as foundation;
pub use quarry_rules as rules;
pub use quarry_storage as storage;

pub use quarry_foundation::{EntityId, Error, ErrorKind, Id, Result, VarId, VarMask};
pub use quarry_rules::{
    CompileScratch, Field, Filter, FilterBuilder, Match, Rule, RuleConfig, RuleIter, Term, TermId,
};
pub use quarry_storage::{TableId, World};
