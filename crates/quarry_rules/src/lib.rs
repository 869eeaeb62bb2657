//! Rule engine for Quarry.
//!
//! This crate provides:
//! - [`Filter`] and [`Term`] - The query input: an ordered list of terms
//! - [`Rule`] - A filter compiled into a linear instruction program
//! - [`RuleIter`] - A backtracking VM producing [`Match`]es lazily
//!
//! A rule is compiled once and never changes. Each iterator owns its own
//! variable registers, per-op scratch state, and traversal caches, so many
//! iterators can run over one rule at the same time.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod compiler;
pub mod config;
mod explain;
pub mod filter;
pub mod iter;
pub mod op;
pub mod rule;
pub mod term;
mod trav;
pub mod var;
pub mod vm;

pub use compiler::{CompileScratch, FieldSrc};
pub use config::RuleConfig;
pub use filter::{Filter, FilterBuilder};
pub use iter::{Field, Match, RuleIter};
pub use op::{EXHAUSTED, Label, MatchFlags, Op, OpKind, Ref};
pub use rule::Rule;
pub use term::{Oper, Predicate, Term, TermFlags, TermId, Traverse};
pub use var::{RuleVar, VarKind};
pub use vm::{OpProfile, TableRange};
