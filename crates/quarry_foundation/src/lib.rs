//! Core types for Quarry.
//!
//! This crate provides:
//! - [`EntityId`] - Generational entity identifiers and the builtin entities
//! - [`Id`] - Tags and `(relationship, target)` pairs
//! - [`VarMask`] - Fixed-width variable bitset used by the rule compiler and VM
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entity;
pub mod error;
pub mod id;
pub mod mask;

pub use entity::{BUILTIN_COUNT, EntityId};
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use id::Id;
pub use mask::{MAX_VARS, VarId, VarMask};
