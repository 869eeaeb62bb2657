//! Archetype storage and the id index for Quarry.
//!
//! This crate provides:
//! - [`EntityStore`] - Generational entity allocation
//! - [`Table`] - Entities sharing one sorted type
//! - [`IdRecord`] - Per-id table membership, including wildcard forms
//! - [`World`] - Storage with cheap snapshots, names, and relationship properties

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entity;
pub mod table;
pub mod world;

pub use entity::EntityStore;
pub use table::{IdRecord, Table, TableId, TableRecord};
pub use world::{Record, World};
