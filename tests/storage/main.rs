//! Integration tests for Layer 1: Storage
//!
//! Tests for entity allocation, archetype tables, the id index, and names.

mod entities;
mod names;
mod relationships;
mod tables;
