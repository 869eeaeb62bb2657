//! Entity allocation with generational indices.
//!
//! The `EntityStore` hands out entity ids and detects stale references to
//! destroyed entities. The first [`BUILTIN_COUNT`] indices are reserved for the
//! builtin entities so their ids are the same in every world.

// Allow u64 to usize casts - we target 64-bit systems
#![allow(clippy::cast_possible_truncation)]

use quarry_foundation::{BUILTIN_COUNT, EntityId, Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Manages entity lifecycle and generation tracking.
///
/// Odd generations are alive, even generations are free.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityStore {
    generations: Vec<u32>,
    free_list: Vec<u64>,
    live_count: usize,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    /// Creates a store with the builtin entities already allocated.
    #[must_use]
    pub fn new() -> Self {
        Self {
            generations: vec![1; BUILTIN_COUNT as usize],
            free_list: Vec::new(),
            live_count: BUILTIN_COUNT as usize,
        }
    }

    /// Allocates a new entity, reusing freed indices first.
    pub fn spawn(&mut self) -> EntityId {
        self.live_count += 1;
        if let Some(index) = self.free_list.pop() {
            let generation = &mut self.generations[index as usize];
            *generation += 1;
            EntityId::new(index, *generation)
        } else {
            let index = self.generations.len() as u64;
            self.generations.push(1);
            EntityId::new(index, 1)
        }
    }

    /// Frees an entity.
    ///
    /// # Errors
    /// Returns an error if the entity is stale, unknown, or builtin.
    pub fn destroy(&mut self, id: EntityId) -> Result<()> {
        self.validate(id)?;
        if id.is_builtin() {
            return Err(Error::internal(format!("cannot destroy builtin {id:?}")));
        }
        self.generations[id.index as usize] += 1;
        self.free_list.push(id.index);
        self.live_count -= 1;
        Ok(())
    }

    /// Checks if an entity exists and is not stale.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        self.validate(id).is_ok()
    }

    /// Validates that an entity is live.
    ///
    /// # Errors
    /// Returns `StaleEntity` on a generation mismatch and `EntityNotFound`
    /// for indices that were never allocated or are currently free.
    pub fn validate(&self, id: EntityId) -> Result<()> {
        match self.generations.get(id.index as usize) {
            None => Err(Error::entity_not_found(id)),
            Some(&current) if current != id.generation => Err(Error::stale_entity(id)),
            Some(&current) if current % 2 == 0 => Err(Error::entity_not_found(id)),
            Some(_) => Ok(()),
        }
    }

    /// Number of live entities, builtins included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if there are no live entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }
}
