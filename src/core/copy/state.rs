//! Per-entity copy state
//!
//! ```text
//! Pending -> Resolving -> AlreadyMapped
//!                      -> Rewriting -> Creating -> Mapped
//!                                   -> Failed   -> Failed
//! ```
//!
//! `Mapped`, `AlreadyMapped` and `Failed` are terminal.

use crate::domain::{EntityId, EntityRef};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Pending,
    /// Looking the entity up in the mapping store
    Resolving,
    AlreadyMapped(EntityId),
    Rewriting,
    Creating,
    Mapped(EntityId),
    Failed,
}

/// A state change the copy state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal state transition for {entity}: {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub entity: EntityRef,
    pub from: EntityState,
    pub to: EntityState,
}

impl EntityState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntityState::AlreadyMapped(_) | EntityState::Mapped(_) | EntityState::Failed
        )
    }

    fn allows(&self, next: &EntityState) -> bool {
        use EntityState::*;
        matches!(
            (self, next),
            (Pending, Resolving)
                | (Resolving, AlreadyMapped(_))
                | (Resolving, Rewriting)
                | (Rewriting, Creating)
                | (Rewriting, Failed)
                | (Creating, Mapped(_))
                | (Creating, Failed)
        )
    }
}

/// Tracks one entity through the state machine
#[derive(Debug, Clone, Copy)]
pub struct EntityProgress {
    entity: EntityRef,
    state: EntityState,
}

impl EntityProgress {
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            state: EntityState::Pending,
        }
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    /// Move to `next`
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] and keeps the current state if the
    /// state machine does not allow the change.
    pub fn advance(&mut self, next: EntityState) -> Result<EntityState, IllegalTransition> {
        if !self.state.allows(&next) {
            return Err(IllegalTransition {
                entity: self.entity,
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(entity = %self.entity, from = ?self.state, to = ?next, "State change");
        self.state = next;
        Ok(next)
    }
}
