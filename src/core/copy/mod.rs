//! Copy pass orchestration
//!
//! This module coordinates a copy pass: dependency resolution, reference
//! rewriting, creation at the destination and mapping bookkeeping.

pub mod orchestrator;
pub mod report;
pub mod state;

pub use orchestrator::{CopyOptions, CopyOrchestrator};
pub use report::{
    AbandonedEntity, CopyReport, CreatedEntity, FailedEntity, PlannedEntity, SkippedEntity,
    Warning,
};
pub use state::{EntityProgress, EntityState, IllegalTransition};
