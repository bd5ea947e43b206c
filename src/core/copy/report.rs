//! Copy report
//!
//! This module defines structures for tracking and reporting copy results.

use crate::core::rewrite::WarehouseRef;
use crate::domain::{CopyError, EntityId, EntityRef, MappingConflict};
use std::fmt;
use std::time::Duration;

/// An entity created at the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntity {
    pub entity: EntityRef,
    pub name: String,
    pub destination: EntityId,
    /// Root whose copy created the entity
    pub root: EntityRef,
}

/// An entity that already had a mapping entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntity {
    pub entity: EntityRef,
    pub destination: EntityId,
    pub root: EntityRef,
}

/// An entity whose copy failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntity {
    pub entity: EntityRef,
    pub root: EntityRef,
    pub error: CopyError,
}

/// An entity not attempted because an earlier entity of its root failed,
/// or because the run was interrupted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedEntity {
    pub entity: EntityRef,
    pub root: EntityRef,
}

/// An entity a dry run would create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntity {
    pub entity: EntityRef,
    pub name: String,
    pub root: EntityRef,
}

/// Something worth an operator's attention that did not fail the copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A different destination ID was proposed for a mapped entity
    MappingConflict(MappingConflict),

    /// An equivalent entity already existed at the destination; a new one was created anyway
    ExistingDestinationEntity {
        entity: EntityRef,
        existing: EntityId,
    },

    /// A warehouse table or field in a copied entity had no destination counterpart
    UnmatchedWarehouseId { entity: EntityRef, item: WarehouseRef },

    /// A source table or field found no counterpart while matching databases
    UnmatchedWarehouseName { database: u64, name: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MappingConflict(conflict) => write!(f, "Mapping conflict: {conflict}"),
            Warning::ExistingDestinationEntity { entity, existing } => write!(
                f,
                "{entity} already existed at the destination as id {existing}; created a new copy"
            ),
            Warning::UnmatchedWarehouseId { entity, item } => {
                write!(f, "{entity} uses {item}, which has no destination counterpart")
            }
            Warning::UnmatchedWarehouseName { database, name } => write!(
                f,
                "{name} in source database {database} has no destination counterpart"
            ),
        }
    }
}

/// Result of one copy pass
#[derive(Debug, Clone, Default)]
pub struct CopyReport {
    pub created: Vec<CreatedEntity>,
    pub skipped: Vec<SkippedEntity>,
    pub failed: Vec<FailedEntity>,
    pub abandoned: Vec<AbandonedEntity>,
    pub planned: Vec<PlannedEntity>,
    pub warnings: Vec<Warning>,

    /// Whether the pass ran without writing anything
    pub dry_run: bool,

    /// Whether a shutdown signal stopped the pass early
    pub interrupted: bool,

    /// Failure that stopped the whole pass, such as an unsaved mapping cache
    pub fatal: Option<String>,

    pub duration: Duration,
}

impl CopyReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Append another report's entries
    pub fn merge(&mut self, other: CopyReport) {
        self.created.extend(other.created);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
        self.abandoned.extend(other.abandoned);
        self.planned.extend(other.planned);
        self.warnings.extend(other.warnings);
        self.interrupted |= other.interrupted;
        if self.fatal.is_none() {
            self.fatal = other.fatal;
        }
    }

    /// Destination ID created for a source entity during this pass
    pub fn created_id(&self, entity: EntityRef) -> Option<EntityId> {
        self.created
            .iter()
            .find(|c| c.entity == entity)
            .map(|c| c.destination)
    }

    /// Check if the copy was successful (no failures)
    pub fn is_successful(&self) -> bool {
        self.failed.is_empty() && self.fatal.is_none()
    }

    /// Log the report
    pub fn log_summary(&self) {
        tracing::info!(
            created = self.created.len(),
            skipped = self.skipped.len(),
            failed = self.failed.len(),
            abandoned = self.abandoned.len(),
            planned = self.planned.len(),
            warnings = self.warnings.len(),
            dry_run = self.dry_run,
            interrupted = self.interrupted,
            fatal = self.fatal.is_some(),
            duration_secs = self.duration.as_secs(),
            "Copy completed"
        );

        for failure in &self.failed {
            tracing::warn!(
                entity = %failure.entity,
                root = %failure.root,
                category = failure.error.category(),
                error = %failure.error,
                "Copy failure"
            );
        }
        for warning in &self.warnings {
            tracing::warn!(warning = %warning, "Copy warning");
        }
        if let Some(fatal) = &self.fatal {
            tracing::error!(error = %fatal, "Copy pass stopped early");
        }
    }
}

impl fmt::Display for CopyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "Planned: {}", self.planned.len())?;
            for planned in &self.planned {
                writeln!(f, "  + {} {:?} (root {})", planned.entity, planned.name, planned.root)?;
            }
        } else {
            writeln!(f, "Created: {}", self.created.len())?;
            for created in &self.created {
                writeln!(
                    f,
                    "  + {} {:?} => {}",
                    created.entity, created.name, created.destination
                )?;
            }
        }
        writeln!(f, "Skipped (already mapped): {}", self.skipped.len())?;
        writeln!(f, "Failed: {}", self.failed.len())?;
        for failure in &self.failed {
            writeln!(
                f,
                "  - {} (root {}): {}: {}",
                failure.entity,
                failure.root,
                failure.error.category(),
                failure.error
            )?;
        }
        writeln!(f, "Abandoned: {}", self.abandoned.len())?;
        for abandoned in &self.abandoned {
            writeln!(f, "  - {} (root {})", abandoned.entity, abandoned.root)?;
        }
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings: {}", self.warnings.len())?;
            for warning in &self.warnings {
                writeln!(f, "  ! {warning}")?;
            }
        }
        if let Some(fatal) = &self.fatal {
            writeln!(f, "Stopped: {fatal}")?;
        }
        write!(f, "Duration: {:.2}s", self.duration.as_secs_f64())
    }
}
