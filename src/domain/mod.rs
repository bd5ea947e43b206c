//! Domain models and types for dashclone.
//!
//! This module contains the core domain types shared by every layer.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Identifiers** ([`EntityKind`], [`EntityId`], [`EntityRef`], [`InstancePairKey`])
//! - **Entity representations** ([`Entity`], [`Collection`], [`Question`], [`Dashboard`])
//! - **Error types** ([`DashcloneError`], [`InstanceError`], [`CopyError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, DashcloneError>`]:
//!
//! ```rust
//! use dashclone::domain::{EntityRef, Result};
//!
//! fn parse_root(raw: &str) -> Result<EntityRef> {
//!     raw.parse()
//!         .map_err(dashclone::domain::DashcloneError::Validation)
//! }
//!
//! assert!(parse_root("dashboard:12").is_ok());
//! assert!(parse_root("dashboard").is_err());
//! ```

pub mod entity;
pub mod errors;
pub mod ids;
pub mod query;
pub mod result;

// Re-export commonly used types for convenience
pub use entity::{Collection, Dashboard, DashboardCard, Entity, ParameterMapping, Question};
pub use errors::{CopyError, DashcloneError, InstanceError, MappingConflict};
pub use ids::{EntityId, EntityKind, EntityRef, InstancePairKey};
pub use result::Result;
