//! Domain error types
//!
//! This module defines the error hierarchy for dashclone.
//! All errors are domain-specific and don't expose third-party types.

use super::ids::{EntityId, EntityRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main dashclone error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum DashcloneError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Analytics instance errors
    #[error("Instance error: {0}")]
    Instance(#[from] InstanceError),

    /// Copy engine errors
    #[error("Copy error: {0}")]
    Copy(#[from] CopyError),

    /// Mapping cache errors
    #[error("Mapping cache error: {0}")]
    Cache(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Errors raised by an instance client
///
/// These errors don't expose third-party HTTP client types. They are
/// `Clone` so a failure can be recorded in a copy report and logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    /// Failed to connect to the instance
    #[error("Failed to connect to instance: {0}")]
    ConnectionFailed(String),

    /// Login or session failure
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The instance has no such entity
    #[error("Entity not found: {0}")]
    NotFound(EntityRef),

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Response could not be understood
    #[error("Invalid response from instance: {0}")]
    InvalidResponse(String),

    /// The operation is not available on this instance client
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The entity was created as `id` but a follow-up request failed
    ///
    /// The entity exists on the instance; only part of it was written.
    #[error("Created as {id} but left incomplete: {message}")]
    PartiallyCreated { id: EntityId, message: String },
}

impl InstanceError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            InstanceError::ConnectionFailed(_) | InstanceError::Timeout(_) => true,
            InstanceError::ServerError { .. } => true,
            InstanceError::ClientError { status, .. } => *status == 429,
            _ => false,
        }
    }
}

/// Errors raised by the copy engine
///
/// Every variant is attributable to a specific entity; the orchestrator
/// records them in the copy report instead of aborting the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CopyError {
    /// The dependency graph below a root contains a cycle
    #[error("Cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<EntityRef> },

    /// An entity references another entity that no longer exists at the source
    #[error("{referrer} references {missing}, which does not exist at the source")]
    DanglingReference {
        referrer: EntityRef,
        missing: EntityRef,
    },

    /// An entity was rewritten before one of its dependencies was mapped
    #[error("{referrer} references {missing}, which has no destination mapping")]
    UnresolvedReference {
        referrer: EntityRef,
        missing: EntityRef,
    },

    /// The instance client failed for this entity
    #[error("Instance client failed for {entity}: {source}")]
    InstanceClient {
        entity: EntityRef,
        #[source]
        source: InstanceError,
    },
}

impl CopyError {
    /// Short name of the error category, used in reports
    pub fn category(&self) -> &'static str {
        match self {
            CopyError::CyclicDependency { .. } => "CyclicDependency",
            CopyError::DanglingReference { .. } => "DanglingReference",
            CopyError::UnresolvedReference { .. } => "UnresolvedReference",
            CopyError::InstanceClient { .. } => "InstanceClientError",
        }
    }

    /// Entity the failure is attributed to
    ///
    /// A cycle is attributed to its first participant.
    pub fn entity(&self) -> Option<EntityRef> {
        match self {
            CopyError::CyclicDependency { cycle } => cycle.first().copied(),
            CopyError::DanglingReference { referrer, .. }
            | CopyError::UnresolvedReference { referrer, .. } => Some(*referrer),
            CopyError::InstanceClient { entity, .. } => Some(*entity),
        }
    }
}

/// Two different destination IDs proposed for the same source entity
///
/// Not an error: the existing entry is kept and the conflict is reported
/// as a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConflict {
    pub entity: EntityRef,
    pub existing: EntityId,
    pub proposed: EntityId,
}

impl std::fmt::Display for MappingConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} is already mapped to {}; ignored proposed {}",
            self.entity, self.existing, self.proposed
        )
    }
}

fn format_cycle(cycle: &[EntityRef]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

// Conversion from std::io::Error
impl From<std::io::Error> for DashcloneError {
    fn from(err: std::io::Error) -> Self {
        DashcloneError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for DashcloneError {
    fn from(err: serde_json::Error) -> Self {
        DashcloneError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for DashcloneError {
    fn from(err: toml::de::Error) -> Self {
        DashcloneError::Configuration(format!("TOML parse error: {err}"))
    }
}
