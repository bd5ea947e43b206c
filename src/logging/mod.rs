//! Logging and observability
//!
//! Structured logging through `tracing`, plus a few macros that keep the
//! field names of recurring events consistent.
//!
//! # Example
//!
//! ```no_run
//! use dashclone::logging::init_logging;
//! use dashclone::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(entity = "dashboard:12", "Copy started");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, parse_log_level, LoggingGuard};

/// Log a newly created destination entity
///
/// # Example
///
/// ```no_run
/// use dashclone::log_entity_created;
/// use dashclone::domain::{EntityId, EntityRef};
///
/// let source = EntityRef::dashboard(EntityId::new(12).unwrap());
/// let destination = EntityId::new(40).unwrap();
/// log_entity_created!(&source, &destination);
/// ```
#[macro_export]
macro_rules! log_entity_created {
    ($entity:expr, $destination_id:expr) => {
        tracing::info!(
            entity = %$entity,
            destination_id = %$destination_id,
            "Entity created at destination"
        );
    };
}

/// Log a copy failure attributed to an entity and its root
///
/// # Example
///
/// ```no_run
/// use dashclone::log_entity_failed;
/// use dashclone::domain::{EntityId, EntityRef};
///
/// let root = EntityRef::dashboard(EntityId::new(12).unwrap());
/// log_entity_failed!(&root, &root, "Server error: 500");
/// ```
#[macro_export]
macro_rules! log_entity_failed {
    ($entity:expr, $root:expr, $reason:expr) => {
        tracing::error!(
            entity = %$entity,
            root = %$root,
            reason = %$reason,
            "Entity copy failed"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use dashclone::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying request"
        );
    };
}
