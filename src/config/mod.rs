//! Configuration management for dashclone.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! dashclone uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - Environment variable overrides, including the `SOURCE_INSTANCE_*`,
//!   `DEST_INSTANCE_*` and `CONFIG_FOLDER` variables
//! - Default values for optional settings
//! - Validation of every section
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level and dry-run flag
//! - [`InstanceConfig`] - Source and destination connection and login
//! - [`CacheConfig`] - Where the ID mapping cache is kept
//! - [`CopyConfig`] - Parallelism, existing-content warnings, database remaps
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [source]
//! base_url = "https://staging-bi.example.com"
//! username = "copy-bot@example.com"
//! password = "${SOURCE_INSTANCE_PASSWORD}"
//!
//! [destination]
//! base_url = "https://bi.example.com"
//! username = "copy-bot@example.com"
//! password = "${DEST_INSTANCE_PASSWORD}"
//!
//! [cache]
//! folder = ".dashclone"
//!
//! [[copy.databases]]
//! source_id = 2
//! destination_id = 5
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    ApplicationConfig, CacheConfig, CopyConfig, DashcloneConfig, DatabaseMappingConfig,
    InstanceConfig, LoggingConfig, RetryConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
