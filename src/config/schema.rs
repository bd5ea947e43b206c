//! Configuration schema types
//!
//! This module defines the configuration structure for dashclone.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};

/// Main dashclone configuration
///
/// This is the root configuration structure that maps to the TOML file.
/// Every section has defaults so a configuration can be built purely from
/// environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashcloneConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Instance content is copied from
    #[serde(default)]
    pub source: InstanceConfig,

    /// Instance content is copied to
    #[serde(default)]
    pub destination: InstanceConfig,

    /// Mapping cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Copy engine settings
    #[serde(default)]
    pub copy: CopyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DashcloneConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.source.validate("source")?;
        self.destination.validate("destination")?;

        crate::domain::InstancePairKey::new(&self.source.base_url, &self.destination.base_url)?;

        self.cache.validate()?;
        self.copy.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (resolve and report, create nothing)
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    fn validate(&self, section: &str) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err(format!("{section}.retry.max_retries must be > 0"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(format!("{section}.retry.backoff_multiplier must be >= 1.0"));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(format!(
                "{section}.retry.initial_delay_ms must not exceed max_delay_ms"
            ));
        }
        Ok(())
    }

    /// Delay before the given retry (1-based), capped at `max_delay_ms`
    pub fn delay_ms(&self, attempt: usize) -> u64 {
        let factor = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay = (self.initial_delay_ms as f64 * factor) as u64;
        delay.min(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Connection settings for one analytics instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Base URL of the instance, e.g. `https://bi.example.com`
    #[serde(default)]
    pub base_url: String,

    /// Login user (usually an email address)
    #[serde(default)]
    pub username: String,

    /// Login password
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// TLS certificate verification enabled
    ///
    /// **SECURITY WARNING**: Disabling TLS verification exposes the session
    /// token to man-in-the-middle attacks. Only use it against test instances
    /// with self-signed certificates.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
}

impl InstanceConfig {
    fn validate(&self, section: &str) -> Result<(), String> {
        use secrecy::ExposeSecret;

        if self.base_url.is_empty() {
            return Err(format!("{section}.base_url cannot be empty"));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!(
                "{section}.base_url must start with http:// or https://"
            ));
        }

        if self.username.is_empty() {
            return Err(format!("{section}.username cannot be empty"));
        }

        if self
            .password
            .as_ref()
            .map(|s| s.expose_secret().is_empty())
            .unwrap_or(true)
        {
            return Err(format!("{section}.password cannot be empty"));
        }

        if self.timeout_seconds == 0 {
            return Err(format!("{section}.timeout_seconds must be > 0"));
        }

        self.retry.validate(section)
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: None,
            timeout_seconds: default_timeout_seconds(),
            tls_verify: true,
            retry: RetryConfig::default(),
        }
    }
}

/// Mapping cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Folder holding one sub-folder per instance pair
    #[serde(default = "default_cache_folder")]
    pub folder: String,

    /// Persist the mapping after every created entity instead of once per run
    #[serde(default = "default_true")]
    pub checkpoint_each_entry: bool,
}

impl CacheConfig {
    fn validate(&self) -> Result<(), String> {
        if self.folder.trim().is_empty() {
            return Err("cache.folder cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            folder: default_cache_folder(),
            checkpoint_each_entry: true,
        }
    }
}

/// Copy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Number of roots processed concurrently (1 = sequential)
    #[serde(default = "default_parallel_roots")]
    pub parallel_roots: usize,

    /// Warn when an equivalent entity already exists at the destination
    #[serde(default = "default_true")]
    pub warn_on_existing: bool,

    /// Warehouse database pairs whose table and field IDs are remapped
    #[serde(default)]
    pub databases: Vec<DatabaseMappingConfig>,
}

impl CopyConfig {
    fn validate(&self) -> Result<(), String> {
        if self.parallel_roots == 0 || self.parallel_roots > 32 {
            return Err("copy.parallel_roots must be between 1 and 32".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for database in &self.databases {
            if database.source_id == 0 || database.destination_id == 0 {
                return Err("copy.databases ids must be positive".to_string());
            }
            if !seen.insert(database.source_id) {
                return Err(format!(
                    "copy.databases lists source database {} more than once",
                    database.source_id
                ));
            }
        }
        Ok(())
    }
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            parallel_roots: default_parallel_roots(),
            warn_on_existing: true,
            databases: Vec::new(),
        }
    }
}

/// A source warehouse database and its destination counterpart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMappingConfig {
    /// Database ID on the source instance
    pub source_id: u64,

    /// Database ID on the destination instance
    pub destination_id: u64,

    /// Also remap table and field IDs by name
    #[serde(default = "default_true")]
    pub match_fields: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log file path
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_retries() -> usize {
    3
}

fn default_cache_folder() -> String {
    ".dashclone".to_string()
}

fn default_parallel_roots() -> usize {
    1
}

fn default_local_path() -> String {
    "/var/log/dashclone".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
