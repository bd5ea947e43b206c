//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the dashclone configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // Loading validates as well
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Source: {} (as {})", config.source.base_url, config.source.username);
        println!(
            "  Destination: {} (as {})",
            config.destination.base_url, config.destination.username
        );
        println!("  Cache Folder: {}", config.cache.folder);
        println!("  Parallel Roots: {}", config.copy.parallel_roots);
        println!("  Warn On Existing: {}", config.copy.warn_on_existing);
        for database in &config.copy.databases {
            println!(
                "  Database Remap: {} -> {}{}",
                database.source_id,
                database.destination_id,
                if database.match_fields { " (tables and fields)" } else { "" }
            );
        }
        println!();
        Ok(0)
    }
}
