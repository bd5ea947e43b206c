//! Status command implementation
//!
//! This module implements the `status` command for displaying the ID
//! mapping cache of the configured instance pair.

use super::open_mapping_store;
use crate::config::load_config;
use crate::domain::EntityKind;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter by entity kind (collection, dashboard, question, card)
    #[arg(long)]
    pub kind: Option<EntityKind>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking mapping status");

        println!("📊 Mapping Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let store = match open_mapping_store(&config).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to open mapping cache");
                println!("   Error: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        println!("Instance pair: {}", store.pair());
        println!("Cache: {}", store.location());
        println!();

        if store.is_empty() {
            println!("No copy history found.");
            println!("Run 'dashclone copy' to start copying content.");
            return Ok(0);
        }

        let entries = store.entries(self.kind);
        if entries.is_empty() {
            println!("No mapping entries match the specified filters.");
            return Ok(0);
        }

        for kind in EntityKind::ALL {
            let count = entries.iter().filter(|(r, _)| r.kind == kind).count();
            if count > 0 {
                println!("  {:<12} {count}", kind.as_str());
            }
        }
        println!();

        println!("{:<24} {:<15}", "Source", "Destination ID");
        println!("{}", "-".repeat(40));
        for (source, destination) in entries {
            println!("{:<24} {:<15}", source.to_string(), destination.to_string());
        }
        println!();

        Ok(0)
    }
}
