//! Forget command implementation
//!
//! This module implements the `forget` command, the manual invalidation of
//! ID mapping entries. A forgotten entity is created again by the next copy.

use super::{confirm, open_mapping_store};
use crate::config::load_config;
use crate::core::mapping::MappingStore;
use crate::domain::{EntityKind, EntityRef};
use clap::{ArgGroup, Args};

/// Arguments for the forget command
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("selection").required(true).args(["roots", "kind", "all"])))]
pub struct ForgetArgs {
    /// Entries to remove, as kind:id
    #[arg(long = "root", value_name = "KIND:ID", num_args = 1..)]
    pub roots: Vec<EntityRef>,

    /// Remove every entry of this kind
    #[arg(long)]
    pub kind: Option<EntityKind>,

    /// Remove every entry of the instance pair
    #[arg(long)]
    pub all: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl ForgetArgs {
    /// Remove the selected entries; returns how many were removed
    pub fn apply(&self, store: &MappingStore) -> usize {
        if self.all {
            return EntityKind::ALL.iter().map(|kind| store.clear(*kind)).sum();
        }
        if let Some(kind) = self.kind {
            return store.clear(kind);
        }
        self.roots
            .iter()
            .filter(|reference| store.remove(**reference).is_some())
            .count()
    }

    fn describe(&self) -> String {
        if self.all {
            "all mapping entries".to_string()
        } else if let Some(kind) = self.kind {
            format!("all {kind} mapping entries")
        } else {
            let roots: Vec<String> = self.roots.iter().map(ToString::to_string).collect();
            format!("mapping entries for {}", roots.join(", "))
        }
    }

    /// Execute the forget command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let store = match open_mapping_store(&config).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to open mapping cache");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if !self.yes && !confirm(&format!("Forget {} of {}?", self.describe(), store.pair()))? {
            println!("Nothing removed.");
            return Ok(0);
        }

        let removed = self.apply(&store);
        tracing::info!(removed = removed, selection = %self.describe(), "Mapping entries forgotten");

        if removed > 0 {
            if let Err(e) = store.flush().await {
                println!("❌ Failed to save mapping cache");
                println!("   Error: {e}");
                return Ok(5);
            }
        }

        println!("✅ Removed {removed} mapping entr{}", if removed == 1 { "y" } else { "ies" });
        Ok(0)
    }
}
