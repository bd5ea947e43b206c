//! Copy command implementation
//!
//! This module implements the `copy` command, which copies the requested
//! roots and everything they depend on to the destination instance.

use super::confirm;
use crate::adapters::RootFilter;
use crate::config::load_config;
use crate::core::copy::{CopyOrchestrator, CopyReport};
use crate::domain::{EntityId, EntityKind, EntityRef};
use clap::Args;
use std::collections::HashSet;
use tokio::sync::watch;

/// Arguments for the copy command
#[derive(Args, Debug, Default)]
pub struct CopyArgs {
    /// Source dashboard ID(s) to copy
    #[arg(long = "dashboard", value_name = "ID", num_args = 1..)]
    pub dashboards: Vec<u64>,

    /// Source question ID(s) to copy
    #[arg(long = "question", value_name = "ID", num_args = 1..)]
    pub questions: Vec<u64>,

    /// Source collection ID(s) to copy (the collection itself)
    #[arg(long = "collection", value_name = "ID", num_args = 1..)]
    pub collections: Vec<u64>,

    /// Copy every dashboard inside these source collection(s)
    #[arg(long = "collection-dashboards", value_name = "ID", num_args = 1..)]
    pub collection_dashboards: Vec<u64>,

    /// Roots as kind:id (e.g. dashboard:12), copied in the order given
    ///
    /// Roots run grouped: --dashboard, then --question, then --collection,
    /// then --root, then --collection-dashboards. Use --root alone to control
    /// the order across kinds.
    #[arg(long = "root", value_name = "KIND:ID", num_args = 1..)]
    pub roots: Vec<EntityRef>,

    /// Dry run mode - resolve and report without creating anything
    #[arg(long)]
    pub dry_run: bool,

    /// Number of roots copied concurrently
    #[arg(long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl CopyArgs {
    /// Roots named directly on the command line, duplicates removed
    ///
    /// Grouped by flag (dashboards, questions, collections, then `--root`),
    /// each group in command-line order.
    pub fn explicit_roots(&self) -> Result<Vec<EntityRef>, String> {
        let by_kind = [
            (EntityKind::Dashboard, &self.dashboards),
            (EntityKind::Question, &self.questions),
            (EntityKind::Collection, &self.collections),
        ];

        let mut roots = Vec::new();
        for (kind, ids) in by_kind {
            for id in ids {
                roots.push(EntityRef::new(kind, EntityId::new(*id)?));
            }
        }
        roots.extend(self.roots.iter().copied());
        Ok(dedup(roots))
    }

    /// Execute the copy command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting copy command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        // Apply CLI overrides
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }
        if let Some(parallel) = self.parallel {
            tracing::info!(parallel_roots = parallel, "Overriding parallel roots from CLI");
            config.copy.parallel_roots = parallel;
        }

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let explicit = match self.explicit_roots() {
            Ok(roots) => roots,
            Err(e) => {
                eprintln!("Invalid root: {e}");
                return Ok(2);
            }
        };
        if explicit.is_empty() && self.collection_dashboards.is_empty() {
            eprintln!("Nothing to copy: pass --dashboard, --question, --collection, --collection-dashboards or --root");
            return Ok(2);
        }

        let dry_run = config.application.dry_run;
        if dry_run {
            println!("🔍 DRY RUN MODE - Nothing will be created at the destination");
            println!();
        }

        if !self.yes && !dry_run {
            println!("Copy Configuration:");
            println!("  Source: {}", config.source.base_url);
            println!("  Destination: {}", config.destination.base_url);
            println!("  Roots: {}", describe_roots(&explicit, &self.collection_dashboards));
            println!("  Parallel roots: {}", config.copy.parallel_roots);
            println!();
            if !confirm("Proceed with copy?")? {
                println!("Copy cancelled.");
                return Ok(0);
            }
        }

        tracing::info!("Creating copy orchestrator");
        let orchestrator = match CopyOrchestrator::from_config(&config).await {
            Ok(o) => o.with_shutdown(shutdown_signal),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create copy orchestrator");
                eprintln!("Failed to initialize copy: {e}");
                return Ok(4); // Connection error exit code
            }
        };

        let mut roots = explicit;
        for collection in &self.collection_dashboards {
            let filter = match EntityId::new(*collection) {
                Ok(id) => RootFilter::DashboardsInCollection(id),
                Err(e) => {
                    eprintln!("Invalid collection: {e}");
                    return Ok(2);
                }
            };
            match orchestrator.source().list_roots(filter).await {
                Ok(found) => {
                    tracing::info!(filter = %filter, roots = found.len(), "Listed roots");
                    roots.extend(found);
                }
                Err(e) => {
                    eprintln!("Failed to list {filter}: {e}");
                    return Ok(4);
                }
            }
        }
        let roots = dedup(roots);

        println!("🚀 Copying {} root(s)...", roots.len());
        println!();

        let report = match orchestrator.copy(&roots).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Copy failed");
                eprintln!("Copy failed: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        println!("📊 Copy Report:");
        println!("{report}");
        println!();

        Ok(exit_code(&report))
    }
}

/// Exit code for a finished copy
pub fn exit_code(report: &CopyReport) -> i32 {
    if let Some(fatal) = &report.fatal {
        println!("❌ Copy stopped: {fatal}");
        5 // Fatal error exit code
    } else if report.interrupted {
        println!("⚠️  Copy interrupted. Mapped entities are saved; run the same command to resume.");
        130 // SIGINT exit code (standard Unix convention)
    } else if report.is_successful() {
        println!("✅ Copy completed successfully!");
        0
    } else {
        println!("⚠️  Copy completed with failures");
        1
    }
}

fn dedup(roots: Vec<EntityRef>) -> Vec<EntityRef> {
    let mut seen = HashSet::new();
    roots.into_iter().filter(|r| seen.insert(*r)).collect()
}

fn describe_roots(roots: &[EntityRef], collections: &[u64]) -> String {
    let mut parts: Vec<String> = roots.iter().map(ToString::to_string).collect();
    parts.extend(
        collections
            .iter()
            .map(|id| format!("dashboards in collection {id}")),
    );
    parts.join(", ")
}
