//! Core business logic for dashclone.
//!
//! This module contains the copy engine.
//!
//! # Modules
//!
//! - [`mapping`] - Source-ID to destination-ID mapping store
//! - [`resolve`] - Dependency resolution in creation order
//! - [`rewrite`] - Reference rewriting and warehouse remapping
//! - [`copy`] - Copy orchestration and reporting
//!
//! # Copy Workflow
//!
//! 1. **Open**: Load the mapping cache of the instance pair
//! 2. **Resolve**: Fetch each root and everything it transitively depends on
//! 3. **Rewrite**: Translate embedded references to destination IDs
//! 4. **Create**: Submit destination-ready entities, dependencies first
//! 5. **Record**: Store the new mapping entries and checkpoint the cache
//! 6. **Report**: Collect created, skipped, failed and abandoned entities
//!
//! # Example
//!
//! ```rust,no_run
//! use dashclone::config::load_config;
//! use dashclone::core::copy::CopyOrchestrator;
//! use dashclone::domain::EntityRef;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("dashclone.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let orchestrator = CopyOrchestrator::from_config(&config)
//!     .await?
//!     .with_shutdown(shutdown_rx);
//!
//! let root: EntityRef = "dashboard:12".parse()?;
//! let report = orchestrator.copy(&[root]).await?;
//!
//! println!("Created: {}", report.created.len());
//! println!("Failed: {}", report.failed.len());
//! # Ok(())
//! # }
//! ```

pub mod copy;
pub mod mapping;
pub mod resolve;
pub mod rewrite;
