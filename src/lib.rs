// dashclone - Metabase dashboard copy tool
// Copyright (c) 2025 dashclone Contributors
// Licensed under the MIT License

//! # dashclone - Metabase dashboard copy
//!
//! dashclone copies dashboards, the questions they embed and the
//! collections that contain them from one Metabase instance to another,
//! rewriting every cross-reference to the IDs the destination assigns.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Resolving** everything a dashboard transitively depends on
//! - **Rewriting** collection parents, card placements, nested queries and
//!   filter bindings to destination IDs
//! - **Remembering** source to destination IDs per instance pair, so a
//!   second run creates nothing twice
//! - **Remapping** warehouse databases, tables and fields between instances
//!
//! ## Architecture
//!
//! dashclone follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Copy engine (mapping, resolve, rewrite, copy)
//! - [`adapters`] - External integrations (Metabase HTTP API, mapping cache storage)
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dashclone::config::load_config;
//! use dashclone::core::copy::CopyOrchestrator;
//! use dashclone::domain::EntityRef;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("dashclone.toml")?;
//!     let orchestrator = CopyOrchestrator::from_config(&config).await?;
//!
//!     let report = orchestrator.copy(&["dashboard:12".parse::<EntityRef>()?]).await?;
//!
//!     println!("Created {} entities", report.created.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Offline Rehearsal
//!
//! The copy engine only talks to instances through
//! [`adapters::InstanceClient`], so it runs against in-memory instances too:
//!
//! ```rust
//! use dashclone::adapters::MemoryInstance;
//! use dashclone::core::copy::{CopyOptions, CopyOrchestrator};
//! use dashclone::core::mapping::MappingStore;
//! use dashclone::domain::{EntityKind, EntityRef, InstancePairKey};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let source = Arc::new(MemoryInstance::new("https://staging.example.com"));
//! source
//!     .insert_json(EntityKind::Collection, json!({"id": 1, "name": "Team"}))
//!     .unwrap();
//! let destination = Arc::new(MemoryInstance::with_first_id("https://bi.example.com", 100));
//!
//! let pair = InstancePairKey::new("https://staging.example.com", "https://bi.example.com").unwrap();
//! let store = Arc::new(MappingStore::in_memory(pair));
//! let orchestrator = CopyOrchestrator::new(source, destination, store, CopyOptions::default());
//!
//! let report = orchestrator
//!     .copy(&["collection:1".parse::<EntityRef>().unwrap()])
//!     .await
//!     .unwrap();
//! assert_eq!(report.created.len(), 1);
//! # });
//! ```
//!
//! ## Error Handling
//!
//! dashclone uses the [`domain::DashcloneError`] type for all errors:
//!
//! ```rust,no_run
//! use dashclone::domain::DashcloneError;
//!
//! fn example() -> Result<(), DashcloneError> {
//!     let config = dashclone::config::load_config("dashclone.toml")?;
//!     println!("Copying from {}", config.source.base_url);
//!     Ok(())
//! }
//! ```
//!
//! Per-entity failures never abort a copy; they are collected in the
//! [`core::copy::CopyReport`].

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
