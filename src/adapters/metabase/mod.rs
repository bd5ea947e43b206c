//! Metabase adapter implementation
//!
//! This module provides the HTTP integration with Metabase instances:
//! session login, entity reads and creates, collection listings and
//! warehouse metadata.

pub mod client;
pub mod models;

pub use client::MetabaseClient;
pub use models::{GridPosition, SERVER_MANAGED_FIELDS, SESSION_HEADER};
