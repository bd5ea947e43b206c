//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod copy;
pub mod forget;
pub mod init;
pub mod list;
pub mod status;
pub mod validate;

use crate::adapters::FileMappingStorage;
use crate::config::DashcloneConfig;
use crate::core::mapping::MappingStore;
use crate::domain::{DashcloneError, InstancePairKey, Result};
use std::io::{self, Write};
use std::sync::Arc;

/// Open the file-backed mapping store of the configured instance pair
///
/// Needs no network access.
pub(crate) async fn open_mapping_store(config: &DashcloneConfig) -> Result<MappingStore> {
    let pair = InstancePairKey::new(&config.source.base_url, &config.destination.base_url)
        .map_err(DashcloneError::Configuration)?;
    let storage = Arc::new(FileMappingStorage::new(&config.cache.folder));
    MappingStore::open(pair, storage).await
}

/// Ask a yes/no question on stdin; anything but `y` is a no
pub(crate) fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt} [y/N]: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
